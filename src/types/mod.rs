//! Core types for Tether.

pub mod message;
pub mod run;
pub mod usage;

pub use message::*;
pub use run::*;
pub use usage::*;
