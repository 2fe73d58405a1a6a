//! HTTP plumbing shared by protocol adapters.

pub mod http;
