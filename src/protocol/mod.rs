//! Wire protocol: response frame decoding and request encoding.

pub mod event;
pub mod frame;
pub mod wire;

pub use event::ProtocolEvent;
pub use frame::{decode_stream, Frame, FrameDecoder};
pub use wire::{encode_message, encode_run_input};
