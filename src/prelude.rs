//! Convenience re-exports for common use.

pub use crate::adapter::{
    create_adapter, AdapterEvent, AdapterOptions, AdapterStatus, AgUiAdapter, ProtocolAdapter,
    SendOptions, StateUpdate, Subscription, ToolOutcome,
};
pub use crate::config::{TetherConfig, TransportKind};
pub use crate::error::{Result, TetherError};
pub use crate::tools::{FnTool, Tool, ToolExecutor, ToolInvocation, ToolSet};
pub use crate::types::{Message, Role, RunOutcome, ToolDefinition, Usage};
