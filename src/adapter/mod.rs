//! Protocol adapters: the public surface UI collaborators talk to.
//!
//! An adapter issues one streaming request per run, turns the response
//! into [`AdapterEvent`]s, and batches local tool results into a single
//! continuation request per run.

pub mod agui;
pub mod batcher;
pub mod dispatch;
pub mod events;
pub mod registry;
pub mod session;
pub mod state;

pub use agui::AgUiAdapter;
pub use batcher::{CollectedResult, ContinuationBatcher, ToolOutcome, UNKNOWN_TOOL_NAME};
pub use events::{AdapterEvent, EventBus, EventStream, Listener, StateUpdate, Subscription};
pub use registry::{PendingToolCall, ToolCallRegistry};
pub use session::AdapterState;
pub use state::{RunPhase, RunState};

use std::sync::Arc;

use async_trait::async_trait;
use bon::Builder;
use serde_json::Value;

use crate::config::{TetherConfig, TransportKind};
use crate::error::Result;
use crate::tools::{ToolExecutor, ToolSet};
use crate::types::{Message, RunOutcome, ToolDefinition};

/// Per-call request options for `send_message`.
///
/// Fields left unset keep their previous value, and the values in effect
/// are reused for continuations.
#[derive(Debug, Clone, Default, Builder)]
pub struct SendOptions {
    /// Tools advertised to the agent.
    pub tools: Option<Vec<ToolDefinition>>,
    #[builder(into)]
    pub model: Option<String>,
    pub context: Option<Vec<Value>>,
    pub forwarded_props: Option<Value>,
    /// Replace the in-memory transcript before appending the message.
    pub history: Option<Vec<Message>>,
}

/// Construction options shared by every adapter variant.
#[derive(Clone, Default)]
pub struct AdapterOptions {
    /// Runs client tool calls and feeds results back automatically.
    pub executor: Option<Arc<dyn ToolExecutor>>,
    /// Tools advertised on every request unless overridden per call.
    pub tools: Vec<ToolDefinition>,
}

impl AdapterOptions {
    /// Advertise and execute the tools in `tools`.
    pub fn with_tool_set(tools: ToolSet) -> Self {
        Self {
            tools: tools.definitions(),
            executor: Some(Arc::new(tools)),
        }
    }
}

impl std::fmt::Debug for AdapterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterOptions")
            .field("executor", &self.executor.as_ref().map(|_| ".."))
            .field("tools", &self.tools)
            .finish()
    }
}

/// Coarse adapter status, observable through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterStatus {
    /// No stream open and no tool calls outstanding.
    Idle,
    /// A response stream is open.
    Streaming,
    /// The last run ended with tool calls waiting for results.
    AwaitingToolResults,
}

/// Capability shared by all protocol variants.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Protocol this adapter speaks.
    fn transport(&self) -> TransportKind;

    /// Mark the adapter ready. No socket is opened.
    async fn connect(&self) -> Result<()>;

    /// Abort any in-flight request and notify the remote side.
    async fn disconnect(&self);

    /// Send a user message and drive the run to completion or abort.
    async fn send_message(&self, message: Message, options: SendOptions) -> Result<RunOutcome>;

    /// Report a locally executed tool result.
    async fn send_tool_result(&self, tool_call_id: &str, outcome: ToolOutcome)
        -> Result<RunOutcome>;

    /// Register a listener for normalized events.
    fn subscribe(&self, listener: Listener) -> Subscription;

    fn is_connected(&self) -> bool;
}

/// Create the adapter variant selected by `config.transport`.
pub fn create_adapter(
    config: TetherConfig,
    options: AdapterOptions,
) -> Result<Box<dyn ProtocolAdapter>> {
    match config.transport {
        TransportKind::AgUi => Ok(Box::new(AgUiAdapter::with_options(config, options)?)),
    }
}
