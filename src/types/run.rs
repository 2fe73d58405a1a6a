//! Outbound run requests.

use serde::{Deserialize, Serialize};

use super::message::Message;

/// Tool definition advertised to the remote agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One outbound streaming request.
///
/// Built fresh for every `send_message` and every continuation, and never
/// mutated after it is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInput {
    pub thread_id: String,
    pub run_id: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub state: serde_json::Value,
    pub context: Vec<serde_json::Value>,
    pub forwarded_props: serde_json::Value,
    pub model: Option<String>,
    /// Local marker: this request continues a tool-calling turn.
    pub continuation: bool,
}

/// How a call to `send_message` or `send_tool_result` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run (and any continuations it triggered) finished.
    Completed,
    /// The run finished with tool calls still waiting for results.
    AwaitingToolResults { pending: Vec<String> },
    /// The remote agent reported a run error.
    Failed { message: String },
    /// The run was aborted by `disconnect`.
    Cancelled,
}
