//! Collects tool results and assembles the single continuation for a run.

use serde_json::{json, Map, Value};
use tracing::warn;

use super::registry::ToolCallRegistry;
use crate::error::TetherError;
use crate::types::{Message, ToolCall};

/// Tool name recorded for results whose call was never registered.
pub const UNKNOWN_TOOL_NAME: &str = "unknown";

/// Result of executing one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub result: Value,
    pub success: bool,
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(result: Value) -> Self {
        Self {
            result,
            success: true,
            error: None,
        }
    }

    /// A failed execution. The message is still delivered to the agent.
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            result: json!({ "error": message }),
            success: false,
            error: Some(message),
        }
    }
}

impl From<Result<Value, TetherError>> for ToolOutcome {
    fn from(result: Result<Value, TetherError>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(error) => Self::failure(error.to_string()),
        }
    }
}

/// A result waiting for the rest of its batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub parsed_args: Value,
    pub result: Value,
    pub success: bool,
    pub error: Option<String>,
}

impl CollectedResult {
    /// Serialized payload sent as the tool message content.
    pub fn payload(&self) -> String {
        match &self.result {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    fn to_tool_call(&self) -> ToolCall {
        ToolCall {
            id: self.tool_call_id.clone(),
            name: self.tool_name.clone(),
            arguments: self.parsed_args.clone(),
        }
    }

    fn to_message(&self) -> Message {
        let mut message = Message::tool(self.tool_call_id.clone(), self.payload());
        message.error = self.error.clone();
        message
    }
}

/// Messages appended to the history by one continuation.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuationBatch {
    /// Assistant message listing every collected call.
    pub assistant: Message,
    /// One tool-role message per result, in call-start order.
    pub tool_messages: Vec<Message>,
}

impl ContinuationBatch {
    pub fn into_messages(self) -> Vec<Message> {
        std::iter::once(self.assistant)
            .chain(self.tool_messages)
            .collect()
    }
}

/// Collected results for the current run.
#[derive(Debug, Default)]
pub struct ContinuationBatcher {
    collected: Vec<CollectedResult>,
}

impl ContinuationBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result against the registry.
    ///
    /// An id the registry does not know is recorded under
    /// [`UNKNOWN_TOOL_NAME`] so the batch never stalls on it. With no
    /// calls outstanding there is no batch to join, so such a result is
    /// returned but not held.
    pub fn record(
        &mut self,
        registry: &ToolCallRegistry,
        tool_call_id: &str,
        outcome: ToolOutcome,
    ) -> CollectedResult {
        let (tool_name, parsed_args) = match registry.get(tool_call_id) {
            Some(call) => (call.tool_name.clone(), call.args()),
            None => {
                warn!(tool_call_id, "result for unregistered tool call");
                (UNKNOWN_TOOL_NAME.to_string(), Value::Object(Map::new()))
            }
        };
        let collected = CollectedResult {
            tool_call_id: tool_call_id.to_string(),
            tool_name,
            parsed_args,
            result: outcome.result,
            success: outcome.success,
            error: outcome.error,
        };
        if registry.is_empty() {
            warn!(tool_call_id, "no tool calls outstanding; result not batched");
            return collected;
        }
        match self
            .collected
            .iter_mut()
            .find(|r| r.tool_call_id == tool_call_id)
        {
            Some(existing) => {
                warn!(tool_call_id, "duplicate result; keeping the latest");
                *existing = collected.clone();
            }
            None => self.collected.push(collected.clone()),
        }
        collected
    }

    pub fn has_result(&self, tool_call_id: &str) -> bool {
        self.collected.iter().any(|r| r.tool_call_id == tool_call_id)
    }

    /// True when calls are outstanding and every one of them has a result.
    pub fn is_complete(&self, registry: &ToolCallRegistry) -> bool {
        !registry.is_empty() && registry.ids().all(|id| self.has_result(id))
    }

    /// Drop the result held for `tool_call_id`, if any.
    pub fn discard(&mut self, tool_call_id: &str) -> bool {
        let before = self.collected.len();
        self.collected.retain(|r| r.tool_call_id != tool_call_id);
        self.collected.len() != before
    }

    /// Registered calls still waiting for a result.
    pub fn missing(&self, registry: &ToolCallRegistry) -> Vec<String> {
        registry
            .ids()
            .filter(|id| !self.has_result(id))
            .map(str::to_string)
            .collect()
    }

    /// Drain results and registry into one batch.
    ///
    /// Results are ordered by call start; unregistered ones follow in
    /// arrival order.
    pub fn take_batch(
        &mut self,
        registry: &mut ToolCallRegistry,
        turn_text: &str,
    ) -> ContinuationBatch {
        let mut results = std::mem::take(&mut self.collected);
        results.sort_by_key(|r| registry.position(&r.tool_call_id).unwrap_or(usize::MAX));
        registry.clear();

        let calls = results.iter().map(CollectedResult::to_tool_call).collect();
        ContinuationBatch {
            assistant: Message::assistant_with_tool_calls(turn_text, calls),
            tool_messages: results.iter().map(CollectedResult::to_message).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.collected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.is_empty()
    }

    pub fn clear(&mut self) {
        self.collected.clear();
    }
}
