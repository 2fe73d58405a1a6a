//! Tool calls that have started but are not yet resolved.

use serde_json::{Map, Value};
use tracing::warn;

/// A registered tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    args_buffer: String,
    parsed_args: Option<Value>,
}

impl PendingToolCall {
    fn new(tool_call_id: &str, tool_name: &str) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            tool_name: tool_name.to_string(),
            args_buffer: String::new(),
            parsed_args: None,
        }
    }

    /// Arguments as parsed at tool-call-end, or a lenient parse of the
    /// buffer for a call that never closed.
    pub fn args(&self) -> Value {
        self.parsed_args
            .clone()
            .unwrap_or_else(|| parse_arguments(&self.args_buffer))
    }

    pub fn args_buffer(&self) -> &str {
        &self.args_buffer
    }

    /// Whether tool-call-end has been seen.
    pub fn is_closed(&self) -> bool {
        self.parsed_args.is_some()
    }
}

/// Parse streamed arguments; empty or invalid JSON becomes `{}`.
pub fn parse_arguments(buffer: &str) -> Value {
    if buffer.trim().is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_str(buffer).unwrap_or_else(|error| {
        warn!(%error, "tool call arguments are not valid JSON; using {{}}");
        Value::Object(Map::new())
    })
}

/// Registry of pending tool calls, kept in call-start order.
#[derive(Debug, Default)]
pub struct ToolCallRegistry {
    calls: Vec<PendingToolCall>,
}

impl ToolCallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call with an empty argument buffer.
    ///
    /// A repeated start for a known id restarts that call in place.
    pub fn start(&mut self, tool_call_id: &str, tool_name: &str) {
        let call = PendingToolCall::new(tool_call_id, tool_name);
        match self.get_mut(tool_call_id) {
            Some(existing) => {
                warn!(tool_call_id, "tool call started twice; restarting it");
                *existing = call;
            }
            None => self.calls.push(call),
        }
    }

    /// Append an argument fragment. Returns false for an unknown id.
    pub fn append_args(&mut self, tool_call_id: &str, delta: &str) -> bool {
        match self.get_mut(tool_call_id) {
            Some(call) => {
                call.args_buffer.push_str(delta);
                true
            }
            None => {
                warn!(tool_call_id, "argument delta for unknown tool call");
                false
            }
        }
    }

    /// Close a call: parse its buffer and keep it registered.
    pub fn close(&mut self, tool_call_id: &str) -> Option<&PendingToolCall> {
        let call = self.get_mut(tool_call_id)?;
        call.parsed_args = Some(parse_arguments(&call.args_buffer));
        Some(&*call)
    }

    pub fn get(&self, tool_call_id: &str) -> Option<&PendingToolCall> {
        self.calls.iter().find(|c| c.tool_call_id == tool_call_id)
    }

    fn get_mut(&mut self, tool_call_id: &str) -> Option<&mut PendingToolCall> {
        self.calls.iter_mut().find(|c| c.tool_call_id == tool_call_id)
    }

    pub fn remove(&mut self, tool_call_id: &str) -> Option<PendingToolCall> {
        let index = self.position(tool_call_id)?;
        Some(self.calls.remove(index))
    }

    /// Call-start position of `tool_call_id`.
    pub fn position(&self, tool_call_id: &str) -> Option<usize> {
        self.calls.iter().position(|c| c.tool_call_id == tool_call_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.calls.iter().map(|c| c.tool_call_id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingToolCall> {
        self.calls.iter()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reassembles_fragments_split_inside_json() {
        let mut registry = ToolCallRegistry::new();
        registry.start("t1", "sum");
        assert!(registry.append_args("t1", "{\"a\":1"));
        assert!(registry.append_args("t1", ",\"b\":2}"));
        let call = registry.close("t1").unwrap();
        assert_eq!(call.args(), json!({"a": 1, "b": 2}));
        assert!(call.is_closed());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn invalid_or_empty_arguments_become_empty_object() {
        let mut registry = ToolCallRegistry::new();
        registry.start("t1", "a");
        registry.start("t2", "b");
        registry.append_args("t2", "{\"oops\":");
        assert_eq!(registry.close("t1").unwrap().args(), json!({}));
        assert_eq!(registry.close("t2").unwrap().args(), json!({}));
    }

    #[test]
    fn keeps_call_start_order() {
        let mut registry = ToolCallRegistry::new();
        registry.start("t2", "b");
        registry.start("t1", "a");
        registry.start("t3", "c");
        registry.remove("t1");
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["t2", "t3"]);
        assert_eq!(registry.position("t3"), Some(1));
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut registry = ToolCallRegistry::new();
        assert!(!registry.append_args("ghost", "{}"));
        assert!(registry.close("ghost").is_none());
        assert!(registry.remove("ghost").is_none());
    }

    #[test]
    fn restart_resets_buffer() {
        let mut registry = ToolCallRegistry::new();
        registry.start("t1", "a");
        registry.append_args("t1", "{\"x\":");
        registry.start("t1", "a");
        assert_eq!(registry.get("t1").unwrap().args_buffer(), "");
        assert_eq!(registry.len(), 1);
    }
}
