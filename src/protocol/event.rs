//! Typed events carried in the `data:` lines of a run response.

use serde::Deserialize;
use serde_json::Value;

use crate::types::Usage;

/// A decoded protocol event.
///
/// Event kinds this client does not understand decode to
/// [`ProtocolEvent::Unknown`] and are ignored downstream.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted {
        #[serde(default)]
        thread_id: Option<String>,
        #[serde(default)]
        run_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    TextMessageStart {
        #[serde(default)]
        message_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    TextMessageContent {
        #[serde(default)]
        message_id: Option<String>,
        delta: String,
    },
    #[serde(rename_all = "camelCase")]
    TextMessageEnd {
        #[serde(default)]
        message_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ToolCallStart {
        tool_call_id: String,
        tool_call_name: String,
        #[serde(default)]
        parent_message_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ToolCallArgs { tool_call_id: String, delta: String },
    #[serde(rename_all = "camelCase")]
    ToolCallEnd { tool_call_id: String },
    #[serde(rename_all = "camelCase")]
    ToolCallResult {
        tool_call_id: String,
        #[serde(default)]
        content: Value,
    },
    StateSnapshot {
        #[serde(default)]
        snapshot: Value,
    },
    StateDelta {
        #[serde(default)]
        delta: Value,
    },
    Custom {
        name: String,
        #[serde(default)]
        value: Value,
    },
    #[serde(rename_all = "camelCase")]
    RunFinished {
        #[serde(default)]
        usage: Option<Usage>,
        #[serde(default)]
        result: Option<Value>,
    },
    RunError {
        message: String,
        #[serde(default)]
        code: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl ProtocolEvent {
    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunFinished { .. } | Self::RunError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> ProtocolEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn decodes_tool_call_start() {
        let event = parse(json!({
            "type": "TOOL_CALL_START",
            "toolCallId": "t1",
            "toolCallName": "search",
            "parentMessageId": "m1"
        }));
        assert_eq!(
            event,
            ProtocolEvent::ToolCallStart {
                tool_call_id: "t1".into(),
                tool_call_name: "search".into(),
                parent_message_id: Some("m1".into()),
            }
        );
    }

    #[test]
    fn decodes_run_finished_usage() {
        let event = parse(json!({
            "type": "RUN_FINISHED",
            "threadId": "th",
            "runId": "r",
            "usage": {"inputTokens": 5, "outputTokens": 7, "totalTokens": 12}
        }));
        let ProtocolEvent::RunFinished { usage, .. } = event else {
            panic!("expected RUN_FINISHED");
        };
        assert_eq!(usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn unknown_type_is_ignored_not_rejected() {
        let event = parse(json!({"type": "STEP_STARTED", "stepName": "plan"}));
        assert_eq!(event, ProtocolEvent::Unknown);
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let result = serde_json::from_value::<ProtocolEvent>(json!({"type": "TOOL_CALL_ARGS"}));
        assert!(result.is_err());
    }

    #[test]
    fn terminal_events() {
        assert!(parse(json!({"type": "RUN_ERROR", "message": "x"})).is_terminal());
        assert!(!parse(json!({"type": "TEXT_MESSAGE_END"})).is_terminal());
    }
}
