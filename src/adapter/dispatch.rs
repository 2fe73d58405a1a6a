//! Applies protocol events to the adapter state.

use serde_json::json;
use tracing::{debug, warn};

use super::batcher::UNKNOWN_TOOL_NAME;
use super::events::{AdapterEvent, StateUpdate};
use super::session::AdapterState;
use crate::protocol::ProtocolEvent;
use crate::tools::ToolInvocation;
use crate::types::Role;

/// Output of dispatching one event.
#[derive(Debug, Default, PartialEq)]
pub struct Dispatched {
    /// Events to emit, in order.
    pub events: Vec<AdapterEvent>,
    /// Client tool calls whose arguments are complete.
    pub closed_calls: Vec<ToolInvocation>,
}

/// Update `state` for one event and collect what must be emitted.
pub fn dispatch(state: &mut AdapterState, event: ProtocolEvent) -> Dispatched {
    let mut out = Dispatched::default();

    match event {
        ProtocolEvent::RunStarted { thread_id, run_id } => {
            state.run.on_run_started();
            out.events.push(AdapterEvent::RunStarted {
                thread_id: thread_id.unwrap_or_else(|| state.thread_id.clone()),
                run_id: run_id
                    .or_else(|| state.run_id.clone())
                    .unwrap_or_default(),
                continuation: state.continuation,
            });
        }
        ProtocolEvent::TextMessageStart { message_id } => {
            state.run.on_message_start(message_id.as_deref());
        }
        ProtocolEvent::TextMessageContent { delta, .. } => {
            let (message_id, content) = state.run.append_delta(&delta);
            out.events.push(AdapterEvent::Message {
                message_id,
                role: Role::Assistant,
                content,
            });
        }
        ProtocolEvent::TextMessageEnd { .. } => {
            state.run.on_message_end();
        }
        ProtocolEvent::ToolCallStart {
            tool_call_id,
            tool_call_name,
            ..
        } => {
            state.registry.start(&tool_call_id, &tool_call_name);
            state.run.on_tool_call();
            out.events.push(AdapterEvent::ToolCall {
                tool_call_id,
                tool_name: tool_call_name,
                args: json!({}),
                complete: false,
            });
        }
        ProtocolEvent::ToolCallArgs {
            tool_call_id,
            delta,
        } => {
            state.registry.append_args(&tool_call_id, &delta);
        }
        ProtocolEvent::ToolCallEnd { tool_call_id } => {
            let Some(call) = state.registry.close(&tool_call_id) else {
                warn!(tool_call_id = %tool_call_id, "end for unknown tool call");
                return out;
            };
            let invocation = ToolInvocation {
                tool_call_id: call.tool_call_id.clone(),
                tool_name: call.tool_name.clone(),
                arguments: call.args(),
            };
            state.run.on_tool_call_closed();
            out.events.push(AdapterEvent::ToolCall {
                tool_call_id: invocation.tool_call_id.clone(),
                tool_name: invocation.tool_name.clone(),
                args: invocation.arguments.clone(),
                complete: true,
            });
            if state.is_client_tool(&invocation.tool_name) {
                out.closed_calls.push(invocation);
            }
        }
        ProtocolEvent::ToolCallResult {
            tool_call_id,
            content,
        } => {
            // Resolved remotely: nothing to execute, nothing to continue.
            if state.batcher.discard(&tool_call_id) {
                debug!(tool_call_id = %tool_call_id, "dropping local result for remotely resolved call");
            }
            let tool_name = state
                .registry
                .remove(&tool_call_id)
                .map_or_else(|| UNKNOWN_TOOL_NAME.to_string(), |call| call.tool_name);
            out.events.push(AdapterEvent::ToolResult {
                tool_call_id,
                tool_name,
                result: content,
                success: true,
                error: None,
            });
        }
        ProtocolEvent::StateSnapshot { snapshot } => {
            state.agent_state = snapshot.clone();
            out.events.push(AdapterEvent::StateUpdate {
                update: StateUpdate::Snapshot(snapshot),
            });
        }
        ProtocolEvent::StateDelta { delta } => {
            out.events.push(AdapterEvent::StateUpdate {
                update: StateUpdate::Delta(delta),
            });
        }
        ProtocolEvent::Custom { name, value } => {
            out.events.push(AdapterEvent::Custom { name, value });
        }
        ProtocolEvent::RunFinished { usage, .. } => {
            state.run.finish(usage.as_ref());
            out.events.push(AdapterEvent::RunFinished {
                run_id: state.run_id.clone().unwrap_or_default(),
                usage,
            });
        }
        ProtocolEvent::RunError { message, code } => {
            state.run.fail();
            state.last_error = Some(message.clone());
            out.events.push(AdapterEvent::Error { message, code });
        }
        ProtocolEvent::Unknown => {
            debug!("ignoring unknown event type");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::state::RunPhase;
    use crate::adapter::batcher::ToolOutcome;
    use crate::adapter::session::StreamEnd;
    use crate::types::ToolDefinition;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn started_state() -> AdapterState {
        let mut state = AdapterState::new("thread-1");
        state.defaults.tools = vec![ToolDefinition {
            name: "search".into(),
            description: String::new(),
            parameters: json!({}),
        }];
        state.begin_request(false);
        state
    }

    /// Decode each value the way the frame decoder does, dropping malformed ones.
    fn feed(state: &mut AdapterState, events: Vec<Value>) -> Dispatched {
        let mut all = Dispatched::default();
        for value in events {
            let Ok(event) = serde_json::from_value::<ProtocolEvent>(value) else {
                continue;
            };
            let out = dispatch(state, event);
            all.events.extend(out.events);
            all.closed_calls.extend(out.closed_calls);
        }
        all
    }

    #[test]
    fn message_events_carry_full_snapshot() {
        let mut state = started_state();
        let out = feed(
            &mut state,
            vec![
                json!({"type": "RUN_STARTED", "threadId": "thread-1", "runId": "r1"}),
                json!({"type": "TEXT_MESSAGE_START", "messageId": "m1"}),
                json!({"type": "TEXT_MESSAGE_CONTENT", "messageId": "m1", "delta": "Hel"}),
                json!({"type": "TEXT_MESSAGE_CONTENT", "messageId": "m1", "delta": "lo"}),
                json!({"type": "TEXT_MESSAGE_END", "messageId": "m1"}),
            ],
        );
        let contents: Vec<_> = out
            .events
            .iter()
            .filter_map(|e| match e {
                AdapterEvent::Message { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["Hel", "Hello"]);
        assert_eq!(state.run.turn_text(), "Hello");
    }

    #[test]
    fn tool_call_lifecycle() {
        let mut state = started_state();
        let out = feed(
            &mut state,
            vec![
                json!({"type": "TOOL_CALL_START", "toolCallId": "t1", "toolCallName": "search"}),
                json!({"type": "TOOL_CALL_ARGS", "toolCallId": "t1", "delta": "{\"a\":1"}),
                json!({"type": "TOOL_CALL_ARGS", "toolCallId": "t1", "delta": ",\"b\":2}"}),
                json!({"type": "TOOL_CALL_END", "toolCallId": "t1"}),
            ],
        );
        assert_eq!(
            out.events,
            vec![
                AdapterEvent::ToolCall {
                    tool_call_id: "t1".into(),
                    tool_name: "search".into(),
                    args: json!({}),
                    complete: false,
                },
                AdapterEvent::ToolCall {
                    tool_call_id: "t1".into(),
                    tool_name: "search".into(),
                    args: json!({"a": 1, "b": 2}),
                    complete: true,
                },
            ]
        );
        assert_eq!(out.closed_calls.len(), 1);
        assert_eq!(state.registry.len(), 1);
    }

    #[test]
    fn backend_tool_is_not_executed_and_result_removes_it() {
        let mut state = started_state();
        let out = feed(
            &mut state,
            vec![
                json!({"type": "TOOL_CALL_START", "toolCallId": "b1", "toolCallName": "server_lookup"}),
                json!({"type": "TOOL_CALL_END", "toolCallId": "b1"}),
                json!({"type": "TOOL_CALL_RESULT", "toolCallId": "b1", "messageId": "m", "content": "42"}),
            ],
        );
        assert!(out.closed_calls.is_empty());
        assert!(state.registry.is_empty());
        assert_eq!(
            out.events.last(),
            Some(&AdapterEvent::ToolResult {
                tool_call_id: "b1".into(),
                tool_name: "server_lookup".into(),
                result: json!("42"),
                success: true,
                error: None,
            })
        );
    }

    #[test]
    fn remote_result_drops_local_result_for_same_call() {
        let mut state = started_state();
        feed(
            &mut state,
            vec![
                json!({"type": "TOOL_CALL_START", "toolCallId": "t1", "toolCallName": "search"}),
                json!({"type": "TOOL_CALL_END", "toolCallId": "t1"}),
            ],
        );
        let (_, next) = state.report_result("t1", ToolOutcome::success(json!("local")));
        assert!(next.is_none());

        feed(
            &mut state,
            vec![json!({"type": "TOOL_CALL_RESULT", "toolCallId": "t1", "content": "remote"})],
        );
        assert!(state.batcher.is_empty());
        assert_eq!(state.finish_stream(), StreamEnd::Completed);
        assert!(state.take_continuation().is_none());
    }

    #[test]
    fn state_and_custom_events_pass_through() {
        let mut state = started_state();
        let out = feed(
            &mut state,
            vec![
                json!({"type": "STATE_SNAPSHOT", "snapshot": {"plan": ["a"]}}),
                json!({"type": "STATE_DELTA", "delta": [{"op": "add", "path": "/plan/1", "value": "b"}]}),
                json!({"type": "CUSTOM", "name": "progress", "value": 0.5}),
            ],
        );
        assert_eq!(state.agent_state, json!({"plan": ["a"]}));
        assert_eq!(out.events.len(), 3);
        assert!(matches!(
            &out.events[2],
            AdapterEvent::Custom { name, .. } if name == "progress"
        ));
    }

    #[test]
    fn run_error_moves_to_error_phase() {
        let mut state = started_state();
        let out = feed(
            &mut state,
            vec![json!({"type": "RUN_ERROR", "message": "overloaded", "code": "503"})],
        );
        assert_eq!(state.run.phase(), RunPhase::Error);
        assert_eq!(state.last_error.as_deref(), Some("overloaded"));
        assert_eq!(
            out.events,
            vec![AdapterEvent::Error {
                message: "overloaded".into(),
                code: Some("503".into())
            }]
        );
    }

    #[test]
    fn unknown_and_malformed_events_have_no_effect() {
        let mut state = started_state();
        let out = feed(
            &mut state,
            vec![
                json!({"type": "STEP_STARTED", "stepName": "x"}),
                json!({"type": "TOOL_CALL_START"}),
                json!({"no_type": true}),
            ],
        );
        assert_eq!(out, Dispatched::default());
        assert!(state.registry.is_empty());
        assert_eq!(state.run.phase(), RunPhase::RunActive);
    }

    #[test]
    fn run_finished_reports_usage() {
        let mut state = started_state();
        let out = feed(
            &mut state,
            vec![json!({"type": "RUN_FINISHED", "usage": {"inputTokens": 1, "outputTokens": 2, "totalTokens": 3}})],
        );
        assert_eq!(state.run.phase(), RunPhase::Complete);
        let AdapterEvent::RunFinished { usage, .. } = &out.events[0] else {
            panic!("expected RunFinished");
        };
        assert_eq!(usage.as_ref().map(|u| u.total_tokens), Some(3));
    }
}
