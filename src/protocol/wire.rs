//! JSON encoding of outbound run requests.

use serde_json::{json, Map, Value};

use crate::types::{ContentPart, Message, MessageContent, Role, RunInput, ToolDefinition};

/// Encode a [`RunInput`] as the request body.
pub fn encode_run_input(input: &RunInput) -> Value {
    let mut body = json!({
        "threadId": input.thread_id,
        "runId": input.run_id,
        "messages": input.messages.iter().map(encode_message).collect::<Vec<_>>(),
        "tools": input.tools.iter().map(encode_tool).collect::<Vec<_>>(),
        "state": input.state,
        "context": input.context,
        "forwardedProps": input.forwarded_props,
    });
    if let Some(model) = &input.model {
        body["model"] = json!(model);
    }
    body
}

/// Encode one message as a role-tagged record.
///
/// Assistant messages that issue tool calls are sent with `content: null`.
pub fn encode_message(message: &Message) -> Value {
    let mut record = Map::new();
    record.insert("id".into(), json!(message.id));
    record.insert("role".into(), json!(message.role));

    match message.role {
        Role::Assistant if !message.tool_calls.is_empty() => {
            record.insert("content".into(), Value::Null);
            let calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    })
                })
                .collect();
            record.insert("tool_calls".into(), Value::Array(calls));
        }
        Role::Tool => {
            record.insert("content".into(), json!(message.text()));
            if let Some(id) = &message.tool_call_id {
                record.insert("tool_call_id".into(), json!(id));
            }
            if let Some(error) = &message.error {
                record.insert("error".into(), json!(error));
            }
        }
        _ => {
            record.insert("content".into(), encode_content(&message.content));
        }
    }

    Value::Object(record)
}

fn encode_content(content: &MessageContent) -> Value {
    match content {
        MessageContent::Text(text) => json!(text),
        MessageContent::Parts(parts) => Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({"type": "text", "text": text}),
                    ContentPart::Image { url, mime_type } => {
                        let mut image = json!({"type": "image", "url": url});
                        if let Some(mime) = mime_type {
                            image["mimeType"] = json!(mime);
                        }
                        image
                    }
                })
                .collect(),
        ),
    }
}

fn encode_tool(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}
