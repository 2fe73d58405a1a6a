//! Shared test helpers: response bodies, event recording and a mock agent.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use tether::adapter::{AdapterEvent, Listener};
use tether::config::TetherConfig;

pub const RUN_PATH: &str = "/api/agent/run";
pub const TERMINATE_PATH: &str = "/api/agent/terminate";

/// Encode events as a streamed response body.
pub fn sse_body(events: &[Value]) -> String {
    events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect()
}

/// A 200 response streaming `events`.
pub fn sse_response(events: &[Value]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(sse_body(events), "text/event-stream")
}

/// Events for a run that streams `text` and finishes.
pub fn text_run(message_id: &str, text: &[&str]) -> Vec<Value> {
    let mut events = vec![
        json!({"type": "RUN_STARTED", "threadId": "thread-1", "runId": "run-1"}),
        json!({"type": "TEXT_MESSAGE_START", "messageId": message_id, "role": "assistant"}),
    ];
    for delta in text {
        events.push(json!({"type": "TEXT_MESSAGE_CONTENT", "messageId": message_id, "delta": delta}));
    }
    events.push(json!({"type": "TEXT_MESSAGE_END", "messageId": message_id}));
    events.push(json!({"type": "RUN_FINISHED", "threadId": "thread-1", "runId": "run-1"}));
    events
}

/// Events for one complete tool call.
pub fn tool_call(id: &str, name: &str, args: &str) -> Vec<Value> {
    vec![
        json!({"type": "TOOL_CALL_START", "toolCallId": id, "toolCallName": name}),
        json!({"type": "TOOL_CALL_ARGS", "toolCallId": id, "delta": args}),
        json!({"type": "TOOL_CALL_END", "toolCallId": id}),
    ]
}

/// Tool definition with an empty object schema.
pub fn tool_def(name: &str) -> tether::types::ToolDefinition {
    tether::types::ToolDefinition {
        name: name.to_string(),
        description: format!("{name} tool"),
        parameters: json!({"type": "object", "properties": {}}),
    }
}

/// Responds with each template in turn, repeating the last one.
pub struct Sequence {
    responses: Vec<ResponseTemplate>,
    next: AtomicUsize,
}

impl Sequence {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        Self {
            responses,
            next: AtomicUsize::new(0),
        }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        self.responses[index.min(self.responses.len() - 1)].clone()
    }
}

/// Mock agent answering run requests with `responses` in order.
pub async fn mock_agent(responses: Vec<ResponseTemplate>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RUN_PATH))
        .respond_with(Sequence::new(responses))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TERMINATE_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

pub fn config_for(server: &MockServer) -> TetherConfig {
    let mut config = TetherConfig::new(format!("{}{RUN_PATH}", server.uri()));
    config.thread_id = Some("thread-1".to_string());
    config
}

/// JSON bodies of the run requests the server received, in order.
pub async fn run_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == RUN_PATH)
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

/// Records every emitted event.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<AdapterEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener(&self) -> Listener {
        let events = Arc::clone(&self.events);
        Arc::new(move |event: &AdapterEvent| events.lock().unwrap().push(event.clone()))
    }

    pub fn events(&self) -> Vec<AdapterEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Message contents in emission order.
    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                AdapterEvent::Message { content, .. } => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                AdapterEvent::Error { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn run_starts(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                AdapterEvent::RunStarted { continuation, .. } => Some(continuation),
                _ => None,
            })
            .collect()
    }
}

/// How the scripted agent answers one run request.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Send the whole body and close.
    Full(String),
    /// Send `prefix`, then hold the stream open until the client goes away.
    Stall(String),
}

/// Minimal HTTP/1.1 agent that can stall a response mid-body.
///
/// wiremock only delays whole responses, so a stream that is already
/// delivering frames when the client disconnects needs a raw listener.
pub struct ScriptedAgent {
    pub uri: String,
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl ScriptedAgent {
    pub async fn start(script: Vec<Scripted>) -> Self {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(script);
        let served = Arc::new(AtomicUsize::new(0));

        let recorded = Arc::clone(&bodies);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let recorded = Arc::clone(&recorded);
                let script = Arc::clone(&script);
                let served = Arc::clone(&served);
                tokio::spawn(async move {
                    let Some((path, body)) = read_request(&mut socket).await else {
                        return;
                    };
                    if path != RUN_PATH {
                        let _ = socket
                            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                            .await;
                        return;
                    }
                    recorded
                        .lock()
                        .unwrap()
                        .push(serde_json::from_slice(&body).unwrap_or(Value::Null));
                    let index = served.fetch_add(1, Ordering::SeqCst);
                    match &script[index.min(script.len() - 1)] {
                        Scripted::Full(body) => {
                            let head = format!(
                                "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                                body.len()
                            );
                            let _ = socket.write_all(head.as_bytes()).await;
                            let _ = socket.write_all(body.as_bytes()).await;
                        }
                        Scripted::Stall(prefix) => {
                            let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
                            let chunk = format!("{:x}\r\n{prefix}\r\n", prefix.len());
                            let _ = socket.write_all(head.as_bytes()).await;
                            let _ = socket.write_all(chunk.as_bytes()).await;
                            let mut sink = [0u8; 256];
                            while matches!(socket.read(&mut sink).await, Ok(n) if n > 0) {}
                        }
                    }
                });
            }
        });

        Self { uri, bodies }
    }

    pub fn config(&self) -> TetherConfig {
        let mut config = TetherConfig::new(format!("{}{RUN_PATH}", self.uri));
        config.thread_id = Some("thread-1".to_string());
        config
    }

    /// JSON bodies of the run requests received, in order.
    pub fn run_bodies(&self) -> Vec<Value> {
        self.bodies.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<(String, Vec<u8>)> {
    use tokio::io::AsyncReadExt;

    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let path = head.split_whitespace().nth(1)?.to_string();
    let length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < header_end + length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    Some((path, buffer[header_end..].to_vec()))
}
