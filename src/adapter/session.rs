//! All mutable protocol state of one adapter instance.

use serde_json::{json, Value};

use super::batcher::{CollectedResult, ContinuationBatcher, ToolOutcome};
use super::registry::ToolCallRegistry;
use super::state::{RunPhase, RunState};
use crate::types::{Message, RunInput, ToolDefinition};

/// Request fields carried over from `send_message` into continuations.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDefaults {
    pub tools: Vec<ToolDefinition>,
    pub model: Option<String>,
    pub context: Vec<Value>,
    pub forwarded_props: Value,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            model: None,
            context: Vec::new(),
            forwarded_props: json!({}),
        }
    }
}

/// How a response stream ended, as seen by the state.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEnd {
    Completed,
    AwaitingToolResults(Vec<String>),
    Continue(RunInput),
    Failed(String),
}

/// Run state, tool-call registry, collected results and transcript.
///
/// Owned by one adapter and passed by `&mut` into the dispatch routine.
#[derive(Debug)]
pub struct AdapterState {
    pub run: RunState,
    pub registry: ToolCallRegistry,
    pub batcher: ContinuationBatcher,
    /// In-memory history sent with every request.
    pub transcript: Vec<Message>,
    /// Last agent state snapshot, echoed back as `state`.
    pub agent_state: Value,
    pub defaults: RequestDefaults,
    pub thread_id: String,
    pub run_id: Option<String>,
    pub continuation: bool,
    pub connected: bool,
    /// A response stream is open; continuations wait for it to close.
    pub streaming: bool,
    pub last_error: Option<String>,
}

impl AdapterState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            run: RunState::new(),
            registry: ToolCallRegistry::new(),
            batcher: ContinuationBatcher::new(),
            transcript: Vec::new(),
            agent_state: json!({}),
            defaults: RequestDefaults::default(),
            thread_id: thread_id.into(),
            run_id: None,
            continuation: false,
            connected: false,
            streaming: false,
            last_error: None,
        }
    }

    /// Build the next request from the transcript and mark a stream open.
    pub fn begin_request(&mut self, continuation: bool) -> RunInput {
        self.run.begin_run(continuation);
        let run_id = uuid::Uuid::new_v4().to_string();
        self.run_id = Some(run_id.clone());
        self.continuation = continuation;
        self.streaming = true;
        self.last_error = None;

        RunInput {
            thread_id: self.thread_id.clone(),
            run_id,
            messages: self.transcript.clone(),
            tools: self.defaults.tools.clone(),
            state: self.agent_state.clone(),
            context: self.defaults.context.clone(),
            forwarded_props: self.defaults.forwarded_props.clone(),
            model: self.defaults.model.clone(),
            continuation,
        }
    }

    /// Record a tool result and, if the batch is complete, build the continuation.
    pub fn report_result(
        &mut self,
        tool_call_id: &str,
        outcome: ToolOutcome,
    ) -> (CollectedResult, Option<RunInput>) {
        let collected = self.batcher.record(&self.registry, tool_call_id, outcome);
        (collected, self.take_continuation())
    }

    /// Take the continuation if no stream is open and every call has a result.
    ///
    /// Registry and collected results are drained before the request is
    /// built, so at most one continuation comes out of one batch.
    pub fn take_continuation(&mut self) -> Option<RunInput> {
        if self.streaming || !self.batcher.is_complete(&self.registry) {
            return None;
        }
        let batch = self
            .batcher
            .take_batch(&mut self.registry, self.run.turn_text());
        self.transcript.extend(batch.into_messages());
        Some(self.begin_request(true))
    }

    /// Close the current stream and decide what happens next.
    pub fn finish_stream(&mut self) -> StreamEnd {
        self.streaming = false;

        if self.run.phase() == RunPhase::Error {
            self.discard_pending();
            let message = self
                .last_error
                .clone()
                .unwrap_or_else(|| "run failed".to_string());
            return StreamEnd::Failed(message);
        }
        if self.run.phase() != RunPhase::Complete {
            // Stream closed without RUN_FINISHED.
            self.run.finish(None);
        }

        if let Some(next) = self.take_continuation() {
            return StreamEnd::Continue(next);
        }
        if !self.registry.is_empty() {
            return StreamEnd::AwaitingToolResults(self.batcher.missing(&self.registry));
        }

        let text = self.run.turn_text();
        if !text.is_empty() {
            let mut reply = Message::assistant(text);
            if let Some(id) = self.run.message_id() {
                reply.id = id.to_string();
            }
            self.transcript.push(reply);
        }
        StreamEnd::Completed
    }

    /// Drop pending tool calls and collected results.
    pub fn discard_pending(&mut self) {
        self.registry.clear();
        self.batcher.clear();
    }

    /// Abandon the current run entirely.
    pub fn abort(&mut self) {
        self.discard_pending();
        self.run.reset();
        self.streaming = false;
        self.continuation = false;
    }

    /// Whether a tool with this name was advertised to the agent.
    pub fn is_client_tool(&self, name: &str) -> bool {
        self.defaults.tools.iter().any(|t| t.name == name)
    }

    pub fn pending_tool_calls(&self) -> Vec<String> {
        self.registry.ids().map(str::to_string).collect()
    }
}
