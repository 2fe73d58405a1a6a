//! Per-run text accumulation and phase tracking.

use strum::Display;

use crate::types::{message::new_message_id, Usage};

/// Phase of the run state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    RunActive,
    StreamingText,
    ToolCallActive,
    Complete,
    Error,
}

/// Text and phase of the in-flight run.
///
/// `accumulated` spans a user turn and all of its continuations; `turn`
/// covers only the current request. Message-end freezes `turn`, and the
/// frozen text is what a continuation carries: deltas arriving outside
/// an open message after that point reach subscribers but not the turn.
#[derive(Debug, Default)]
pub struct RunState {
    message_id: Option<String>,
    accumulated: String,
    turn: String,
    frozen_turn: Option<String>,
    message_open: bool,
    phase: RunPhase,
    usage: Usage,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare for a new request.
    ///
    /// A user-initiated request starts a fresh assistant message; a
    /// continuation keeps the message id and accumulated text.
    pub fn begin_run(&mut self, continuation: bool) {
        if !continuation {
            self.message_id = None;
            self.accumulated.clear();
            self.usage = Usage::default();
        }
        self.turn.clear();
        self.frozen_turn = None;
        self.message_open = false;
        self.phase = RunPhase::RunActive;
    }

    /// Handle run-started: initialize the message id or reuse the current one.
    pub fn on_run_started(&mut self) -> &str {
        self.phase = RunPhase::RunActive;
        self.message_id.get_or_insert_with(new_message_id)
    }

    /// Handle message-start: adopt `id` if no message is active.
    pub fn on_message_start(&mut self, id: Option<&str>) {
        if self.message_id.is_none() {
            self.message_id = Some(id.map_or_else(new_message_id, str::to_string));
        }
        self.message_open = true;
        self.phase = RunPhase::StreamingText;
    }

    /// Append a text delta; returns the message id and full text so far.
    pub fn append_delta(&mut self, delta: &str) -> (String, String) {
        self.accumulated.push_str(delta);
        if self.message_open || self.frozen_turn.is_none() {
            self.turn.push_str(delta);
        }
        self.phase = RunPhase::StreamingText;
        let id = self.message_id.get_or_insert_with(new_message_id).clone();
        (id, self.accumulated.clone())
    }

    /// Handle message-end: freeze this turn's text.
    pub fn on_message_end(&mut self) {
        self.message_open = false;
        self.frozen_turn = Some(self.turn.clone());
        if self.phase == RunPhase::StreamingText {
            self.phase = RunPhase::RunActive;
        }
    }

    pub fn on_tool_call(&mut self) {
        self.phase = RunPhase::ToolCallActive;
    }

    pub fn on_tool_call_closed(&mut self) {
        if self.phase == RunPhase::ToolCallActive {
            self.phase = RunPhase::RunActive;
        }
    }

    pub fn finish(&mut self, usage: Option<&Usage>) {
        if let Some(usage) = usage {
            self.usage.merge(usage);
        }
        self.phase = RunPhase::Complete;
    }

    pub fn fail(&mut self) {
        self.phase = RunPhase::Error;
    }

    /// Return to `Idle`, dropping all text.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Text to use for this turn's assistant message.
    pub fn turn_text(&self) -> &str {
        self.frozen_turn.as_deref().unwrap_or(&self.turn)
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Usage summed over the user turn and its continuations.
    pub fn usage(&self) -> &Usage {
        &self.usage
    }
}
