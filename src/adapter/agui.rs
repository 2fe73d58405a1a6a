//! AG-UI adapter: one streaming POST per run, events decoded from the
//! response body.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::batcher::ToolOutcome;
use super::dispatch::dispatch;
use super::events::{AdapterEvent, EventBus, EventStream, Listener, Subscription};
use super::session::{AdapterState, StreamEnd};
use super::state::RunPhase;
use super::{AdapterOptions, AdapterStatus, ProtocolAdapter, SendOptions};
use crate::config::{TetherConfig, TransportKind};
use crate::error::{Result, TetherError};
use crate::protocol::{decode_stream, encode_run_input};
use crate::tools::ToolInvocation;
use crate::transport::http;
use crate::types::{Message, RunInput, RunOutcome};

/// What `drive` decided once a stream closed.
enum Step {
    Continue(RunInput),
    Done(RunOutcome),
}

struct Inner {
    config: TetherConfig,
    client: reqwest::Client,
    options: AdapterOptions,
    state: Mutex<AdapterState>,
    bus: EventBus,
    /// Parent of every request token; replaced on disconnect.
    connection: Mutex<CancellationToken>,
    status_tx: watch::Sender<AdapterStatus>,
}

/// Adapter for AG-UI agents.
///
/// Cheap to clone; clones share state, listeners and the connection.
#[derive(Clone)]
pub struct AgUiAdapter {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AgUiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgUiAdapter")
            .field("endpoint", &self.inner.config.endpoint)
            .field("status", &self.status())
            .finish()
    }
}

impl AgUiAdapter {
    pub fn new(config: TetherConfig) -> Result<Self> {
        Self::with_options(config, AdapterOptions::default())
    }

    pub fn with_options(config: TetherConfig, options: AdapterOptions) -> Result<Self> {
        config.validate()?;
        let client = http::build_client(&config)?;

        let thread_id = config
            .thread_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut state = AdapterState::new(thread_id);
        state.defaults.tools = options.tools.clone();
        state.defaults.model = config.model.clone();

        let (status_tx, _) = watch::channel(AdapterStatus::Idle);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                client,
                options,
                state: Mutex::new(state),
                bus: EventBus::new(),
                connection: Mutex::new(CancellationToken::new()),
                status_tx,
            }),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, AdapterState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: AdapterStatus) {
        self.inner.status_tx.send_replace(status);
    }

    /// Token for one request; cancelled with the connection.
    fn request_token(&self) -> CancellationToken {
        self.inner
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token()
    }

    pub async fn connect(&self) -> Result<()> {
        let mut state = self.lock_state();
        if !state.connected {
            state.connected = true;
            info!(
                endpoint = %self.inner.config.endpoint,
                thread_id = %state.thread_id,
                "adapter connected"
            );
        }
        Ok(())
    }

    /// Abort the in-flight request, drop pending tool calls and notify the
    /// remote side. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let token = std::mem::replace(
            &mut *self
                .inner
                .connection
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            CancellationToken::new(),
        );
        token.cancel();

        let (was_connected, thread_id) = {
            let mut state = self.lock_state();
            let was_connected = state.connected;
            state.abort();
            state.connected = false;
            self.set_status(AdapterStatus::Idle);
            (was_connected, state.thread_id.clone())
        };

        if was_connected {
            info!(thread_id = %thread_id, "adapter disconnected");
            self.notify_terminate(thread_id);
        }
    }

    /// Send a user message and drive the run, including any continuations
    /// completed while it streams.
    pub async fn send_message(&self, message: Message, options: SendOptions) -> Result<RunOutcome> {
        let input = {
            let mut state = self.lock_state();
            if !state.connected {
                return Err(TetherError::InvalidState("adapter is not connected".into()));
            }
            if state.streaming {
                return Err(TetherError::InvalidState(
                    "a run is already streaming".into(),
                ));
            }
            if !state.registry.is_empty() {
                warn!(
                    pending = state.registry.len(),
                    "new message abandons pending tool calls"
                );
                state.discard_pending();
            }

            if let Some(tools) = options.tools {
                state.defaults.tools = tools;
            }
            if let Some(model) = options.model {
                state.defaults.model = Some(model);
            }
            if let Some(context) = options.context {
                state.defaults.context = context;
            }
            if let Some(props) = options.forwarded_props {
                state.defaults.forwarded_props = props;
            }
            if let Some(history) = options.history {
                state.transcript = history;
            }
            state.transcript.push(message);

            let input = state.begin_request(false);
            self.set_status(AdapterStatus::Streaming);
            input
        };

        self.execute(input, self.request_token()).await
    }

    /// Record a tool result. When it completes the batch and no stream is
    /// open, the continuation is sent and driven here.
    pub async fn send_tool_result(
        &self,
        tool_call_id: &str,
        outcome: ToolOutcome,
    ) -> Result<RunOutcome> {
        let (collected, next, pending) = {
            let mut state = self.lock_state();
            if !state.connected {
                return Err(TetherError::InvalidState("adapter is not connected".into()));
            }
            let (collected, next) = state.report_result(tool_call_id, outcome);
            if next.is_some() {
                self.set_status(AdapterStatus::Streaming);
            }
            // Nothing outstanding and no stream to carry it: the run is done.
            let pending = if next.is_none() && !state.streaming && state.registry.is_empty() {
                None
            } else {
                Some(state.batcher.missing(&state.registry))
            };
            (collected, next, pending)
        };

        debug!(
            tool_call_id,
            tool_name = %collected.tool_name,
            success = collected.success,
            "tool result recorded"
        );
        self.inner.bus.emit(&AdapterEvent::ToolResult {
            tool_call_id: collected.tool_call_id,
            tool_name: collected.tool_name,
            result: collected.result,
            success: collected.success,
            error: collected.error,
        });

        match next {
            Some(input) => self.execute(input, self.request_token()).await,
            None => Ok(match pending {
                Some(pending) => RunOutcome::AwaitingToolResults { pending },
                None => RunOutcome::Completed,
            }),
        }
    }

    /// Drive requests until a stream ends without a continuation.
    async fn execute(&self, mut input: RunInput, token: CancellationToken) -> Result<RunOutcome> {
        loop {
            match self.drive(&input, &token).await {
                Ok(Step::Continue(next)) => {
                    debug!(run_id = %next.run_id, "sending continuation");
                    input = next;
                }
                Ok(Step::Done(outcome)) => return Ok(outcome),
                Err(error) => {
                    token.cancel();
                    self.fail(&error);
                    return Err(error);
                }
            }
        }
    }

    /// Send one request and apply its response stream to the state.
    async fn drive(&self, input: &RunInput, token: &CancellationToken) -> Result<Step> {
        info!(
            run_id = %input.run_id,
            continuation = input.continuation,
            messages = input.messages.len(),
            "starting run"
        );

        let request = self
            .inner
            .client
            .post(&self.inner.config.endpoint)
            .headers(http::run_headers(&self.inner.config))
            .json(&encode_run_input(input))
            .send();

        let resp = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(Step::Done(RunOutcome::Cancelled)),
            resp = request => resp?,
        };

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(http::status_to_error(status, &body_text));
        }

        let frames = decode_stream(resp.bytes_stream());
        futures::pin_mut!(frames);

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(Step::Done(RunOutcome::Cancelled)),
                next = frames.next() => next,
            };
            let Some(frame) = next else { break };
            let frame = frame?;
            let terminal = frame.event.is_terminal();

            let dispatched = {
                let mut state = self.lock_state();
                if token.is_cancelled() {
                    return Ok(Step::Done(RunOutcome::Cancelled));
                }
                dispatch(&mut state, frame.event)
            };
            self.inner.bus.emit_all(&dispatched.events);
            for call in dispatched.closed_calls {
                self.spawn_tool(call, token.clone());
            }
            if terminal {
                // Frames after RUN_FINISHED / RUN_ERROR belong to no run.
                break;
            }
        }

        let mut state = self.lock_state();
        if token.is_cancelled() {
            return Ok(Step::Done(RunOutcome::Cancelled));
        }
        let step = match state.finish_stream() {
            StreamEnd::Continue(next) => Step::Continue(next),
            StreamEnd::Completed => {
                self.set_status(AdapterStatus::Idle);
                Step::Done(RunOutcome::Completed)
            }
            StreamEnd::AwaitingToolResults(pending) => {
                debug!(pending = pending.len(), "run awaiting tool results");
                self.set_status(AdapterStatus::AwaitingToolResults);
                Step::Done(RunOutcome::AwaitingToolResults { pending })
            }
            StreamEnd::Failed(message) => {
                token.cancel();
                self.set_status(AdapterStatus::Idle);
                Step::Done(RunOutcome::Failed { message })
            }
        };
        Ok(step)
    }

    /// Surface a transport or decode failure and drop the run.
    fn fail(&self, error: &TetherError) {
        warn!(%error, "run failed");
        {
            let mut state = self.lock_state();
            state.discard_pending();
            state.run.fail();
            state.streaming = false;
            state.last_error = Some(error.to_string());
            self.set_status(AdapterStatus::Idle);
        }
        self.inner.bus.emit(&AdapterEvent::Error {
            message: error.to_string(),
            code: None,
        });
    }

    /// Execute a client tool in the background and report its result.
    fn spawn_tool(&self, call: ToolInvocation, token: CancellationToken) {
        let Some(executor) = self.inner.options.executor.clone() else {
            return;
        };
        let adapter = self.clone();
        tokio::spawn(async move {
            debug!(tool_call_id = %call.tool_call_id, tool_name = %call.tool_name, "executing tool");
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = executor.execute(&call) => ToolOutcome::from(result),
            };
            if let Err(error) = adapter.send_tool_result(&call.tool_call_id, outcome).await {
                warn!(tool_call_id = %call.tool_call_id, %error, "failed to report tool result");
            }
        });
    }

    /// Best-effort terminate notification; failures are only logged.
    fn notify_terminate(&self, thread_id: String) {
        let client = self.inner.client.clone();
        let url = self.inner.config.terminate_url();
        let headers = http::base_headers(&self.inner.config);
        tokio::spawn(async move {
            let result = client
                .post(&url)
                .headers(headers)
                .json(&serde_json::json!({ "thread_id": thread_id }))
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => {
                    debug!(url = %url, "terminate notification sent");
                }
                Ok(resp) => {
                    warn!(url = %url, status = resp.status().as_u16(), "terminate notification rejected");
                }
                Err(error) => warn!(url = %url, %error, "terminate notification failed"),
            }
        });
    }

    pub fn subscribe(&self, listener: Listener) -> Subscription {
        self.inner.bus.subscribe(listener)
    }

    /// Events as a stream; the subscription ends when the stream is dropped.
    pub fn events(&self) -> EventStream {
        self.inner.bus.stream()
    }

    pub fn status(&self) -> AdapterStatus {
        *self.inner.status_tx.borrow()
    }

    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<AdapterStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Wait until no stream is open and no tool calls are outstanding.
    ///
    /// Without an executor this waits for the embedding application to
    /// report every pending result.
    pub async fn wait_for_idle(&self) {
        let mut rx = self.inner.status_tx.subscribe();
        let _ = rx.wait_for(|status| *status == AdapterStatus::Idle).await;
    }

    pub fn is_connected(&self) -> bool {
        self.lock_state().connected
    }

    /// Conversation history as it will be sent with the next request.
    pub fn transcript(&self) -> Vec<Message> {
        self.lock_state().transcript.clone()
    }

    pub fn pending_tool_calls(&self) -> Vec<String> {
        self.lock_state().pending_tool_calls()
    }

    pub fn phase(&self) -> RunPhase {
        self.lock_state().run.phase()
    }

    pub fn thread_id(&self) -> String {
        self.lock_state().thread_id.clone()
    }

    /// Forget the transcript and agent state. Rejected while streaming.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.lock_state();
        if state.streaming {
            return Err(TetherError::InvalidState(
                "cannot reset while a run is streaming".into(),
            ));
        }
        state.abort();
        state.transcript.clear();
        state.agent_state = serde_json::json!({});
        self.set_status(AdapterStatus::Idle);
        Ok(())
    }
}

#[async_trait]
impl ProtocolAdapter for AgUiAdapter {
    fn transport(&self) -> TransportKind {
        TransportKind::AgUi
    }

    async fn connect(&self) -> Result<()> {
        AgUiAdapter::connect(self).await
    }

    async fn disconnect(&self) {
        AgUiAdapter::disconnect(self).await
    }

    async fn send_message(&self, message: Message, options: SendOptions) -> Result<RunOutcome> {
        AgUiAdapter::send_message(self, message, options).await
    }

    async fn send_tool_result(
        &self,
        tool_call_id: &str,
        outcome: ToolOutcome,
    ) -> Result<RunOutcome> {
        AgUiAdapter::send_tool_result(self, tool_call_id, outcome).await
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        AgUiAdapter::subscribe(self, listener)
    }

    fn is_connected(&self) -> bool {
        AgUiAdapter::is_connected(self)
    }
}
