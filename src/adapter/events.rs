//! Normalized adapter events and the listener list that delivers them.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::types::{Role, Usage};

/// Agent state carried by `STATE_SNAPSHOT` / `STATE_DELTA`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StateUpdate {
    Snapshot(Value),
    /// Patch operations, forwarded unapplied.
    Delta(Value),
}

/// Events emitted to subscribers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdapterEvent {
    RunStarted {
        thread_id: String,
        run_id: String,
        continuation: bool,
    },
    /// Full accumulated text of the current assistant message.
    Message {
        message_id: String,
        role: Role,
        content: String,
    },
    /// A tool call opened (`complete: false`, empty args) or closed.
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: Value,
        complete: bool,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: Value,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    StateUpdate {
        update: StateUpdate,
    },
    Custom {
        name: String,
        value: Value,
    },
    RunFinished {
        run_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

/// Event callback.
pub type Listener = Arc<dyn Fn(&AdapterEvent) + Send + Sync>;

#[derive(Default)]
struct ListenerList {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Explicit listener list; one per adapter.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<ListenerList>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ListenerList> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener.
    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let mut list = self.lock();
        let id = list.next_id;
        list.next_id += 1;
        list.listeners.push((id, listener));
        Subscription {
            id,
            list: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver one event to every listener.
    ///
    /// Listeners run outside the lock, so they may subscribe or
    /// unsubscribe from inside the callback.
    pub fn emit(&self, event: &AdapterEvent) {
        let listeners: Vec<Listener> = self
            .lock()
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn emit_all<'a>(&self, events: impl IntoIterator<Item = &'a AdapterEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

impl EventBus {
    /// Subscribe through a channel and expose the events as a [`Stream`].
    pub fn stream(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(Arc::new(move |event: &AdapterEvent| {
            let _ = tx.send(event.clone());
        }));
        EventStream {
            receiver: UnboundedReceiverStream::new(rx),
            subscription: Some(subscription),
        }
    }
}

/// Stream of adapter events; unsubscribes when dropped.
#[derive(Debug)]
pub struct EventStream {
    receiver: UnboundedReceiverStream<AdapterEvent>,
    subscription: Option<Subscription>,
}

impl Stream for EventStream {
    type Item = AdapterEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle returned by `subscribe`. Dropping it keeps the listener registered.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    list: Weak<Mutex<ListenerList>>,
}

impl Subscription {
    /// Remove the listener. No-op if the adapter is gone.
    pub fn unsubscribe(self) {
        if let Some(list) = self.list.upgrade() {
            list.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }
}
