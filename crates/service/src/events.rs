//! Action events and where they go.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Who triggered an action and on which collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventContext {
    pub collection: String,
    pub user: Option<String>,
    pub role: Option<String>,
}

/// One action notification. Built right before it is queued, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionEventParams {
    /// Names the event is published under, most generic first.
    pub event: Vec<String>,
    pub meta: Value,
    pub context: EventContext,
}

impl ActionEventParams {
    pub fn new(collection: &str, action: &str, meta: Value, context: EventContext) -> Self {
        Self { event: event_names(collection, action), meta, context }
    }

    pub fn is(&self, name: &str) -> bool { self.event.iter().any(|e| e == name) }
}

/// `items.<action>` and `<collection>.items.<action>`.
pub fn event_names(collection: &str, action: &str) -> Vec<String> {
    vec![format!("items.{action}"), format!("{collection}.items.{action}")]
}

/// Fire-and-forget action bus. `emit` must not block.
pub trait EventBus: Send + Sync {
    fn emit(&self, params: ActionEventParams);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventBus;

impl EventBus for NoopEventBus {
    fn emit(&self, _: ActionEventParams) {}
}

/// Bus backed by a tokio broadcast channel. Emissions with no subscriber are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    tx: broadcast::Sender<ActionEventParams>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActionEventParams> { self.tx.subscribe() }
}

impl Default for BroadcastEventBus {
    fn default() -> Self { Self::new(1024) }
}

impl EventBus for BroadcastEventBus {
    fn emit(&self, params: ActionEventParams) {
        if self.tx.send(params).is_err() {
            trace!("action_event_without_subscribers");
        }
    }
}

/// Caller-owned buffer that receives actions instead of the bus.
#[derive(Debug, Clone, Default)]
pub struct ActionCollector {
    inner: Arc<Mutex<Vec<ActionEventParams>>>,
}

impl ActionCollector {
    pub fn new() -> Self { Self::default() }

    pub fn push(&self, params: ActionEventParams) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).push(params);
    }

    pub fn len(&self) -> usize { self.inner.lock().unwrap_or_else(PoisonError::into_inner).len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Take everything collected so far.
    pub fn drain(&self) -> Vec<ActionEventParams> {
        std::mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Destination for actions produced by a mutation.
#[derive(Debug, Clone, Default)]
pub enum EventSink {
    /// Emit on the bus once the transaction commits.
    #[default]
    Emit,
    /// Hand to the caller's collector; the bus never sees them.
    Collect(ActionCollector),
}
