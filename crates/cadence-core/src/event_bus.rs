//! Process-wide publish/subscribe hub.
//!
//! Every component reports side effects by emitting events here. Emission
//! awaits every subscriber: `emit` returns only after all handler futures
//! have settled. Handler failures and panics are logged and swallowed, so a
//! broken subscriber never blocks its peers or the emitter.
//!
//! Subscribers are kept sorted by descending priority; equal priorities run
//! in subscription order. Each handler is started in that order and the
//! handlers then run concurrently.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use tracing::{debug, error, warn};

use cadence_contracts::{error::CadenceResult, event::Event};

use crate::handler::FnEventHandler;
use crate::traits::EventHandler;

/// Default number of events retained for replay.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Identifier handed out by `subscribe`, unique per bus.
pub type SubscriptionId = u64;

/// Per-subscription options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
    /// Remove the subscription before its first invocation.
    pub once: bool,
    /// Higher runs earlier. Defaults to 0.
    pub priority: i32,
}

impl SubscribeOptions {
    pub fn once() -> Self {
        Self { once: true, priority: 0 }
    }

    pub fn priority(priority: i32) -> Self {
        Self { once: false, priority }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

struct Subscriber {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
    once: bool,
    priority: i32,
}

struct BusState {
    subscribers: HashMap<String, Vec<Subscriber>>,
    history: VecDeque<Event>,
    next_id: SubscriptionId,
}

impl BusState {
    fn record(&mut self, event: Event, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.history.len() >= capacity {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }

    /// Snapshot the handlers for `event_type` in invocation order, dropping
    /// `once` subscriptions from the registry as they are taken.
    fn take_targets(&mut self, event_type: &str) -> Vec<(SubscriptionId, Arc<dyn EventHandler>)> {
        let Some(list) = self.subscribers.get_mut(event_type) else {
            return Vec::new();
        };
        let targets = list
            .iter()
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();
        list.retain(|s| !s.once);
        if list.is_empty() {
            self.subscribers.remove(event_type);
        }
        targets
    }

    fn remove(&mut self, event_type: &str, id: SubscriptionId) -> bool {
        let Some(list) = self.subscribers.get_mut(event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.subscribers.remove(event_type);
        }
        removed
    }
}

struct Inner {
    state: Mutex<BusState>,
    history_capacity: usize,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The publish/subscribe hub. Cloning is cheap and every clone shares the
/// same subscribers and history.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<Inner>,
    event_type: String,
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Remove the subscription. Returns false if it was already gone (for
    /// example a `once` subscription that has fired) or the bus was dropped.
    pub fn unsubscribe(self) -> bool {
        match self.bus.upgrade() {
            Some(inner) => inner.lock().remove(&self.event_type, self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("history_capacity", &self.history_capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// A bus retaining at most `capacity` events. Zero disables history.
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BusState {
                    subscribers: HashMap::new(),
                    history: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
                    next_id: 1,
                }),
                history_capacity: capacity,
            }),
        }
    }

    /// Register `handler` for events of exactly `event_type`.
    pub fn subscribe(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> Subscription {
        let event_type = event_type.into();
        let mut state = self.inner.lock();
        let id = state.next_id;
        state.next_id += 1;

        let list = state.subscribers.entry(event_type.clone()).or_default();
        // Insert after every subscriber of equal or higher priority so ties
        // keep subscription order.
        let position = list
            .iter()
            .position(|s| s.priority < options.priority)
            .unwrap_or(list.len());
        list.insert(
            position,
            Subscriber {
                id,
                handler,
                once: options.once,
                priority: options.priority,
            },
        );

        debug!(event_type = %event_type, subscription_id = id, priority = options.priority, once = options.once, "subscribed");

        Subscription {
            bus: Arc::downgrade(&self.inner),
            event_type,
            id,
        }
    }

    /// Register an async closure as a subscriber.
    pub fn subscribe_fn<F, Fut>(
        &self,
        event_type: impl Into<String>,
        options: SubscribeOptions,
        f: F,
    ) -> Subscription
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = CadenceResult<()>> + Send + 'static,
    {
        self.subscribe(event_type, Arc::new(FnEventHandler(f)), options)
    }

    pub fn unsubscribe(&self, event_type: &str, id: SubscriptionId) -> bool {
        self.inner.lock().remove(event_type, id)
    }

    /// Drop every subscription for `event_type`, or all subscriptions.
    pub fn unsubscribe_all(&self, event_type: Option<&str>) {
        let mut state = self.inner.lock();
        match event_type {
            Some(t) => {
                state.subscribers.remove(t);
            }
            None => state.subscribers.clear(),
        }
    }

    pub fn subscriber_count(&self, event_type: Option<&str>) -> usize {
        let state = self.inner.lock();
        match event_type {
            Some(t) => state.subscribers.get(t).map_or(0, Vec::len),
            None => state.subscribers.values().map(Vec::len).sum(),
        }
    }

    /// Retained events, oldest first, optionally filtered by type.
    pub fn history(&self, event_type: Option<&str>) -> Vec<Event> {
        let state = self.inner.lock();
        state
            .history
            .iter()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .cloned()
            .collect()
    }

    pub fn history_capacity(&self) -> usize {
        self.inner.history_capacity
    }

    /// Build an event and deliver it to every subscriber of its type.
    pub async fn emit(
        &self,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        source: impl Into<String>,
    ) -> Event {
        let event = Event::new(event_type, payload, source);
        self.publish(event.clone()).await;
        event
    }

    /// Record a pre-built event and deliver it.
    pub async fn publish(&self, event: Event) {
        let targets = {
            let mut state = self.inner.lock();
            state.record(event.clone(), self.inner.history_capacity);
            state.take_targets(&event.event_type)
        };
        dispatch(&event, targets).await;
    }

    /// Re-deliver retained events to the current subscribers.
    ///
    /// With `from`, only events stamped at or after it are replayed. Replayed
    /// events are not recorded again. Returns the number replayed.
    pub async fn replay(&self, from: Option<DateTime<Utc>>) -> usize {
        let events: Vec<Event> = {
            let state = self.inner.lock();
            state
                .history
                .iter()
                .filter(|e| from.map_or(true, |ts| e.timestamp >= ts))
                .cloned()
                .collect()
        };

        for event in &events {
            let targets = self.inner.lock().take_targets(&event.event_type);
            dispatch(event, targets).await;
        }

        debug!(count = events.len(), "replayed events");
        events.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

async fn dispatch(event: &Event, targets: Vec<(SubscriptionId, Arc<dyn EventHandler>)>) {
    if targets.is_empty() {
        debug!(event_type = %event.event_type, "event emitted (no subscribers)");
        return;
    }

    let calls = targets.into_iter().map(|(id, handler)| async move {
        let outcome = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
        (id, outcome)
    });

    let outcomes = join_all(calls).await;
    let delivered = outcomes.len();

    for (id, outcome) in outcomes {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                event_type = %event.event_type,
                event_id = %event.id.0,
                subscription_id = id,
                error = %e,
                "event handler failed"
            ),
            Err(_) => error!(
                event_type = %event.event_type,
                event_id = %event.id.0,
                subscription_id = id,
                "event handler panicked"
            ),
        }
    }

    debug!(event_type = %event.event_type, subscribers = delivered, "event delivered");
}
