//! Event envelope and the well-known event kinds.
//!
//! Events are facts: once emitted they are never modified. Subscribers
//! receive a clone of the envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a single emitted event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub uuid::Uuid);

impl EventId {
    /// Create a new, unique event ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Current envelope schema version stamped on every event.
pub const EVENT_VERSION: u32 = 1;

/// An immutable notification broadcast to zero or more subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Dotted event kind, e.g. `"command.executed"`. See [`EventKind`].
    #[serde(rename = "type")]
    pub event_type: String,
    /// Arbitrary JSON body.
    pub payload: serde_json::Value,
    /// Wall-clock time the event was emitted (UTC).
    pub timestamp: DateTime<Utc>,
    pub id: EventId,
    /// The component that emitted the event (e.g. `"command-bus"`).
    pub source: String,
    pub version: u32,
}

impl Event {
    /// Build a fresh event stamped with the current time and a new ID.
    pub fn new(
        event_type: impl Into<String>,
        payload: serde_json::Value,
        source: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
            id: EventId::new(),
            source: source.into(),
            version: EVENT_VERSION,
        }
    }
}

/// Event kind constants, in `<category>.<action>` form.
pub struct EventKind;

impl EventKind {
    // Dispatch
    pub const COMMAND_EXECUTED: &'static str = "command.executed";
    pub const COMMAND_FAILED: &'static str = "command.failed";
    pub const QUERY_EXECUTED: &'static str = "query.executed";
    pub const SYSTEM_ERROR: &'static str = "system.error";

    // Agent lifecycle
    pub const AGENT_TASK_STARTED: &'static str = "agent.task_started";
    pub const AGENT_TASK_COMPLETED: &'static str = "agent.task_completed";
    pub const AGENT_TASK_FAILED: &'static str = "agent.task_failed";
    pub const AGENT_STOPPED: &'static str = "agent.stopped";

    // Observers
    pub const AUDIT_HIGH_RISK: &'static str = "audit.high_risk";
    pub const SECURITY_VIOLATION: &'static str = "security.violation";
    pub const PERFORMANCE_ALERT: &'static str = "performance.alert";
}
