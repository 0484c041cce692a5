//! Session lifecycle events.
//!
//! The façade publishes an event after each state transition. Delivery to
//! external transports (sockets, SSE, polling) is a collaborator concern;
//! this module only exposes the broadcast subscription point.

use serde::Serialize;
use tokio::sync::broadcast;

/// Kinds of session state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionEventKind {
    Registered,
    Resolved,
    Answered,
    Expired,
    Removed,
}

/// A session state transition, keyed by normalized access code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub kind: SessionEventKind,
    pub code: String,
}

/// Fan-out point for session events.
///
/// Wraps a broadcast channel; publishing with no subscribers is a no-op.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        EventPublisher { tx }
    }

    /// Publish a transition. Lagging or absent subscribers never block or
    /// fail the operation that triggered the event.
    pub fn publish(&self, kind: SessionEventKind, code: &str) {
        let event = SessionEvent {
            kind,
            code: code.to_string(),
        };
        if self.tx.send(event).is_err() {
            tracing::trace!(target: "mm.events", code = %code, kind = ?kind, "No event subscribers");
        }
    }

    /// Subscribe to session events from this point forward.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(64)
    }
}
