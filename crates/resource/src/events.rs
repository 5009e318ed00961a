//! Event broadcasting for container lifecycle observability.
//!
//! Containers emit a [`ContainerEvent`] at each externally visible
//! transition. With the `tokio` feature, an [`EventBus`] attached to a scope
//! fans them out over `tokio::sync::broadcast`.

use chrono::{DateTime, Utc};
#[cfg(feature = "tokio")]
use tokio::sync::broadcast;

use crate::error::FailureKind;
use crate::phase::Phase;
use crate::recycle::Disposal;
use crate::scope::ScopeKind;

// ---------------------------------------------------------------------------
// ContainerEvent
// ---------------------------------------------------------------------------

/// An event emitted by a container.
#[derive(Debug, Clone)]
pub struct ContainerEvent {
    /// The binding of the container.
    pub binding: String,
    /// The kind of scope the container lives in.
    pub scope: ScopeKind,
    /// When the event was emitted.
    pub at: DateTime<Utc>,
    /// What happened.
    pub kind: ContainerEventKind,
}

impl ContainerEvent {
    pub(crate) fn new(binding: &str, scope: ScopeKind, kind: ContainerEventKind) -> Self {
        Self {
            binding: binding.to_string(),
            scope,
            at: Utc::now(),
            kind,
        }
    }
}

/// What a [`ContainerEvent`] reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEventKind {
    /// The source delivered the object.
    Sourced,
    /// The container failed.
    Failed {
        /// The failure kind.
        kind: FailureKind,
    },
    /// An asynchronous operation started.
    OperationStarted,
    /// An asynchronous operation completed.
    OperationCompleted,
    /// A callback arrived after the container stopped accepting it.
    LateCallback {
        /// The callback name.
        callback: &'static str,
        /// The phase the container was in.
        phase: Phase,
    },
    /// The container was released.
    Released {
        /// What happened to the object.
        disposal: Disposal,
    },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for container events.
///
/// Emission is fire-and-forget: if no subscribers are listening or the
/// channel is full, events are silently dropped.
#[cfg(feature = "tokio")]
pub struct EventBus {
    sender: broadcast::Sender<ContainerEvent>,
}

#[cfg(feature = "tokio")]
impl EventBus {
    /// Create a new event bus with the given buffer size.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: ContainerEvent) {
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ContainerEvent> {
        self.sender.subscribe()
    }
}

#[cfg(feature = "tokio")]
impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(feature = "tokio")]
impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
