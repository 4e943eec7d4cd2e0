//! Event broadcasting for pool lifecycle observability.
//!
//! Provides [`PoolEvent`] variants emitted by a [`Pool`](crate::Pool) and an
//! [`EventBus`] backed by `tokio::sync::broadcast`.

use std::time::Duration;

use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PoolEvent
// ---------------------------------------------------------------------------

/// Events emitted during pool operations.
///
/// Resource identifiers are carried in their `Display` form so one bus can
/// serve pools of different resource types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// The factory built a new resource.
    Created {
        /// The resource identifier.
        id: String,
    },
    /// A resource was checked out.
    Acquired {
        /// The resource identifier.
        id: String,
        /// Time between the acquire call and the hand-off.
        wait: Duration,
    },
    /// A resource was checked back in and is idle again.
    Released {
        /// The resource identifier.
        id: String,
        /// How long the caller held the resource.
        held: Duration,
    },
    /// A resource was permanently removed.
    Destroyed {
        /// The resource identifier.
        id: String,
        /// Why it was removed.
        reason: DestroyReason,
    },
    /// An acquirer found the pool at capacity and started waiting.
    Exhausted {
        /// Number of callers waiting, this one included.
        waiters: usize,
    },
    /// A housekeeping operation failed (e.g. destroying a resource).
    Error {
        /// The resource identifier.
        id: String,
        /// Human-readable error description.
        error: String,
    },
}

// ---------------------------------------------------------------------------
// DestroyReason
// ---------------------------------------------------------------------------

/// Reason a resource was permanently removed from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    /// The resource exceeded its maximum lifetime.
    Expired,
    /// The resource was idle longer than the idle timeout.
    IdleTimeout,
    /// The pool is shut down.
    Shutdown,
    /// The factory produced a resource whose identifier is already pooled.
    Rejected,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for pool events.
///
/// Emission is fire-and-forget: if no subscribers are listening or the
/// channel is full, events are dropped (no backpressure on the pool).
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: PoolEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    ///
    /// A subscriber that falls more than `buffer_size` events behind
    /// receives `Lagged` and skips ahead.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.emit(PoolEvent::Created { id: "1".to_string() });
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(PoolEvent::Destroyed {
            id: "7".to_string(),
            reason: DestroyReason::IdleTimeout,
        });

        let event = rx.recv().await.expect("should receive event");
        assert_eq!(
            event,
            PoolEvent::Destroyed {
                id: "7".to_string(),
                reason: DestroyReason::IdleTimeout,
            }
        );
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(PoolEvent::Exhausted { waiters: 3 });

        assert!(matches!(rx1.recv().await.unwrap(), PoolEvent::Exhausted { waiters: 3 }));
        assert!(matches!(rx2.recv().await.unwrap(), PoolEvent::Exhausted { waiters: 3 }));
    }
}
