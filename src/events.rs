//! Route event bus
//!
//! A single internal broadcast decouples the number of UI surfaces from
//! the number of store reads: the sync layer emits `ProgressChanged`
//! after every successful save, and consumers re-load and fully replace
//! their derived state in response. Delivery is fire-and-forget.

use tokio::sync::broadcast;
use tracing::trace;

use crate::sync::PendingTaskSummary;

/// Events emitted by the route core.
#[derive(Debug, Clone)]
pub enum RouteEvent {
    /// A progress record was saved. Consumers should reload.
    ProgressChanged { identity: String, version: u64 },

    /// The denormalized pending-task projection changed.
    PendingTaskChanged {
        identity: String,
        task: Option<PendingTaskSummary>,
    },

    /// An activity was newly marked complete.
    ActivityCompleted { identity: String, activity_id: u32 },

    /// An attempt was made to open or complete a locked activity.
    ActivityBlocked { identity: String, activity_id: u32 },

    /// One-shot congratulations signal: all mandatory activities are
    /// newly complete.
    RouteCompleted {
        identity: String,
        lifetime_completed_routes: u64,
    },
}

/// Broadcast bus for route events.
pub struct EventBus {
    sender: broadcast::Sender<RouteEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: RouteEvent) {
        trace!(event = ?event, "Emitting route event");
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RouteEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn emit_reaches_subscribers() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(RouteEvent::ActivityCompleted {
            identity: "ana".into(),
            activity_id: 3,
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            RouteEvent::ActivityCompleted {
                identity,
                activity_id,
            } => {
                assert_eq!(identity, "ana");
                assert_eq!(activity_id, 3);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn emit_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        bus.emit(RouteEvent::ProgressChanged {
            identity: "ana".into(),
            version: 1,
        });
    }
}
