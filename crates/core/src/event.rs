//! Domain event system — decoupled observation of orchestration runs.
//!
//! Events are published as a run progresses. Observers (audit logs, metrics
//! exporters, tests) subscribe without the orchestrator knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A chat message entered the orchestrator
    RequestReceived {
        run_id: String,
        channel_id: String,
        author_id: String,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// A provider call failed transiently and will be retried
    ProviderRetry {
        provider: String,
        attempt: u32,
        delay_ms: u64,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// An operation handler ran
    OperationExecuted {
        run_id: String,
        operation: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A proposed call was short-circuited by deduplication
    OperationSkipped {
        run_id: String,
        operation: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A run finished and its reply was delivered
    RunCompleted {
        run_id: String,
        termination: String,
        rounds: u32,
        operations: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::OperationExecuted {
            run_id: "run-1".into(),
            operation: "createRole".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::OperationExecuted {
                operation, success, ..
            } => {
                assert_eq!(operation, "createRole");
                assert!(success);
            }
            _ => panic!("Expected OperationExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::OperationSkipped {
            run_id: "run-1".into(),
            operation: "search".into(),
            reason: "duplicate".into(),
            timestamp: Utc::now(),
        });
    }
}
