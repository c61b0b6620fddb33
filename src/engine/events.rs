//! Execution events
//!
//! Lifecycle and execution events are published fire-and-forget: a slow or
//! absent consumer never blocks a flow or a lifecycle operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::result::FlowOutcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ExecutionEvent {
    AdapterLifecycle {
        adapter_id: String,
        operation: String,
        success: bool,
        message: String,
        timestamp: DateTime<Utc>,
    },
    AdapterExecution {
        correlation_id: String,
        execution_id: String,
        flow_id: String,
        adapter_id: String,
        target_id: Option<String>,
        success: bool,
        attempts: u32,
        elapsed_ms: u64,
        error_code: Option<String>,
        timestamp: DateTime<Utc>,
    },
    FlowExecution {
        correlation_id: String,
        execution_id: String,
        flow_id: String,
        outcome: FlowOutcome,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn lifecycle(adapter_id: &str, operation: &str, success: bool, message: impl Into<String>) -> Self {
        ExecutionEvent::AdapterLifecycle {
            adapter_id: adapter_id.to_string(),
            operation: operation.to_string(),
            success,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExecutionEvent::AdapterLifecycle { .. } => "ADAPTER_LIFECYCLE",
            ExecutionEvent::AdapterExecution { .. } => "ADAPTER_EXECUTION",
            ExecutionEvent::FlowExecution { .. } => "FLOW_EXECUTION",
        }
    }
}

/// Sink for execution events
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: ExecutionEvent);
}

/// Writes every event to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventPublisher;

impl EventPublisher for TracingEventPublisher {
    fn publish(&self, event: ExecutionEvent) {
        match &event {
            ExecutionEvent::AdapterLifecycle {
                adapter_id,
                operation,
                success,
                message,
                ..
            } => {
                if *success {
                    info!(adapter_id = %adapter_id, "{}: {}", operation, message);
                } else {
                    warn!(adapter_id = %adapter_id, "{} failed: {}", operation, message);
                }
            }
            ExecutionEvent::AdapterExecution {
                correlation_id,
                adapter_id,
                success,
                attempts,
                elapsed_ms,
                error_code,
                ..
            } => {
                if *success {
                    debug!(
                        correlation_id = %correlation_id,
                        "Adapter {} succeeded after {} attempt(s) in {}ms",
                        adapter_id, attempts, elapsed_ms
                    );
                } else {
                    warn!(
                        correlation_id = %correlation_id,
                        "Adapter {} failed after {} attempt(s): {}",
                        adapter_id,
                        attempts,
                        error_code.as_deref().unwrap_or("UNKNOWN")
                    );
                }
            }
            ExecutionEvent::FlowExecution {
                correlation_id,
                flow_id,
                outcome,
                elapsed_ms,
                ..
            } => {
                info!(
                    correlation_id = %correlation_id,
                    "Flow {} finished with {:?} in {}ms",
                    flow_id, outcome, elapsed_ms
                );
            }
        }
    }
}

/// Forwards events to a bounded channel, dropping them when it is full
#[derive(Debug, Clone)]
pub struct ChannelEventPublisher {
    sender: async_channel::Sender<ExecutionEvent>,
}

impl ChannelEventPublisher {
    pub fn new(capacity: usize) -> (Self, async_channel::Receiver<ExecutionEvent>) {
        let (sender, receiver) = async_channel::bounded(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl EventPublisher for ChannelEventPublisher {
    fn publish(&self, event: ExecutionEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(async_channel::TrySendError::Full(event)) => {
                warn!("Event channel full, dropping {} event", event.name());
            }
            Err(async_channel::TrySendError::Closed(event)) => {
                debug!("Event channel closed, dropping {} event", event.name());
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventPublisher;

impl EventPublisher for NoopEventPublisher {
    fn publish(&self, _event: ExecutionEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_publisher_drops_when_full() {
        let (publisher, receiver) = ChannelEventPublisher::new(1);
        publisher.publish(ExecutionEvent::lifecycle("a", "START", true, "started"));
        publisher.publish(ExecutionEvent::lifecycle("b", "START", true, "started"));

        assert_eq!(receiver.len(), 1);
        match receiver.try_recv().unwrap() {
            ExecutionEvent::AdapterLifecycle { adapter_id, .. } => assert_eq!(adapter_id, "a"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_channel_publisher_ignores_closed_channel() {
        let (publisher, receiver) = ChannelEventPublisher::new(4);
        drop(receiver);
        publisher.publish(ExecutionEvent::lifecycle("a", "STOP", true, "stopped"));
    }

    #[test]
    fn test_event_serialization() {
        let event = ExecutionEvent::lifecycle("orders-api", "CREATE", false, "boom");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "ADAPTER_LIFECYCLE");
        assert_eq!(json["adapterId"], "orders-api");
        assert_eq!(json["success"], false);
    }
}
