//! EventBus: the one channel from every background worker to the node's driver.
//!
//! Publishing never blocks and never waits for the consumer, so a slow
//! console cannot stall network I/O.  When the consumer has gone away,
//! events are dropped.

use lanchat_core::NodeEvent;
use tokio::sync::mpsc;
use tracing::debug;

/// Receiving end handed to the single consumer.
pub type EventStream = mpsc::UnboundedReceiver<NodeEvent>;

/// Cloneable publishing handle.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<NodeEvent>,
}

impl EventBus {
    /// Creates a bus and the stream its events arrive on.
    pub fn new() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publishes `event`.  Returns `false` if the consumer has been dropped.
    pub fn publish(&self, event: impl Into<NodeEvent>) -> bool {
        match self.tx.send(event.into()) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                debug!("event dropped, no consumer: {event:?}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanchat_core::TransferStatus;

    #[tokio::test]
    async fn test_published_events_arrive_in_order() {
        let (bus, mut stream) = EventBus::new();

        bus.publish(TransferStatus::Sent { name: "a".into() });
        bus.publish(TransferStatus::Sent { name: "b".into() });

        assert_eq!(
            stream.recv().await,
            Some(NodeEvent::TransferStatus(TransferStatus::Sent { name: "a".into() }))
        );
        assert_eq!(
            stream.recv().await,
            Some(NodeEvent::TransferStatus(TransferStatus::Sent { name: "b".into() }))
        );
    }

    #[test]
    fn test_publish_without_consumer_returns_false() {
        let (bus, stream) = EventBus::new();
        drop(stream);

        assert!(!bus.publish(TransferStatus::Sent { name: "a".into() }));
    }

    #[test]
    fn test_publish_does_not_block_with_many_pending_events() {
        let (bus, _stream) = EventBus::new();
        for i in 0..10_000 {
            assert!(bus.publish(TransferStatus::Sent { name: i.to_string() }));
        }
    }
}
