//! Event fan-out to external observers.
//!
//! The UI layer (or any other observer) learns about state changes through
//! a broadcast channel rather than a toolkit-specific signal mechanism.
//! Publishing never blocks and does not care whether anyone is listening;
//! the pollers keep running with zero subscribers.

use crate::types::Channel;
use tokio::sync::broadcast;
use tracing::trace;

/// Notification published by the pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplyEvent {
    /// A measurement cycle completed and every channel's values were
    /// stored. Fired once per completed cycle, never per channel.
    ValuesUpdated,
    /// One channel's regulation mode differs from its previous value.
    /// Fired once per changed channel, so one cycle can produce several.
    ModeChanged(Channel),
}

/// Multi-subscriber event channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SupplyEvent>,
}

impl EventBus {
    /// Create a bus whose subscribers may lag by up to `capacity` events
    /// before losing the oldest.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SupplyEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: SupplyEvent) {
        if self.sender.send(event).is_err() {
            trace!(?event, "no subscribers for event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_to_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(SupplyEvent::ValuesUpdated);
        bus.publish(SupplyEvent::ModeChanged(Channel::Ch2));

        assert_eq!(first.recv().await.unwrap(), SupplyEvent::ValuesUpdated);
        assert_eq!(
            first.recv().await.unwrap(),
            SupplyEvent::ModeChanged(Channel::Ch2)
        );
        assert_eq!(second.recv().await.unwrap(), SupplyEvent::ValuesUpdated);
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new(16);
        bus.publish(SupplyEvent::ValuesUpdated);
    }
}
