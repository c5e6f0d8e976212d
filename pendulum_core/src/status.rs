//! Connection status notifications for the controller link.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel as xch;

/// Buffered notifications before new ones start being dropped.
const STATUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub device: String,
    pub connected: bool,
}

/// Publishes connect/disconnect transitions without ever blocking the publisher.
///
/// Only changes are published; repeating the current state is a no-op.
#[derive(Debug)]
pub struct StatusBus {
    tx: xch::Sender<StatusEvent>,
    rx: xch::Receiver<StatusEvent>,
    connected: AtomicBool,
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBus {
    pub fn new() -> Self {
        let (tx, rx) = xch::bounded(STATUS_CAPACITY);
        Self {
            tx,
            rx,
            connected: AtomicBool::new(false),
        }
    }

    /// Returns true when the state changed.
    pub fn publish(&self, device: &str, connected: bool) -> bool {
        if self.connected.swap(connected, Ordering::AcqRel) == connected {
            return false;
        }
        let ev = StatusEvent {
            device: device.to_string(),
            connected,
        };
        if self.tx.try_send(ev).is_err() {
            tracing::debug!(device, connected, "status listener lagging; notification dropped");
        }
        tracing::info!(device, connected, "controller connection status");
        true
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Receiver for status notifications. All clones share one queue.
    pub fn subscribe(&self) -> xch::Receiver<StatusEvent> {
        self.rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transitions_are_published() {
        let bus = StatusBus::new();
        let rx = bus.subscribe();
        assert!(!bus.publish("dev", false));
        assert!(bus.publish("dev", true));
        assert!(!bus.publish("dev", true));
        assert!(bus.publish("dev", false));
        let got: Vec<bool> = rx.try_iter().map(|e| e.connected).collect();
        assert_eq!(got, vec![true, false]);
    }

    #[test]
    fn full_queue_never_blocks() {
        let bus = StatusBus::new();
        for i in 0..(STATUS_CAPACITY * 2 + 1) {
            bus.publish("dev", i % 2 == 0);
        }
        assert_eq!(bus.subscribe().try_iter().count(), STATUS_CAPACITY);
    }
}
