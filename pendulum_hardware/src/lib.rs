pub mod error;
pub mod tcp;

pub use error::LinkError;
pub use pendulum_traits::{SORTING_TOKEN, TRIGGER_TOKEN};
pub use tcp::TcpDeviceLink;

use crossbeam_channel as xch;
use pendulum_traits::{DeviceLink, LinkEvent};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Simulated controller link.
///
/// Records every frame written to it and lets callers inject sensor frames,
/// faults and remote closes as if they came from the read loop.
pub struct SimulatedLink {
    name: String,
    events: xch::Sender<LinkEvent>,
    connected: AtomicBool,
    sent: Mutex<Vec<Vec<u8>>>,
    connects: AtomicUsize,
    fail_connects: AtomicUsize,
    fail_sends: AtomicUsize,
}

impl SimulatedLink {
    pub fn new(name: impl Into<String>, events: xch::Sender<LinkEvent>) -> Self {
        Self {
            name: name.into(),
            events,
            connected: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            fail_connects: AtomicUsize::new(0),
            fail_sends: AtomicUsize::new(0),
        }
    }

    /// Publish a raw frame. Dropped (returns false) while disconnected, like a real socket.
    pub fn inject(&self, frame: &[u8]) -> bool {
        if !self.connected.load(Ordering::Acquire) {
            return false;
        }
        self.events.send(LinkEvent::Frame(frame.to_vec())).is_ok()
    }

    /// Simulate the trigger photoelectric firing.
    pub fn trigger(&self) -> bool {
        self.inject(format!("{TRIGGER_TOKEN}\r\n").as_bytes())
    }

    /// Simulate the sorting photoelectric firing.
    pub fn sorting(&self) -> bool {
        self.inject(format!("{SORTING_TOKEN}\r\n").as_bytes())
    }

    /// Simulate a faulted read.
    pub fn fault(&self, msg: &str) {
        let _ = self.events.send(LinkEvent::Fault(msg.to_string()));
    }

    /// Simulate the controller closing the connection.
    pub fn remote_close(&self) {
        self.connected.store(false, Ordering::Release);
        let _ = self.events.send(LinkEvent::Closed);
    }

    /// Make the next `n` connect attempts fail with a timeout.
    pub fn fail_next_connects(&self, n: usize) {
        self.fail_connects.store(n, Ordering::Release);
    }

    /// Make the next `n` sends fail with an I/O error.
    pub fn fail_next_sends(&self, n: usize) {
        self.fail_sends.store(n, Ordering::Release);
    }

    /// Number of successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::Acquire)
    }

    /// Snapshot of every frame written so far, in order.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn clear_sent(&self) {
        if let Ok(mut g) = self.sent.lock() {
            g.clear();
        }
    }
}

/// Decrement `counter` if non-zero; true when a failure should be injected.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

impl DeviceLink for SimulatedLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(
        &self,
        timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if take_one(&self.fail_connects) {
            return Err(Box::new(LinkError::ConnectTimeout {
                addr: format!("sim://{}", self.name),
                timeout_ms: timeout.as_millis() as u64,
            }));
        }
        if !self.connected.swap(true, Ordering::AcqRel) {
            self.connects.fetch_add(1, Ordering::AcqRel);
            tracing::debug!(device = %self.name, "simulated link connected");
        }
        Ok(())
    }

    fn send(&self, frame: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(Box::new(LinkError::NotConnected));
        }
        if take_one(&self.fail_sends) {
            return Err(Box::new(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated write failure",
            ))));
        }
        if let Ok(mut g) = self.sent.lock() {
            g.push(frame.to_vec());
        }
        Ok(())
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            tracing::debug!(device = %self.name, "simulated link disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_link_records_frames_when_connected() {
        let (tx, rx) = xch::unbounded();
        let link = SimulatedLink::new("sim", tx);
        assert!(link.send(&[1, 2, 3]).is_err());
        link.connect(Duration::from_millis(10)).unwrap();
        link.send(&[1, 2, 3]).unwrap();
        assert_eq!(link.sent_frames(), vec![vec![1, 2, 3]]);
        assert!(link.trigger());
        match rx.try_recv().unwrap() {
            LinkEvent::Frame(bytes) => {
                assert!(String::from_utf8_lossy(&bytes).contains(TRIGGER_TOKEN));
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn injected_connect_failures_are_consumed() {
        let (tx, _rx) = xch::unbounded();
        let link = SimulatedLink::new("sim", tx);
        link.fail_next_connects(1);
        let err = link.connect(Duration::from_millis(5)).unwrap_err();
        assert!(err.to_string().contains("timed out"));
        link.connect(Duration::from_millis(5)).unwrap();
        assert_eq!(link.connect_count(), 1);
    }

    #[test]
    fn frames_are_dropped_while_disconnected() {
        let (tx, rx) = xch::unbounded();
        let link = SimulatedLink::new("sim", tx);
        assert!(!link.sorting());
        assert!(rx.try_recv().is_err());
    }
}
