pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

use std::time::Duration;

/// Token the controller reports when the trigger photoelectric fires.
pub const TRIGGER_TOKEN: &str = "+OCCH1:1";
/// Token the controller reports when the sorting photoelectric fires.
pub const SORTING_TOKEN: &str = "+OCCH2:1";

/// Event published by a device link's background read loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Exactly the bytes returned by one socket read.
    Frame(Vec<u8>),
    /// A read failed; the loop keeps running and retries after a short pause.
    Fault(String),
    /// The remote end closed the connection (zero-length read). The loop has ended.
    Closed,
}

/// Persistent command/sensor link to the trigger/actuator controller.
///
/// Implementations are shared between the frame loop, actuation workers and
/// the reconnection supervisor, so every method takes `&self`.
pub trait DeviceLink: Send + Sync {
    /// Human-readable device name used in status notifications.
    fn name(&self) -> &str;

    /// Open the connection within `timeout` and start the background read loop.
    fn connect(
        &self,
        timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Write one raw command frame. Fails when the link is not connected.
    fn send(&self, frame: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Stop the read loop, then release the socket. Never fails; teardown errors are logged.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}
