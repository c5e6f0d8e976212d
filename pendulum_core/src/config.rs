//! Configuration types for the sorting engine.
//!
//! These are the runtime configuration structs used by `SortingService`.
//! They are separate from the TOML-deserialized config in `pendulum_config`.

use std::time::Duration;

/// Inclusive millisecond window `[lower_ms, upper_ms]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayWindow {
    pub lower_ms: u64,
    pub upper_ms: u64,
}

impl DelayWindow {
    pub const fn new(lower_ms: u64, upper_ms: u64) -> Self {
        Self { lower_ms, upper_ms }
    }

    #[inline]
    pub fn contains(&self, delay_ms: u64) -> bool {
        (self.lower_ms..=self.upper_ms).contains(&delay_ms)
    }

    /// Midpoint of the window, used when no delay history exists yet.
    #[inline]
    pub fn midpoint_ms(&self) -> u64 {
        self.lower_ms + (self.upper_ms.saturating_sub(self.lower_ms)) / 2
    }
}

/// Sorting-signal window and per-station actuation delays.
#[derive(Debug, Clone, Copy)]
pub struct SortingCfg {
    /// Trigger→sorting-signal delay range in which a package is due.
    pub window: DelayWindow,
    /// Wait after the sorting signal before swinging.
    pub sorting_delay_ms: u64,
    /// Wait after the swing before the reset decision.
    pub reset_delay_ms: u64,
    /// Pending-registry timeout; eviction fires 500 ms after it.
    pub pending_timeout_ms: u64,
}

impl Default for SortingCfg {
    fn default() -> Self {
        Self {
            window: DelayWindow::new(1000, 4000),
            sorting_delay_ms: 50,
            reset_delay_ms: 400,
            pending_timeout_ms: 4000,
        }
    }
}

impl SortingCfg {
    pub fn sorting_delay(&self) -> Duration {
        Duration::from_millis(self.sorting_delay_ms)
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_millis(self.pending_timeout_ms)
    }
}

/// Link timeouts.
#[derive(Debug, Clone, Copy)]
pub struct LinkCfg {
    /// Bounded connect timeout per attempt (ms).
    pub connect_timeout_ms: u64,
    /// Pause between failed reconnect attempts (ms).
    pub reconnect_interval_ms: u64,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 3000,
            reconnect_interval_ms: 2000,
        }
    }
}

/// Worker pool and housekeeping knobs.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeCfg {
    /// Actuation workers; bounds how many packages can wait on their delays at once.
    pub max_in_flight: usize,
    /// Pending-registry eviction sweep period (ms).
    pub sweep_interval_ms: u64,
    /// Capacity of each rolling delay history.
    pub history_capacity: usize,
}

impl Default for RuntimeCfg {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            sweep_interval_ms: 20,
            history_capacity: 100,
        }
    }
}

/// Raw command frames for one hardware generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    pub start: Vec<u8>,
    pub stop: Vec<u8>,
    pub swing_left: Vec<u8>,
    pub reset_left: Vec<u8>,
    pub swing_right: Vec<u8>,
    pub reset_right: Vec<u8>,
}

impl Default for CommandSet {
    fn default() -> Self {
        Self {
            start: vec![0xFE, 0x05, 0x00, 0x02, 0xFF, 0x00, 0x39, 0xF5],
            stop: vec![0xFE, 0x05, 0x00, 0x02, 0x00, 0x00, 0x78, 0x05],
            swing_left: vec![0xFE, 0x05, 0x00, 0x00, 0xFF, 0x00, 0x98, 0x35],
            reset_left: vec![0xFE, 0x05, 0x00, 0x00, 0x00, 0x00, 0xD9, 0xC5],
            swing_right: vec![0xFE, 0x05, 0x00, 0x01, 0xFF, 0x00, 0xC9, 0xF5],
            reset_right: vec![0xFE, 0x05, 0x00, 0x01, 0x00, 0x00, 0x88, 0x05],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DelayWindow;

    #[test]
    fn window_is_inclusive() {
        let w = DelayWindow::new(100, 300);
        assert!(w.contains(100));
        assert!(w.contains(300));
        assert!(!w.contains(99));
        assert!(!w.contains(301));
    }

    #[test]
    fn midpoint_handles_degenerate_window() {
        assert_eq!(DelayWindow::new(100, 300).midpoint_ms(), 200);
        assert_eq!(DelayWindow::new(250, 250).midpoint_ms(), 250);
        assert_eq!(DelayWindow::new(300, 100).midpoint_ms(), 300);
    }
}
