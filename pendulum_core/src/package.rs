//! Package identification record and package-level errors.

use std::time::Instant;
use thiserror::Error;

/// Package-level failure. Never fatal to the service; surfaced through the
/// package's own error field and its history record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PackageError {
    #[error("no matching trigger timestamp")]
    NoMatchingTrigger,
    #[error("trigger delay anomaly: {delay_ms} ms")]
    DelayAnomaly { delay_ms: u64 },
    #[error("sequence index already pending")]
    DuplicateIndex,
    #[error("no sorting signal before pending timeout")]
    PendingTimeout,
    #[error("actuation failed: {0}")]
    Actuation(String),
    #[error("cancelled by service shutdown")]
    Cancelled,
}

/// Identification record flowing from the upstream pipeline through the engine.
///
/// `trigger_at` and `error` are filled in by the correlator; `processing_ms`
/// once the package reaches a terminal state.
#[derive(Debug, Clone)]
pub struct Package {
    /// Monotonic sequence index; matching and ordering key.
    pub index: u64,
    pub barcode: String,
    pub weight_g: f32,
    /// Destination chute. 1 = left, 2 = right, 3 or <= 0 = straight through.
    pub chute: i32,
    pub created_at: Instant,
    pub trigger_at: Option<Instant>,
    /// Trigger to identification delay at correlation time, matched or estimated.
    pub trigger_delay_ms: Option<u64>,
    pub processing_ms: Option<u64>,
    pub error: Option<PackageError>,
}

impl Package {
    pub fn new(index: u64, barcode: impl Into<String>, chute: i32, created_at: Instant) -> Self {
        Self {
            index,
            barcode: barcode.into(),
            weight_g: 0.0,
            chute,
            created_at,
            trigger_at: None,
            trigger_delay_ms: None,
            processing_ms: None,
            error: None,
        }
    }

    pub fn with_weight(mut self, weight_g: f32) -> Self {
        self.weight_g = weight_g;
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Result of handing a package to `SortingService::process_package`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Correlated and waiting in the pending-sort registry.
    Pending,
    /// Flagged and finalized immediately; it never entered the registry.
    Rejected(PackageError),
}
