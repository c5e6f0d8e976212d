//! Terminal package records handed to the history sink.

use std::time::SystemTime;

use crate::package::Package;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Routed (or passed straight through) without error.
    Diverted,
    /// Flagged at any stage: correlation, timeout, actuation or shutdown.
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Diverted => "diverted",
            Outcome::Error => "error",
        }
    }
}

/// One record per package, written exactly once when it reaches a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub index: u64,
    pub barcode: String,
    pub chute: i32,
    pub weight_g: f32,
    pub outcome: Outcome,
    pub error: Option<String>,
    pub trigger_delay_ms: Option<u64>,
    /// Creation to completion, ms.
    pub processing_ms: Option<u64>,
    pub recorded_at: SystemTime,
}

impl HistoryRecord {
    pub fn from_package(p: &Package) -> Self {
        Self {
            index: p.index,
            barcode: p.barcode.clone(),
            chute: p.chute,
            weight_g: p.weight_g,
            outcome: if p.is_error() {
                Outcome::Error
            } else {
                Outcome::Diverted
            },
            error: p.error.as_ref().map(ToString::to_string),
            trigger_delay_ms: p.trigger_delay_ms,
            processing_ms: p.processing_ms,
            recorded_at: SystemTime::now(),
        }
    }
}

/// Destination for completed package records (database, file, UI, ...).
pub trait HistorySink: Send + Sync {
    fn record(&self, rec: &HistoryRecord) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
