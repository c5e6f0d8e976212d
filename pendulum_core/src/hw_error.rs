//! Maps `Box<dyn Error>` from the `DeviceLink` boundary to typed `SorterError`.
//!
//! The trait in `pendulum_traits` uses `Box<dyn Error + Send + Sync>` so any
//! transport can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `pendulum_hardware::LinkError` downcasting.

use crate::error::SorterError;

/// Map a link-boundary error to a typed `SorterError`.
///
/// Attempts to downcast known link error types first, then falls back
/// to string-based heuristics.
pub fn map_link_error(e: &(dyn std::error::Error + 'static)) -> SorterError {
    // Feature-gated: try to downcast to LinkError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(link) = e.downcast_ref::<pendulum_hardware::LinkError>() {
            return match link {
                pendulum_hardware::LinkError::ConnectTimeout { .. } => SorterError::Timeout,
                pendulum_hardware::LinkError::NotConnected => SorterError::NotConnected,
                other => SorterError::Link(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        SorterError::Timeout
    } else if lower.contains("not connected") {
        SorterError::NotConnected
    } else {
        SorterError::Link(s)
    }
}

/// Convenience wrapper for the boxed errors returned by `DeviceLink` methods.
pub(crate) fn map_link_error_dyn(e: &(dyn std::error::Error + Send + Sync + 'static)) -> SorterError {
    map_link_error(e)
}
