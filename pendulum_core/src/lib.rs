#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Pendulum sorting engine (hardware-agnostic).
//!
//! Correlates the asynchronous trigger-sensor stream with the package
//! identification stream and drives swing/reset commands at the sorting
//! sensor. All controller I/O goes through `pendulum_traits::DeviceLink`.
//!
//! ## Architecture
//!
//! - **Correlation**: trigger FIFO plus median delay estimation (`correlator`)
//! - **Pending-sort registry**: single-lock map with sweep eviction (`registry`)
//! - **Processing marks**: concurrent per-package exclusion (`marks`)
//! - **Actuation**: swing/reset decisions and arm state (`actuation`)
//! - **Service**: lifecycle, worker pool, reconnection supervisor (`service`)
//!
//! Every package that enters the service produces exactly one `HistoryRecord`.

pub mod actuation;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod correlator;
pub mod delays;
pub mod error;
pub mod history;
pub mod hw_error;
pub mod marks;
pub mod mocks;
pub mod package;
pub mod registry;
pub mod service;
pub mod status;
pub mod util;

pub use actuation::{Direction, PendulumState, Station, needs_reset, swing_for_chute};
pub use builder::SortingServiceBuilder;
pub use config::{CommandSet, DelayWindow, LinkCfg, RuntimeCfg, SortingCfg};
pub use correlator::{Correlation, TriggerCorrelator};
pub use error::{BuildError, Report, Result, SorterError};
pub use history::{HistoryRecord, HistorySink, Outcome};
pub use package::{Admission, Package, PackageError};
pub use registry::{PendingRegistry, PendingSnapshot};
pub use service::{ServiceStats, SortingService};
pub use status::StatusEvent;
