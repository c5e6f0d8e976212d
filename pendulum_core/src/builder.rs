//! Builder for `SortingService`.
//!
//! The link, its event receiver and the history sink are required; every
//! other setting falls back to its default. All validation happens in `build()`.

use std::sync::{Arc, Mutex};

use crossbeam_channel as xch;
use pendulum_traits::{Clock, DeviceLink, LinkEvent, MonotonicClock};

use crate::actuation::Station;
use crate::config::{CommandSet, DelayWindow, LinkCfg, RuntimeCfg, SortingCfg};
use crate::correlator::TriggerCorrelator;
use crate::delays::DelayHistory;
use crate::error::{BuildError, Result};
use crate::history::HistorySink;
use crate::marks::ProcessingMarks;
use crate::registry::PendingRegistry;
use crate::service::{Engine, SortingService};
use crate::status::StatusBus;

/// Trigger correlation window used when none is configured.
pub const DEFAULT_TRIGGER_WINDOW: DelayWindow = DelayWindow::new(100, 1500);

#[derive(Default)]
pub struct SortingServiceBuilder {
    link: Option<Arc<dyn DeviceLink>>,
    events: Option<xch::Receiver<LinkEvent>>,
    history: Option<Arc<dyn HistorySink>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    trigger: Option<DelayWindow>,
    sorting: Option<SortingCfg>,
    link_cfg: Option<LinkCfg>,
    runtime: Option<RuntimeCfg>,
    commands: Option<CommandSet>,
    station: Option<String>,
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

impl SortingServiceBuilder {
    pub fn with_link(mut self, link: Arc<dyn DeviceLink>) -> Self {
        self.link = Some(link);
        self
    }

    /// Receiver paired with the sender the link publishes its `LinkEvent`s on.
    pub fn with_events(mut self, events: xch::Receiver<LinkEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_trigger_window(mut self, window: DelayWindow) -> Self {
        self.trigger = Some(window);
        self
    }

    pub fn with_sorting(mut self, sorting: SortingCfg) -> Self {
        self.sorting = Some(sorting);
        self
    }

    pub fn with_link_cfg(mut self, link_cfg: LinkCfg) -> Self {
        self.link_cfg = Some(link_cfg);
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeCfg) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_commands(mut self, commands: CommandSet) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Station name used in processing marks and logs; defaults to the link name.
    pub fn with_station(mut self, name: impl Into<String>) -> Self {
        self.station = Some(name.into());
        self
    }

    pub fn build(self) -> Result<SortingService> {
        let link = self
            .link
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLink))?;
        let events = self
            .events
            .ok_or_else(|| eyre::Report::new(BuildError::MissingEvents))?;
        let history = self
            .history
            .ok_or_else(|| eyre::Report::new(BuildError::MissingHistory))?;

        let trigger = self.trigger.unwrap_or(DEFAULT_TRIGGER_WINDOW);
        let sorting = self.sorting.unwrap_or_default();
        let link_cfg = self.link_cfg.unwrap_or_default();
        let runtime = self.runtime.unwrap_or_default();
        let commands = self.commands.unwrap_or_default();

        // ── Validation ───────────────────────────────────────────────────────
        if trigger.lower_ms > trigger.upper_ms {
            return Err(invalid("trigger window lower bound exceeds upper bound"));
        }
        if sorting.window.lower_ms > sorting.window.upper_ms {
            return Err(invalid("sorting window lower bound exceeds upper bound"));
        }
        if link_cfg.connect_timeout_ms == 0 {
            return Err(invalid("connect_timeout_ms must be >= 1"));
        }
        if runtime.max_in_flight == 0 {
            return Err(invalid("max_in_flight must be >= 1"));
        }
        if runtime.sweep_interval_ms == 0 {
            return Err(invalid("sweep_interval_ms must be >= 1"));
        }
        if runtime.history_capacity == 0 {
            return Err(invalid("history_capacity must be >= 1"));
        }
        let frames = [
            &commands.start,
            &commands.stop,
            &commands.swing_left,
            &commands.reset_left,
            &commands.swing_right,
            &commands.reset_right,
        ];
        if frames.iter().any(|f| f.is_empty()) {
            return Err(invalid("command frames must not be empty"));
        }

        let station = self.station.unwrap_or_else(|| link.name().to_string());
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let engine = Engine {
            link,
            history,
            clock,
            sorting,
            link_cfg,
            runtime,
            correlator: TriggerCorrelator::new(trigger, runtime.history_capacity),
            registry: PendingRegistry::new(),
            marks: ProcessingMarks::new(),
            station: Station::new(station, commands),
            processing: Mutex::new(DelayHistory::new(runtime.history_capacity)),
            status: StatusBus::new(),
        };
        Ok(SortingService::from_engine(engine, events))
    }
}
