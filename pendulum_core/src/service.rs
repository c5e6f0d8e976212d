//! `SortingService`: lifecycle and background workers of one pendulum station.
//!
//! While running, the service owns four kinds of threads, all joined on `stop()`:
//!
//! - **frame loop**: consumes `LinkEvent`s, records trigger timestamps and
//!   dispatches due packages to the actuation pool on every sorting signal
//! - **actuation workers**: `max_in_flight` threads, each running one package's
//!   swing/wait/reset sequence at a time
//! - **sweeper**: evicts pending packages whose timeout has passed
//! - **supervisor**: re-establishes the link after read or write failures
//!
//! Every wait is a `recv_timeout` on the shutdown channel, whose sender is
//! dropped by `stop()`, so cancellation is immediate.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{self as xch, RecvTimeoutError};
use pendulum_traits::{Clock, DeviceLink, LinkEvent, SORTING_TOKEN, TRIGGER_TOKEN};

use crate::actuation::{Station, swing_for_chute};
use crate::builder::SortingServiceBuilder;
use crate::config::{LinkCfg, RuntimeCfg, SortingCfg};
use crate::correlator::TriggerCorrelator;
use crate::delays::DelayHistory;
use crate::error::{Result, SorterError};
use crate::history::{HistoryRecord, HistorySink};
use crate::hw_error::map_link_error_dyn;
use crate::marks::{MarkGuard, ProcessingMarks};
use crate::package::{Admission, Package, PackageError};
use crate::registry::{PendingRegistry, PendingSnapshot};
use crate::status::{StatusBus, StatusEvent};
use crate::util::elapsed_ms;

/// Point-in-time counters for dashboards and the CLI summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStats {
    pub pending: usize,
    pub in_flight: usize,
    pub trigger_queue: usize,
    pub median_trigger_delay_ms: Option<u64>,
    pub median_processing_delay_ms: Option<u64>,
    pub connected: bool,
}

pub(crate) struct Engine {
    pub(crate) link: Arc<dyn DeviceLink>,
    pub(crate) history: Arc<dyn HistorySink>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) sorting: SortingCfg,
    pub(crate) link_cfg: LinkCfg,
    pub(crate) runtime: RuntimeCfg,
    pub(crate) correlator: TriggerCorrelator,
    pub(crate) registry: PendingRegistry,
    pub(crate) marks: ProcessingMarks,
    pub(crate) station: Station,
    pub(crate) processing: Mutex<DelayHistory>,
    pub(crate) status: StatusBus,
}

impl Engine {
    fn processing(&self) -> MutexGuard<'_, DelayHistory> {
        self.processing.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn device(&self) -> &str {
        self.link.name()
    }

    /// Connect within the configured timeout, then bring the station to idle:
    /// start, reset-left, reset-right.
    fn connect_and_init(&self) -> std::result::Result<(), SorterError> {
        let timeout = Duration::from_millis(self.link_cfg.connect_timeout_ms);
        self.link
            .connect(timeout)
            .map_err(|e| map_link_error_dyn(e.as_ref()))?;
        let cmds = self.station.commands();
        for frame in [&cmds.start, &cmds.reset_left, &cmds.reset_right] {
            if let Err(e) = self.link.send(frame) {
                let err = map_link_error_dyn(e.as_ref());
                self.link.disconnect();
                return Err(err);
            }
        }
        self.station.clear();
        Ok(())
    }

    /// Write the package's single history record.
    fn finalize(&self, mut package: Package, now: Instant) {
        if package.processing_ms.is_none() {
            package.processing_ms = Some(elapsed_ms(now, package.created_at));
        }
        match &package.error {
            None => tracing::info!(
                index = package.index,
                chute = package.chute,
                processing_ms = package.processing_ms,
                "package diverted"
            ),
            Some(e) => tracing::warn!(
                index = package.index,
                chute = package.chute,
                error = %e,
                "package flagged"
            ),
        }
        let rec = HistoryRecord::from_package(&package);
        if let Err(e) = self.history.record(&rec) {
            tracing::warn!(index = package.index, error = %e, "history sink rejected record");
        }
    }

    fn reject(&self, mut package: Package, err: PackageError, now: Instant) -> Admission {
        package.error = Some(err.clone());
        self.finalize(package, now);
        Admission::Rejected(err)
    }

    fn evict_expired(&self) {
        let now = self.clock.now();
        for mut package in self.registry.evict_expired(now) {
            tracing::warn!(index = package.index, "pending timeout; evicting package");
            package.error = Some(PackageError::PendingTimeout);
            self.finalize(package, now);
        }
    }

    /// Packages due at the sorting sensor, in service order.
    fn due_packages(&self, now: Instant) -> Vec<PendingSnapshot> {
        let window = self.sorting.window;
        let mut due: Vec<PendingSnapshot> = self
            .registry
            .scan()
            .into_iter()
            .filter(|s| !self.marks.is_marked(s.index))
            .filter(|s| window.contains(elapsed_ms(now, s.trigger_at)))
            .collect();
        due.sort_by_key(|s| (s.trigger_at, s.index));
        due
    }

    fn stats(&self) -> ServiceStats {
        ServiceStats {
            pending: self.registry.len(),
            in_flight: self.marks.len(),
            trigger_queue: self.correlator.queued(),
            median_trigger_delay_ms: self.correlator.median_delay_ms(),
            median_processing_delay_ms: self.processing().median(),
            connected: self.link.is_connected(),
        }
    }

    fn clear(&self) {
        self.marks.clear();
        self.station.clear();
        self.correlator.clear();
        self.processing().clear();
    }
}

struct ActuationJob {
    snapshot: PendingSnapshot,
    dispatched_at: Instant,
    _mark: MarkGuard,
}

/// What every background thread of one run shares.
#[derive(Clone)]
struct RunCtx {
    engine: Arc<Engine>,
    shutdown: xch::Receiver<()>,
    reconnect: xch::Sender<()>,
}

impl RunCtx {
    /// Sleep for `d`; false when the service is stopping.
    fn wait(&self, d: Duration) -> bool {
        matches!(self.shutdown.recv_timeout(d), Err(RecvTimeoutError::Timeout))
    }

    fn wait_until(&self, deadline: Instant) -> bool {
        let now = self.engine.clock.now();
        self.wait(deadline.saturating_duration_since(now))
    }

    fn request_reconnect(&self) {
        // Full means a request is already queued.
        let _ = self.reconnect.try_send(());
    }

    fn frame_loop(&self, events: &xch::Receiver<LinkEvent>, jobs: &xch::Sender<ActuationJob>) {
        loop {
            xch::select! {
                recv(self.shutdown) -> _ => break,
                recv(events) -> ev => match ev {
                    Ok(LinkEvent::Frame(bytes)) => self.on_frame(&bytes, jobs),
                    Ok(LinkEvent::Fault(msg)) => {
                        tracing::warn!(device = %self.engine.device(), error = %msg, "link read fault");
                        self.request_reconnect();
                    }
                    Ok(LinkEvent::Closed) => {
                        tracing::warn!(device = %self.engine.device(), "link closed by controller");
                        self.request_reconnect();
                    }
                    Err(_) => {
                        tracing::debug!("link event channel closed, exiting frame loop");
                        break;
                    }
                },
            }
        }
        tracing::trace!("frame loop exiting cleanly");
    }

    fn on_frame(&self, bytes: &[u8], jobs: &xch::Sender<ActuationJob>) {
        let now = self.engine.clock.now();
        let text = String::from_utf8_lossy(bytes);
        tracing::trace!(frame = %text.trim_end(), "frame");
        // One frame may carry both signals.
        if text.contains(TRIGGER_TOKEN) {
            self.engine.correlator.on_trigger(now);
        }
        if text.contains(SORTING_TOKEN) {
            self.dispatch(now, jobs);
        }
    }

    fn dispatch(&self, now: Instant, jobs: &xch::Sender<ActuationJob>) {
        let e = &self.engine;
        for snapshot in e.due_packages(now) {
            let Some(mark) = e.marks.try_mark(snapshot.index, e.station.name(), now) else {
                continue;
            };
            tracing::debug!(
                index = snapshot.index,
                chute = snapshot.chute,
                delay_ms = elapsed_ms(now, snapshot.trigger_at),
                "dispatching package"
            );
            let job = ActuationJob {
                snapshot,
                dispatched_at: now,
                _mark: mark,
            };
            if jobs.send(job).is_err() {
                break;
            }
        }
    }

    fn worker_loop(&self, jobs: &xch::Receiver<ActuationJob>) {
        loop {
            xch::select! {
                recv(self.shutdown) -> _ => break,
                recv(jobs) -> job => match job {
                    Ok(job) => self.actuate(&job),
                    Err(_) => break,
                },
            }
        }
    }

    fn actuate(&self, job: &ActuationJob) {
        let e = &self.engine;
        let snap = job.snapshot;
        if !self.wait_until(job.dispatched_at + e.sorting.sorting_delay()) {
            tracing::debug!(index = snap.index, "actuation cancelled");
            return;
        }
        let result = match self.drive(snap) {
            Ok(false) => {
                tracing::debug!(index = snap.index, "actuation cancelled");
                return;
            }
            Ok(true) => Ok(()),
            Err(err) => Err(err),
        };
        e.station.finish(snap.index);

        let now = e.clock.now();
        let Some(mut package) = e.registry.remove(snap.index) else {
            tracing::debug!(index = snap.index, "package already evicted; skipping finalize");
            return;
        };
        if let Err(err) = result {
            tracing::warn!(index = snap.index, error = %err, "actuation failed");
            package.error = Some(PackageError::Actuation(err.to_string()));
            self.request_reconnect();
        }
        let processing_ms = elapsed_ms(now, package.created_at);
        package.processing_ms = Some(processing_ms);
        if let Some(mark) = e.marks.get(snap.index) {
            tracing::debug!(
                index = snap.index,
                station = %mark.station,
                held_ms = e.clock.ms_since(mark.started_at),
                "actuation finished"
            );
        }
        e.processing().push(processing_ms);
        e.finalize(package, now);
    }

    /// Swing, wait, then decide on the reset. `Ok(false)` when cancelled.
    fn drive(&self, snap: PendingSnapshot) -> std::result::Result<bool, SorterError> {
        let e = &self.engine;
        let target = swing_for_chute(snap.chute);
        e.station.position(e.link.as_ref(), snap.index, target)?;
        // Straight-through: nothing was swung, so there is no reset decision
        // to wait for and the reset delay is skipped.
        if target.is_none() {
            return Ok(true);
        }
        if !self.wait(e.sorting.reset_delay()) {
            return Ok(false);
        }
        let next = e
            .registry
            .next_after(snap.trigger_at, snap.index, |i| e.marks.is_marked(i))
            .map(|n| swing_for_chute(n.chute));
        e.station.settle(e.link.as_ref(), snap.index, next)?;
        Ok(true)
    }

    fn sweeper_loop(&self) {
        let period = Duration::from_millis(self.engine.runtime.sweep_interval_ms);
        while self.wait(period) {
            self.engine.evict_expired();
        }
        tracing::trace!("sweeper exiting cleanly");
    }

    fn supervisor_loop(&self, requests: &xch::Receiver<()>) {
        loop {
            xch::select! {
                recv(self.shutdown) -> _ => break,
                recv(requests) -> _ => {
                    if !self.reconnect() {
                        break;
                    }
                    // Requests raised by the failure just handled are stale.
                    while requests.try_recv().is_ok() {}
                }
            }
        }
        tracing::trace!("supervisor exiting cleanly");
    }

    /// Retry until connected; false when the service stopped first.
    fn reconnect(&self) -> bool {
        let e = &self.engine;
        let interval = Duration::from_millis(e.link_cfg.reconnect_interval_ms);
        loop {
            e.link.disconnect();
            e.status.publish(e.device(), false);
            match e.connect_and_init() {
                Ok(()) => {
                    e.status.publish(e.device(), true);
                    tracing::info!(device = %e.device(), "controller link re-established");
                    return true;
                }
                Err(err) => {
                    tracing::error!(device = %e.device(), error = %err, "reconnect failed");
                    if !self.wait(interval) {
                        return false;
                    }
                }
            }
        }
    }
}

struct Running {
    shutdown: Option<xch::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl Running {
    fn halt(&mut self) {
        drop(self.shutdown.take());
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if let Err(e) = handle.join() {
                tracing::warn!(thread = %name, ?e, "service thread panicked during shutdown");
            }
        }
    }
}

pub struct SortingService {
    pub(crate) engine: Arc<Engine>,
    pub(crate) events: xch::Receiver<LinkEvent>,
    state: RwLock<Option<Running>>,
}

impl core::fmt::Debug for SortingService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SortingService")
            .field("device", &self.engine.device())
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

impl SortingService {
    pub fn builder() -> SortingServiceBuilder {
        SortingServiceBuilder::default()
    }

    pub(crate) fn from_engine(engine: Engine, events: xch::Receiver<LinkEvent>) -> Self {
        Self {
            engine: Arc::new(engine),
            events,
            state: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.read().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Connect, send the startup sequence and spawn the background threads.
    ///
    /// A connect failure here is fatal and returned as a `SorterError`.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        if state.is_some() {
            return Err(eyre::Report::new(SorterError::State(
                "service already running".into(),
            )));
        }
        let e = &self.engine;
        if let Err(err) = e.connect_and_init() {
            tracing::error!(device = %e.device(), error = %err, "controller connect failed");
            return Err(eyre::Report::new(err));
        }
        e.status.publish(e.device(), true);

        let (shutdown_tx, shutdown_rx) = xch::bounded::<()>(0);
        let (reconnect_tx, reconnect_rx) = xch::bounded::<()>(1);
        let (jobs_tx, jobs_rx) = xch::unbounded::<ActuationJob>();
        let ctx = RunCtx {
            engine: Arc::clone(e),
            shutdown: shutdown_rx,
            reconnect: reconnect_tx,
        };
        let mut running = Running {
            shutdown: Some(shutdown_tx),
            handles: Vec::with_capacity(e.runtime.max_in_flight + 3),
        };

        let station = e.station.name().to_string();
        let spawned = (|| -> std::io::Result<()> {
            let c = ctx.clone();
            let events = self.events.clone();
            running.handles.push(
                std::thread::Builder::new()
                    .name(format!("{station}-frames"))
                    .spawn(move || c.frame_loop(&events, &jobs_tx))?,
            );
            for i in 0..e.runtime.max_in_flight {
                let c = ctx.clone();
                let jobs = jobs_rx.clone();
                running.handles.push(
                    std::thread::Builder::new()
                        .name(format!("{station}-act{i}"))
                        .spawn(move || c.worker_loop(&jobs))?,
                );
            }
            let c = ctx.clone();
            running.handles.push(
                std::thread::Builder::new()
                    .name(format!("{station}-sweep"))
                    .spawn(move || c.sweeper_loop())?,
            );
            let c = ctx.clone();
            running.handles.push(
                std::thread::Builder::new()
                    .name(format!("{station}-supervisor"))
                    .spawn(move || c.supervisor_loop(&reconnect_rx))?,
            );
            Ok(())
        })();
        if let Err(err) = spawned {
            running.halt();
            e.link.disconnect();
            e.status.publish(e.device(), false);
            return Err(eyre::Report::new(SorterError::Io(err.to_string())));
        }

        tracing::info!(
            device = %e.device(),
            workers = e.runtime.max_in_flight,
            "sorting service started"
        );
        *state = Some(running);
        Ok(())
    }

    /// Cancel all waits, join every thread, park the arm, disconnect and
    /// finalize whatever is still pending as cancelled. Idempotent.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        let Some(mut running) = state.take() else {
            return Ok(());
        };
        running.halt();

        let e = &self.engine;
        if e.link.is_connected() {
            let cmds = e.station.commands();
            for frame in [&cmds.reset_left, &cmds.reset_right, &cmds.stop] {
                if let Err(err) = e.link.send(frame) {
                    tracing::warn!(device = %e.device(), error = %err, "shutdown command failed");
                }
            }
        }
        e.link.disconnect();
        e.status.publish(e.device(), false);

        let now = e.clock.now();
        let pending = e.registry.drain();
        let cancelled = pending.len();
        for mut package in pending {
            package.error = Some(PackageError::Cancelled);
            e.finalize(package, now);
        }
        e.clear();
        tracing::info!(device = %e.device(), cancelled, "sorting service stopped");
        Ok(())
    }

    /// Correlate `package` with a trigger timestamp and queue it for sorting.
    ///
    /// Package-level problems are returned as `Admission::Rejected` after the
    /// package has been finalized; only calling on a stopped service is an error.
    pub fn process_package(&self, mut package: Package) -> Result<Admission> {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        if state.is_none() {
            return Err(eyre::Report::new(SorterError::State(
                "service not running".into(),
            )));
        }
        let e = &self.engine;
        let now = e.clock.now();
        if let Err(err) = e.correlator.correlate(&mut package, now) {
            return Ok(e.reject(package, err, now));
        }
        match e
            .registry
            .try_enqueue(package, e.sorting.pending_timeout(), now)
        {
            Ok(()) => Ok(Admission::Pending),
            Err(dup) => {
                tracing::warn!(index = dup.index, "duplicate sequence index");
                Ok(e.reject(*dup, PackageError::DuplicateIndex, now))
            }
        }
    }

    pub fn stats(&self) -> ServiceStats {
        self.engine.stats()
    }

    /// Connection status notifications. Never blocks the service; a lagging
    /// receiver loses notifications.
    pub fn status_events(&self) -> xch::Receiver<StatusEvent> {
        self.engine.status.subscribe()
    }

    pub fn device_name(&self) -> &str {
        self.engine.device()
    }
}

impl Drop for SortingService {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "sorting service stop failed during drop");
        }
    }
}
