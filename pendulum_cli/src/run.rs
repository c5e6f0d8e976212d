//! Command execution: config mapping, link assembly, and the three subcommands.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use eyre::WrapErr;
use pendulum_core::error::{Result as CoreResult, SorterError};
use pendulum_core::{
    Admission, CommandSet, DelayWindow, HistorySink, LinkCfg, Package, RuntimeCfg, ServiceStats,
    SortingCfg, SortingService,
};
use pendulum_hardware::{SimulatedLink, TcpDeviceLink};
use pendulum_traits::{DeviceLink, LinkEvent};
use serde::Deserialize;

use crate::history_sink::JsonlHistory;

const POLL: Duration = Duration::from_millis(100);

/// One upstream identification result, as read from stdin.
#[derive(Debug, Deserialize)]
pub struct PackageLine {
    pub index: u64,
    pub barcode: String,
    pub chute: i32,
    #[serde(default)]
    pub weight_g: f32,
}

impl PackageLine {
    pub fn into_package(self, created_at: Instant) -> Package {
        Package::new(self.index, self.barcode, self.chute, created_at).with_weight(self.weight_g)
    }
}

fn build_service(
    cfg: &pendulum_config::Config,
    link: Arc<dyn DeviceLink>,
    events: xch::Receiver<LinkEvent>,
    history: Arc<dyn HistorySink>,
) -> CoreResult<SortingService> {
    // Config mapping via the From impls in pendulum_core::conversions
    let commands = CommandSet::try_from(&cfg.commands)
        .map_err(|e| eyre::Report::new(SorterError::Config(format!("{e:#}"))))?;
    SortingService::builder()
        .with_link(link)
        .with_events(events)
        .with_history(history)
        .with_station(cfg.device.name.clone())
        .with_trigger_window(DelayWindow::from(&cfg.trigger))
        .with_sorting(SortingCfg::from(&cfg.sorting))
        .with_link_cfg(LinkCfg::from(&cfg.device))
        .with_runtime(RuntimeCfg::from(&cfg.runtime))
        .with_commands(commands)
        .build()
}

fn open_history(
    cfg: &pendulum_config::Config,
    cli_override: Option<&Path>,
) -> eyre::Result<JsonlHistory> {
    let path = cli_override.or(cfg.history.file.as_deref().map(Path::new));
    match path {
        Some(p) => JsonlHistory::open(p),
        None => Ok(JsonlHistory::stdout()),
    }
}

/// Wait until nothing is pending, `limit` passes, or shutdown is requested.
fn drain(service: &SortingService, limit: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + limit;
    while service.stats().pending > 0
        && Instant::now() < deadline
        && !shutdown.load(Ordering::Relaxed)
    {
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// `run`: live controller, packages from stdin until EOF or ctrl-c.
pub fn run_live(
    cfg: &pendulum_config::Config,
    history_override: Option<&Path>,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<()> {
    let history = Arc::new(open_history(cfg, history_override)?);
    let (tx, rx) = xch::unbounded();
    let link = Arc::new(TcpDeviceLink::new(
        cfg.device.name.clone(),
        &cfg.device.host,
        cfg.device.port,
        tx,
    ));
    let service = build_service(cfg, link, rx, history.clone())?;
    service.start()?;

    // Stdin is blocking; read it on its own thread and hand lines over.
    let (line_tx, line_rx) = xch::unbounded::<String>();
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(l) => {
                        if line_tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
        })
        .wrap_err("spawn stdin reader")?;

    let mut eof = false;
    while !shutdown.load(Ordering::Relaxed) {
        match line_rx.recv_timeout(POLL) {
            Ok(line) => handle_line(&service, &line)?,
            Err(xch::RecvTimeoutError::Timeout) => {}
            Err(xch::RecvTimeoutError::Disconnected) => {
                eof = true;
                break;
            }
        }
    }
    if eof {
        let limit = Duration::from_millis(cfg.sorting.effective_pending_timeout_ms())
            + Duration::from_secs(1);
        tracing::info!("input closed; waiting for pending packages");
        drain(&service, limit, &shutdown);
    }
    let stats = service.stats();
    service.stop()?;
    tracing::info!(
        packages = history.total(),
        diverted = history.diverted(),
        errors = history.errors(),
        median_trigger_delay_ms = stats.median_trigger_delay_ms,
        "run finished"
    );
    Ok(())
}

fn handle_line(service: &SortingService, line: &str) -> eyre::Result<()> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    let parsed: PackageLine = match serde_json::from_str(trimmed) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, line = trimmed, "skipping malformed package line");
            return Ok(());
        }
    };
    let index = parsed.index;
    match service.process_package(parsed.into_package(Instant::now()))? {
        Admission::Pending => tracing::debug!(index, "package pending"),
        Admission::Rejected(e) => tracing::debug!(index, error = %e, "package rejected"),
    }
    Ok(())
}

/// Outcome summary of a simulation run.
#[derive(Debug, Clone, Copy)]
pub struct SimSummary {
    pub packages: u64,
    pub diverted: usize,
    pub errors: usize,
    pub frames_sent: usize,
    pub stats: ServiceStats,
}

// xorshift64*; enough to vary chutes and weights reproducibly
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SimEvent {
    Trigger,
    Identify(u64),
    Sorting,
}

/// `simulate`: the full engine against `SimulatedLink`.
///
/// Package `i` fires the trigger sensor at `i * interval`, is identified at the
/// midpoint of the trigger window, and reaches the sorting sensor at the
/// midpoint of the sorting window.
pub fn run_simulation(
    cfg: &pendulum_config::Config,
    packages: u64,
    interval_ms: u64,
    seed: u64,
    shutdown: &AtomicBool,
) -> eyre::Result<SimSummary> {
    let history = Arc::new(match cfg.history.file.as_deref() {
        Some(p) => JsonlHistory::open(Path::new(p))?,
        None => JsonlHistory::counting(),
    });
    let (tx, rx) = xch::unbounded();
    let link = Arc::new(SimulatedLink::new(cfg.device.name.clone(), tx));
    let service = build_service(cfg, link.clone(), rx, history.clone())?;
    service.start()?;
    link.clear_sent();

    let trigger = DelayWindow::from(&cfg.trigger);
    let sorting = SortingCfg::from(&cfg.sorting);
    let mut rng = Rng(seed.max(1));
    let mut chutes = Vec::with_capacity(packages as usize);
    let mut weights = Vec::with_capacity(packages as usize);
    let mut schedule: Vec<(u64, SimEvent)> = Vec::with_capacity(packages as usize * 3);
    for i in 0..packages {
        chutes.push((rng.next() % 5) as i32);
        weights.push((rng.next() % 5000) as f32 / 100.0);
        let t = i * interval_ms;
        schedule.push((t, SimEvent::Trigger));
        schedule.push((t + trigger.midpoint_ms(), SimEvent::Identify(i)));
        schedule.push((t + sorting.window.midpoint_ms(), SimEvent::Sorting));
    }
    schedule.sort_unstable();

    let t0 = Instant::now();
    for (at, ev) in schedule {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let target = t0 + Duration::from_millis(at);
        let now = Instant::now();
        if target > now {
            std::thread::sleep(target - now);
        }
        match ev {
            SimEvent::Trigger => {
                link.trigger();
            }
            SimEvent::Sorting => {
                link.sorting();
            }
            SimEvent::Identify(i) => {
                let idx = i as usize;
                let p = Package::new(i + 1, format!("SIM{:06}", i + 1), chutes[idx], Instant::now())
                    .with_weight(weights[idx]);
                service.process_package(p)?;
            }
        }
    }

    let limit = Duration::from_millis(sorting.pending_timeout_ms) + Duration::from_secs(1);
    drain(&service, limit, shutdown);
    let stats = service.stats();
    let frames_sent = link.sent_frames().len();
    service.stop()?;

    Ok(SimSummary {
        packages,
        diverted: history.diverted(),
        errors: history.errors(),
        frames_sent,
        stats,
    })
}

/// `self-check`: one bounded connect/disconnect against the configured controller.
pub fn self_check(cfg: &pendulum_config::Config) -> eyre::Result<String> {
    // Frames read during the check are discarded.
    let (tx, _rx) = xch::unbounded();
    let link = TcpDeviceLink::new(cfg.device.name.clone(), &cfg.device.host, cfg.device.port, tx);
    let timeout = Duration::from_millis(cfg.device.connect_timeout_ms);
    link.connect(timeout).map_err(|e| {
        eyre::Report::new(pendulum_core::hw_error::map_link_error(e.as_ref()))
    })?;
    link.disconnect();
    Ok(format!(
        "self-check ok: controller {} reachable at {}",
        cfg.device.name,
        link.addr()
    ))
}
