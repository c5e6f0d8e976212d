#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

mod cli;
mod error_fmt;
mod history_sink;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use pendulum_core::error::SorterError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = pendulum_config::load_file(&cli.config)
        .map_err(|e| eyre::Report::new(SorterError::Config(format!("{e:#}"))))?;

    let level = cli
        .log_level
        .clone()
        .or_else(|| cfg.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    init_tracing(cli.json, &level, &cfg.logging)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .wrap_err("install ctrl-c handler")?;
    }

    match cli.cmd {
        Commands::Run { history } => run::run_live(&cfg, history.as_deref(), shutdown),
        Commands::Simulate {
            packages,
            interval_ms,
            seed,
        } => {
            let summary = run::run_simulation(&cfg, packages, interval_ms, seed, &shutdown)?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "packages": summary.packages,
                        "diverted": summary.diverted,
                        "errors": summary.errors,
                        "frames_sent": summary.frames_sent,
                        "median_trigger_delay_ms": summary.stats.median_trigger_delay_ms,
                        "median_processing_delay_ms": summary.stats.median_processing_delay_ms,
                    })
                );
            } else {
                println!("simulated packages: {}", summary.packages);
                println!("diverted: {}", summary.diverted);
                println!("errors: {}", summary.errors);
                println!("frames sent: {}", summary.frames_sent);
                if let Some(ms) = summary.stats.median_trigger_delay_ms {
                    println!("median trigger delay: {ms} ms");
                }
                if let Some(ms) = summary.stats.median_processing_delay_ms {
                    println!("median processing delay: {ms} ms");
                }
            }
            Ok(())
        }
        Commands::SelfCheck => {
            let msg = run::self_check(&cfg)?;
            println!("{msg}");
            Ok(())
        }
    }
}

/// Console logs go to stderr (stdout carries history and summaries).
///
/// `RUST_LOG` wins over `level`. When `[logging] file` is set, JSON lines are
/// also appended there through a non-blocking rolling appender.
fn init_tracing(json: bool, level: &str, logging: &pendulum_config::Logging) -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(fmt::layer().json().with_writer(std::io::stderr).boxed());
    } else {
        layers.push(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    if let Some(file) = logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .wrap_err("initialize logging")
}
