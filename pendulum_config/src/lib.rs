#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the pendulum sorting controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Command frames are written as hex strings and decoded with `parse_hex`.
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceCfg {
    /// Name used in connection status notifications
    #[serde(default = "default_device_name")]
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Bounded timeout for each connect attempt (ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Pause between failed reconnect attempts (ms)
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

fn default_device_name() -> String {
    "pendulum".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_reconnect_interval_ms() -> u64 {
    2000
}

/// Trigger→identification correlation window.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TriggerCfg {
    pub lower_ms: u64,
    pub upper_ms: u64,
}

/// Trigger→sorting-sensor window plus per-station actuation delays.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SortingCfg {
    pub lower_ms: u64,
    pub upper_ms: u64,
    /// Wait after the sorting signal before swinging (ms)
    #[serde(default)]
    pub sorting_delay_ms: u64,
    /// Wait after the swing before deciding on a reset (ms)
    #[serde(default)]
    pub reset_delay_ms: u64,
    /// Pending-registry timeout; defaults to `upper_ms` when absent
    #[serde(default)]
    pub pending_timeout_ms: Option<u64>,
}

impl SortingCfg {
    pub fn effective_pending_timeout_ms(&self) -> u64 {
        self.pending_timeout_ms.unwrap_or(self.upper_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct RuntimeCfg {
    /// Actuation worker pool size (packages in flight at once)
    pub max_in_flight: usize,
    /// Pending-registry eviction sweep period (ms)
    pub sweep_interval_ms: u64,
    /// Length of each rolling delay history
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

/// Raw command frames as hex strings; whitespace is ignored.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Commands {
    pub start: String,
    pub stop: String,
    pub swing_left: String,
    pub reset_left: String,
    pub swing_right: String,
    pub reset_right: String,
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            start: "FE 05 00 02 FF 00 39 F5".to_string(),
            stop: "FE 05 00 02 00 00 78 05".to_string(),
            swing_left: "FE 05 00 00 FF 00 98 35".to_string(),
            reset_left: "FE 05 00 00 00 00 D9 C5".to_string(),
            swing_right: "FE 05 00 01 FF 00 C9 F5".to_string(),
            reset_right: "FE 05 00 01 00 00 88 05".to_string(),
        }
    }
}

impl Commands {
    fn named(&self) -> [(&'static str, &str); 6] {
        [
            ("start", &self.start),
            ("stop", &self.stop),
            ("swing_left", &self.swing_left),
            ("reset_left", &self.reset_left),
            ("swing_right", &self.swing_right),
            ("reset_right", &self.reset_right),
        ]
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct HistoryCfg {
    /// JSONL package-history file; stdout when absent
    pub file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub device: DeviceCfg,
    pub trigger: TriggerCfg,
    pub sorting: SortingCfg,
    #[serde(default)]
    pub runtime: RuntimeCfg,
    #[serde(default)]
    pub commands: Commands,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub history: HistoryCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("invalid configuration {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Decode a hex command string such as `"FE 05 00 00 FF 00 98 35"`.
///
/// Whitespace, `:` and `-` separators are ignored; an optional `0x` prefix is accepted.
pub fn parse_hex(s: &str) -> eyre::Result<Vec<u8>> {
    let trimmed = s.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = body
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    if digits.is_empty() {
        eyre::bail!("command frame is empty");
    }
    hex::decode(&digits).map_err(|e| eyre::eyre!("invalid hex frame {:?}: {}", s, e))
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Device
        if self.device.name.trim().is_empty() {
            eyre::bail!("device.name must not be empty");
        }
        if self.device.host.trim().is_empty() {
            eyre::bail!("device.host must not be empty");
        }
        if self.device.port == 0 {
            eyre::bail!("device.port must be > 0");
        }
        if self.device.connect_timeout_ms == 0 {
            eyre::bail!("device.connect_timeout_ms must be >= 1");
        }
        if self.device.reconnect_interval_ms == 0 {
            eyre::bail!("device.reconnect_interval_ms must be >= 1");
        }

        // Windows
        if self.trigger.lower_ms > self.trigger.upper_ms {
            eyre::bail!("trigger.lower_ms must be <= trigger.upper_ms");
        }
        if self.sorting.lower_ms > self.sorting.upper_ms {
            eyre::bail!("sorting.lower_ms must be <= sorting.upper_ms");
        }
        if self.sorting.upper_ms > 10 * 60 * 1000 {
            eyre::bail!("sorting.upper_ms is unreasonably large (>10min)");
        }
        if self.sorting.effective_pending_timeout_ms() == 0 {
            eyre::bail!("sorting.pending_timeout_ms must be >= 1");
        }

        // Runtime
        if self.runtime.max_in_flight == 0 {
            eyre::bail!("runtime.max_in_flight must be >= 1");
        }
        if self.runtime.sweep_interval_ms == 0 {
            eyre::bail!("runtime.sweep_interval_ms must be >= 1");
        }
        if self.runtime.history_capacity == 0 {
            eyre::bail!("runtime.history_capacity must be >= 1");
        }

        // Commands
        for (name, frame) in self.commands.named() {
            parse_hex(frame).map_err(|e| eyre::eyre!("commands.{name}: {e}"))?;
        }

        // Logging: only known rotation policies
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
