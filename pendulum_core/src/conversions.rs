//! Conversions from `pendulum_config` (TOML schema) to the engine's runtime configs.

use eyre::WrapErr;

use crate::config::{CommandSet, DelayWindow, LinkCfg, RuntimeCfg, SortingCfg};

// ── Windows and delays ───────────────────────────────────────────────────────

impl From<&pendulum_config::TriggerCfg> for DelayWindow {
    fn from(c: &pendulum_config::TriggerCfg) -> Self {
        Self::new(c.lower_ms, c.upper_ms)
    }
}

impl From<&pendulum_config::SortingCfg> for SortingCfg {
    fn from(c: &pendulum_config::SortingCfg) -> Self {
        Self {
            window: DelayWindow::new(c.lower_ms, c.upper_ms),
            sorting_delay_ms: c.sorting_delay_ms,
            reset_delay_ms: c.reset_delay_ms,
            pending_timeout_ms: c.effective_pending_timeout_ms(),
        }
    }
}

// ── Link and runtime ─────────────────────────────────────────────────────────

impl From<&pendulum_config::DeviceCfg> for LinkCfg {
    fn from(c: &pendulum_config::DeviceCfg) -> Self {
        Self {
            connect_timeout_ms: c.connect_timeout_ms,
            reconnect_interval_ms: c.reconnect_interval_ms,
        }
    }
}

impl From<&pendulum_config::RuntimeCfg> for RuntimeCfg {
    fn from(c: &pendulum_config::RuntimeCfg) -> Self {
        Self {
            max_in_flight: c.max_in_flight,
            sweep_interval_ms: c.sweep_interval_ms,
            history_capacity: c.history_capacity,
        }
    }
}

// ── Command frames ───────────────────────────────────────────────────────────

impl TryFrom<&pendulum_config::Commands> for CommandSet {
    type Error = eyre::Report;

    fn try_from(c: &pendulum_config::Commands) -> Result<Self, Self::Error> {
        let parse = |name: &str, hex: &str| {
            pendulum_config::parse_hex(hex).wrap_err_with(|| format!("commands.{name}"))
        };
        Ok(Self {
            start: parse("start", &c.start)?,
            stop: parse("stop", &c.stop)?,
            swing_left: parse("swing_left", &c.swing_left)?,
            reset_left: parse("reset_left", &c.reset_left)?,
            swing_right: parse("swing_right", &c.swing_right)?,
            reset_right: parse("reset_right", &c.reset_right)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_command_strings_match_default_frames() {
        let cfg = pendulum_config::Commands::default();
        let set = CommandSet::try_from(&cfg).unwrap();
        assert_eq!(set, CommandSet::default());
    }

    #[test]
    fn pending_timeout_defaults_to_sorting_upper() {
        let c = pendulum_config::SortingCfg {
            lower_ms: 1000,
            upper_ms: 3500,
            sorting_delay_ms: 50,
            reset_delay_ms: 400,
            pending_timeout_ms: None,
        };
        let s = SortingCfg::from(&c);
        assert_eq!(s.pending_timeout_ms, 3500);
        assert_eq!(s.window, DelayWindow::new(1000, 3500));
    }

    #[test]
    fn bad_hex_names_the_command() {
        let cfg = pendulum_config::Commands {
            reset_right: "zz".into(),
            ..Default::default()
        };
        let err = CommandSet::try_from(&cfg).unwrap_err();
        assert!(format!("{err:#}").contains("commands.reset_right"));
    }
}
