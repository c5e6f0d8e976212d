//! Human-readable error descriptions, exit codes and structured JSON error formatting.

use pendulum_core::error::{BuildError, SorterError};

/// Exit code for a connect timeout against the controller.
pub const EXIT_CONNECT_TIMEOUT: i32 = 3;
/// Exit code for any other link failure.
pub const EXIT_LINK: i32 = 4;
/// Exit code for configuration problems.
pub const EXIT_CONFIG: i32 = 5;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingLink => {
                "What happened: No controller link was provided to the sorting service.\nLikely causes: The link failed to initialize or was not wired into the builder.\nHow to fix: Pass the link via with_link(...).".to_string()
            }
            BuildError::MissingEvents => {
                "What happened: The link's event receiver was not provided.\nLikely causes: The channel pairing the link and the service was not set up.\nHow to fix: Pass the receiver via with_events(...).".to_string()
            }
            BuildError::MissingHistory => {
                "What happened: No package history sink was provided.\nLikely causes: The history output could not be opened.\nHow to fix: Check [history] file in the config.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<SorterError>() {
        return match se {
            SorterError::Timeout => "What happened: Connecting to the controller timed out.\nLikely causes: Wrong [device] host/port, controller powered off, or network unreachable.\nHow to fix: Verify the address and cabling, or raise device.connect_timeout_ms.".to_string(),
            SorterError::NotConnected => "What happened: The controller link is not connected.\nLikely causes: The connection dropped and has not been re-established.\nHow to fix: Check the controller and network; the service reconnects automatically.".to_string(),
            SorterError::Link(msg) | SorterError::LinkFault(msg) => format!(
                "What happened: Controller link failure ({msg}).\nLikely causes: Connection refused or reset by the controller.\nHow to fix: Verify [device] host/port and that the controller accepts connections."
            ),
            SorterError::Config(msg) => format!(
                "What happened: Configuration is invalid or unreadable.\nLikely causes: {msg}\nHow to fix: Edit the TOML config and try again."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes by failure class; anything unclassified returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return EXIT_CONFIG;
    }
    match err.downcast_ref::<SorterError>() {
        Some(SorterError::Timeout) => EXIT_CONNECT_TIMEOUT,
        Some(SorterError::Link(_) | SorterError::LinkFault(_) | SorterError::NotConnected) => {
            EXIT_LINK
        }
        Some(SorterError::Config(_)) => EXIT_CONFIG,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "ConfigError";
    }
    match err.downcast_ref::<SorterError>() {
        Some(SorterError::Timeout) => "ConnectTimeout",
        Some(SorterError::Link(_) | SorterError::LinkFault(_) | SorterError::NotConnected) => {
            "LinkError"
        }
        Some(SorterError::Config(_)) => "ConfigError",
        Some(SorterError::State(_)) => "StateError",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_map_to_stable_codes() {
        let e = eyre::Report::new(SorterError::Timeout);
        assert_eq!(exit_code_for_error(&e), EXIT_CONNECT_TIMEOUT);
        let e = eyre::Report::new(SorterError::Link("refused".into()));
        assert_eq!(exit_code_for_error(&e), EXIT_LINK);
        let e = eyre::Report::new(BuildError::InvalidConfig("x"));
        assert_eq!(exit_code_for_error(&e), EXIT_CONFIG);
        assert_eq!(exit_code_for_error(&eyre::eyre!("boom")), 1);
    }

    #[test]
    fn json_error_names_the_reason() {
        let e = eyre::Report::new(SorterError::Config("bad port".into()));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&e)).unwrap();
        assert_eq!(v["reason"], "ConfigError");
        assert_eq!(v["exit_code"], EXIT_CONFIG);
        assert!(v["message"].as_str().unwrap().contains("bad port"));
    }
}
