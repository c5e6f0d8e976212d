use pendulum_config::{load_file, load_toml};
use rstest::rstest;
use std::fs;

const VALID: &str = r#"
[device]
name = "station-a"
host = "192.168.1.200"
port = 2000
connect_timeout_ms = 3000

[trigger]
lower_ms = 100
upper_ms = 1500

[sorting]
lower_ms = 1000
upper_ms = 4000
sorting_delay_ms = 50
reset_delay_ms = 400
"#;

#[test]
fn accepts_minimal_config_with_defaults() {
    let cfg = load_toml(VALID).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.runtime.max_in_flight, 8);
    assert_eq!(cfg.runtime.history_capacity, 100);
    assert_eq!(cfg.device.reconnect_interval_ms, 2000);
    assert_eq!(cfg.sorting.effective_pending_timeout_ms(), 4000);
    assert_eq!(cfg.commands.start, "FE 05 00 02 FF 00 39 F5");
}

#[test]
fn explicit_pending_timeout_wins() {
    let toml = VALID.replace("reset_delay_ms = 400", "reset_delay_ms = 400\npending_timeout_ms = 2500");
    let cfg = load_toml(&toml).expect("parse TOML");
    assert_eq!(cfg.sorting.effective_pending_timeout_ms(), 2500);
}

#[rstest]
#[case("port = 2000", "port = 0", "device.port must be > 0")]
#[case("host = \"192.168.1.200\"", "host = \" \"", "device.host must not be empty")]
#[case("connect_timeout_ms = 3000", "connect_timeout_ms = 0", "connect_timeout_ms must be >= 1")]
#[case("lower_ms = 100", "lower_ms = 2000", "trigger.lower_ms must be <= trigger.upper_ms")]
#[case("lower_ms = 1000", "lower_ms = 5000", "sorting.lower_ms must be <= sorting.upper_ms")]
fn rejects_invalid_values(#[case] from: &str, #[case] to: &str, #[case] needle: &str) {
    let toml = VALID.replacen(from, to, 1);
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "error {err} does not mention {needle}"
    );
}

#[test]
fn rejects_bad_command_hex() {
    let toml = format!("{VALID}\n[commands]\nswing_left = \"FE 05 0\"\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("odd-length hex must fail");
    assert!(format!("{err}").contains("commands.swing_left"));
}

#[test]
fn rejects_zero_worker_pool() {
    let toml = format!("{VALID}\n[runtime]\nmax_in_flight = 0\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("zero workers must fail");
    assert!(format!("{err}").contains("runtime.max_in_flight"));
}

#[test]
fn rejects_unknown_rotation() {
    let toml = format!("{VALID}\n[logging]\nrotation = \"weekly\"\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    assert!(cfg.validate().is_err());
}

#[test]
fn missing_device_section_is_a_parse_error() {
    let toml = VALID.replace("[device]", "[devices]");
    assert!(load_toml(&toml).is_err());
}

#[test]
fn load_file_reads_and_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pendulum.toml");
    fs::write(&path, VALID).unwrap();
    let cfg = load_file(&path).expect("load");
    assert_eq!(cfg.device.name, "station-a");

    let missing = dir.path().join("nope.toml");
    let err = load_file(&missing).expect_err("missing file");
    assert!(format!("{err}").contains("read config"));
}

#[test]
fn shipped_sample_config_is_valid() {
    let cfg = load_toml(include_str!("../../etc/pendulum.toml")).expect("parse sample");
    cfg.validate().expect("sample config should pass");
    assert_eq!(cfg.sorting.effective_pending_timeout_ms(), 3500);
    assert!(cfg.history.file.is_none());
}
