#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(bytes) = pendulum_config::parse_hex(data) {
        assert!(!bytes.is_empty());
    }
});
