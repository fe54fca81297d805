#![no_main]

use libfuzzer_sys::fuzz_target;
use veil_core::LockConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Anything that parses must also pass validation.
        if let Ok(config) = LockConfig::from_toml(text) {
            assert!(config.validate().is_ok());
            assert!(!config.sentinel.is_empty());
            assert!(config.grab_attempts >= 1);
        }
    }
});
