#![no_main]

use libfuzzer_sys::fuzz_target;
use veil_core::account::shadow_hash;

fuzz_target!(|data: (&str, &str)| {
    let (contents, name) = data;
    if let Some(secret) = shadow_hash(contents, name) {
        // The hash is one field of one line.
        assert!(!secret.as_str().contains(':'));
        assert!(!secret.as_str().contains('\n'));
    }
});
