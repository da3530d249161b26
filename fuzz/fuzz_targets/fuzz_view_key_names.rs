#![no_main]

use debtbook_runtime::{ViewKey, is_known_key};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|name: &str| {
    match name.parse::<ViewKey>() {
        Ok(key) => {
            assert!(is_known_key(name));
            assert_eq!(key.name(), name);
        }
        Err(err) => {
            assert!(!is_known_key(name));
            assert_eq!(err.0, name);
        }
    }
});
