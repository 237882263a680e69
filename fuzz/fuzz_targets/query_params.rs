#![no_main]

use hct_core::types::ATTRIBUTION_KEYS;
use hct_tracker::QueryParams;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(search) = std::str::from_utf8(data) {
        let params = QueryParams::parse(search);
        let _ = params.contains_any(ATTRIBUTION_KEYS);
        let _ = params.test_overrides();
        for (key, value) in params.iter() {
            assert!(params.get(key).is_some(), "parsed key {key}={value} must be retrievable");
        }
    }
});
