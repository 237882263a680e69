#![no_main]

use hct_core::types::PersistedState;
use hct_tracker::codec::decode_stored;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        // 손상된 저장값은 에러여야 하며 패닉하면 안 됨
        let _ = decode_stored::<PersistedState>(raw);
        let _ = decode_stored::<serde_json::Value>(raw);
    }
});
