#![no_main]

use arbitrary::Arbitrary;
use hct_core::types::PersistedState;
use hct_tracker::codec::{decode_stored, encode_stored};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    anonym: Option<bool>,
    consent_at: Option<i64>,
    token: Option<String>,
    session_token: Option<String>,
    associate: Option<String>,
}

fuzz_target!(|input: Input| {
    let state = PersistedState {
        anonym: input.anonym,
        consent_at: input.consent_at,
        token: input.token,
        session_token: input.session_token,
        associate: input.associate,
        ..Default::default()
    };
    let encoded = encode_stored(&state).expect("state always encodes");
    let decoded: PersistedState = decode_stored(&encoded).expect("encoded state must decode");
    assert_eq!(decoded, state);
});
