#![no_main]

use hct_tracker::CookieJar;
use hct_tracker::cookie::{parse_cookie_header, parse_set_cookie};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = std::str::from_utf8(data) {
        if let Ok(parsed) = parse_set_cookie(header) {
            let _ = parsed.expires_at(0);
        }
        let _ = parse_cookie_header(header);

        let jar = CookieJar::new();
        if jar.set_cookie(header, 0).is_ok() {
            let _ = jar.document_cookie(0);
        }
    }
});
