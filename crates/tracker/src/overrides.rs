//! 테스트 오버라이드 (`_hct_ut` 저장값, `hct_ut[key]=value` 쿼리)
//!
//! 스테이징/테스트 페이지에서 수집 서버, 트래킹 코드 등을 바꿀 때 사용합니다.
//! 허용된 키만 적용되며, 나머지는 경고 후 무시됩니다.

use std::collections::BTreeMap;

use hct_core::config::{decode_app_token, decode_cookie_list};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::TrackerSettings;
use crate::query::QueryParams;

/// 저장되는 오버라이드 맵
pub type OverrideMap = BTreeMap<String, Value>;

/// 오버라이드 가능한 키
pub const OVERRIDE_KEYS: &[&str] = &[
    "app_token",
    "tracking_code",
    "cookie_expiration",
    "session_expiration",
    "cookies",
    "with_consent",
];

/// 저장된 맵과 쿼리 오버라이드를 합칩니다. 쿼리 값이 우선합니다.
///
/// 둘 다 없으면 `None`입니다.
pub fn collect(stored: Option<OverrideMap>, query: &QueryParams) -> Option<OverrideMap> {
    let from_query = query.test_overrides();
    if stored.is_none() && from_query.is_empty() {
        return None;
    }
    let mut merged = stored.unwrap_or_default();
    for (key, value) in from_query {
        merged.insert(key, Value::String(value));
    }
    Some(merged)
}

/// 오버라이드를 설정에 적용합니다. 적용된 키 수를 반환합니다.
pub fn apply(settings: &mut TrackerSettings, overrides: &OverrideMap) -> usize {
    let mut applied = 0;
    for (key, value) in overrides {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        match apply_one(settings, key, &text) {
            Ok(true) => {
                applied += 1;
                info!(key = %key, "test override applied");
            }
            Ok(false) => warn!(key = %key, "unknown test override ignored"),
            Err(reason) => warn!(key = %key, value = %text, reason = %reason, "invalid test override ignored"),
        }
    }
    applied
}

/// 키 하나를 적용합니다. 알 수 없는 키면 `Ok(false)`.
fn apply_one(settings: &mut TrackerSettings, key: &str, value: &str) -> Result<bool, String> {
    match key {
        "app_token" => {
            settings.app_url = decode_app_token(value).map_err(|e| e.to_string())?;
        }
        "tracking_code" => {
            let code = value.trim();
            settings.code = (!code.is_empty()).then(|| code.to_owned());
        }
        "cookie_expiration" => settings.cookie_expiration_days = parse_positive(value)?,
        "session_expiration" => settings.session_expiration_minutes = parse_positive(value)?,
        "cookies" => settings.external_cookies = decode_cookie_list(value),
        "with_consent" => settings.with_consent = parse_flag(value)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse_positive(value: &str) -> Result<u32, String> {
    match value.trim().parse::<u32>() {
        Ok(0) => Err("must be greater than 0".to_owned()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(format!("'{other}' is not a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hct_core::config::TrackerOptions;
    use serde_json::json;

    fn settings() -> TrackerSettings {
        TrackerSettings::resolve(Some("CODE"), &TrackerOptions::default()).unwrap()
    }

    #[test]
    fn nothing_to_collect() {
        assert_eq!(collect(None, &QueryParams::parse("a=1")), None);
    }

    #[test]
    fn query_overrides_win_over_stored() {
        let stored = OverrideMap::from([
            ("tracking_code".to_owned(), json!("OLD")),
            ("cookies".to_owned(), json!("X2dhLF9mYnA=")),
        ]);
        let query = QueryParams::parse("hct_ut[tracking_code]=NEW");
        let merged = collect(Some(stored), &query).unwrap();
        assert_eq!(merged["tracking_code"], "NEW");
        assert_eq!(merged["cookies"], "X2dhLF9mYnA=");
    }

    #[test]
    fn applies_known_keys() {
        let mut settings = settings();
        let overrides = OverrideMap::from([
            // base64("https://collect.example")
            ("app_token".to_owned(), json!("aHR0cHM6Ly9jb2xsZWN0LmV4YW1wbGU=")),
            ("tracking_code".to_owned(), json!("T2")),
            ("cookie_expiration".to_owned(), json!("7")),
            ("session_expiration".to_owned(), json!(5)),
            ("cookies".to_owned(), json!("X2dhLF9mYnA=")),
            ("with_consent".to_owned(), json!("false")),
        ]);
        assert_eq!(apply(&mut settings, &overrides), 6);
        assert_eq!(settings.app_url, "https://collect.example");
        assert_eq!(settings.code.as_deref(), Some("T2"));
        assert_eq!(settings.cookie_expiration_days, 7);
        assert_eq!(settings.session_expiration_minutes, 5);
        assert_eq!(settings.external_cookies, vec!["_ga", "_fbp"]);
        assert!(!settings.with_consent);
    }

    #[test]
    fn unknown_and_invalid_keys_are_ignored() {
        let mut settings = settings();
        let before = settings.clone();
        let overrides = OverrideMap::from([
            ("window.location".to_owned(), json!("x")),
            ("cookie_expiration".to_owned(), json!("0")),
            ("app_token".to_owned(), json!("not base64")),
            ("with_consent".to_owned(), json!("maybe")),
        ]);
        assert_eq!(apply(&mut settings, &overrides), 0);
        assert_eq!(settings, before);
    }
}
