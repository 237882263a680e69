//! 인코딩 유틸리티
//!
//! - `encodeURIComponent` / `encodeURI`와 같은 퍼센트 인코딩
//! - 저장 값 인코딩 (JSON → base64, 원시 JSON 허용)
//! - 중첩 쿼리 문자열 직렬화 (`scr_resolution[screen_width]=..`, `hct_p[0]=..`)
//! - 요청 본문 인코딩 (`q=` + encodeURIComponent(base64(encodeURI(쿼리 문자열))))

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hct_core::error::CodecError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

/// `encodeURIComponent`가 인코딩하지 않는 문자를 제외한 집합
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// `encodeURI`는 예약 문자도 그대로 둠
const URI: &AsciiSet = &URI_COMPONENT
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'#');

/// 요청 본문 필드 이름
const BODY_FIELD: &str = "q=";

/// `encodeURIComponent`와 같은 결과를 냅니다.
pub fn encode_uri_component(input: &str) -> String {
    utf8_percent_encode(input, URI_COMPONENT).to_string()
}

/// `encodeURI`와 같은 결과를 냅니다.
pub fn encode_uri(input: &str) -> String {
    utf8_percent_encode(input, URI).to_string()
}

/// 퍼센트 인코딩을 해제합니다. 잘못된 UTF-8은 대체 문자로 바뀝니다.
pub fn decode_uri_component(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// 문자열을 표준 base64로 인코딩합니다.
pub fn encode_base64(input: &str) -> String {
    STANDARD.encode(input)
}

/// 표준 base64를 UTF-8 문자열로 디코딩합니다.
pub fn decode_base64(input: &str) -> Result<String, CodecError> {
    let bytes = STANDARD
        .decode(input.trim())
        .map_err(|e| CodecError::Base64(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CodecError::Utf8(e.to_string()))
}

/// 값을 저장 형식(JSON의 base64)으로 인코딩합니다.
pub fn encode_stored<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_string(value).map_err(|e| CodecError::Json(e.to_string()))?;
    Ok(encode_base64(&json))
}

/// 저장 형식을 디코딩합니다.
///
/// `{`로 시작하는 값은 원시 JSON으로, 그 외에는 base64로 인코딩된 JSON으로 읽습니다.
pub fn decode_stored<T: DeserializeOwned>(raw: &str) -> Result<T, CodecError> {
    let trimmed = raw.trim();
    let json = if trimmed.starts_with('{') {
        trimmed.to_owned()
    } else {
        decode_base64(trimmed)?
    };
    serde_json::from_str(&json).map_err(|e| CodecError::Json(e.to_string()))
}

/// 페이로드를 중첩 쿼리 문자열로 직렬화합니다.
///
/// 키는 `encodeURIComponent`로 인코딩되고, 중첩 키는 대괄호로 감쌉니다.
/// 배열은 인덱스를 키로 사용합니다. `null` 값과 빈 컨테이너는 생략됩니다.
pub fn to_query_string(payload: &Map<String, Value>) -> String {
    let mut pairs = Vec::new();
    for (key, value) in payload {
        push_pairs(&encode_uri_component(key), value, &mut pairs);
    }
    pairs.join("&")
}

fn push_pairs(prefix: &str, value: &Value, pairs: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::Object(object) => {
            for (key, nested) in object {
                let nested_prefix = format!("{prefix}[{}]", encode_uri_component(key));
                push_pairs(&nested_prefix, nested, pairs);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                push_pairs(&format!("{prefix}[{index}]"), nested, pairs);
            }
        }
        Value::Bool(b) => pairs.push(format!("{prefix}={b}")),
        Value::Number(n) => pairs.push(format!("{prefix}={}", js_number(n))),
        Value::String(s) => pairs.push(format!("{prefix}={}", encode_uri_component(s))),
    }
}

/// 숫자를 JS `String(number)`와 같은 형식으로 만듭니다 (`2.0` → `2`).
pub fn js_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{}", f as i128),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// 값을 JS `JSON.stringify`와 같은 형식으로 직렬화합니다 (`{"a":1.0}` → `{"a":1}`).
pub fn js_stringify(value: &Value) -> String {
    match value {
        Value::Number(n) => js_number(n),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(js_stringify).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("{}:{}", Value::from(key.as_str()), js_stringify(value)))
                .collect();
            format!("{{{}}}", entries.join(","))
        }
        other => other.to_string(),
    }
}

/// 쿼리 문자열을 요청 본문으로 인코딩합니다.
pub fn encode_body(query: &str) -> String {
    let encoded = encode_base64(&encode_uri(query));
    format!("{BODY_FIELD}{}", encode_uri_component(&encoded))
}

/// 요청 본문을 쿼리 문자열로 되돌립니다.
pub fn decode_body(body: &str) -> Result<String, CodecError> {
    let encoded = body
        .strip_prefix(BODY_FIELD)
        .ok_or_else(|| CodecError::Json(format!("body does not start with '{BODY_FIELD}'")))?;
    let base64 = percent_decode_str(encoded)
        .decode_utf8()
        .map_err(|e| CodecError::Utf8(e.to_string()))?;
    let uri = decode_base64(&base64)?;
    percent_decode_str(&uri)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| CodecError::Utf8(e.to_string()))
}
