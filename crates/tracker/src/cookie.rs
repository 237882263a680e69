//! 쿠키 직렬화/파싱과 호스트 페이지 쿠키 저장소
//!
//! [`serialize_cookie`]는 RFC 6265 문법으로 이름, 값, 도메인, 경로를 검증한 뒤
//! `Set-Cookie` 형식 문자열을 만듭니다. [`CookieJar`]는 `document.cookie`에 해당하는
//! 공유 저장소로, 스토리지 폴백과 외부 쿠키 수집에 함께 쓰입니다.
//!
//! 저장소는 쿠키를 이름으로만 구분합니다 (도메인/경로별 중복 없음).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use hct_core::error::CodecError;
use hct_core::types::parse_int_prefix;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// RFC 6265 4.1.1 cookie-name
static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\x21-\x3A\x3C\x3E-\x7E]+$").expect("cookie name regex is valid")
});

/// RFC 6265 4.1.1 cookie-value
static VALUE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\x21-\x3A\x3C-\x7E]*$").expect("cookie value regex is valid")
});

/// RFC 6265 4.1.1 domain-value
static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^([.]?[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)([.][a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)*$",
    )
    .expect("cookie domain regex is valid")
});

/// RFC 6265 4.1.1 path-value
static PATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\x20-\x3A\x3D-\x7E]*$").expect("cookie path regex is valid")
});

/// `Expires` 속성 날짜 형식 (`Date.toUTCString()`)
const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// SameSite 속성
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "Strict"),
            Self::Lax => write!(f, "Lax"),
            Self::None => write!(f, "None"),
        }
    }
}

/// 쿠키 속성
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    /// 도메인 (없으면 현재 호스트)
    pub domain: Option<String>,
    /// 경로
    pub path: String,
    /// 만료 시각 (`max_age`가 있으면 무시됨)
    pub expires: Option<DateTime<Utc>>,
    /// 만료까지 남은 초 (0 이하이면 즉시 만료)
    pub max_age: Option<i64>,
    /// HttpOnly
    pub http_only: bool,
    /// Secure (`SameSite=None`이면 강제)
    pub secure: bool,
    /// SameSite
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            domain: None,
            path: "/".to_owned(),
            expires: None,
            max_age: None,
            http_only: false,
            secure: false,
            same_site: SameSite::Lax,
        }
    }
}

fn invalid(field: &str, value: &str) -> CodecError {
    CodecError::InvalidCookie {
        field: field.to_owned(),
        reason: format!("'{value}' does not match RFC 6265"),
    }
}

/// 쿠키 이름을 검증합니다.
pub fn validate_name(name: &str) -> Result<(), CodecError> {
    NAME_REGEX
        .is_match(name)
        .then_some(())
        .ok_or_else(|| invalid("name", name))
}

/// 쿠키 값을 검증합니다.
pub fn validate_value(value: &str) -> Result<(), CodecError> {
    VALUE_REGEX
        .is_match(value)
        .then_some(())
        .ok_or_else(|| invalid("value", value))
}

/// 쿠키 도메인을 검증합니다.
pub fn validate_domain(domain: &str) -> Result<(), CodecError> {
    DOMAIN_REGEX
        .is_match(domain)
        .then_some(())
        .ok_or_else(|| invalid("domain", domain))
}

/// 쿠키 경로를 검증합니다.
pub fn validate_path(path: &str) -> Result<(), CodecError> {
    PATH_REGEX
        .is_match(path)
        .then_some(())
        .ok_or_else(|| invalid("path", path))
}

/// 쿠키를 `Set-Cookie` 형식 문자열로 직렬화합니다.
pub fn serialize_cookie(
    name: &str,
    value: &str,
    options: &CookieOptions,
) -> Result<String, CodecError> {
    validate_name(name)?;
    validate_value(value)?;

    let mut parts = vec![format!("{name}={value}")];

    if let Some(domain) = &options.domain {
        validate_domain(domain)?;
        parts.push(format!("Domain={domain}"));
    }

    validate_path(&options.path)?;
    parts.push(format!("Path={}", options.path));

    match (options.max_age, options.expires) {
        (Some(max_age), _) => parts.push(format!("Max-Age={max_age}")),
        (None, Some(expires)) => parts.push(format!("Expires={}", expires.format(EXPIRES_FORMAT))),
        (None, None) => {}
    }

    if options.http_only {
        parts.push("HttpOnly".to_owned());
    }
    if options.secure || options.same_site == SameSite::None {
        parts.push("Secure".to_owned());
    }
    parts.push(format!("SameSite={}", options.same_site));

    Ok(parts.join("; "))
}

/// 파싱된 `Set-Cookie` 문자열
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub options: CookieOptions,
}

impl SetCookie {
    /// 절대 만료 시각 (epoch 밀리초). `Max-Age`가 `Expires`보다 우선합니다.
    pub fn expires_at(&self, now_millis: i64) -> Option<i64> {
        match (self.options.max_age, self.options.expires) {
            (Some(max_age), _) => Some(now_millis.saturating_add(max_age.saturating_mul(1000))),
            (None, Some(expires)) => Some(expires.timestamp_millis()),
            (None, None) => None,
        }
    }
}

/// `Set-Cookie` 형식 문자열을 파싱합니다.
///
/// 첫 번째 `이름=값` 쌍이 쿠키이고, 나머지는 속성입니다. 해석할 수 없는 속성 값은 무시합니다.
pub fn parse_set_cookie(input: &str) -> Result<SetCookie, CodecError> {
    let mut parts = input.split(';').map(str::trim).filter(|p| !p.is_empty());

    let (name, value) = parts
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(n, v)| (n.trim(), v.trim()))
        .ok_or_else(|| CodecError::InvalidCookie {
            field: "name".to_owned(),
            reason: format!("missing name=value pair in '{input}'"),
        })?;
    validate_name(name)?;

    let mut options = CookieOptions::default();
    for part in parts {
        let (key, value) = match part.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (part, None),
        };
        match (key.to_ascii_lowercase().as_str(), value) {
            ("domain", Some(v)) => options.domain = Some(v.to_owned()),
            ("path", Some(v)) => options.path = v.to_owned(),
            ("expires", Some(v)) => {
                options.expires = DateTime::parse_from_rfc2822(v)
                    .ok()
                    .map(|d| d.with_timezone(&Utc));
            }
            ("max-age", Some(v)) => options.max_age = parse_int_prefix(v),
            ("httponly", _) => options.http_only = true,
            ("secure", _) => options.secure = true,
            ("samesite", Some(v)) => {
                options.same_site = SameSite::parse(v).unwrap_or_default();
            }
            _ => {}
        }
    }

    Ok(SetCookie {
        name: name.to_owned(),
        value: value.to_owned(),
        options,
    })
}

/// `a=1; b=2` 형식의 Cookie 헤더를 (이름, 값) 쌍으로 나눕니다.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_owned(), value.trim().to_owned()))
        })
        .collect()
}

/// 저장소에 보관되는 쿠키
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default = "default_path")]
    pub path: String,
    /// 만료 시각 (epoch 밀리초), 없으면 세션 쿠키
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

fn default_path() -> String {
    "/".to_owned()
}

impl StoredCookie {
    fn is_live(&self, now_millis: i64) -> bool {
        self.expires_at.is_none_or(|at| at > now_millis)
    }
}

/// 호스트 페이지의 쿠키 저장소 (`document.cookie`)
///
/// 복제본은 같은 저장소를 공유합니다.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Arc<Mutex<BTreeMap<String, StoredCookie>>>,
}

impl CookieJar {
    /// 빈 저장소를 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 쿠키 목록으로 저장소를 만듭니다.
    pub fn from_cookies(cookies: impl IntoIterator<Item = StoredCookie>) -> Self {
        let jar = Self::new();
        {
            let mut map = jar.lock();
            for cookie in cookies {
                map.insert(cookie.name.clone(), cookie);
            }
        }
        jar
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, StoredCookie>> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Set-Cookie` 형식 문자열을 적용합니다 (`document.cookie = ...`).
    ///
    /// 이미 만료된 쿠키는 삭제로 처리합니다.
    pub fn set_cookie(&self, header: &str, now_millis: i64) -> Result<(), CodecError> {
        let parsed = parse_set_cookie(header)?;
        let expires_at = parsed.expires_at(now_millis);
        let mut map = self.lock();
        if expires_at.is_some_and(|at| at <= now_millis) {
            map.remove(&parsed.name);
            return Ok(());
        }
        map.insert(
            parsed.name.clone(),
            StoredCookie {
                name: parsed.name,
                value: parsed.value,
                domain: parsed.options.domain,
                path: parsed.options.path,
                expires_at,
            },
        );
        Ok(())
    }

    /// 세션 쿠키를 넣습니다.
    pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.lock().insert(
            name.clone(),
            StoredCookie {
                name,
                value: value.into(),
                domain: None,
                path: default_path(),
                expires_at: None,
            },
        );
    }

    /// 만료되지 않은 쿠키 값을 반환합니다.
    pub fn get(&self, name: &str, now_millis: i64) -> Option<String> {
        self.lock()
            .get(name)
            .filter(|c| c.is_live(now_millis))
            .map(|c| c.value.clone())
    }

    /// 쿠키를 삭제합니다.
    pub fn remove(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    /// `document.cookie` 형식 (`a=1; b=2`)
    pub fn document_cookie(&self, now_millis: i64) -> String {
        self.lock()
            .values()
            .filter(|c| c.is_live(now_millis))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// 만료되지 않은 쿠키 목록 (영속화용)
    pub fn cookies(&self, now_millis: i64) -> Vec<StoredCookie> {
        self.lock()
            .values()
            .filter(|c| c.is_live(now_millis))
            .cloned()
            .collect()
    }
}
