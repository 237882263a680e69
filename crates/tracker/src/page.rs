//! 페이지 컨텍스트 -- 호스트 페이지의 URL, 제목, 리퍼러, 화면, 내비게이터 정보
//!
//! 브라우저의 `window.location`, `document.title`, `document.referrer`,
//! `window.screen`, `window.navigator`에 해당합니다.

use std::fmt;

use hct_core::error::CodecError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query::QueryParams;

/// 파싱된 URL (`scheme://host/path?search#hash`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUrl {
    /// 원본 URL
    pub href: String,
    /// 스킴 (`https`)
    pub scheme: String,
    /// 호스트 (포트 포함)
    pub host: String,
    /// 경로 (없으면 `/`)
    pub pathname: String,
    /// `?`로 시작하는 쿼리 문자열, 없거나 비어 있으면 빈 문자열
    pub search: String,
    /// `#`로 시작하는 프래그먼트, 없으면 빈 문자열
    pub hash: String,
}

impl PageUrl {
    /// 절대 URL을 파싱합니다.
    pub fn parse(url: &str) -> Result<Self, CodecError> {
        let invalid = |reason: &str| CodecError::InvalidUrl {
            url: url.to_owned(),
            reason: reason.to_owned(),
        };
        let trimmed = url.trim();
        let (scheme, rest) = trimmed
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
            return Err(invalid("invalid scheme"));
        }

        let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let host = &rest[..authority_end];
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let rest = &rest[authority_end..];

        let (before_hash, hash) = match rest.find('#') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };
        let (path, search) = match before_hash.find('?') {
            Some(i) => (&before_hash[..i], &before_hash[i..]),
            None => (before_hash, ""),
        };

        Ok(Self {
            href: trimmed.to_owned(),
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            pathname: if path.is_empty() { "/".to_owned() } else { path.to_owned() },
            search: if search == "?" { String::new() } else { search.to_owned() },
            hash: if hash == "#" { String::new() } else { hash.to_owned() },
        })
    }

    /// `scheme://host`
    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// 포트를 뺀 호스트 이름
    pub fn hostname(&self) -> &str {
        self.host
            .rsplit_once(':')
            .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
            .map_or(self.host.as_str(), |(name, _)| name)
    }

    /// 쿼리 파라미터
    pub fn query(&self) -> QueryParams {
        QueryParams::parse(&self.search)
    }
}

impl fmt::Display for PageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.href)
    }
}

/// 화면 정보 (`scr_resolution`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<u32>,
    pub device_pixel_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_height: Option<u32>,
}

impl Default for ScreenInfo {
    fn default() -> Self {
        Self {
            screen_width: None,
            screen_height: None,
            device_pixel_ratio: 1.0,
            client_width: None,
            client_height: None,
        }
    }
}

impl ScreenInfo {
    /// 화면과 뷰포트 크기가 같은 화면 정보를 만듭니다.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            screen_width: Some(width),
            screen_height: Some(height),
            device_pixel_ratio: 1.0,
            client_width: Some(width),
            client_height: Some(height),
        }
    }

    /// 페이로드용 JSON 객체
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// 내비게이터 정보 (`/register`의 `navigator`)
///
/// 브라우저 속성 이름(camelCase)으로 직렬화됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatorInfo {
    pub user_agent: String,
    pub language: String,
    pub languages: Vec<String>,
    pub platform: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub vendor: String,
    pub cookie_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub do_not_track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_concurrency: Option<u32>,
    pub max_touch_points: u32,
    pub on_line: bool,
}

impl Default for NavigatorInfo {
    fn default() -> Self {
        Self::native()
    }
}

impl NavigatorInfo {
    /// 현재 프로세스 환경에서 내비게이터 정보를 만듭니다.
    ///
    /// 언어는 `LANG` 환경변수(`fr_FR.UTF-8` → `fr-FR`)에서 읽습니다.
    pub fn native() -> Self {
        let language = std::env::var("LANG")
            .ok()
            .and_then(|lang| {
                let tag = lang.split('.').next()?.replace('_', "-");
                (!tag.is_empty() && tag != "C" && tag != "POSIX").then_some(tag)
            })
            .unwrap_or_else(|| "en-US".to_owned());
        Self {
            user_agent: format!(
                "hct/{} ({}; {})",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS,
                std::env::consts::ARCH
            ),
            languages: vec![language.clone()],
            language,
            platform: std::env::consts::OS.to_owned(),
            vendor: String::new(),
            cookie_enabled: true,
            do_not_track: None,
            hardware_concurrency: std::thread::available_parallelism()
                .ok()
                .and_then(|n| u32::try_from(n.get()).ok()),
            max_touch_points: 0,
            on_line: true,
        }
    }

    /// 브라우저가 추적 거부를 요청했는지 확인합니다.
    pub fn requests_do_not_track(&self) -> bool {
        self.do_not_track
            .as_deref()
            .is_some_and(|dnt| matches!(dnt, "1" | "true" | "yes"))
    }

    /// 페이로드용 JSON 객체
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// 호스트 페이지 컨텍스트
#[derive(Debug, Clone, PartialEq)]
pub struct PageContext {
    /// 페이지 URL
    pub url: PageUrl,
    /// 문서 제목
    pub title: String,
    /// 리퍼러 URL
    pub referrer: String,
    /// 화면 정보
    pub screen: ScreenInfo,
    /// 내비게이터 정보
    pub navigator: NavigatorInfo,
}

impl PageContext {
    /// URL로 페이지 컨텍스트를 만듭니다.
    pub fn new(url: &str) -> Result<Self, CodecError> {
        Ok(Self {
            url: PageUrl::parse(url)?,
            title: String::new(),
            referrer: String::new(),
            screen: ScreenInfo::default(),
            navigator: NavigatorInfo::native(),
        })
    }

    /// 문서 제목을 설정합니다.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// 리퍼러를 설정합니다.
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = referrer.into();
        self
    }

    /// 화면 정보를 설정합니다.
    pub fn with_screen(mut self, screen: ScreenInfo) -> Self {
        self.screen = screen;
        self
    }

    /// 내비게이터 정보를 설정합니다.
    pub fn with_navigator(mut self, navigator: NavigatorInfo) -> Self {
        self.navigator = navigator;
        self
    }

    /// 페이지 쿼리 파라미터
    pub fn query(&self) -> QueryParams {
        self.url.query()
    }
}
