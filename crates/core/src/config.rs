//! 설정 관리 -- hct.toml 파싱 및 런타임 설정
//!
//! [`HctConfig`]는 트래커와 CLI가 사용하는 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`HCT_TRACKER_CODE=ABC123` 형식)
//! 3. 설정 파일 (`hct.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), hct_core::error::HctError> {
//! use hct_core::config::HctConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = HctConfig::load("hct.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = HctConfig::parse("[tracker]\ncode = \"ABC123\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, HctError};

/// 기본 앱 토큰 -- base64(`https://hct.net-helium.fr`)
pub const DEFAULT_APP_TOKEN: &str = "aHR0cHM6Ly9oY3QubmV0LWhlbGl1bS5mcg==";

/// 기본 쿠키 보존 기간 (일)
pub const DEFAULT_COOKIE_EXPIRATION_DAYS: u32 = 395;

/// 기본 세션 유지 시간 (분)
pub const DEFAULT_SESSION_EXPIRATION_MINUTES: u32 = 30;

/// 기본 스토리지 키
pub const DEFAULT_STORAGE_KEY: &str = "hct";

/// 기본 테스트 오버라이드 키
pub const DEFAULT_OVERRIDES_KEY: &str = "_hct_ut";

/// HCT 통합 설정
///
/// `hct.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HctConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 트래커 설정
    #[serde(default)]
    pub tracker: TrackerSection,
    /// 스토리지 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 전송 계층 설정
    #[serde(default)]
    pub transport: TransportConfig,
}

impl HctConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, HctError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, HctError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HctError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                HctError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, HctError> {
        toml::from_str(toml_str).map_err(|e| {
            HctError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `HCT_{SECTION}_{FIELD}`
    /// 예: `HCT_TRACKER_WITH_CONSENT=false`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "HCT_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "HCT_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "HCT_GENERAL_DATA_DIR");

        // Tracker
        let options = &mut self.tracker.options;
        override_string(&mut self.tracker.code, "HCT_TRACKER_CODE");
        override_string(&mut options.token, "HCT_TRACKER_TOKEN");
        override_string(&mut options.cookies, "HCT_TRACKER_COOKIES");
        override_bool(&mut options.with_consent, "HCT_TRACKER_WITH_CONSENT");
        override_bool(
            &mut options.disable_page_view,
            "HCT_TRACKER_DISABLE_PAGE_VIEW",
        );
        override_bool(
            &mut options.enable_form_tracking,
            "HCT_TRACKER_ENABLE_FORM_TRACKING",
        );
        override_bool(&mut options.trigger_htms, "HCT_TRACKER_TRIGGER_HTMS");
        override_bool(
            &mut options.honor_do_not_track,
            "HCT_TRACKER_HONOR_DO_NOT_TRACK",
        );
        override_u32(
            &mut options.cookie_expiration,
            "HCT_TRACKER_COOKIE_EXPIRATION",
        );
        override_u32(
            &mut options.session_expiration,
            "HCT_TRACKER_SESSION_EXPIRATION",
        );

        // Storage
        override_string(&mut self.storage.key, "HCT_STORAGE_KEY");
        override_string(&mut self.storage.overrides_key, "HCT_STORAGE_OVERRIDES_KEY");
        override_string(&mut self.storage.cookie_domain, "HCT_STORAGE_COOKIE_DOMAIN");
        override_string(&mut self.storage.cookie_path, "HCT_STORAGE_COOKIE_PATH");
        override_bool(&mut self.storage.local_storage, "HCT_STORAGE_LOCAL_STORAGE");

        // Transport
        override_usize(
            &mut self.transport.channel_capacity,
            "HCT_TRANSPORT_CHANNEL_CAPACITY",
        );
        override_u64(
            &mut self.transport.request_timeout_secs,
            "HCT_TRANSPORT_REQUEST_TIMEOUT_SECS",
        );
        override_bool(&mut self.transport.dry_run, "HCT_TRANSPORT_DRY_RUN");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), HctError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.tracker.options.validate()?;

        if self.storage.key.is_empty() {
            return Err(invalid("storage.key", "must not be empty"));
        }
        if self.storage.overrides_key.is_empty() {
            return Err(invalid("storage.overrides_key", "must not be empty"));
        }
        if !self.storage.cookie_path.starts_with('/') {
            return Err(invalid("storage.cookie_path", "must start with '/'"));
        }

        if self.transport.channel_capacity == 0 {
            return Err(invalid(
                "transport.channel_capacity",
                "must be greater than 0",
            ));
        }
        if self.transport.request_timeout_secs == 0 {
            return Err(invalid(
                "transport.request_timeout_secs",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> HctError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 앱 토큰(base64로 인코딩된 수집 서버 URL)을 디코딩합니다.
///
/// 디코딩 결과는 `http://` 또는 `https://`로 시작하는 UTF-8 문자열이어야 합니다.
pub fn decode_app_token(token: &str) -> Result<String, ConfigError> {
    let invalid_token = |reason: String| ConfigError::InvalidValue {
        field: "tracker.options.token".to_owned(),
        reason,
    };
    let bytes = STANDARD
        .decode(token.trim())
        .map_err(|e| invalid_token(format!("not base64: {e}")))?;
    let url = String::from_utf8(bytes).map_err(|e| invalid_token(format!("not utf-8: {e}")))?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(invalid_token(format!("'{url}' is not an http(s) url")));
    }
    Ok(url.trim_end_matches('/').to_owned())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리 (CLI의 파일 스토리지와 쿠키 저장 위치)
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            data_dir: ".hct".to_owned(),
        }
    }
}

/// `[tracker]` 섹션 -- 트래킹 코드와 `create` 옵션
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSection {
    /// 트래킹 코드 (비어 있으면 아무것도 전송하지 않음)
    pub code: String,
    /// `create` 옵션
    pub options: TrackerOptions,
}

/// `create(code, options)`가 받는 옵션
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerOptions {
    /// 생성 시 page_view 이벤트를 보내지 않음
    pub disable_page_view: bool,
    /// 폼 제출 추적
    pub enable_form_tracking: bool,
    /// 쿼리에 어트리뷰션 키가 있으면 `/htms` 전송
    pub trigger_htms: bool,
    /// 쿠키 보존 기간 (일)
    pub cookie_expiration: u32,
    /// 세션 유지 시간 (분)
    pub session_expiration: u32,
    /// 앱 토큰 (base64로 인코딩된 수집 서버 URL)
    pub token: String,
    /// 외부 쿠키 이름 목록 (쉼표 구분 목록의 base64)
    pub cookies: String,
    /// 동의 게이트 사용 여부
    pub with_consent: bool,
    /// 브라우저의 do-not-track 설정 존중 여부
    pub honor_do_not_track: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            disable_page_view: false,
            enable_form_tracking: false,
            trigger_htms: false,
            cookie_expiration: DEFAULT_COOKIE_EXPIRATION_DAYS,
            session_expiration: DEFAULT_SESSION_EXPIRATION_MINUTES,
            token: DEFAULT_APP_TOKEN.to_owned(),
            cookies: String::new(),
            with_consent: true,
            honor_do_not_track: false,
        }
    }
}

impl TrackerOptions {
    /// 옵션 값을 검증합니다.
    pub fn validate(&self) -> Result<(), HctError> {
        if self.cookie_expiration == 0 {
            return Err(invalid(
                "tracker.options.cookie_expiration",
                "must be greater than 0",
            ));
        }
        if self.session_expiration == 0 {
            return Err(invalid(
                "tracker.options.session_expiration",
                "must be greater than 0",
            ));
        }
        decode_app_token(&self.token)?;
        if !self.cookies.is_empty() && STANDARD.decode(self.cookies.trim()).is_err() {
            return Err(invalid("tracker.options.cookies", "not base64"));
        }
        Ok(())
    }

    /// 외부 쿠키 이름 목록을 디코딩합니다. 디코딩할 수 없으면 빈 목록.
    pub fn external_cookie_names(&self) -> Vec<String> {
        decode_cookie_list(&self.cookies)
    }
}

/// base64로 인코딩된 쉼표 구분 목록을 디코딩합니다.
pub fn decode_cookie_list(encoded: &str) -> Vec<String> {
    if encoded.trim().is_empty() {
        return Vec::new();
    }
    STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .map(|list| {
            list.split(',')
                .map(|name| name.trim().to_owned())
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// 스토리지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 상태 저장 키
    pub key: String,
    /// 테스트 오버라이드 저장 키
    pub overrides_key: String,
    /// 쿠키 도메인
    pub cookie_domain: String,
    /// 쿠키 경로
    pub cookie_path: String,
    /// localStorage(파일 스토리지) 사용 여부, false면 쿠키만 사용
    pub local_storage: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_STORAGE_KEY.to_owned(),
            overrides_key: DEFAULT_OVERRIDES_KEY.to_owned(),
            cookie_domain: ".net-helium.dev".to_owned(),
            cookie_path: "/".to_owned(),
            local_storage: true,
        }
    }
}

/// 전송 계층 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// 전송 대기열 용량
    pub channel_capacity: usize,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 네트워크로 보내지 않고 기록만 함
    pub dry_run: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            request_timeout_secs: 10,
            dry_run: false,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
