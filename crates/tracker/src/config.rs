//! 트래커 설정
//!
//! [`TrackerConfig`]는 core의 [`HctConfig`]에서 트래커에 필요한 부분을 모은 설정입니다.
//! [`TrackerSettings`]는 설정을 해석한 결과(디코딩된 수집 서버 URL, 외부 쿠키 이름 등)로,
//! `create` 옵션과 테스트 오버라이드가 적용되는 런타임 값입니다.
//!
//! # 사용 예시
//! ```ignore
//! use hct_core::config::HctConfig;
//! use hct_tracker::config::TrackerConfig;
//!
//! let core_config = HctConfig::default();
//! let config = TrackerConfig::from_core(&core_config);
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hct_core::config::{
    DEFAULT_OVERRIDES_KEY, DEFAULT_STORAGE_KEY, HctConfig, TrackerOptions, decode_app_token,
    decode_cookie_list,
};

use crate::cookie;
use crate::error::TrackerError;

/// 트래커 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// 트래킹 코드 (없으면 아무것도 전송하지 않음)
    pub code: Option<String>,
    /// `create` 옵션
    pub options: TrackerOptions,
    /// 상태 저장 키
    pub storage_key: String,
    /// 테스트 오버라이드 저장 키
    pub overrides_key: String,
    /// 쿠키 폴백의 도메인
    pub cookie_domain: Option<String>,
    /// 쿠키 폴백의 경로
    pub cookie_path: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            code: None,
            options: TrackerOptions::default(),
            storage_key: DEFAULT_STORAGE_KEY.to_owned(),
            overrides_key: DEFAULT_OVERRIDES_KEY.to_owned(),
            cookie_domain: Some(".net-helium.dev".to_owned()),
            cookie_path: "/".to_owned(),
        }
    }
}

impl TrackerConfig {
    /// core의 `HctConfig`에서 트래커 설정을 생성합니다.
    pub fn from_core(core: &HctConfig) -> Self {
        Self {
            code: non_empty(&core.tracker.code),
            options: core.tracker.options.clone(),
            storage_key: core.storage.key.clone(),
            overrides_key: core.storage.overrides_key.clone(),
            cookie_domain: non_empty(&core.storage.cookie_domain),
            cookie_path: core.storage.cookie_path.clone(),
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.options.cookie_expiration == 0 {
            return Err(config_error("cookie_expiration", "must be greater than 0"));
        }
        if self.options.session_expiration == 0 {
            return Err(config_error("session_expiration", "must be greater than 0"));
        }
        if self.storage_key.is_empty() {
            return Err(config_error("storage_key", "must not be empty"));
        }
        if self.overrides_key.is_empty() {
            return Err(config_error("overrides_key", "must not be empty"));
        }
        decode_app_token(&self.options.token)?;
        cookie::validate_name(&self.storage_key)?;
        if let Some(domain) = &self.cookie_domain {
            cookie::validate_domain(domain)?;
        }
        cookie::validate_path(&self.cookie_path)?;
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn config_error(field: &str, reason: &str) -> TrackerError {
    TrackerError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// 트래커 설정 빌더
#[derive(Default)]
pub struct TrackerConfigBuilder {
    config: TrackerConfig,
}

impl TrackerConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 트래킹 코드를 설정합니다.
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.config.code = non_empty(&code.into());
        self
    }

    /// `create` 옵션 전체를 교체합니다.
    pub fn options(mut self, options: TrackerOptions) -> Self {
        self.config.options = options;
        self
    }

    /// 동의 게이트 사용 여부를 설정합니다.
    pub fn with_consent(mut self, enabled: bool) -> Self {
        self.config.options.with_consent = enabled;
        self
    }

    /// 쿠키 보존 기간(일)을 설정합니다.
    pub fn cookie_expiration(mut self, days: u32) -> Self {
        self.config.options.cookie_expiration = days;
        self
    }

    /// 세션 유지 시간(분)을 설정합니다.
    pub fn session_expiration(mut self, minutes: u32) -> Self {
        self.config.options.session_expiration = minutes;
        self
    }

    /// 수집 서버 URL을 설정합니다 (내부에서 base64로 인코딩).
    pub fn app_url(mut self, url: &str) -> Self {
        self.config.options.token = STANDARD.encode(url);
        self
    }

    /// 외부 쿠키 이름 목록을 설정합니다 (내부에서 base64로 인코딩).
    pub fn external_cookies(mut self, names: &[&str]) -> Self {
        self.config.options.cookies = STANDARD.encode(names.join(","));
        self
    }

    /// page_view 비활성화 여부를 설정합니다.
    pub fn disable_page_view(mut self, disabled: bool) -> Self {
        self.config.options.disable_page_view = disabled;
        self
    }

    /// 폼 제출 추적 여부를 설정합니다.
    pub fn enable_form_tracking(mut self, enabled: bool) -> Self {
        self.config.options.enable_form_tracking = enabled;
        self
    }

    /// `/htms` 자동 전송 여부를 설정합니다.
    pub fn trigger_htms(mut self, enabled: bool) -> Self {
        self.config.options.trigger_htms = enabled;
        self
    }

    /// do-not-track 존중 여부를 설정합니다.
    pub fn honor_do_not_track(mut self, enabled: bool) -> Self {
        self.config.options.honor_do_not_track = enabled;
        self
    }

    /// 상태 저장 키를 설정합니다.
    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.config.storage_key = key.into();
        self
    }

    /// 쿠키 도메인을 설정합니다. 빈 문자열이면 도메인 속성을 생략합니다.
    pub fn cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.cookie_domain = non_empty(&domain.into());
        self
    }

    /// 설정을 검증하고 `TrackerConfig`를 생성합니다.
    pub fn build(self) -> Result<TrackerConfig, TrackerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// 해석된 런타임 설정
///
/// `create` 시 옵션에서 만들어지고, 이후 테스트 오버라이드가 덮어씁니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    /// 트래킹 코드
    pub code: Option<String>,
    /// 디코딩된 수집 서버 URL (끝의 `/` 제거)
    pub app_url: String,
    /// 쿠키 보존 기간 (일)
    pub cookie_expiration_days: u32,
    /// 세션 유지 시간 (분)
    pub session_expiration_minutes: u32,
    /// 전송할 외부 쿠키 이름
    pub external_cookies: Vec<String>,
    /// 동의 게이트 사용 여부
    pub with_consent: bool,
    /// do-not-track 존중 여부
    pub honor_do_not_track: bool,
    /// page_view 비활성화
    pub disable_page_view: bool,
    /// 폼 제출 추적
    pub enable_form_tracking: bool,
    /// `/htms` 자동 전송
    pub trigger_htms: bool,
}

impl TrackerSettings {
    /// 트래킹 코드와 옵션으로 런타임 설정을 만듭니다.
    pub fn resolve(code: Option<&str>, options: &TrackerOptions) -> Result<Self, TrackerError> {
        if options.cookie_expiration == 0 {
            return Err(config_error("cookie_expiration", "must be greater than 0"));
        }
        if options.session_expiration == 0 {
            return Err(config_error("session_expiration", "must be greater than 0"));
        }
        Ok(Self {
            code: code.and_then(non_empty),
            app_url: decode_app_token(&options.token)?,
            cookie_expiration_days: options.cookie_expiration,
            session_expiration_minutes: options.session_expiration,
            external_cookies: decode_cookie_list(&options.cookies),
            with_consent: options.with_consent,
            honor_do_not_track: options.honor_do_not_track,
            disable_page_view: options.disable_page_view,
            enable_form_tracking: options.enable_form_tracking,
            trigger_htms: options.trigger_htms,
        })
    }

    /// 쿠키 보존 기간 (밀리초)
    pub fn cookie_expiration_millis(&self) -> i64 {
        i64::from(self.cookie_expiration_days) * 24 * 60 * 60 * 1000
    }

    /// 세션 유지 시간 (밀리초)
    pub fn session_expiration_millis(&self) -> i64 {
        i64::from(self.session_expiration_minutes) * 60 * 1000
    }

    /// 경로와 트래킹 코드로 엔드포인트 URL을 만듭니다.
    pub fn endpoint(&self, path: &str) -> Option<String> {
        self.code
            .as_ref()
            .map(|code| format!("{}{}/{}", self.app_url, path, code))
    }
}
