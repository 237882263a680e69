//! 도메인 타입 -- 트래커 전역에서 사용되는 공통 타입
//!
//! 영속 상태([`PersistedState`]), 동의 시각 입력([`ConsentInstant`]),
//! 파생 동의 상태([`ConsentState`]), 수집 서버로 나가는 요청([`OutboundRequest`])을 정의합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// 세션 토큰 → 값 맵
pub type SessionMap<T> = BTreeMap<String, T>;

/// 어트리뷰션 파라미터 (utm_source 등)
pub type AttributionMap = BTreeMap<String, String>;

/// 정규화된 연락처 데이터
pub type ContactMap = Map<String, Value>;

/// 쿼리 문자열에서 어트리뷰션으로 수집하는 키
pub const ATTRIBUTION_KEYS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "url",
    "pk_campaign",
    "pk_kwd",
    "pk_source",
    "pk_medium",
    "pk_content",
    "utm_id",
    "gad_source",
    "gclid",
];

/// 쿼리 문자열에서 연락처로 수집하는 키
pub const CONTACT_KEYS: &[&str] = &[
    "hct_e",
    "hct_p",
    "hc_id",
    "hct_id_1",
    "hct_id_2",
    "hct_id_3",
    "hct_id_4",
    "hct_id_5",
    "email",
    "mail",
    "e_mail",
    "phone",
    "phone_number",
    "phonenumber",
    "mobile",
    "telephone",
];

/// JS `Date`가 표현할 수 있는 최대 절대값 (밀리초)
pub const MAX_DATE_MILLIS: i64 = 8_640_000_000_000_000;

/// 스토리지에 저장되는 트래커 상태
///
/// 하나의 JSON 객체로 직렬화되어 단일 키에 저장됩니다.
/// 알 수 없는 필드는 무시되고, 없는 필드는 기본값을 사용합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    /// 익명 모드 여부 (없으면 `ensure_tokens`가 `true`로 채움)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonym: Option<bool>,
    /// 동의 시각 (epoch 밀리초)
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_millis"
    )]
    pub consent_at: Option<i64>,
    /// 동의 만료 시각 (epoch 밀리초)
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_millis"
    )]
    pub expired_at: Option<i64>,
    /// 브라우저 토큰
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// 세션 토큰
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    /// 세션 만료 시각 (epoch 밀리초)
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_millis"
    )]
    pub session_expired_at: Option<i64>,
    /// 브라우저 등록 여부
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_registered: Option<bool>,
    /// 세션별 어트리뷰션 파라미터
    pub htms: SessionMap<AttributionMap>,
    /// 세션별 연락처 (개인정보)
    pub contact: SessionMap<ContactMap>,
    /// 세션별 이벤트 → 마지막 전송 페이로드(JSON 문자열)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub changes: SessionMap<BTreeMap<String, String>>,
    /// 이미 연결(association)을 보낸 세션
    #[serde(skip_serializing_if = "Option::is_none")]
    pub associate: Option<String>,
    /// 동의 전까지 보류된 연결 유형
    #[serde(skip_serializing_if = "Option::is_none")]
    pub association_type: Option<String>,
    /// 동의 전까지 보류된 연결 데이터
    #[serde(skip_serializing_if = "Option::is_none")]
    pub association_datas: Option<Value>,
}

impl PersistedState {
    /// 새 세션을 위해 세션 종속 데이터를 초기화합니다.
    ///
    /// 브라우저 등록 플래그를 내리고 `htms`/`contact`를 새 세션의 빈 항목 하나로 교체합니다.
    pub fn reset_session(&mut self, session_token: &str) {
        self.browser_registered = Some(false);
        self.htms = BTreeMap::from([(session_token.to_owned(), AttributionMap::new())]);
        self.contact = BTreeMap::from([(session_token.to_owned(), ContactMap::new())]);
    }

    /// 세션의 어트리뷰션 맵 (없으면 빈 맵)
    pub fn attribution(&self, session_token: &str) -> AttributionMap {
        self.htms.get(session_token).cloned().unwrap_or_default()
    }

    /// 세션의 연락처 맵 (없으면 빈 맵)
    pub fn session_contact(&self, session_token: &str) -> ContactMap {
        self.contact.get(session_token).cloned().unwrap_or_default()
    }

    /// 보류 중인 연결 요청이 있는지 여부
    pub fn has_deferred_association(&self) -> bool {
        self.association_type.is_some()
    }
}

/// 숫자, 소수, 숫자 문자열을 모두 epoch 밀리초로 받아들입니다.
///
/// 해석할 수 없는 값은 에러 대신 `None`이 됩니다.
fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => parse_int_prefix(&s),
        _ => None,
    }))
}

/// JS `parseInt(s, 10)`과 같은 방식으로 앞부분의 정수를 읽습니다.
///
/// 앞쪽 공백과 부호를 허용하고, 숫자가 아닌 문자를 만나면 멈춥니다.
pub fn parse_int_prefix(input: &str) -> Option<i64> {
    let trimmed = input.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// `activate()`에 전달되는 동의 시각
///
/// epoch 밀리초, 문자열(정수로 해석), 날짜 세 가지 형태를 받습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentInstant {
    /// epoch 밀리초
    Epoch(i64),
    /// 앞부분 정수를 epoch 밀리초로 해석하는 문자열
    Text(String),
    /// 날짜
    Date(DateTime<Utc>),
}

impl ConsentInstant {
    /// epoch 밀리초로 변환합니다. 해석할 수 없거나 날짜 범위를 벗어나면 `None`.
    pub fn to_epoch_millis(&self) -> Option<i64> {
        let millis = match self {
            Self::Epoch(ms) => Some(*ms),
            Self::Text(text) => parse_int_prefix(text),
            Self::Date(date) => Some(date.timestamp_millis()),
        }?;
        (millis.unsigned_abs() <= MAX_DATE_MILLIS.unsigned_abs()).then_some(millis)
    }
}

impl From<i64> for ConsentInstant {
    fn from(ms: i64) -> Self {
        Self::Epoch(ms)
    }
}

impl From<&str> for ConsentInstant {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for ConsentInstant {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<DateTime<Utc>> for ConsentInstant {
    fn from(date: DateTime<Utc>) -> Self {
        Self::Date(date)
    }
}

/// 영속 상태로부터 계산되는 동의 상태 (저장되지 않음)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentState {
    /// 동의 게이트 비활성 -- 식별 모드로 동작
    Disabled,
    /// 익명 모드
    Anonymous,
    /// 동의 완료
    Identified {
        consent_at: Option<i64>,
        expired_at: Option<i64>,
    },
}

impl ConsentState {
    /// 영속 상태와 현재 시각으로 동의 상태를 계산합니다.
    pub fn derive(state: &PersistedState, now_millis: i64, gating_enabled: bool) -> Self {
        if !gating_enabled {
            return Self::Disabled;
        }
        let unexpired = state.expired_at.is_some_and(|at| at > now_millis);
        let anonymous = match state.anonym {
            Some(true) => true,
            Some(false) => !unexpired,
            None => !unexpired,
        };
        if anonymous {
            Self::Anonymous
        } else {
            Self::Identified {
                consent_at: state.consent_at,
                expired_at: state.expired_at,
            }
        }
    }

    /// 익명 모드 여부
    pub fn is_anonymized(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl fmt::Display for ConsentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Anonymous => write!(f, "anonymous"),
            Self::Identified { .. } => write!(f, "identified"),
        }
    }
}

/// 수집 서버 엔드포인트 경로
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectPath {
    /// 신규 세션 등록
    Register,
    /// 이벤트
    Event,
    /// 동의 변경
    Consent,
    /// 연락처 연결
    Associate,
    /// 페이지 이탈
    Leave,
    /// 어트리뷰션 파라미터
    Htms,
}

impl CollectPath {
    /// URL 경로 (`/register` 등)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "/register",
            Self::Event => "/event",
            Self::Consent => "/consent",
            Self::Associate => "/associate",
            Self::Leave => "/leave",
            Self::Htms => "/htms",
        }
    }

    /// 메트릭 레이블용 이름 (`register` 등)
    pub fn label(&self) -> &'static str {
        &self.as_str()[1..]
    }
}

impl fmt::Display for CollectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 요청 본문의 Content-Type
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// 수집 서버로 나가는 요청
///
/// 구조화된 페이로드와 인코딩된 본문을 함께 보관합니다.
/// 전송 계층은 `body`만 사용하고, `payload`는 로깅과 dry-run 출력에 쓰입니다.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// 요청 ID
    pub id: uuid::Uuid,
    /// 엔드포인트 경로
    pub path: CollectPath,
    /// 전체 URL (`{app_url}{path}/{tracking_code}`)
    pub url: String,
    /// 보강된 페이로드
    pub payload: Map<String, Value>,
    /// `q=...` 형태의 인코딩된 본문
    pub body: Bytes,
    /// 생성 시각
    pub created_at: SystemTime,
}

impl OutboundRequest {
    /// 새 요청을 생성합니다.
    pub fn new(
        path: CollectPath,
        url: impl Into<String>,
        payload: Map<String, Value>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            path,
            url: url.into(),
            payload,
            body: body.into(),
            created_at: SystemTime::now(),
        }
    }
}

impl fmt::Display for OutboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "POST {} ({} bytes)", self.url, self.body.len())
    }
}
