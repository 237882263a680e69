//! 식별자 관리 -- 세션 토큰과 브라우저 토큰의 생명주기
//!
//! [`Identity::ensure_tokens`]는 모든 공개 동작 전에 호출되며 멱등입니다.
//! 세션이 새로 시작되면(발급 또는 `hct_session` 전달) 브라우저 등록 플래그가 내려가고
//! 세션 종속 데이터(`htms`, `contact`)가 초기화됩니다.

use hct_core::metrics as m;
use hct_core::types::{ATTRIBUTION_KEYS, CONTACT_KEYS, ContactMap, PersistedState};
use rand::Rng;
use serde_json::Value;
use tracing::info;

use crate::dispatch::normalize_contact;
use crate::query::QueryParams;

/// 세션 토큰을 지정하는 쿼리 파라미터
pub const SESSION_PARAM: &str = "hct_session";

/// 브라우저 토큰을 지정하는 쿼리 파라미터
pub const BROWSER_PARAM: &str = "hct_browser";

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// 토큰 뒤에 붙는 무작위 문자 수
const RANDOM_SUFFIX_LEN: usize = 5;

/// 새 토큰을 발급합니다: `base36(now)` + 무작위 base36 5자, 대문자.
pub fn mint_token(now_millis: i64) -> String {
    let mut token = to_base36(now_millis.unsigned_abs());
    let mut rng = rand::thread_rng();
    for _ in 0..RANDOM_SUFFIX_LEN {
        token.push(char::from(BASE36[rng.gen_range(0..BASE36.len())]));
    }
    token.to_ascii_uppercase()
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_owned();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.iter().rev().map(|&d| char::from(d)).collect()
}

/// `ensure_tokens` 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenUpdate {
    pub session_token: String,
    pub browser_token: String,
    /// 새 세션이 시작되어 `/register`가 필요함
    pub registered: bool,
    /// 세션 토큰을 새로 발급했음
    pub session_minted: bool,
    /// 브라우저 토큰을 새로 발급했음
    pub browser_minted: bool,
}

/// 메모리에 유지되는 현재 토큰
#[derive(Debug, Clone, Default)]
pub struct Identity {
    session_token: Option<String>,
    browser_token: Option<String>,
}

impl Identity {
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 세션 토큰
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// 현재 브라우저 토큰
    pub fn browser_token(&self) -> Option<&str> {
        self.browser_token.as_deref()
    }

    /// 세션/브라우저 토큰을 확정하고 영속 상태를 갱신합니다.
    ///
    /// 저장은 호출자의 몫입니다. 결과의 `registered`가 참이면 호출자가 `/register`를 보냅니다.
    pub fn ensure_tokens(
        &mut self,
        state: &mut PersistedState,
        query: &QueryParams,
        now_millis: i64,
        session_ttl_millis: i64,
    ) -> TokenUpdate {
        let session_param = query.get(SESSION_PARAM).filter(|s| !s.is_empty());
        let browser_param = query.get(BROWSER_PARAM).filter(|s| !s.is_empty());

        let mut registered = false;
        let mut session_minted = false;
        let session_token = match (self.session_token.take(), session_param) {
            (None, Some(param)) => {
                registered = true;
                state.reset_session(param);
                info!(session_token = param, "session taken from query");
                param.to_owned()
            }
            (None, None) => match stored_session(state, now_millis) {
                Some(stored) => stored,
                None => {
                    let minted = mint_token(now_millis);
                    registered = true;
                    session_minted = true;
                    state.reset_session(&minted);
                    metrics::counter!(m::SESSIONS_MINTED_TOTAL).increment(1);
                    info!(session_token = %minted, "new session minted");
                    minted
                }
            },
            (Some(current), Some(param)) if param != current => {
                info!(from = %current, to = param, "session overridden by query");
                param.to_owned()
            }
            (Some(current), _) => current,
        };

        if state.anonym.is_none() {
            state.anonym = Some(true);
        }

        capture_query(state, query, &session_token);

        state.session_token = Some(session_token.clone());
        state.session_expired_at = Some(now_millis.saturating_add(session_ttl_millis));

        let mut browser_minted = false;
        let browser_token = match (self.browser_token.take(), browser_param) {
            (None, Some(param)) => param.to_owned(),
            (None, None) => match state.token.clone() {
                Some(stored) => stored,
                None => {
                    browser_minted = true;
                    state.browser_registered = Some(false);
                    let minted = mint_token(now_millis);
                    info!(browser_token = %minted, "new browser token minted");
                    minted
                }
            },
            (Some(current), Some(param)) if param != current => param.to_owned(),
            (Some(current), _) => current,
        };
        state.token = Some(browser_token.clone());

        self.session_token = Some(session_token.clone());
        self.browser_token = Some(browser_token.clone());

        TokenUpdate {
            session_token,
            browser_token,
            registered,
            session_minted,
            browser_minted,
        }
    }
}

/// 만료되지 않은 저장 세션
fn stored_session(state: &PersistedState, now_millis: i64) -> Option<String> {
    let expired_at = state.session_expired_at?;
    if expired_at > now_millis {
        state.session_token.clone()
    } else {
        None
    }
}

/// 쿼리의 어트리뷰션/연락처 파라미터를 세션 맵에 기록합니다.
fn capture_query(state: &mut PersistedState, query: &QueryParams, session_token: &str) {
    let attribution = state.htms.entry(session_token.to_owned()).or_default();
    for (key, value) in query.filter_keys(ATTRIBUTION_KEYS) {
        attribution.insert(key.to_owned(), value.to_owned());
    }

    let incoming: ContactMap = query
        .filter_keys(CONTACT_KEYS)
        .map(|(k, v)| (k.to_owned(), Value::String(v.to_owned())))
        .collect();
    let stored = state.session_contact(session_token);
    if incoming.is_empty() && state.contact.contains_key(session_token) {
        return;
    }
    let contact = normalize_contact(&stored, Some(&Value::Object(incoming)));
    state.contact.insert(session_token.to_owned(), contact);
}
