//! 트래커 알림 -- 호스트(페이지, 폼 임베드, CLI)로 전달되는 상태 변경 알림
//!
//! 트래커는 토큰 갱신, 동의 변경, 연결 완료 시 [`TrackerNotification`]을
//! broadcast 채널로 발행합니다. 폼 임베드는 `TokensUpdated`를 받아 iframe URL을 다시 만듭니다.

use std::fmt;

use serde::{Deserialize, Serialize};

// --- 알림 이름 상수 ---

/// 토큰 갱신 알림 이름
pub const NOTIFICATION_TOKENS_UPDATED: &str = "hct.tokensUpdate";
/// 동의 변경 알림 이름
pub const NOTIFICATION_CONSENT_CHANGED: &str = "hct.consentChange";
/// 연결 완료 알림 이름
pub const NOTIFICATION_ASSOCIATED: &str = "hct.associate";

/// 트래커 상태 변경 알림
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerNotification {
    /// `ensure_tokens` 완료 후 현재 토큰
    TokensUpdated {
        session_token: String,
        browser_token: String,
    },
    /// 동의 상태 변경
    ConsentChanged {
        granted: bool,
        /// 변경 시각 (epoch 밀리초)
        at: i64,
    },
    /// 연락처 연결 전송
    Associated {
        session_token: String,
        association_type: String,
    },
}

impl TrackerNotification {
    /// 알림 이름 (`hct.tokensUpdate` 등)
    pub fn name(&self) -> &'static str {
        match self {
            Self::TokensUpdated { .. } => NOTIFICATION_TOKENS_UPDATED,
            Self::ConsentChanged { .. } => NOTIFICATION_CONSENT_CHANGED,
            Self::Associated { .. } => NOTIFICATION_ASSOCIATED,
        }
    }
}

impl fmt::Display for TrackerNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokensUpdated {
                session_token,
                browser_token,
            } => write!(
                f,
                "{} session={} browser={}",
                self.name(),
                session_token,
                browser_token
            ),
            Self::ConsentChanged { granted, at } => {
                write!(f, "{} granted={} at={}", self.name(), granted, at)
            }
            Self::Associated {
                session_token,
                association_type,
            } => write!(
                f,
                "{} session={} type={}",
                self.name(),
                session_token,
                association_type
            ),
        }
    }
}
