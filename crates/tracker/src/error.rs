//! 트래커 에러 타입
//!
//! [`TrackerError`]는 트래커 생성 시점에 발생하는 에러를 표현합니다.
//! 런타임 경로(스토리지, 네트워크)의 실패는 에러로 올라오지 않고 로그로만 남습니다.
//! `From<TrackerError> for HctError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use hct_core::error::{CodecError, ConfigError, HctError, StorageError, TransportError};

/// 트래커 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 빌더에 필수 구성 요소가 빠짐
    #[error("missing component: {0}")]
    MissingComponent(&'static str),

    /// 전송 계층 초기화 실패
    #[error("transport error: {0}")]
    Transport(String),

    /// 인코딩/디코딩 에러 (쿠키 속성, URL 등)
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for TrackerError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidValue { field, reason } => Self::Config { field, reason },
            other => Self::Config {
                field: "config".to_owned(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<TrackerError> for HctError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::Config { field, reason } => {
                HctError::Config(ConfigError::InvalidValue { field, reason })
            }
            TrackerError::MissingComponent(name) => HctError::Config(ConfigError::InvalidValue {
                field: name.to_owned(),
                reason: "component is required".to_owned(),
            }),
            TrackerError::Transport(reason) => HctError::Transport(TransportError::Build(reason)),
            TrackerError::Codec(e) => HctError::Codec(e),
            TrackerError::Storage(e) => HctError::Storage(e),
            TrackerError::Io(e) => HctError::Io(e),
        }
    }
}
