//! 에러 타입 -- 도메인별 에러 정의
//!
//! 트래커의 런타임 경로(스토리지 읽기, 네트워크 전송)는 에러를 삼키고 로그만 남깁니다.
//! 여기 정의된 에러가 호출자에게 전달되는 것은 생성 시점(설정 검증, 앱 토큰 디코딩,
//! 전송 계층 초기화, 쿠키 속성 검증)뿐입니다.

/// HCT 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum HctError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 전송 계층 에러
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// 인코딩/디코딩 에러
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 백엔드를 사용할 수 없음 (권한 없음, 용량 초과 등)
    #[error("storage backend '{backend}' unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    /// 읽기 실패
    #[error("failed to read '{key}': {reason}")]
    Read { key: String, reason: String },

    /// 쓰기 실패
    #[error("failed to write '{key}': {reason}")]
    Write { key: String, reason: String },
}

/// 전송 계층 에러
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP 클라이언트 생성 실패
    #[error("failed to build http client: {0}")]
    Build(String),

    /// 전송 채널이 닫힘
    #[error("transport channel closed")]
    ChannelClosed,

    /// 요청 실패
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

/// 인코딩/디코딩 에러
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// base64 디코딩 실패
    #[error("invalid base64: {0}")]
    Base64(String),

    /// UTF-8 디코딩 실패
    #[error("invalid utf-8: {0}")]
    Utf8(String),

    /// JSON 파싱 실패
    #[error("invalid json: {0}")]
    Json(String),

    /// 쿠키 이름/값/속성이 RFC 6265 문법에 맞지 않음
    #[error("invalid cookie {field}: {reason}")]
    InvalidCookie { field: String, reason: String },

    /// URL 형식 오류
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}
