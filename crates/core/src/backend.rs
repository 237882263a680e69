//! 호스트 추상화 trait -- 스토리지, 전송, 시계
//!
//! 브라우저의 localStorage, `fetch`, `Date.now()`에 해당하는 확장 포인트입니다.
//! 트래커는 이 trait들만 통해 외부 세계와 상호작용합니다.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::StorageError;
use crate::types::OutboundRequest;

/// 키-값 스토리지 백엔드 (localStorage 대응)
pub trait StorageBackend: Send + Sync {
    /// 백엔드 이름 (로깅용)
    fn name(&self) -> &str;

    /// 사용 가능 여부를 확인합니다. 패닉하지 않아야 합니다.
    fn probe(&self) -> bool;

    /// 값을 읽습니다. 키가 없으면 `Ok(None)`.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// 값을 씁니다.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// 수집 서버로 요청을 보내는 전송 계층
///
/// fire-and-forget 방식입니다. 구현체는 블로킹하지 않아야 하며,
/// 실패를 호출자에게 알리지 않습니다.
pub trait Transport: Send + Sync {
    /// 전송 계층 이름 (로깅용)
    fn name(&self) -> &str;

    /// 요청을 전송 대기열에 넣습니다.
    fn send(&self, request: OutboundRequest);
}

/// 현재 시각 공급자
pub trait Clock: Send + Sync {
    /// 현재 epoch 밀리초
    fn now_millis(&self) -> i64;
}

/// 시스템 시계
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}
