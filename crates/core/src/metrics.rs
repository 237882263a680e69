//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 트래커와 전송 계층은 이 상수를 사용하여 `metrics::counter!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `hct_`
//! - 접미어: `_total` (counter)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(hct_core::metrics::REQUESTS_SENT_TOTAL, hct_core::metrics::LABEL_PATH => "event")
//!     .increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 엔드포인트 경로 레이블 키 (register, event, consent, associate, leave, htms)
pub const LABEL_PATH: &str = "path";

/// 동의 변경 유형 레이블 키 (activate, deactivate)
pub const LABEL_TYPE: &str = "type";

/// 드롭 사유 레이블 키 (full, closed)
pub const LABEL_REASON: &str = "reason";

// ─── 전송 메트릭 ────────────────────────────────────────────────────

/// 수집 서버로 전송 완료된 요청 수 (counter, label: path)
pub const REQUESTS_SENT_TOTAL: &str = "hct_requests_sent_total";

/// 전송 실패한 요청 수 (counter, label: path)
pub const REQUESTS_FAILED_TOTAL: &str = "hct_requests_failed_total";

/// 대기열이 가득 차거나 닫혀서 버려진 요청 수 (counter, labels: path, reason)
pub const REQUESTS_DROPPED_TOTAL: &str = "hct_requests_dropped_total";

// ─── 트래커 메트릭 ──────────────────────────────────────────────────

/// 중복으로 판정되어 전송되지 않은 이벤트 수 (counter)
pub const EVENTS_DEDUPLICATED_TOTAL: &str = "hct_events_deduplicated_total";

/// 새로 발급된 세션 수 (counter)
pub const SESSIONS_MINTED_TOTAL: &str = "hct_sessions_minted_total";

/// 동의 상태 변경 수 (counter, label: type)
pub const CONSENT_CHANGES_TOTAL: &str = "hct_consent_changes_total";

/// 저장된 상태 디코딩 실패 수 (counter)
pub const STORAGE_DECODE_ERRORS_TOTAL: &str = "hct_storage_decode_errors_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::describe_counter;

    describe_counter!(
        REQUESTS_SENT_TOTAL,
        "Total number of requests delivered to the collect server"
    );
    describe_counter!(
        REQUESTS_FAILED_TOTAL,
        "Total number of requests that failed or got a non-success status"
    );
    describe_counter!(
        REQUESTS_DROPPED_TOTAL,
        "Total number of requests dropped before sending (queue full or closed)"
    );
    describe_counter!(
        EVENTS_DEDUPLICATED_TOTAL,
        "Total number of events skipped because the payload did not change"
    );
    describe_counter!(SESSIONS_MINTED_TOTAL, "Total number of sessions minted");
    describe_counter!(
        CONSENT_CHANGES_TOTAL,
        "Total number of consent activations and deactivations"
    );
    describe_counter!(
        STORAGE_DECODE_ERRORS_TOTAL,
        "Total number of stored values that could not be decoded"
    );
}
