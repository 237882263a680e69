#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`error`]: 도메인 에러 (`TrackerError`)
//! - [`config`]: 트래커 설정과 빌더 (`TrackerConfig`), 런타임 설정 (`TrackerSettings`)
//! - [`codec`]: URI/base64 인코딩, 저장값 코덱, 쿼리 문자열 직렬화
//! - [`query`]: 페이지 쿼리 파라미터 (`QueryParams`)
//! - [`cookie`]: 쿠키 직렬화/파싱과 페이지 쿠키 저장소 (`CookieJar`)
//! - [`store`]: 로컬 스토리지 → 쿠키 폴백 저장소 (`PersistentStore`)
//! - [`page`]: 호스트 페이지 정보 (`PageContext`, `NavigatorInfo`, `ScreenInfo`)
//! - [`identity`]: 세션/브라우저 토큰 관리 (`Identity`)
//! - [`consent`]: 동의 컨트롤러 (`ConsentPolicy`)
//! - [`association`]: 연결과 이벤트 중복 제거
//! - [`dispatch`]: 연락처 정규화, 요청 보강
//! - [`overrides`]: 테스트 오버라이드
//! - [`transport`]: HTTP 전송과 기록용 전송
//! - [`embed`]: 폼 임베드 URL과 리사이즈 디바운스
//! - [`tracker`]: 퍼사드 (`Tracker`, `TrackerBuilder`)
//!
//! # 구조
//!
//! ```text
//! 호스트 (CLI, 앱) --> Tracker --> Identity / ConsentPolicy / association
//!                        |
//!                   PersistentStore (local storage -> cookie)
//!                        |
//!                   build_request --> Transport --mpsc--> 수집 서버
//! ```

pub mod association;
pub mod codec;
pub mod config;
pub mod consent;
pub mod cookie;
pub mod dispatch;
pub mod embed;
pub mod error;
pub mod identity;
pub mod overrides;
pub mod page;
pub mod query;
pub mod store;
pub mod tracker;
pub mod transport;

// --- 주요 타입 re-export ---

// 퍼사드
pub use tracker::{FormField, FormSubmission, ManualClock, Tracker, TrackerBuilder};

// 설정
pub use config::{TrackerConfig, TrackerConfigBuilder, TrackerSettings};

// 에러
pub use error::TrackerError;

// 페이지
pub use page::{NavigatorInfo, PageContext, PageUrl, ScreenInfo};

// 저장소
pub use cookie::{CookieJar, StoredCookie};
pub use store::{CookieStorage, FileStorage, MemoryStorage, PersistentStore};

// 전송
pub use transport::{HttpTransport, RecordingTransport, TransportStats};

// 폼 임베드
pub use embed::{EmbedMessage, EmbedTokens, ResizeDebouncer, build_form_src, form_identifier};

// 쿼리
pub use query::QueryParams;
