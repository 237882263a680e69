//! 트래커 퍼사드 -- 공개 API와 호스트 이벤트 처리
//!
//! [`Tracker`]는 식별자 관리, 동의 컨트롤러, 디스패처, 연결 로직을 묶습니다.
//! 모든 공개 동작은 `&mut self`를 받으며, 상태를 읽고 → 수정하고 → 저장한 뒤에만 전송합니다.
//!
//! # 흐름
//! ```text
//! create/activate/send_event/...
//!        |
//!   ensure_tokens ──> PersistentStore (load/store)
//!        |
//!   ConsentPolicy / association
//!        |
//!   build_request ──> Transport ──> 수집 서버
//!        |
//!   TrackerNotification ──broadcast──> 구독자
//! ```
//!
//! # 사용 예시
//! ```ignore
//! use std::sync::Arc;
//! use hct_tracker::{PageContext, RecordingTransport, TrackerBuilder};
//!
//! let transport = Arc::new(RecordingTransport::new());
//! let mut tracker = TrackerBuilder::new()
//!     .page(PageContext::new("https://shop.example/?utm_source=google")?)
//!     .transport(transport.clone())
//!     .build()?;
//! tracker.create(Some("CODE"), &Default::default())?;
//! tracker.activate(None, None);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use hct_core::backend::{Clock, StorageBackend, SystemClock, Transport};
use hct_core::config::TrackerOptions;
use hct_core::event::TrackerNotification;
use hct_core::types::{
    ATTRIBUTION_KEYS, CollectPath, ConsentInstant, ConsentState, PersistedState,
};
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::association::{self, AssociationDecision};
use crate::config::{TrackerConfig, TrackerSettings};
use crate::consent::ConsentPolicy;
use crate::cookie::CookieJar;
use crate::dispatch::{DispatchContext, build_request, normalize_contact};
use crate::error::TrackerError;
use crate::identity::{Identity, TokenUpdate};
use crate::overrides::{self, OverrideMap};
use crate::page::PageContext;
use crate::store::{CookieStorage, PersistentStore};

/// 알림 채널 기본 용량
const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

/// 폼 제출 이벤트 이름
const FORM_SUBMIT_EVENT: &str = "form_submit";

/// 페이지 뷰 이벤트 이름
const PAGE_VIEW_EVENT: &str = "page_view";

/// 제출된 폼 필드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: String,
    /// `input`의 `type` 속성 (`text`, `password` 등)
    pub input_type: String,
}

impl FormField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            input_type: "text".to_owned(),
        }
    }

    /// 입력 타입을 지정합니다.
    pub fn with_type(mut self, input_type: impl Into<String>) -> Self {
        self.input_type = input_type.into();
        self
    }
}

/// 폼 제출
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormSubmission {
    pub fields: Vec<FormField>,
}

impl FormSubmission {
    pub fn new(fields: Vec<FormField>) -> Self {
        Self { fields }
    }

    /// 비밀번호 필드가 있는지 여부
    pub fn has_password(&self) -> bool {
        self.fields
            .iter()
            .any(|f| f.input_type.eq_ignore_ascii_case("password"))
    }

    /// 이름이 있는 필드를 `{name: value}`로 모읍니다. 같은 이름은 마지막 값이 남습니다.
    fn to_datas(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter(|f| !f.name.is_empty())
            .map(|f| (f.name.clone(), Value::String(f.value.clone())))
            .collect()
    }
}

/// 수동으로 움직이는 시계 (테스트, 재현용)
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    /// 시각을 앞으로 옮깁니다.
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// 시각을 지정합니다.
    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// 방문자 식별/동의 트래커
pub struct Tracker {
    settings: TrackerSettings,
    storage_key: String,
    overrides_key: String,
    page: PageContext,
    store: PersistentStore,
    cookies: CookieJar,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    identity: Identity,
    notifications: broadcast::Sender<TrackerNotification>,
}

impl Tracker {
    /// 옵션을 적용하고 트래커를 시작합니다.
    ///
    /// 1. 옵션 적용 2. 토큰 확정 3. 테스트 오버라이드 적용
    /// 4. `page_view` 전송 (`disable_page_view`가 아니면)
    /// 5. 어트리뷰션 파라미터가 있으면 `/htms` 전송 (`trigger_htms`)
    pub fn create(&mut self, code: Option<&str>, options: &TrackerOptions) -> Result<(), TrackerError> {
        self.settings = TrackerSettings::resolve(code, options)?;
        self.apply_runtime_settings();

        let (mut state, update) = self.ensure_tokens();
        self.load_overrides();
        info!(
            code = self.settings.code.as_deref().unwrap_or("-"),
            session_token = %update.session_token,
            session_minted = update.session_minted,
            browser_minted = update.browser_minted,
            backend = self.store.backend_name(),
            "tracker created"
        );

        if !self.settings.disable_page_view {
            self.dispatch(
                &mut state,
                CollectPath::Event,
                payload(json!({ "event_name": PAGE_VIEW_EVENT })),
            );
        }
        if self.settings.trigger_htms && self.page.query().contains_any(ATTRIBUTION_KEYS) {
            self.dispatch(&mut state, CollectPath::Htms, Map::new());
        }
        Ok(())
    }

    /// 동의를 기록합니다. 동의 게이트가 꺼져 있으면 아무것도 하지 않습니다.
    pub fn activate(&mut self, consent_at: Option<ConsentInstant>, expire_at: Option<ConsentInstant>) {
        let policy = self.policy();
        if !policy.with_consent {
            debug!("consent gating disabled, activate ignored");
            return;
        }
        let (mut state, update) = self.ensure_tokens();
        let activation = policy.activate(&mut state, consent_at, expire_at, self.now());
        self.save_state(&state);

        if activation.changed {
            let datas = payload(json!({
                "token": update.browser_token,
                "session_token": update.session_token,
                "type": "activate",
                "htms": state.attribution(&update.session_token),
                "consent_at": activation.consent_at,
                "expired_at": activation.expired_at,
            }));
            self.dispatch(&mut state, CollectPath::Consent, datas);
            self.notify(TrackerNotification::ConsentChanged {
                granted: true,
                at: activation.consent_at,
            });
        } else {
            debug!(consent_at = activation.consent_at, "consent unchanged, /consent not sent");
        }

        if let Some((association_type, contact)) =
            association::take_deferred(&mut state, &update.session_token)
        {
            info!(association_type = %association_type, "replaying deferred association");
            self.save_state(&state);
            self.dispatch_association(&mut state, &update.session_token, association_type, contact);
        } else {
            self.save_state(&state);
        }
    }

    /// 동의를 철회합니다. 이미 익명이면 아무것도 보내지 않습니다.
    pub fn deactivate(&mut self) {
        let policy = self.policy();
        if !policy.with_consent {
            debug!("consent gating disabled, deactivate ignored");
            return;
        }
        let (mut state, update) = self.ensure_tokens();
        let Some(expired_at) = policy.deactivate(&mut state, self.now()) else {
            debug!("visitor already anonymous, deactivate ignored");
            return;
        };
        self.save_state(&state);
        let datas = payload(json!({
            "token": update.browser_token,
            "session_token": update.session_token,
            "type": "deactivate",
            "expired_at": expired_at,
        }));
        self.dispatch(&mut state, CollectPath::Consent, datas);
        self.notify(TrackerNotification::ConsentChanged {
            granted: false,
            at: expired_at,
        });
    }

    /// 이벤트를 보냅니다.
    ///
    /// `dedupe`가 참이면 이 세션에서 같은 이름으로 같은 데이터를 보낸 적이 있을 때 건너뜁니다.
    pub fn send_event(&mut self, name: &str, data: Value, dedupe: bool) {
        let (mut state, update) = self.ensure_tokens();
        let data = if data.is_null() { json!({}) } else { data };

        if dedupe {
            let changed = association::record_change(&mut state, &update.session_token, name, &data);
            self.save_state(&state);
            if !changed {
                return;
            }
        }
        if self.settings.code.is_none() {
            debug!(event = name, "no tracking code, event not sent");
            return;
        }
        self.dispatch(
            &mut state,
            CollectPath::Event,
            payload(json!({ "event_name": name, "datas": data })),
        );
    }

    /// 현재 방문자를 연락처와 연결합니다.
    ///
    /// 세션당 한 번만 전송되며, 익명 모드에서는 동의할 때까지 보류됩니다.
    pub fn associate(&mut self, association_type: &str, data: Value) {
        let (mut state, update) = self.ensure_tokens();
        if self.settings.code.is_none() {
            debug!(association_type, "no tracking code, association ignored");
            return;
        }
        let data = if data.is_null() { json!({}) } else { data };
        let anonymized = self.policy().anonymized(&state, self.now());
        match association::request_association(
            &mut state,
            &update.session_token,
            anonymized,
            association_type,
            data,
        ) {
            AssociationDecision::AlreadyAssociated => {}
            AssociationDecision::Deferred => self.save_state(&state),
            AssociationDecision::Send {
                association_type,
                contact,
            } => {
                // request_association이 이미 associate를 표시함
                self.save_state(&state);
                self.dispatch_association(&mut state, &update.session_token, association_type, contact);
            }
        }
    }

    /// 이 세션에서 연결을 보냈는지 여부
    pub fn is_associated(&mut self) -> bool {
        let (state, update) = self.ensure_tokens();
        association::is_associated(&state, &update.session_token)
    }

    /// 동의 여부 (익명 모드가 아님)
    pub fn consent_granted(&self) -> bool {
        !self.consent_state().is_anonymized()
    }

    /// 현재 동의 상태
    pub fn consent_state(&self) -> ConsentState {
        self.policy().state(&self.load_state(), self.now())
    }

    /// 현재 세션 토큰
    pub fn session_token(&self) -> Option<&str> {
        self.identity.session_token()
    }

    /// 현재 브라우저 토큰
    pub fn browser_token(&self) -> Option<&str> {
        self.identity.browser_token()
    }

    /// 폼 제출을 처리합니다. 전송했으면 `true`.
    ///
    /// 폼 추적이 꺼져 있거나 비밀번호 필드가 있는 폼은 무시합니다.
    pub fn submit_form(&mut self, form: &FormSubmission) -> bool {
        if !self.settings.enable_form_tracking {
            debug!("form tracking disabled, submission ignored");
            return false;
        }
        if form.has_password() {
            debug!("form contains a password field, submission ignored");
            return false;
        }
        let (mut state, _) = self.ensure_tokens();
        let datas = json!({ "event_name": FORM_SUBMIT_EVENT, "datas": form.to_datas() });
        self.dispatch(&mut state, CollectPath::Event, payload(datas));
        true
    }

    /// 페이지 이탈(`beforeunload`)을 처리합니다. 전송했으면 `true`.
    ///
    /// 포커스된 링크가 같은 출처를 가리키면 내부 이동으로 보고 보내지 않습니다.
    pub fn leave(&mut self, active_link: Option<&str>) -> bool {
        let origin = format!("{}/", self.page.url.origin());
        if active_link.is_some_and(|href| href.starts_with(&origin)) {
            debug!(origin = %origin, "same-origin navigation, /leave not sent");
            return false;
        }
        let mut state = if self.identity.session_token().is_some() {
            self.load_state()
        } else {
            self.ensure_tokens().0
        };
        self.dispatch(&mut state, CollectPath::Leave, Map::new());
        true
    }

    /// 페이지 컨텍스트를 바꿉니다 (단일 페이지 앱의 화면 전환).
    ///
    /// 메모리의 토큰은 유지됩니다.
    pub fn navigate(&mut self, page: PageContext) {
        debug!(url = %page.url, "page changed");
        self.page = page;
        self.apply_runtime_settings();
    }

    /// 알림을 구독합니다.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerNotification> {
        self.notifications.subscribe()
    }

    /// 저장된 상태 (없거나 읽을 수 없으면 기본값)
    pub fn stored_state(&self) -> PersistedState {
        self.load_state()
    }

    /// 현재 런타임 설정
    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// 현재 페이지
    pub fn page(&self) -> &PageContext {
        &self.page
    }

    /// 페이지 쿠키 저장소
    pub fn cookie_jar(&self) -> &CookieJar {
        &self.cookies
    }

    /// 사용 중인 스토리지 백엔드 이름
    pub fn storage_backend(&self) -> &str {
        self.store.backend_name()
    }

    /// do-not-track 가드 활성 여부
    pub fn tracking_disabled(&self) -> bool {
        self.policy().tracking_disabled(&self.page.navigator)
    }

    // --- 내부 동작 ---

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn policy(&self) -> ConsentPolicy {
        ConsentPolicy::from_settings(&self.settings)
    }

    fn load_state(&self) -> PersistedState {
        self.store.get(&self.storage_key).unwrap_or_default()
    }

    fn save_state(&self, state: &PersistedState) {
        self.store.set(&self.storage_key, state);
    }

    /// 설정 변경을 저장소에 반영합니다.
    fn apply_runtime_settings(&mut self) {
        self.store
            .set_cookie_expiration_days(self.settings.cookie_expiration_days);
        let disabled = self.tracking_disabled();
        self.store.set_tracking_disabled(disabled);
    }

    fn notify(&self, notification: TrackerNotification) {
        // 구독자가 없으면 send가 실패하지만 무시해도 됨
        let _ = self.notifications.send(notification);
    }

    /// 토큰을 확정하고 상태를 저장합니다. 새 세션이면 `/register`를 보냅니다.
    fn ensure_tokens(&mut self) -> (PersistedState, TokenUpdate) {
        let mut state = self.load_state();
        let query = self.page.query();
        let update = self.identity.ensure_tokens(
            &mut state,
            &query,
            self.now(),
            self.settings.session_expiration_millis(),
        );
        self.save_state(&state);

        if update.registered {
            let anonymized = self.policy().anonymized(&state, self.now());
            let datas = payload(json!({
                "token": update.browser_token,
                "session_token": update.session_token,
                "navigator": self.page.navigator.to_payload(),
                "anonym": anonymized,
            }));
            self.dispatch(&mut state, CollectPath::Register, datas);
        }

        self.notify(TrackerNotification::TokensUpdated {
            session_token: update.session_token.clone(),
            browser_token: update.browser_token.clone(),
        });
        (state, update)
    }

    /// 저장된 오버라이드와 쿼리 오버라이드를 적용하고 저장합니다.
    fn load_overrides(&mut self) {
        let stored: Option<OverrideMap> = self.store.get(&self.overrides_key);
        let Some(merged) = overrides::collect(stored, &self.page.query()) else {
            return;
        };
        overrides::apply(&mut self.settings, &merged);
        self.store.set(&self.overrides_key, &merged);
        self.apply_runtime_settings();
    }

    /// `/associate`를 보내고 알립니다. 호출 전에 `associate` 표시가 저장되어 있어야 합니다.
    fn dispatch_association(
        &self,
        state: &mut PersistedState,
        session_token: &str,
        association_type: String,
        contact: Value,
    ) {
        let datas = payload(json!({
            "association_type": association_type,
            "contact": contact,
        }));
        self.dispatch(state, CollectPath::Associate, datas);
        self.notify(TrackerNotification::Associated {
            session_token: session_token.to_owned(),
            association_type,
        });
    }

    /// 연락처를 정규화/저장하고 보강된 요청을 전송합니다.
    fn dispatch(&self, state: &mut PersistedState, path: CollectPath, datas: Map<String, Value>) {
        if self.tracking_disabled() {
            debug!(path = %path, "do-not-track active, request not sent");
            return;
        }
        let session_token = self.identity.session_token().unwrap_or_default();
        let browser_token = self.identity.browser_token().unwrap_or_default();

        let contact = normalize_contact(&state.session_contact(session_token), datas.get("contact"));
        state
            .contact
            .insert(session_token.to_owned(), contact.clone());
        self.save_state(state);

        let now = self.now();
        let attribution = state.attribution(session_token);
        let ctx = DispatchContext {
            settings: &self.settings,
            page: &self.page,
            cookies: &self.cookies,
            session_token,
            browser_token,
            anonymized: self.policy().anonymized(state, now),
            attribution: &attribution,
            now_millis: now,
        };
        if let Some(request) = build_request(path, datas, &contact, &ctx) {
            debug!(
                request_id = %request.id,
                path = %path,
                transport = self.transport.name(),
                anonym = ctx.anonymized,
                "dispatching request"
            );
            self.transport.send(request);
        }
    }
}

fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// 트래커 빌더
pub struct TrackerBuilder {
    config: TrackerConfig,
    page: Option<PageContext>,
    local_storage: Option<Arc<dyn StorageBackend>>,
    cookies: Option<CookieJar>,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    notification_capacity: usize,
}

impl TrackerBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: TrackerConfig::default(),
            page: None,
            local_storage: None,
            cookies: None,
            transport: None,
            clock: None,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }

    /// 트래커 설정을 지정합니다.
    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// 호스트 페이지를 설정합니다.
    pub fn page(mut self, page: PageContext) -> Self {
        self.page = Some(page);
        self
    }

    /// 로컬 스토리지 백엔드를 설정합니다. 없으면 쿠키만 사용합니다.
    pub fn local_storage(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.local_storage = Some(backend);
        self
    }

    /// 페이지 쿠키 저장소를 설정합니다. 없으면 빈 저장소를 만듭니다.
    pub fn cookie_jar(mut self, jar: CookieJar) -> Self {
        self.cookies = Some(jar);
        self
    }

    /// 전송 계층을 설정합니다.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 시계를 설정합니다. 없으면 시스템 시계를 사용합니다.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 알림 채널 용량을 설정합니다.
    pub fn notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    /// 트래커를 빌드합니다. `create`는 호출하지 않습니다.
    pub fn build(self) -> Result<Tracker, TrackerError> {
        self.config.validate()?;
        if self.notification_capacity == 0 {
            return Err(TrackerError::Config {
                field: "notification_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        let page = self.page.ok_or(TrackerError::MissingComponent("page"))?;
        let transport = self
            .transport
            .ok_or(TrackerError::MissingComponent("transport"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let settings = TrackerSettings::resolve(self.config.code.as_deref(), &self.config.options)?;

        let cookies = self.cookies.unwrap_or_default();
        let cookie_storage = CookieStorage::new(
            cookies.clone(),
            self.config.cookie_domain.clone(),
            self.config.cookie_path.clone(),
            settings.cookie_expiration_days,
            Arc::clone(&clock),
        );
        let store = PersistentStore::new(self.local_storage, cookie_storage);
        let (notifications, _) = broadcast::channel(self.notification_capacity);

        let mut tracker = Tracker {
            settings,
            storage_key: self.config.storage_key,
            overrides_key: self.config.overrides_key,
            page,
            store,
            cookies,
            transport,
            clock,
            identity: Identity::new(),
            notifications,
        };
        tracker.apply_runtime_settings();
        Ok(tracker)
    }

    /// 빌드 후 설정의 트래킹 코드와 옵션으로 `create`를 호출합니다.
    pub fn create(self) -> Result<Tracker, TrackerError> {
        let code = self.config.code.clone();
        let options = self.config.options.clone();
        let mut tracker = self.build()?;
        tracker.create(code.as_deref(), &options)?;
        Ok(tracker)
    }
}

impl Default for TrackerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
