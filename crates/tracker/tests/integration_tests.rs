//! 통합 테스트 -- 방문자 식별/동의 흐름 검증
//!
//! 페이지 생성 → 토큰 확정 → 동의/철회 → 이벤트/연결 전송 시나리오를
//! 메모리 스토리지와 기록용 전송 계층으로 검증합니다.

use std::sync::Arc;

use hct_core::backend::{Clock, StorageBackend};
use hct_core::config::TrackerOptions;
use hct_core::event::TrackerNotification;
use hct_core::types::{CollectPath, ConsentInstant, OutboundRequest, PersistedState};
use hct_tracker::codec::decode_body;
use hct_tracker::{
    CookieJar, FormField, FormSubmission, ManualClock, MemoryStorage, PageContext,
    RecordingTransport, Tracker, TrackerBuilder,
};
use proptest::prelude::*;
use serde_json::{Value, json};

const NOW: i64 = 1_700_000_000_000;
const CODE: &str = "CODE";

struct Harness {
    tracker: Tracker,
    transport: Arc<RecordingTransport>,
    storage: Arc<MemoryStorage>,
    clock: Arc<ManualClock>,
}

fn harness_with(url: &str, storage: Arc<MemoryStorage>, options: TrackerOptions) -> Harness {
    let transport = Arc::new(RecordingTransport::new());
    let clock = Arc::new(ManualClock::new(NOW));
    let mut tracker = TrackerBuilder::new()
        .page(PageContext::new(url).unwrap())
        .local_storage(storage.clone())
        .transport(transport.clone())
        .clock(clock.clone())
        .build()
        .unwrap();
    tracker.create(Some(CODE), &options).unwrap();
    Harness {
        tracker,
        transport,
        storage,
        clock,
    }
}

fn harness(url: &str) -> Harness {
    harness_with(url, Arc::new(MemoryStorage::new()), quiet_options())
}

/// page_view 없이 생성
fn quiet_options() -> TrackerOptions {
    TrackerOptions {
        disable_page_view: true,
        ..Default::default()
    }
}

fn last(transport: &RecordingTransport, path: CollectPath) -> OutboundRequest {
    transport
        .requests()
        .into_iter()
        .rev()
        .find(|r| r.path == path)
        .unwrap()
}

// --- 식별자 ---

#[test]
fn first_visit_captures_attribution_and_contact_with_one_register() {
    let h = harness_with(
        "https://shop.example/?utm_source=google&email=a@b.com",
        Arc::new(MemoryStorage::new()),
        TrackerOptions::default(),
    );
    let session = h.tracker.session_token().unwrap().to_owned();
    let state = h.tracker.stored_state();

    assert_eq!(state.htms[&session]["utm_source"], "google");
    assert_eq!(state.contact[&session]["hct_e"], "a@b.com");
    assert_eq!(h.transport.count(CollectPath::Register), 1);
    assert_eq!(h.transport.count(CollectPath::Event), 1);

    let register = last(&h.transport, CollectPath::Register);
    assert_eq!(register.url, format!("https://hct.net-helium.fr/register/{CODE}"));
    assert_eq!(register.payload["anonym"], true);
    assert!(register.payload.get("contact").is_none());
}

#[test]
fn ensuring_tokens_again_mints_nothing() {
    let mut h = harness("https://shop.example/");
    let session = h.tracker.session_token().unwrap().to_owned();
    let browser = h.tracker.browser_token().unwrap().to_owned();
    let registered = h.tracker.stored_state().browser_registered;

    h.tracker.send_event("x", json!({}), false);
    h.tracker.send_event("y", json!({}), false);

    assert_eq!(h.tracker.session_token(), Some(session.as_str()));
    assert_eq!(h.tracker.browser_token(), Some(browser.as_str()));
    assert_eq!(h.tracker.stored_state().browser_registered, registered);
    assert_eq!(h.transport.count(CollectPath::Register), 1);
}

#[test]
fn stored_session_is_reused_until_it_expires() {
    let storage = Arc::new(MemoryStorage::new());
    let first = harness_with("https://shop.example/", storage.clone(), quiet_options());
    let session = first.tracker.session_token().unwrap().to_owned();

    let second = harness_with("https://shop.example/", storage.clone(), quiet_options());
    assert_eq!(second.tracker.session_token(), Some(session.as_str()));
    assert!(second.transport.is_empty());

    // 세션 만료 후 새 방문
    let transport = Arc::new(RecordingTransport::new());
    let clock = Arc::new(ManualClock::new(NOW + 31 * 60 * 1000));
    let mut third = TrackerBuilder::new()
        .page(PageContext::new("https://shop.example/").unwrap())
        .local_storage(storage)
        .transport(transport.clone())
        .clock(clock)
        .build()
        .unwrap();
    third.create(Some(CODE), &quiet_options()).unwrap();
    assert_ne!(third.session_token(), Some(session.as_str()));
    assert_eq!(third.browser_token(), first.tracker.browser_token());
    assert_eq!(transport.count(CollectPath::Register), 1);
}

#[test]
fn query_tokens_override_stored_identity() {
    let h = harness("https://shop.example/?hct_session=SQ&hct_browser=BQ");
    assert_eq!(h.tracker.session_token(), Some("SQ"));
    assert_eq!(h.tracker.browser_token(), Some("BQ"));
    assert_eq!(h.transport.count(CollectPath::Register), 1);
}

// --- 저장소 ---

#[test]
fn cookie_fallback_round_trips_state() {
    let jar = CookieJar::new();
    let build = |transport: Arc<RecordingTransport>| {
        let mut tracker = TrackerBuilder::new()
            .page(PageContext::new("https://shop.example/").unwrap())
            .local_storage(Arc::new(MemoryStorage::unavailable()))
            .cookie_jar(jar.clone())
            .transport(transport)
            .clock(Arc::new(ManualClock::new(NOW)))
            .build()
            .unwrap();
        tracker.create(Some(CODE), &quiet_options()).unwrap();
        tracker
    };

    let first_transport = Arc::new(RecordingTransport::new());
    let first = build(first_transport.clone());
    assert_eq!(first.storage_backend(), "cookie");
    assert!(jar.get("hct", NOW).is_some());
    assert_eq!(first_transport.count(CollectPath::Register), 1);

    let second_transport = Arc::new(RecordingTransport::new());
    let second = build(second_transport.clone());
    assert_eq!(second.session_token(), first.session_token());
    assert_eq!(second.browser_token(), first.browser_token());
    assert!(second_transport.is_empty());
}

#[test]
fn raw_json_stored_state_is_accepted() {
    let storage = Arc::new(MemoryStorage::new());
    let raw = json!({
        "token": "BROWSER1",
        "session_token": "SESS1",
        "session_expired_at": NOW + 60_000,
        "anonym": false,
        "consent_at": NOW - 1_000,
        "expired_at": NOW + 86_400_000,
    });
    storage.set_item("hct", &raw.to_string()).unwrap();

    let h = harness_with("https://shop.example/", storage, quiet_options());
    assert_eq!(h.tracker.session_token(), Some("SESS1"));
    assert_eq!(h.tracker.browser_token(), Some("BROWSER1"));
    assert!(h.tracker.consent_granted());
    assert!(h.transport.is_empty());
}

#[test]
fn corrupted_state_yields_fresh_identity() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set_item("hct", "%%% not base64 %%%").unwrap();

    let h = harness_with("https://shop.example/", storage.clone(), quiet_options());
    assert!(h.tracker.session_token().is_some());
    assert_eq!(h.transport.count(CollectPath::Register), 1);
    // 새 상태로 덮어씀
    let stored = storage.get_item("hct").unwrap().unwrap();
    let state: PersistedState = hct_tracker::codec::decode_stored(&stored).unwrap();
    assert_eq!(state.session_token.as_deref(), h.tracker.session_token());
}

// --- 동의 ---

#[test]
fn anonymized_payloads_carry_no_personal_data() {
    let options = TrackerOptions {
        disable_page_view: true,
        // base64("_ga")
        cookies: "X2dh".to_owned(),
        ..Default::default()
    };
    let jar = CookieJar::new();
    jar.insert("_ga", "GA1.2.3");
    let transport = Arc::new(RecordingTransport::new());
    let mut tracker = TrackerBuilder::new()
        .page(PageContext::new("https://shop.example/?email=a@b.com").unwrap())
        .local_storage(Arc::new(MemoryStorage::new()))
        .cookie_jar(jar)
        .transport(transport.clone())
        .clock(Arc::new(ManualClock::new(NOW)))
        .build()
        .unwrap();
    tracker.create(Some(CODE), &options).unwrap();

    tracker.send_event("view", json!({"sku": "A1"}), false);
    let anonymous = last(&transport, CollectPath::Event);
    assert_eq!(anonymous.payload["anonym"], true);
    assert!(anonymous.payload.get("contact").is_none());
    assert!(anonymous.payload.get("external_cookies").is_none());

    tracker.activate(None, None);
    tracker.send_event("view", json!({"sku": "A2"}), false);
    let identified = last(&transport, CollectPath::Event);
    assert_eq!(identified.payload["anonym"], false);
    assert_eq!(identified.payload["contact"]["hct_e"], "a@b.com");
    assert_eq!(identified.payload["external_cookies"]["_ga"], "GA1.2.3");

    let body = String::from_utf8(identified.body.to_vec()).unwrap();
    let query = decode_body(&body).unwrap();
    assert!(query.contains("contact[hct_e]=a%40b.com"));
}

#[test]
fn repeated_activation_with_same_instant_sends_once() {
    let mut h = harness("https://shop.example/");
    let at = || Some(ConsentInstant::Text("1700000000000".to_owned()));

    h.tracker.activate(at(), None);
    h.tracker.activate(at(), None);

    assert_eq!(h.transport.count(CollectPath::Consent), 1);
    let consent = last(&h.transport, CollectPath::Consent);
    assert_eq!(consent.payload["type"], "activate");
    assert_eq!(consent.payload["consent_at"], 1_700_000_000_000i64);
    // 만료 시각 = 동의 시각 + 쿠키 보존 기간 (395일)
    assert_eq!(
        consent.payload["expired_at"],
        1_700_000_000_000i64 + 395 * 24 * 60 * 60 * 1000
    );
}

#[test]
fn deactivating_anonymous_visitor_sends_nothing() {
    let mut h = harness("https://shop.example/");
    h.transport.take();

    h.tracker.deactivate();
    assert!(h.transport.is_empty());
    assert!(!h.tracker.consent_granted());
}

#[test]
fn deactivate_records_withdrawal_time() {
    let mut h = harness("https://shop.example/");
    h.tracker.activate(None, None);
    h.clock.advance(5_000);
    h.tracker.deactivate();

    let state = h.tracker.stored_state();
    assert_eq!(state.anonym, Some(true));
    assert_eq!(state.expired_at, Some(NOW + 5_000));
    assert_eq!(state.consent_at, None);

    let consent = last(&h.transport, CollectPath::Consent);
    assert_eq!(consent.payload["type"], "deactivate");
    assert_eq!(consent.payload["expired_at"], NOW + 5_000);
}

#[test]
fn consent_gating_disabled_means_identified() {
    let options = TrackerOptions {
        disable_page_view: true,
        with_consent: false,
        ..Default::default()
    };
    let mut h = harness_with("https://shop.example/", Arc::new(MemoryStorage::new()), options);
    assert!(h.tracker.consent_granted());

    h.tracker.activate(None, None);
    h.tracker.deactivate();
    assert_eq!(h.transport.count(CollectPath::Consent), 0);
}

proptest! {
    #[test]
    fn consent_toggles_follow_last_call(ops in proptest::collection::vec(any::<bool>(), 1..16)) {
        let mut h = harness("https://shop.example/");
        let mut identified = false;
        for activate in ops {
            h.clock.advance(1_000);
            let before = h.tracker.stored_state();
            if activate {
                h.tracker.activate(None, None);
                identified = true;
            } else {
                h.tracker.deactivate();
                let after = h.tracker.stored_state();
                if identified {
                    prop_assert_eq!(after.expired_at, Some(h.clock.now_millis()));
                } else {
                    prop_assert_eq!(after.expired_at, before.expired_at);
                }
                identified = false;
            }
            let state = h.tracker.stored_state();
            prop_assert_eq!(state.anonym, Some(!identified));
            prop_assert_eq!(h.tracker.consent_granted(), identified);
        }
    }
}

// --- 이벤트와 연결 ---

#[test]
fn deduplicated_events_send_only_changes() {
    let mut h = harness("https://shop.example/");
    h.transport.take();

    h.tracker.send_event("x", json!({"a": 1}), true);
    h.tracker.send_event("x", json!({"a": 1}), true);
    assert_eq!(h.transport.count(CollectPath::Event), 1);

    h.tracker.send_event("x", json!({"a": 2}), true);
    assert_eq!(h.transport.count(CollectPath::Event), 2);

    let event = last(&h.transport, CollectPath::Event);
    assert_eq!(event.payload["event_name"], "x");
    assert_eq!(event.payload["datas"], json!({"a": 2}));
}

#[test]
fn association_sent_at_most_once_per_session() {
    let mut h = harness("https://shop.example/");
    h.tracker.activate(None, None);

    h.tracker.associate("lead", json!({"email": "a@b.com"}));
    h.tracker.associate("lead", json!({"email": "a@b.com"}));

    assert_eq!(h.transport.count(CollectPath::Associate), 1);
    assert!(h.tracker.is_associated());
    let request = last(&h.transport, CollectPath::Associate);
    assert_eq!(request.payload["association_type"], "lead");
    assert_eq!(request.payload["contact"]["hct_e"], "a@b.com");
}

#[test]
fn deferred_association_replayed_once_after_consent() {
    let mut h = harness("https://shop.example/");
    let mut notifications = h.tracker.subscribe();

    h.tracker.associate("lead", json!({"id": "42"}));
    assert_eq!(h.transport.count(CollectPath::Associate), 0);
    assert!(h.tracker.stored_state().has_deferred_association());

    h.tracker.activate(None, None);
    assert_eq!(h.transport.count(CollectPath::Associate), 1);
    let request = last(&h.transport, CollectPath::Associate);
    assert_eq!(request.payload["contact"]["hct_id_1"], "42");

    h.clock.advance(1_000);
    h.tracker.activate(Some(ConsentInstant::Epoch(NOW + 1_000)), None);
    assert_eq!(h.transport.count(CollectPath::Associate), 1);
    assert!(!h.tracker.stored_state().has_deferred_association());

    let mut associated = 0;
    while let Ok(notification) = notifications.try_recv() {
        if matches!(notification, TrackerNotification::Associated { .. }) {
            associated += 1;
        }
    }
    assert_eq!(associated, 1);
}

#[test]
fn no_tracking_code_sends_nothing() {
    let transport = Arc::new(RecordingTransport::new());
    let mut tracker = TrackerBuilder::new()
        .page(PageContext::new("https://shop.example/?utm_source=x").unwrap())
        .local_storage(Arc::new(MemoryStorage::new()))
        .transport(transport.clone())
        .build()
        .unwrap();
    tracker.create(None, &TrackerOptions::default()).unwrap();
    tracker.activate(None, None);
    tracker.send_event("x", Value::Null, false);
    tracker.associate("lead", json!({}));

    assert!(transport.is_empty());
}

// --- 호스트 이벤트 ---

#[test]
fn password_forms_are_ignored() {
    let options = TrackerOptions {
        disable_page_view: true,
        enable_form_tracking: true,
        ..Default::default()
    };
    let mut h = harness_with("https://shop.example/", Arc::new(MemoryStorage::new()), options);
    h.transport.take();

    let login = FormSubmission::new(vec![
        FormField::new("user", "alice"),
        FormField::new("pw", "secret").with_type("password"),
    ]);
    assert!(!h.tracker.submit_form(&login));
    assert!(h.transport.is_empty());

    let newsletter = FormSubmission::new(vec![FormField::new("email", "a@b.com")]);
    assert!(h.tracker.submit_form(&newsletter));
    let event = last(&h.transport, CollectPath::Event);
    assert_eq!(event.payload["event_name"], "form_submit");
    assert_eq!(event.payload["datas"]["email"], "a@b.com");
}

#[test]
fn form_tracking_disabled_by_default() {
    let mut h = harness("https://shop.example/");
    let form = FormSubmission::new(vec![FormField::new("email", "a@b.com")]);
    assert!(!h.tracker.submit_form(&form));
}

#[test]
fn leave_suppressed_for_same_origin_links() {
    let mut h = harness("https://shop.example/a");
    h.transport.take();

    assert!(!h.tracker.leave(Some("https://shop.example/b")));
    assert!(h.tracker.leave(Some("https://other.example/")));
    assert!(h.tracker.leave(None));
    assert_eq!(h.transport.count(CollectPath::Leave), 2);
}

#[test]
fn htms_sent_when_triggered_with_attribution() {
    let options = TrackerOptions {
        disable_page_view: true,
        trigger_htms: true,
        ..Default::default()
    };
    let h = harness_with(
        "https://shop.example/?utm_campaign=spring",
        Arc::new(MemoryStorage::new()),
        options,
    );
    let htms = last(&h.transport, CollectPath::Htms);
    assert_eq!(htms.payload["htms"]["utm_campaign"], "spring");
}

#[test]
fn navigation_keeps_tokens() {
    let mut h = harness("https://shop.example/");
    let session = h.tracker.session_token().unwrap().to_owned();

    h.tracker
        .navigate(PageContext::new("https://shop.example/checkout").unwrap().with_title("Checkout"));
    h.tracker.send_event("step", json!({"n": 2}), false);

    assert_eq!(h.tracker.session_token(), Some(session.as_str()));
    let event = last(&h.transport, CollectPath::Event);
    assert_eq!(event.payload["url"], "https://shop.example/checkout");
    assert_eq!(event.payload["title"], "Checkout");
}

#[test]
fn query_overrides_are_applied_and_persisted() {
    let h = harness("https://shop.example/?hct_ut[tracking_code]=T2&hct_ut[cookie_expiration]=7");

    assert_eq!(h.tracker.settings().code.as_deref(), Some("T2"));
    assert_eq!(h.tracker.settings().cookie_expiration_days, 7);
    assert!(h.storage.get_item("_hct_ut").unwrap().is_some());
}

#[test]
fn tokens_notification_on_create() {
    let transport = Arc::new(RecordingTransport::new());
    let mut tracker = TrackerBuilder::new()
        .page(PageContext::new("https://shop.example/").unwrap())
        .local_storage(Arc::new(MemoryStorage::new()))
        .transport(transport)
        .build()
        .unwrap();
    let mut notifications = tracker.subscribe();
    tracker.create(Some(CODE), &quiet_options()).unwrap();

    match notifications.try_recv().unwrap() {
        TrackerNotification::TokensUpdated { session_token, .. } => {
            assert_eq!(Some(session_token.as_str()), tracker.session_token());
        }
        other => panic!("unexpected notification: {other:?}"),
    }
}
