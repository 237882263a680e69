//! 폼 임베드 -- 폼 URL 보강과 리사이즈 디바운스
//!
//! 호스트 페이지의 어트리뷰션 파라미터, 도메인, 쿠키 동의 플래그, 트래커 토큰을
//! 폼 iframe URL에 실어 보냅니다.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use hct_core::error::CodecError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::codec::{decode_uri_component, encode_uri_component};
use crate::page::PageUrl;
use crate::query::QueryParams;
use crate::tracker::Tracker;

static FORM_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:fid|forms)/([a-f\d]{24})").expect("form id regex is valid")
});

static FORM_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)fpl/([a-z\d\-_]+)").expect("form slug regex is valid"));

/// 연락처 코드 자리표시자
const CONTACT_PLACEHOLDER: &str = "$CODE_CONTACT$";

/// 자리표시자를 채우는 파라미터
const CONTACT_CODE_PARAM: &str = "hc_contact_code";

/// 호스트 페이지에서 폼으로 넘기는 파라미터 접두사
const FORWARDED_PREFIXES: &[&str] = &["utm_", "hc_"];

/// 리사이즈 디바운스 기본 간격
pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(250);

/// URL의 24자리 16진수 폼 ID (`fid/` 또는 `forms/` 뒤)
pub fn form_id(url: &str) -> Option<String> {
    FORM_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}

/// URL의 폼 슬러그 (`fpl/` 뒤)
pub fn form_slug(url: &str) -> Option<String> {
    FORM_SLUG
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}

/// `host + path` (경로가 `/`이면 호스트만)
pub fn host_path(url: &str) -> Option<String> {
    let url = PageUrl::parse(&decode_uri_component(url)).ok()?;
    if url.pathname == "/" {
        Some(url.host)
    } else {
        Some(format!("{}{}", url.host, url.pathname))
    }
}

/// 폼 식별자: ID → 슬러그 → `host + path` 순
pub fn form_identifier(url: &str) -> Option<String> {
    form_id(url)
        .or_else(|| form_slug(url))
        .or_else(|| host_path(url))
}

/// 폼으로 넘기는 트래커 토큰
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedTokens {
    pub browser_token: String,
    pub session_token: String,
}

impl EmbedTokens {
    /// 트래커의 현재 토큰. 아직 없으면 `None`.
    pub fn from_tracker(tracker: &Tracker) -> Option<Self> {
        Some(Self {
            browser_token: tracker.browser_token()?.to_owned(),
            session_token: tracker.session_token()?.to_owned(),
        })
    }
}

/// 폼 iframe URL을 만듭니다.
///
/// 호스트 페이지의 `utm_*`/`hc_*` 파라미터, `ldom`, `ck-<이름>` 동의 플래그,
/// `hct_browser`/`hct_session`을 붙입니다. 폼 URL에 이미 있는 파라미터가 우선합니다.
pub fn build_form_src(
    form_url: &str,
    page_url: &PageUrl,
    tokens: Option<&EmbedTokens>,
    consent_flags: &BTreeMap<String, bool>,
) -> Result<String, CodecError> {
    let page_query = page_url.query();
    let mut params = QueryParams::default();
    for prefix in FORWARDED_PREFIXES {
        for (key, value) in page_query.iter().filter(|(k, _)| k.starts_with(prefix)) {
            params.insert(key.to_owned(), value.to_owned());
        }
    }
    params.insert("ldom".to_owned(), page_url.host.clone());
    for (name, granted) in consent_flags {
        let flag = if *granted { "1" } else { "0" };
        params.insert(format!("ck-{name}"), flag.to_owned());
    }
    if let Some(tokens) = tokens {
        params.insert("hct_browser".to_owned(), tokens.browser_token.clone());
        params.insert("hct_session".to_owned(), tokens.session_token.clone());
    }

    let processed = match params.get(CONTACT_CODE_PARAM) {
        Some(code) => form_url.replace(CONTACT_PLACEHOLDER, code),
        None => form_url.to_owned(),
    };
    let parsed = PageUrl::parse(&processed)?;
    for (key, value) in parsed.query().iter() {
        params.insert(key.to_owned(), value.to_owned());
    }

    let base = processed.split(['?', '#']).next().unwrap_or_default();
    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={}", encode_uri_component(value)))
        .collect::<Vec<_>>()
        .join("&");
    Ok(format!("{base}?{query}"))
}

/// 폼 iframe으로 보내는 메시지
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbedMessage {
    /// 높이 재계산 요청
    Resize,
}

/// 리사이즈 디바운서
///
/// `notify`가 호출될 때마다 대기 중인 타이머를 취소하고 다시 시작합니다.
/// 타이머가 끝나면 [`EmbedMessage::Resize`] 하나를 출력 채널로 보냅니다.
/// 디바운서를 drop하면 태스크가 종료됩니다.
pub struct ResizeDebouncer {
    trigger: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl ResizeDebouncer {
    /// 기본 간격(250ms)으로 디바운서 태스크를 스폰합니다.
    pub fn spawn(output: mpsc::Sender<EmbedMessage>) -> Self {
        Self::with_delay(output, RESIZE_DEBOUNCE)
    }

    /// 지정한 간격으로 디바운서 태스크를 스폰합니다.
    pub fn with_delay(output: mpsc::Sender<EmbedMessage>, delay: Duration) -> Self {
        let (trigger, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_debouncer(rx, output, delay));
        Self { trigger, task }
    }

    /// 리사이즈 이벤트를 알립니다.
    pub fn notify(&self) {
        if self.trigger.send(()).is_err() {
            debug!("resize debouncer already stopped");
        }
    }

    /// 태스크가 끝났는지 여부
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run_debouncer(
    mut rx: mpsc::UnboundedReceiver<()>,
    output: mpsc::Sender<EmbedMessage>,
    delay: Duration,
) {
    while rx.recv().await.is_some() {
        loop {
            tokio::select! {
                next = rx.recv() => {
                    if next.is_none() {
                        return;
                    }
                }
                _ = tokio::time::sleep(delay) => {
                    if output.send(EmbedMessage::Resize).await.is_err() {
                        debug!("embed message receiver dropped, debouncer stopping");
                        return;
                    }
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifies_forms_by_id_slug_or_host_path() {
        assert_eq!(
            form_identifier("https://connect.example/forms/65A1B2C3D4E5F60718293A4B?x=1"),
            Some("65A1B2C3D4E5F60718293A4B".to_owned())
        );
        assert_eq!(
            form_identifier("https://connect.example/fid/0123456789abcdef01234567"),
            Some("0123456789abcdef01234567".to_owned())
        );
        assert_eq!(
            form_identifier("https://connect.example/fpl/contact-us_2"),
            Some("contact-us_2".to_owned())
        );
        assert_eq!(
            form_identifier("https://connect.example/landing"),
            Some("connect.example/landing".to_owned())
        );
        assert_eq!(
            form_identifier("https://connect.example/"),
            Some("connect.example".to_owned())
        );
        assert_eq!(form_identifier("not a url"), None);
    }

    #[test]
    fn form_src_carries_page_params_and_tokens() {
        let page = PageUrl::parse("https://shop.example/p?utm_source=google&hc_contact_code=C42&foo=1")
            .unwrap();
        let tokens = EmbedTokens {
            browser_token: "B1".to_owned(),
            session_token: "S1".to_owned(),
        };
        let flags = BTreeMap::from([("analytics".to_owned(), true), ("ads".to_owned(), false)]);

        let src = build_form_src(
            "https://connect.example/fpl/signup?contact=$CODE_CONTACT$",
            &page,
            Some(&tokens),
            &flags,
        )
        .unwrap();

        assert_eq!(
            src,
            "https://connect.example/fpl/signup?utm_source=google&hc_contact_code=C42\
             &ldom=shop.example&ck-ads=0&ck-analytics=1&hct_browser=B1&hct_session=S1&contact=C42"
        );
    }

    #[test]
    fn existing_form_params_win() {
        let page = PageUrl::parse("https://shop.example/?utm_source=google").unwrap();
        let src = build_form_src(
            "https://connect.example/fpl/x?utm_source=newsletter&note=a%20b",
            &page,
            None,
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(
            src,
            "https://connect.example/fpl/x?utm_source=newsletter&ldom=shop.example&note=a%20b"
        );
    }

    #[test]
    fn invalid_form_url_is_an_error() {
        let page = PageUrl::parse("https://shop.example/").unwrap();
        assert!(build_form_src("/relative", &page, None, &BTreeMap::new()).is_err());
    }

    #[test]
    fn embed_message_serializes_like_post_message() {
        assert_eq!(
            serde_json::to_string(&EmbedMessage::Resize).unwrap(),
            r#"{"type":"resize"}"#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_coalesces_bursts() {
        let (tx, mut rx) = mpsc::channel(8);
        let debouncer = ResizeDebouncer::spawn(tx);

        for _ in 0..5 {
            debouncer.notify();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        // 마지막 notify 후 100ms: 아직 발화 전
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.recv().await, Some(EmbedMessage::Resize));
        assert!(rx.try_recv().is_err());

        debouncer.notify();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(rx.recv().await, Some(EmbedMessage::Resize));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_debouncer_ends_task() {
        let (tx, mut rx) = mpsc::channel(8);
        let debouncer = ResizeDebouncer::spawn(tx);
        debouncer.notify();
        drop(debouncer);

        // 태스크가 출력 송신자를 들고 끝나므로 채널이 닫힘
        assert_eq!(rx.recv().await, None);
    }
}
