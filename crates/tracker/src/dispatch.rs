//! 이벤트 디스패처 -- 연락처 정규화, 페이로드 보강, 요청 생성
//!
//! 모든 전송 경로(`/register`, `/event`, `/consent` 등)는 같은 보강 단계를 거칩니다.
//! 익명 모드에서는 연락처와 외부 쿠키가 페이로드에서 제거됩니다.

use hct_core::types::{AttributionMap, CollectPath, ContactMap, OutboundRequest};
use serde_json::{Map, Value};
use tracing::debug;

use crate::codec::{encode_body, encode_uri, to_query_string};
use crate::config::TrackerSettings;
use crate::cookie::CookieJar;
use crate::page::PageContext;

/// 전화번호로 모이는 키
const PHONE_KEYS: &[&str] = &["phone", "phonenumber", "phone_number", "mobile", "telephone"];

/// 이메일로 모이는 키
const EMAIL_KEYS: &[&str] = &["email", "e_mail", "mail"];

/// 그대로 유지되는 식별자 키
const ID_KEYS: &[&str] = &["hc_id", "hct_id_1", "hct_id_2", "hct_id_3", "hct_id_4", "hct_id_5"];

/// 저장된 연락처와 새 연락처를 합쳐 정규화합니다. 새 값이 우선합니다.
///
/// - `id` → `hct_id_1`과 `id` 모두 기록
/// - `email`/`e_mail`/`mail` → `hct_e`
/// - 전화번호 계열 → `hct_p` 배열 (중복은 추가하지 않음)
/// - 나머지 키는 그대로
///
/// `incoming`이 객체가 아니면 무시합니다.
pub fn normalize_contact(stored: &ContactMap, incoming: Option<&Value>) -> ContactMap {
    let mut merged = stored.clone();
    if let Some(Value::Object(incoming)) = incoming {
        for (key, value) in incoming {
            merged.insert(key.clone(), value.clone());
        }
    }

    let mut contact = ContactMap::new();
    for (key, value) in merged {
        let key = key.as_str();
        if key == "id" {
            contact.insert("hct_id_1".to_owned(), value.clone());
            contact.insert("id".to_owned(), value);
        } else if ID_KEYS.contains(&key) {
            contact.insert(key.to_owned(), value);
        } else if EMAIL_KEYS.contains(&key) {
            contact.insert("hct_e".to_owned(), value);
        } else if PHONE_KEYS.contains(&key) {
            push_phone(&mut contact, value);
        } else if key == "hct_p" {
            match contact.get("hct_p") {
                None => {
                    contact.insert("hct_p".to_owned(), value);
                }
                Some(_) => push_phone(&mut contact, value),
            }
        } else {
            contact.insert(key.to_owned(), value);
        }
    }
    contact
}

/// `hct_p` 배열에 번호를 추가합니다. 문자열 하나였다면 배열로 바꿉니다.
fn push_phone(contact: &mut ContactMap, value: Value) {
    let numbers = match contact.remove("hct_p") {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single],
    };
    let mut numbers = numbers;
    let incoming = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    };
    for number in incoming {
        if !numbers.contains(&number) {
            numbers.push(number);
        }
    }
    contact.insert("hct_p".to_owned(), Value::Array(numbers));
}

/// 요청 보강에 필요한 현재 상태
pub struct DispatchContext<'a> {
    /// 런타임 설정 (트래킹 코드, 수집 서버 URL, 외부 쿠키 이름)
    pub settings: &'a TrackerSettings,
    /// 호스트 페이지
    pub page: &'a PageContext,
    /// 페이지 쿠키
    pub cookies: &'a CookieJar,
    pub session_token: &'a str,
    pub browser_token: &'a str,
    /// 익명 모드 여부
    pub anonymized: bool,
    /// 현재 세션의 어트리뷰션 맵
    pub attribution: &'a AttributionMap,
    pub now_millis: i64,
}

impl DispatchContext<'_> {
    /// 설정된 외부 쿠키 중 페이지에 있는 것만 모읍니다.
    fn external_cookies(&self) -> Map<String, Value> {
        let names = &self.settings.external_cookies;
        if names.is_empty() {
            return Map::new();
        }
        self.cookies
            .cookies(self.now_millis)
            .into_iter()
            .filter(|cookie| names.contains(&cookie.name))
            .map(|cookie| (cookie.name, Value::String(cookie.value)))
            .collect()
    }
}

/// 페이로드를 보강하고 요청을 만듭니다.
///
/// 트래킹 코드가 없으면 `None`을 반환합니다 (아무것도 전송하지 않음).
pub fn build_request(
    path: CollectPath,
    mut datas: Map<String, Value>,
    contact: &ContactMap,
    ctx: &DispatchContext<'_>,
) -> Option<OutboundRequest> {
    if ctx.anonymized {
        datas.remove("contact");
    } else {
        datas.insert("contact".to_owned(), Value::Object(contact.clone()));
    }

    let Some(url) = ctx.settings.endpoint(path.as_str()) else {
        debug!(path = %path, "no tracking code, request not sent");
        return None;
    };

    if !ctx.anonymized {
        datas.insert(
            "external_cookies".to_owned(),
            Value::Object(ctx.external_cookies()),
        );
    }
    let page = ctx.page;
    datas.insert("token".to_owned(), ctx.browser_token.into());
    datas.insert("session_token".to_owned(), ctx.session_token.into());
    datas.insert(
        "url".to_owned(),
        format!("{}{}", page.url.origin(), page.url.pathname).into(),
    );
    datas.insert("query".to_owned(), page.url.search.clone().into());
    datas.insert("title".to_owned(), page.title.clone().into());
    datas.insert("referrer".to_owned(), encode_uri(&page.referrer).into());
    datas.insert("scr_resolution".to_owned(), page.screen.to_payload());
    datas.insert("anonym".to_owned(), ctx.anonymized.into());
    datas.insert(
        "htms".to_owned(),
        Value::Object(
            ctx.attribution
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        ),
    );

    let query = to_query_string(&datas);
    let body = encode_body(&query);
    Some(OutboundRequest::new(path, url, datas, body))
}
