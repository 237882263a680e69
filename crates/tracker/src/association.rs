//! 연결(association)과 이벤트 중복 제거
//!
//! - 연결은 세션당 최대 한 번 전송됩니다.
//! - 익명 모드에서 요청된 연결은 보류되었다가 동의 후 재생됩니다.
//! - 중복 제거 이벤트는 세션별로 마지막 페이로드를 기억합니다.

use std::collections::BTreeMap;

use hct_core::metrics as m;
use hct_core::types::PersistedState;
use serde_json::Value;
use tracing::debug;

use crate::codec::js_stringify;

/// 이벤트 페이로드가 마지막 기록과 다르면 기록하고 `true`를 반환합니다.
///
/// 현재 세션의 기록이 없으면 다른 세션의 기록을 모두 버립니다.
pub fn record_change(state: &mut PersistedState, session_token: &str, event: &str, data: &Value) -> bool {
    if !state.changes.contains_key(session_token) {
        state.changes = BTreeMap::from([(session_token.to_owned(), BTreeMap::new())]);
    }
    let serialized = js_stringify(data);
    let session = state.changes.entry(session_token.to_owned()).or_default();
    if session.get(event) == Some(&serialized) {
        metrics::counter!(m::EVENTS_DEDUPLICATED_TOTAL).increment(1);
        debug!(event, "event payload unchanged, not sent");
        return false;
    }
    session.insert(event.to_owned(), serialized);
    true
}

/// 이 세션에서 이미 연결을 보냈는지 여부
pub fn is_associated(state: &PersistedState, session_token: &str) -> bool {
    state.associate.as_deref() == Some(session_token)
}

/// `associate` 요청의 처리 방식
#[derive(Debug, Clone, PartialEq)]
pub enum AssociationDecision {
    /// 이미 이 세션에서 연결함
    AlreadyAssociated,
    /// 익명 모드 -- 동의 후 재생
    Deferred,
    /// 지금 전송
    Send {
        association_type: String,
        contact: Value,
    },
}

/// 연결 요청을 처리하고 상태를 갱신합니다.
pub fn request_association(
    state: &mut PersistedState,
    session_token: &str,
    anonymized: bool,
    association_type: &str,
    data: Value,
) -> AssociationDecision {
    if is_associated(state, session_token) {
        debug!(association_type, "already associated in this session");
        return AssociationDecision::AlreadyAssociated;
    }
    if anonymized {
        state.association_type = Some(association_type.to_owned());
        state.association_datas = Some(data);
        debug!(association_type, "visitor is anonymous, association deferred");
        return AssociationDecision::Deferred;
    }
    state.associate = Some(session_token.to_owned());
    AssociationDecision::Send {
        association_type: association_type.to_owned(),
        contact: data,
    }
}

/// 보류된 연결을 꺼냅니다. 보류 필드는 항상 지워집니다.
///
/// 이 세션에서 이미 연결했다면 `None`입니다.
pub fn take_deferred(state: &mut PersistedState, session_token: &str) -> Option<(String, Value)> {
    let association_type = state.association_type.take()?;
    let data = state.association_datas.take().unwrap_or(Value::Null);
    if is_associated(state, session_token) {
        debug!(association_type, "deferred association dropped, already associated");
        return None;
    }
    state.associate = Some(session_token.to_owned());
    Some((association_type, data))
}
