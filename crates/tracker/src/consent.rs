//! 동의 컨트롤러 -- 익명/식별 모드 전환과 do-not-track 가드

use hct_core::metrics as m;
use hct_core::types::{ConsentInstant, ConsentState, PersistedState};
use tracing::info;

use crate::config::TrackerSettings;
use crate::page::NavigatorInfo;

/// `activate` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    pub consent_at: i64,
    pub expired_at: i64,
    /// 저장된 동의 시각이 바뀌었음 (`/consent` 전송 대상)
    pub changed: bool,
}

/// 동의 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsentPolicy {
    /// 동의 게이트 사용 여부 (꺼져 있으면 항상 식별 모드)
    pub with_consent: bool,
    /// 브라우저의 do-not-track 신호를 따를지 여부
    pub honor_do_not_track: bool,
    /// 동의 유효 기간 (밀리초)
    pub cookie_expiration_millis: i64,
}

impl ConsentPolicy {
    pub fn from_settings(settings: &TrackerSettings) -> Self {
        Self {
            with_consent: settings.with_consent,
            honor_do_not_track: settings.honor_do_not_track,
            cookie_expiration_millis: settings.cookie_expiration_millis(),
        }
    }

    /// 현재 동의 상태
    pub fn state(&self, state: &PersistedState, now_millis: i64) -> ConsentState {
        ConsentState::derive(state, now_millis, self.with_consent)
    }

    /// 데이터를 익명화해야 하는지 여부
    pub fn anonymized(&self, state: &PersistedState, now_millis: i64) -> bool {
        self.state(state, now_millis).is_anonymized()
    }

    /// do-not-track 가드. 활성화되면 저장과 전송을 모두 하지 않습니다.
    ///
    /// `honor_do_not_track`이 꺼져 있으면 항상 `false`입니다.
    pub fn tracking_disabled(&self, navigator: &NavigatorInfo) -> bool {
        self.honor_do_not_track
            && (navigator.requests_do_not_track() || !navigator.cookie_enabled)
    }

    /// 동의를 기록합니다.
    ///
    /// 동의 시각은 인자 → 저장된 값 → `now` 순으로 정해지고,
    /// 만료 시각은 인자가 없으면 동의 시각 + 쿠키 보존 기간입니다.
    /// 해석할 수 없는 인자는 없는 것으로 취급합니다.
    pub fn activate(
        &self,
        state: &mut PersistedState,
        consent_at: Option<ConsentInstant>,
        expire_at: Option<ConsentInstant>,
        now_millis: i64,
    ) -> Activation {
        let consent_at = consent_at
            .and_then(|at| at.to_epoch_millis())
            .or(state.consent_at)
            .unwrap_or(now_millis);
        let expired_at = expire_at
            .and_then(|at| at.to_epoch_millis())
            .unwrap_or_else(|| consent_at.saturating_add(self.cookie_expiration_millis));
        let changed = state.consent_at != Some(consent_at);

        state.anonym = Some(false);
        state.consent_at = Some(consent_at);
        state.expired_at = Some(expired_at);

        if changed {
            metrics::counter!(m::CONSENT_CHANGES_TOTAL, m::LABEL_TYPE => "activate").increment(1);
            info!(consent_at, expired_at, "consent granted");
        }
        Activation {
            consent_at,
            expired_at,
            changed,
        }
    }

    /// 동의를 철회합니다. 이미 익명이면 `None`, 아니면 새 `expired_at`.
    pub fn deactivate(&self, state: &mut PersistedState, now_millis: i64) -> Option<i64> {
        if state.anonym.unwrap_or(true) {
            return None;
        }
        state.anonym = Some(true);
        state.expired_at = Some(now_millis);
        state.consent_at = None;

        metrics::counter!(m::CONSENT_CHANGES_TOTAL, m::LABEL_TYPE => "deactivate").increment(1);
        info!(expired_at = now_millis, "consent withdrawn");
        Some(now_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;
    const DAY: i64 = 24 * 60 * 60 * 1000;

    fn policy() -> ConsentPolicy {
        ConsentPolicy {
            with_consent: true,
            honor_do_not_track: false,
            cookie_expiration_millis: 395 * DAY,
        }
    }

    #[test]
    fn activate_defaults_to_now_and_cookie_expiration() {
        let mut state = PersistedState {
            anonym: Some(true),
            ..Default::default()
        };
        let activation = policy().activate(&mut state, None, None, NOW);
        assert_eq!(activation.consent_at, NOW);
        assert_eq!(activation.expired_at, NOW + 395 * DAY);
        assert!(activation.changed);
        assert_eq!(state.anonym, Some(false));
        assert!(!policy().anonymized(&state, NOW));
    }

    #[test]
    fn activate_with_same_instant_is_unchanged() {
        let mut state = PersistedState::default();
        let first = policy().activate(&mut state, Some("1700000000000".into()), None, NOW);
        let second = policy().activate(&mut state, Some("1700000000000".into()), None, NOW + 1);
        assert!(first.changed);
        assert!(!second.changed);
    }

    #[test]
    fn activate_without_argument_reuses_stored_consent() {
        let mut state = PersistedState {
            consent_at: Some(NOW - DAY),
            ..Default::default()
        };
        let activation = policy().activate(&mut state, None, None, NOW);
        assert_eq!(activation.consent_at, NOW - DAY);
        assert!(!activation.changed);
    }

    #[test]
    fn unparseable_instants_fall_back() {
        let mut state = PersistedState::default();
        let activation = policy().activate(
            &mut state,
            Some("tomorrow".into()),
            Some("never".into()),
            NOW,
        );
        assert_eq!(activation.consent_at, NOW);
        assert_eq!(activation.expired_at, NOW + 395 * DAY);
    }

    #[test]
    fn explicit_expiry_is_used() {
        let mut state = PersistedState::default();
        let activation = policy().activate(&mut state, Some(NOW.into()), Some((NOW + 5).into()), NOW);
        assert_eq!(activation.expired_at, NOW + 5);
    }

    #[test]
    fn deactivate_only_from_identified() {
        let mut state = PersistedState::default();
        assert_eq!(policy().deactivate(&mut state, NOW), None);

        policy().activate(&mut state, None, None, NOW);
        assert_eq!(policy().deactivate(&mut state, NOW + 1), Some(NOW + 1));
        assert_eq!(state.anonym, Some(true));
        assert_eq!(state.consent_at, None);
        assert_eq!(state.expired_at, Some(NOW + 1));
        assert_eq!(policy().deactivate(&mut state, NOW + 2), None);
    }

    #[test]
    fn gating_disabled_is_never_anonymized() {
        let policy = ConsentPolicy {
            with_consent: false,
            ..policy()
        };
        assert!(!policy.anonymized(&PersistedState::default(), NOW));
        assert_eq!(
            policy.state(&PersistedState::default(), NOW),
            ConsentState::Disabled
        );
    }

    #[test]
    fn do_not_track_only_when_honored() {
        let navigator = NavigatorInfo {
            do_not_track: Some("yes".to_owned()),
            ..NavigatorInfo::native()
        };
        assert!(!policy().tracking_disabled(&navigator));

        let honoring = ConsentPolicy {
            honor_do_not_track: true,
            ..policy()
        };
        assert!(honoring.tracking_disabled(&navigator));
        assert!(!honoring.tracking_disabled(&NavigatorInfo::native()));

        let no_cookies = NavigatorInfo {
            cookie_enabled: false,
            ..NavigatorInfo::native()
        };
        assert!(honoring.tracking_disabled(&no_cookies));
    }
}
