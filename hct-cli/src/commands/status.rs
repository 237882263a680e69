//! `hct status` command handler

use std::io::Write;

use serde::Serialize;
use tracing::debug;

use hct_core::backend::{Clock, SystemClock};
use hct_core::config::HctConfig;
use hct_core::types::PersistedState;

use crate::cli::Cli;
use crate::commands::consent::format_millis;
use crate::error::CliError;
use crate::host::{self, Host};
use crate::output::{OutputWriter, Render};

/// Execute the `status` command.
///
/// Reads the persisted state without starting the tracker, so nothing is sent
/// and no token is minted.
pub async fn execute(cli: &Cli, config: HctConfig, writer: &OutputWriter) -> Result<(), CliError> {
    let page = host::page_context(cli)?;
    // status는 요청을 보내지 않으므로 항상 dry-run
    let host = Host::open(config, true).await?;
    let tracker = host.build(page)?;

    let stored = tracker.stored_state();
    let now = SystemClock.now_millis();
    let report = StatusReport {
        tracking_code: tracker.settings().code.clone(),
        app_url: tracker.settings().app_url.clone(),
        storage_backend: tracker.storage_backend().to_owned(),
        consent: tracker.consent_state().to_string(),
        tracking_disabled: tracker.tracking_disabled(),
        identity: IdentitySummary::from_state(&stored, now),
    };
    debug!(consent = %report.consent, "status collected");

    host.finish(Some(tracker)).await?;
    writer.render(&report)?;
    Ok(())
}

/// Tracker and stored-state summary.
#[derive(Serialize)]
pub struct StatusReport {
    pub tracking_code: Option<String>,
    pub app_url: String,
    pub storage_backend: String,
    pub consent: String,
    pub tracking_disabled: bool,
    pub identity: IdentitySummary,
}

/// Identity fields of the persisted state.
#[derive(Debug, Default, Serialize)]
pub struct IdentitySummary {
    pub browser_token: Option<String>,
    pub session_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_expires_at: Option<String>,
    /// The stored session is still usable.
    pub session_active: bool,
    pub browser_registered: bool,
    /// Session that already sent `/associate`.
    pub associated_session: Option<String>,
    pub deferred_association: Option<String>,
    /// Attribution parameters captured for the current session.
    pub attribution: Vec<String>,
}

impl IdentitySummary {
    pub fn from_state(state: &PersistedState, now_millis: i64) -> Self {
        let attribution = state
            .session_token
            .as_deref()
            .map(|token| state.attribution(token).into_keys().collect())
            .unwrap_or_default();
        Self {
            browser_token: state.token.clone(),
            session_token: state.session_token.clone(),
            session_expires_at: state.session_expired_at.map(format_millis),
            session_active: state.session_token.is_some()
                && state.session_expired_at.is_some_and(|at| at > now_millis),
            browser_registered: state.browser_registered.unwrap_or(false),
            associated_session: state.associate.clone(),
            deferred_association: state.association_type.clone(),
            attribution,
        }
    }
}

impl Render for StatusReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{}", "HCT Status".bold())?;
        match self.tracking_code {
            Some(ref code) => writeln!(w, "  Tracking code: {}", code)?,
            None => writeln!(w, "  Tracking code: {}", "not configured".yellow())?,
        }
        writeln!(w, "  Collector:     {}", self.app_url)?;
        writeln!(w, "  Storage:       {}", self.storage_backend)?;
        writeln!(w, "  Consent:       {}", self.consent)?;
        if self.tracking_disabled {
            writeln!(w, "  {}", "Do-not-track active".yellow())?;
        }

        let id = &self.identity;
        writeln!(w)?;
        writeln!(w, "{}", "Identity".bold())?;
        writeln!(
            w,
            "  Browser token: {}",
            id.browser_token.as_deref().unwrap_or("-")
        )?;
        let session_state = if id.session_active {
            "active".green()
        } else {
            "expired".red()
        };
        match id.session_token {
            Some(ref token) => writeln!(w, "  Session token: {} ({})", token, session_state)?,
            None => writeln!(w, "  Session token: -")?,
        }
        if let Some(ref at) = id.session_expires_at {
            writeln!(w, "  Session until: {}", at)?;
        }
        writeln!(w, "  Registered:    {}", id.browser_registered)?;
        if let Some(ref session) = id.associated_session {
            writeln!(w, "  Associated:    {}", session)?;
        }
        if let Some(ref kind) = id.deferred_association {
            writeln!(w, "  Deferred:      {} (waiting for consent)", kind.yellow())?;
        }
        if !id.attribution.is_empty() {
            writeln!(w, "  Attribution:   {}", id.attribution.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_summary_from_empty_state() {
        let summary = IdentitySummary::from_state(&PersistedState::default(), 0);
        assert!(summary.browser_token.is_none());
        assert!(!summary.session_active);
        assert!(summary.attribution.is_empty());
    }

    #[test]
    fn test_identity_summary_session_expiry() {
        let state = PersistedState {
            token: Some("B".to_owned()),
            session_token: Some("S".to_owned()),
            session_expired_at: Some(2_000),
            browser_registered: Some(true),
            ..Default::default()
        };
        assert!(IdentitySummary::from_state(&state, 1_000).session_active);
        assert!(!IdentitySummary::from_state(&state, 3_000).session_active);
    }

    #[test]
    fn test_status_report_text_without_code() {
        let report = StatusReport {
            tracking_code: None,
            app_url: "https://hct.net-helium.fr".to_owned(),
            storage_backend: "file".to_owned(),
            consent: "anonymous".to_owned(),
            tracking_disabled: false,
            identity: IdentitySummary::default(),
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("not configured"));
        assert!(output.contains("Browser token: -"));
    }
}
