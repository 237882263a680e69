//! `hct consent` command handler

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use hct_core::config::HctConfig;
use hct_core::types::{ConsentInstant, ConsentState, PersistedState};

use crate::cli::{Cli, ConsentAction, ConsentArgs};
use crate::commands::render_delivery;
use crate::error::CliError;
use crate::host::{self, Delivery, Host, StartMode};
use crate::output::{OutputWriter, Render};

/// Execute the `consent` command.
pub async fn execute(
    args: ConsentArgs,
    cli: &Cli,
    config: HctConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let page = host::page_context(cli)?;
    let host = Host::open(config, cli.dry_run).await?;

    let (action, tracker) = match args.action {
        ConsentAction::Activate { at, expire_at } => {
            let mut tracker = host.start(page, StartMode::Quiet)?;
            tracker.activate(
                at.as_deref().map(parse_instant),
                expire_at.as_deref().map(parse_instant),
            );
            ("activate", tracker)
        }
        ConsentAction::Deactivate => {
            let mut tracker = host.start(page, StartMode::Quiet)?;
            tracker.deactivate();
            ("deactivate", tracker)
        }
        // status는 토큰을 만들지 않음
        ConsentAction::Status => ("status", host.build(page)?),
    };

    let gating = tracker.settings().with_consent;
    let state = tracker.consent_state();
    let stored = tracker.stored_state();
    info!(action, consent = %state, "consent command complete");

    let delivery = host.finish(Some(tracker)).await?;
    let report = ConsentReport::new(action, gating, state, &stored, delivery);
    writer.render(&report)?;
    Ok(())
}

/// Parse a consent time argument.
///
/// Integers are epoch milliseconds and RFC 3339 strings are dates. Anything else
/// is passed through as text and read for a leading integer.
pub fn parse_instant(input: &str) -> ConsentInstant {
    let trimmed = input.trim();
    if let Ok(millis) = trimmed.parse::<i64>() {
        return ConsentInstant::Epoch(millis);
    }
    match DateTime::parse_from_rfc3339(trimmed) {
        Ok(date) => ConsentInstant::Date(date.with_timezone(&Utc)),
        Err(_) => ConsentInstant::Text(input.to_owned()),
    }
}

/// Consent state after a command.
#[derive(Serialize)]
pub struct ConsentReport {
    pub action: String,
    /// `false` when `with_consent` is off and the visitor is always identified.
    pub gating: bool,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<String>,
    /// An association is waiting for consent.
    pub association_deferred: bool,
    #[serde(flatten)]
    pub delivery: Delivery,
}

impl ConsentReport {
    fn new(
        action: &str,
        gating: bool,
        state: ConsentState,
        stored: &PersistedState,
        delivery: Delivery,
    ) -> Self {
        Self {
            action: action.to_owned(),
            gating,
            state: state.to_string(),
            consent_at: stored.consent_at.map(format_millis),
            expired_at: stored.expired_at.map(format_millis),
            association_deferred: stored.has_deferred_association(),
            delivery,
        }
    }
}

/// Format epoch milliseconds as RFC 3339, falling back to the raw number.
pub fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|date| date.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

impl Render for ConsentReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let state = match self.state.as_str() {
            "identified" => self.state.green().bold(),
            "anonymous" => self.state.yellow().bold(),
            _ => self.state.dimmed(),
        };
        writeln!(w, "Consent ({}): {}", self.action, state)?;
        if !self.gating {
            writeln!(w, "  Gating: {}", "disabled".dimmed())?;
        }
        if let Some(ref at) = self.consent_at {
            writeln!(w, "  Consented at: {}", at)?;
        }
        if let Some(ref at) = self.expired_at {
            writeln!(w, "  Expires at:   {}", at)?;
        }
        if self.association_deferred {
            writeln!(w, "  Association: {}", "waiting for consent".yellow())?;
        }
        render_delivery(&self.delivery, w)
    }
}
