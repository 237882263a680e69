//! `hct visit` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use hct_core::config::HctConfig;

use crate::cli::{Cli, VisitArgs};
use crate::commands::render_delivery;
use crate::error::CliError;
use crate::host::{self, Delivery, Host, StartMode};
use crate::output::{OutputWriter, Render};

/// Execute the `visit` command.
pub async fn execute(
    args: VisitArgs,
    cli: &Cli,
    config: HctConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let page = host::page_context(cli)?;
    let host = Host::open(config, cli.dry_run).await?;
    let tracker = host.start(
        page,
        StartMode::Visit {
            page_view: !args.no_page_view,
        },
    )?;

    let session_token = tracker.session_token().unwrap_or_default().to_owned();
    let browser_token = tracker.browser_token().unwrap_or_default().to_owned();
    let consent = tracker.consent_state().to_string();
    let storage_backend = tracker.storage_backend().to_owned();
    let tracking_disabled = tracker.tracking_disabled();
    info!(session_token = %session_token, consent = %consent, "visit complete");

    let delivery = host.finish(Some(tracker)).await?;
    let report = VisitReport {
        page: cli.page.clone(),
        session_token,
        browser_token,
        consent,
        storage_backend,
        tracking_disabled,
        delivery,
    };
    writer.render(&report)?;
    Ok(())
}

/// Outcome of a page load.
#[derive(Serialize)]
pub struct VisitReport {
    pub page: String,
    pub session_token: String,
    pub browser_token: String,
    pub consent: String,
    pub storage_backend: String,
    pub tracking_disabled: bool,
    #[serde(flatten)]
    pub delivery: Delivery,
}

impl Render for VisitReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Visit: {}", self.page.bold())?;
        writeln!(w, "  Session: {}", self.session_token)?;
        writeln!(w, "  Browser: {}", self.browser_token)?;
        writeln!(w, "  Consent: {}", self.consent)?;
        writeln!(w, "  Storage: {}", self.storage_backend)?;
        if self.tracking_disabled {
            writeln!(w, "  {}", "Do-not-track active: nothing sent".yellow())?;
        }
        render_delivery(&self.delivery, w)
    }
}
