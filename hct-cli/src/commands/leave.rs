//! `hct leave` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use hct_core::config::HctConfig;

use crate::cli::{Cli, LeaveArgs};
use crate::commands::render_delivery;
use crate::error::CliError;
use crate::host::{self, Delivery, Host, StartMode};
use crate::output::{OutputWriter, Render};

/// Execute the `leave` command.
pub async fn execute(
    args: LeaveArgs,
    cli: &Cli,
    config: HctConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let page = host::page_context(cli)?;
    let host = Host::open(config, cli.dry_run).await?;
    let mut tracker = host.start(page, StartMode::Quiet)?;
    let sent = tracker.leave(args.link.as_deref());
    info!(sent, link = args.link.as_deref().unwrap_or("-"), "leave command complete");

    let delivery = host.finish(Some(tracker)).await?;
    let report = LeaveReport {
        link: args.link,
        sent,
        delivery,
    };
    writer.render(&report)?;
    Ok(())
}

/// Outcome of leaving the page.
#[derive(Serialize)]
pub struct LeaveReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// `false` for same-origin navigation.
    pub sent: bool,
    #[serde(flatten)]
    pub delivery: Delivery,
}

impl Render for LeaveReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.sent {
            writeln!(w, "Leave: {}", "SENT".green().bold())?;
        } else {
            writeln!(w, "Leave: {}", "SKIPPED (same-origin link)".yellow())?;
        }
        if let Some(ref link) = self.link {
            writeln!(w, "  Link: {}", link)?;
        }
        render_delivery(&self.delivery, w)
    }
}
