//! `hct event` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use hct_core::config::HctConfig;
use hct_core::types::CollectPath;

use crate::cli::{Cli, EventArgs};
use crate::commands::{parse_data, render_delivery};
use crate::error::CliError;
use crate::host::{self, Delivery, Host, StartMode};
use crate::output::{OutputWriter, Render};

/// Execute the `event` command.
pub async fn execute(
    args: EventArgs,
    cli: &Cli,
    config: HctConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let name = args.name.trim();
    if name.is_empty() {
        return Err(CliError::Command("event name must not be empty".to_owned()));
    }
    let data = parse_data(args.data.as_deref())?;

    let page = host::page_context(cli)?;
    let host = Host::open(config, cli.dry_run).await?;
    let mut tracker = host.start(page, StartMode::Quiet)?;
    tracker.send_event(name, data, args.dedupe);

    let delivery = host.finish(Some(tracker)).await?;
    let sent = delivery
        .requests
        .iter()
        .any(|r| r.path == CollectPath::Event);
    info!(event = name, sent, dedupe = args.dedupe, "event command complete");

    let report = EventReport {
        event: name.to_owned(),
        sent,
        dedupe: args.dedupe,
        delivery,
    };
    writer.render(&report)?;
    Ok(())
}

/// Outcome of a custom event.
#[derive(Serialize)]
pub struct EventReport {
    pub event: String,
    /// `false` when the event was deduplicated or no tracking code is configured.
    pub sent: bool,
    pub dedupe: bool,
    #[serde(flatten)]
    pub delivery: Delivery,
}

impl Render for EventReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let status = if self.sent {
            "SENT".green().bold()
        } else if self.dedupe {
            "SKIPPED (duplicate)".yellow().bold()
        } else {
            "SKIPPED".yellow().bold()
        };
        writeln!(w, "Event {}: {}", self.event.bold(), status)?;
        render_delivery(&self.delivery, w)
    }
}
