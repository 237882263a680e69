//! `hct associate` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use hct_core::config::HctConfig;
use hct_core::types::CollectPath;

use crate::cli::{AssociateArgs, Cli};
use crate::commands::{parse_data, render_delivery};
use crate::error::CliError;
use crate::host::{self, Delivery, Host, StartMode};
use crate::output::{OutputWriter, Render};

/// Execute the `associate` command.
pub async fn execute(
    args: AssociateArgs,
    cli: &Cli,
    config: HctConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let association_type = args.association_type.trim();
    if association_type.is_empty() {
        return Err(CliError::Command(
            "association type must not be empty".to_owned(),
        ));
    }
    let data = parse_data(args.data.as_deref())?;

    let page = host::page_context(cli)?;
    let host = Host::open(config, cli.dry_run).await?;
    let mut tracker = host.start(page, StartMode::Quiet)?;
    tracker.associate(association_type, data);
    let associated = tracker.is_associated();
    let deferred = tracker.stored_state().has_deferred_association();

    let delivery = host.finish(Some(tracker)).await?;
    let sent = delivery
        .requests
        .iter()
        .any(|r| r.path == CollectPath::Associate);
    let outcome = AssociationOutcome::from_flags(sent, associated, deferred);
    info!(association_type, outcome = ?outcome, "associate command complete");

    let report = AssociateReport {
        association_type: association_type.to_owned(),
        outcome,
        delivery,
    };
    writer.render(&report)?;
    Ok(())
}

/// What happened to an association request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationOutcome {
    /// `/associate` went out in this run.
    Sent,
    /// This session was already associated.
    AlreadyAssociated,
    /// The visitor is anonymous; replayed on the next consent.
    Deferred,
    /// Nothing happened (no tracking code).
    Ignored,
}

impl AssociationOutcome {
    fn from_flags(sent: bool, associated: bool, deferred: bool) -> Self {
        if sent {
            Self::Sent
        } else if associated {
            Self::AlreadyAssociated
        } else if deferred {
            Self::Deferred
        } else {
            Self::Ignored
        }
    }
}

/// Outcome of an association.
#[derive(Serialize)]
pub struct AssociateReport {
    pub association_type: String,
    pub outcome: AssociationOutcome,
    #[serde(flatten)]
    pub delivery: Delivery,
}

impl Render for AssociateReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let outcome = match self.outcome {
            AssociationOutcome::Sent => "SENT".green().bold(),
            AssociationOutcome::AlreadyAssociated => "ALREADY ASSOCIATED".dimmed(),
            AssociationOutcome::Deferred => "DEFERRED until consent".yellow().bold(),
            AssociationOutcome::Ignored => "IGNORED (no tracking code)".yellow(),
        };
        writeln!(w, "Associate {}: {}", self.association_type.bold(), outcome)?;
        render_delivery(&self.delivery, w)
    }
}
