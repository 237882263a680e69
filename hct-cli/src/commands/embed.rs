//! `hct embed` command handler

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;
use tracing::debug;

use hct_core::config::HctConfig;
use hct_tracker::{EmbedTokens, build_form_src, form_identifier};

use crate::cli::{Cli, EmbedArgs};
use crate::error::CliError;
use crate::host::{self, Host};
use crate::output::{OutputWriter, Render};

/// Execute the `embed` command.
///
/// The stored tokens are forwarded when present. The tracker is not started.
pub async fn execute(
    args: EmbedArgs,
    cli: &Cli,
    config: HctConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let page = host::page_context(cli)?;
    let host = Host::open(config, true).await?;
    let tracker = host.build(page)?;

    let stored = tracker.stored_state();
    let tokens = match (stored.token, stored.session_token) {
        (Some(browser_token), Some(session_token)) => Some(EmbedTokens {
            browser_token,
            session_token,
        }),
        _ => None,
    };
    let flags: BTreeMap<String, bool> = args.consent.into_iter().collect();
    let src = build_form_src(&args.form_url, &tracker.page().url, tokens.as_ref(), &flags)?;
    let identifier = form_identifier(&args.form_url);
    debug!(form = %args.form_url, identifier = ?identifier, "form src built");

    host.finish(Some(tracker)).await?;

    let report = EmbedReport {
        form_url: args.form_url,
        identifier,
        src,
        tokens_forwarded: tokens.is_some(),
    };
    writer.render(&report)?;
    Ok(())
}

/// Iframe source of an embedded form.
#[derive(Serialize)]
pub struct EmbedReport {
    pub form_url: String,
    pub identifier: Option<String>,
    pub src: String,
    pub tokens_forwarded: bool,
}

impl Render for EmbedReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Form: {}", self.form_url.bold())?;
        writeln!(
            w,
            "  Identifier: {}",
            self.identifier.as_deref().unwrap_or("-")
        )?;
        if !self.tokens_forwarded {
            writeln!(w, "  {}", "No stored tokens: run `hct visit` first".yellow())?;
        }
        writeln!(w, "  Src: {}", self.src)?;
        Ok(())
    }
}
