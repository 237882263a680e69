//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Default host page URL when `--page` is not given.
pub const DEFAULT_PAGE_URL: &str = "http://localhost/";

/// hct -- visitor identity and consent tracker.
///
/// Each invocation behaves like one page load: tokens are restored from
/// `general.data_dir`, the command runs, and the state is written back.
#[derive(Parser, Debug)]
#[command(name = "hct", version, about, long_about = None)]
pub struct Cli {
    /// Path to the hct.toml configuration file.
    #[arg(short, long, global = true, default_value = "hct.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// URL of the host page (query parameters feed attribution and tokens).
    #[arg(long, global = true, default_value = DEFAULT_PAGE_URL)]
    pub page: String,

    /// Document title of the host page.
    #[arg(long, global = true)]
    pub title: Option<String>,

    /// Referrer of the host page.
    #[arg(long, global = true)]
    pub referrer: Option<String>,

    /// Record requests instead of sending them.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Print the Prometheus counters of this invocation to stderr.
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the tracker on the page (sends the page view).
    Visit(VisitArgs),

    /// Send a custom event.
    Event(EventArgs),

    /// Grant, withdraw or inspect consent.
    Consent(ConsentArgs),

    /// Associate the visitor with a contact.
    Associate(AssociateArgs),

    /// Simulate leaving the page.
    Leave(LeaveArgs),

    /// Show tokens, consent and stored state.
    Status,

    /// Manage configuration.
    Config(ConfigArgs),

    /// Build the iframe URL of an embedded form.
    Embed(EmbedArgs),
}

// ---- visit ----

#[derive(Args, Debug, Clone)]
pub struct VisitArgs {
    /// Do not send the page view event.
    #[arg(long)]
    pub no_page_view: bool,
}

// ---- event ----

#[derive(Args, Debug, Clone)]
pub struct EventArgs {
    /// Event name.
    pub name: String,

    /// Event data as a JSON object.
    #[arg(long)]
    pub data: Option<String>,

    /// Skip the event if the same data was already sent in this session.
    #[arg(long)]
    pub dedupe: bool,
}

// ---- consent ----

#[derive(Args, Debug, Clone)]
pub struct ConsentArgs {
    #[command(subcommand)]
    pub action: ConsentAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConsentAction {
    /// Record consent.
    Activate {
        /// Consent time (epoch millis or RFC 3339); defaults to the stored value, else now.
        #[arg(long)]
        at: Option<String>,
        /// Consent expiry (epoch millis or RFC 3339); defaults to consent + cookie expiration.
        #[arg(long)]
        expire_at: Option<String>,
    },
    /// Withdraw consent.
    Deactivate,
    /// Show the current consent state.
    Status,
}

// ---- associate ----

#[derive(Args, Debug, Clone)]
pub struct AssociateArgs {
    /// Association type (e.g. lead, customer).
    pub association_type: String,

    /// Contact data as a JSON object.
    #[arg(long)]
    pub data: Option<String>,
}

// ---- leave ----

#[derive(Args, Debug, Clone)]
pub struct LeaveArgs {
    /// The link that had focus when the page was left.
    #[arg(long)]
    pub link: Option<String>,
}

// ---- config ----

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, tracker, storage, transport).
        #[arg(long)]
        section: Option<String>,
    },
}

// ---- embed ----

#[derive(Args, Debug, Clone)]
pub struct EmbedArgs {
    /// URL of the form to embed.
    pub form_url: String,

    /// Cookie consent flag passed to the form, as `name=true|false`. Repeatable.
    #[arg(long = "consent", value_parser = parse_consent_flag)]
    pub consent: Vec<(String, bool)>,
}

/// Parse a `name=bool` consent flag.
pub fn parse_consent_flag(input: &str) -> Result<(String, bool), String> {
    let (name, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected name=true|false, got '{input}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("consent name must not be empty".to_owned());
    }
    let granted = match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        other => return Err(format!("'{other}' is not a boolean")),
    };
    Ok((name.to_owned(), granted))
}
