//! `hct config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use hct_core::config::HctConfig;
use hct_core::error::{ConfigError, HctError};

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::host;
use crate::output::{OutputWriter, Render};

/// Sections accepted by `config show --section`.
const SECTIONS: &[&str] = &["general", "tracker", "storage", "transport"];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Execute the config validate subcommand.
///
/// A missing file is reported as valid, since every command falls back to defaults.
///
/// # Errors
///
/// Returns `CliError::Config` if parsing or validation fails.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let source = config_path.display().to_string();
    let report = match HctConfig::load(config_path).await {
        Ok(_) => ConfigValidationReport {
            source,
            valid: true,
            note: None,
            errors: Vec::new(),
        },
        Err(HctError::Config(ConfigError::FileNotFound { .. })) => {
            let errors = match host::load_config(config_path).await {
                Ok(_) => Vec::new(),
                Err(e) => vec![e.to_string()],
            };
            ConfigValidationReport {
                source,
                valid: errors.is_empty(),
                note: Some("file not found, defaults and environment in effect".to_owned()),
                errors,
            }
        }
        Err(e) => ConfigValidationReport {
            source,
            valid: false,
            note: None,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

/// Execute the config show subcommand.
///
/// Displays the effective configuration (file + env overrides + defaults).
///
/// # Errors
///
/// Returns `CliError::Config` if loading fails or `CliError::Command` if the section
/// name is unknown.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = host::load_config(config_path).await?;
    let source = config_path.display().to_string();

    let report = match section {
        Some(section_name) => {
            let config_toml = match section_name.as_str() {
                "general" => to_toml(&config.general),
                "tracker" => to_toml(&config.tracker),
                "storage" => to_toml(&config.storage),
                "transport" => to_toml(&config.transport),
                _ => {
                    return Err(CliError::Command(format!(
                        "unknown section: {} (expected: {})",
                        section_name,
                        SECTIONS.join(", ")
                    )));
                }
            };
            ConfigReport {
                source,
                section: Some(section_name),
                config_toml,
            }
        }
        None => ConfigReport {
            source,
            section: None,
            config_toml: to_toml(&config),
        },
    };

    writer.render(&report)?;

    Ok(())
}

fn to_toml<T: Serialize>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {})", e))
}

/// Configuration display report.
///
/// The `config_toml` field is skipped during JSON serialization (only used for text rendering).
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Serialized TOML configuration
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    /// Whether the configuration is valid
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        if let Some(ref note) = self.note {
            writeln!(w, "  Note: {}", note.dimmed())?;
        }

        Ok(())
    }
}
