//! `hct` -- visitor identity and consent tracker CLI

use std::process;

use clap::Parser;
use colored::Colorize;
use tracing::debug;

use hct_cli::cli::{Cli, Commands};
use hct_cli::commands;
use hct_cli::error::CliError;
use hct_cli::host;
use hct_cli::logging::init_tracing;
use hct_cli::metrics::install_metrics_recorder;
use hct_cli::output::OutputWriter;
use hct_core::config::HctConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 설정 오류는 명령 실행 시점에 보고하고, 로깅은 기본값으로 시작
    let loaded = host::load_config(&cli.config).await;
    let mut general = loaded
        .as_ref()
        .map(|config| config.general.clone())
        .unwrap_or_default();
    if let Some(ref level) = cli.log_level {
        general.log_level = level.clone();
    }
    init_tracing(&general)?;
    let metrics = install_metrics_recorder()?;
    debug!(config = %cli.config.display(), "hct starting");

    let result = run(&cli, loaded).await;
    if cli.metrics {
        eprint!("{}", metrics.render());
    }
    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        process::exit(e.exit_code());
    }
    Ok(())
}

async fn run(cli: &Cli, loaded: Result<HctConfig, CliError>) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);

    match cli.command.clone() {
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
        Commands::Visit(args) => commands::visit::execute(args, cli, loaded?, &writer).await,
        Commands::Event(args) => commands::event::execute(args, cli, loaded?, &writer).await,
        Commands::Consent(args) => commands::consent::execute(args, cli, loaded?, &writer).await,
        Commands::Associate(args) => {
            commands::associate::execute(args, cli, loaded?, &writer).await
        }
        Commands::Leave(args) => commands::leave::execute(args, cli, loaded?, &writer).await,
        Commands::Status => commands::status::execute(cli, loaded?, &writer).await,
        Commands::Embed(args) => commands::embed::execute(args, cli, loaded?, &writer).await,
    }
}
