//! Integration tests for the page-load commands.
//!
//! Every command runs dry against a temporary data directory, the same way two
//! consecutive `hct` invocations share state on disk.

use std::path::Path;

use clap::Parser;
use tempfile::TempDir;

use hct_cli::cli::{Cli, Commands};
use hct_cli::commands;
use hct_cli::host::{COOKIE_FILE, Host};
use hct_cli::output::OutputWriter;
use hct_core::config::HctConfig;
use hct_core::types::PersistedState;
use hct_tracker::PageContext;

fn config_for(dir: &Path, local_storage: bool) -> HctConfig {
    let mut config = HctConfig::default();
    config.general.data_dir = dir.display().to_string();
    config.tracker.code = "CODE".to_owned();
    config.storage.local_storage = local_storage;
    config.transport.dry_run = true;
    config
}

async fn run(argv: &[&str], config: HctConfig) -> Result<(), hct_cli::error::CliError> {
    let mut full = vec!["hct", "--dry-run", "--output", "json"];
    full.extend_from_slice(argv);
    let cli = Cli::try_parse_from(full).expect("parse succeeded");
    let writer = OutputWriter::new(cli.output);
    match cli.command.clone() {
        Commands::Visit(args) => commands::visit::execute(args, &cli, config, &writer).await,
        Commands::Event(args) => commands::event::execute(args, &cli, config, &writer).await,
        Commands::Consent(args) => commands::consent::execute(args, &cli, config, &writer).await,
        Commands::Associate(args) => {
            commands::associate::execute(args, &cli, config, &writer).await
        }
        Commands::Leave(args) => commands::leave::execute(args, &cli, config, &writer).await,
        Commands::Status => commands::status::execute(&cli, config, &writer).await,
        Commands::Embed(args) => commands::embed::execute(args, &cli, config, &writer).await,
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    }
}

async fn stored(config: HctConfig) -> PersistedState {
    let host = Host::open(config, true).await.expect("open host");
    let page = PageContext::new("http://localhost/").expect("page");
    let state = host.build(page).expect("build").stored_state();
    host.finish(None).await.expect("finish");
    state
}

#[tokio::test]
async fn test_visit_persists_tokens_and_reuses_session() {
    let dir = TempDir::new().expect("should create temp dir");

    run(&["visit"], config_for(dir.path(), true)).await.expect("first visit");
    let first = stored(config_for(dir.path(), true)).await;
    assert!(first.token.is_some());
    assert!(first.session_token.is_some());

    run(&["visit"], config_for(dir.path(), true)).await.expect("second visit");
    let second = stored(config_for(dir.path(), true)).await;
    assert_eq!(second.token, first.token);
    assert_eq!(second.session_token, first.session_token);
}

#[tokio::test]
async fn test_cookie_only_storage_survives_invocations() {
    let dir = TempDir::new().expect("should create temp dir");

    run(&["visit"], config_for(dir.path(), false)).await.expect("first visit");
    assert!(dir.path().join(COOKIE_FILE).exists(), "cookie jar should be saved");
    assert!(!dir.path().join("hct").exists(), "no file storage when disabled");

    let first = stored(config_for(dir.path(), false)).await;
    run(&["visit"], config_for(dir.path(), false)).await.expect("second visit");
    let second = stored(config_for(dir.path(), false)).await;
    assert!(first.session_token.is_some());
    assert_eq!(second.session_token, first.session_token);
}

#[tokio::test]
async fn test_status_does_not_mint_tokens() {
    let dir = TempDir::new().expect("should create temp dir");
    run(&["status"], config_for(dir.path(), true)).await.expect("status");
    let state = stored(config_for(dir.path(), true)).await;
    assert!(state.token.is_none());
    assert!(state.session_token.is_none());
}

#[tokio::test]
async fn test_consent_activate_records_timestamp() {
    let dir = TempDir::new().expect("should create temp dir");
    run(&["consent", "activate", "--at", "1700000000000"], config_for(dir.path(), true))
        .await
        .expect("activate");

    let state = stored(config_for(dir.path(), true)).await;
    assert_eq!(state.consent_at, Some(1_700_000_000_000));
    assert_eq!(state.anonym, Some(false));
}

#[tokio::test]
async fn test_association_waits_for_consent() {
    let dir = TempDir::new().expect("should create temp dir");

    run(
        &["associate", "lead", "--data", r#"{"email":"a@b.com"}"#],
        config_for(dir.path(), true),
    )
    .await
    .expect("associate");
    let deferred = stored(config_for(dir.path(), true)).await;
    assert_eq!(deferred.association_type.as_deref(), Some("lead"));
    assert!(deferred.associate.is_none());

    run(&["consent", "activate"], config_for(dir.path(), true))
        .await
        .expect("activate");
    let replayed = stored(config_for(dir.path(), true)).await;
    assert!(replayed.association_type.is_none());
    assert_eq!(replayed.associate, replayed.session_token);
}

#[tokio::test]
async fn test_event_rejects_non_object_data() {
    let dir = TempDir::new().expect("should create temp dir");
    let err = run(&["event", "signup", "--data", "[1]"], config_for(dir.path(), true))
        .await
        .expect_err("array data should be rejected");
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn test_invalid_page_url_is_command_error() {
    let dir = TempDir::new().expect("should create temp dir");
    let err = run(&["visit", "--page", "not a url"], config_for(dir.path(), true))
        .await
        .expect_err("page must be absolute");
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn test_embed_without_visit_still_builds_src() {
    let dir = TempDir::new().expect("should create temp dir");
    run(
        &[
            "embed",
            "https://connect.example/fpl/signup",
            "--consent",
            "analytics=true",
        ],
        config_for(dir.path(), true),
    )
    .await
    .expect("embed");
    let state = stored(config_for(dir.path(), true)).await;
    assert!(state.token.is_none(), "embed must not start the tracker");
}
