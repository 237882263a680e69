//! Host environment for one CLI invocation
//!
//! Each `hct` run plays the role of a single page load: the persisted state and the
//! cookie jar are read from `general.data_dir`, the tracker runs against them, and
//! everything is written back when the command finishes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hct_core::backend::{Clock, SystemClock, Transport};
use hct_core::config::HctConfig;
use hct_core::error::{ConfigError, HctError};
use hct_core::types::{CollectPath, OutboundRequest};
use hct_tracker::{
    CookieJar, FileStorage, HttpTransport, PageContext, RecordingTransport, StoredCookie,
    Tracker, TrackerBuilder, TrackerConfig, TransportStats,
};

use crate::cli::Cli;
use crate::error::CliError;

/// File name of the persisted cookie jar inside `general.data_dir`.
pub const COOKIE_FILE: &str = "cookies.json";

/// Load the configuration for a command.
///
/// A missing file is not an error: defaults plus environment overrides are used.
pub async fn load_config(path: &Path) -> Result<HctConfig, CliError> {
    let mut config = match HctConfig::from_file(path).await {
        Ok(config) => config,
        Err(HctError::Config(ConfigError::FileNotFound { .. })) => {
            debug!(path = %path.display(), "config file not found, using defaults");
            HctConfig::default()
        }
        Err(e) => return Err(CliError::Config(e.to_string())),
    };
    config.apply_env_overrides();
    config
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(config)
}

/// Build the host page from the global flags.
pub fn page_context(cli: &Cli) -> Result<PageContext, CliError> {
    let mut page = PageContext::new(&cli.page)
        .map_err(|e| CliError::Command(format!("invalid --page: {e}")))?;
    if let Some(title) = &cli.title {
        page = page.with_title(title.as_str());
    }
    if let Some(referrer) = &cli.referrer {
        page = page.with_referrer(referrer.as_str());
    }
    Ok(page)
}

/// Read the cookie jar from disk. A missing or unreadable file yields an empty jar.
pub async fn load_cookie_jar(path: &Path) -> CookieJar {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CookieJar::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read cookie jar, starting empty");
            return CookieJar::new();
        }
    };
    match serde_json::from_str::<Vec<StoredCookie>>(&content) {
        Ok(cookies) => CookieJar::from_cookies(cookies),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupted cookie jar, starting empty");
            CookieJar::new()
        }
    }
}

/// Write the live cookies of the jar to disk.
pub async fn save_cookie_jar(path: &Path, jar: &CookieJar, now_millis: i64) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(&jar.cookies(now_millis))?;
    tokio::fs::write(path, content).await?;
    Ok(())
}

/// Transport used by the CLI.
///
/// Every request is recorded for the command report; unless running dry, it is
/// also forwarded to the HTTP worker.
pub struct HostTransport {
    recorder: RecordingTransport,
    forward: Mutex<Option<HttpTransport>>,
}

impl HostTransport {
    fn new(forward: Option<HttpTransport>) -> Self {
        Self {
            recorder: RecordingTransport::new(),
            forward: Mutex::new(forward),
        }
    }

    /// Drop the HTTP sender so the worker drains its queue and exits.
    fn close(&self) {
        let mut forward = self.forward.lock().unwrap_or_else(PoisonError::into_inner);
        forward.take();
    }

    fn take_requests(&self) -> Vec<OutboundRequest> {
        self.recorder.take()
    }
}

impl Transport for HostTransport {
    fn name(&self) -> &str {
        "cli"
    }

    fn send(&self, request: OutboundRequest) {
        let forward = self.forward.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(http) = forward.as_ref() {
            http.send(request.clone());
        }
        self.recorder.send(request);
    }
}

/// One request as shown in command output.
#[derive(Debug, Serialize)]
pub struct RequestSummary {
    pub path: CollectPath,
    pub url: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl From<OutboundRequest> for RequestSummary {
    fn from(request: OutboundRequest) -> Self {
        Self {
            path: request.path,
            url: request.url,
            payload: request.payload,
        }
    }
}

/// What left the tracker during a command.
#[derive(Debug, Default, Serialize)]
pub struct Delivery {
    /// Requests in emission order.
    pub requests: Vec<RequestSummary>,
    /// `true` when nothing was sent over the network.
    pub dry_run: bool,
    /// Worker statistics (absent on dry runs).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<u64>,
}

/// How `create` runs for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// A page load: page view and `/htms` as configured.
    Visit { page_view: bool },
    /// Commands other than `visit` only emit what they are asked to.
    Quiet,
}

/// Per-invocation host: storage directory, cookie jar and transport.
pub struct Host {
    config: HctConfig,
    data_dir: PathBuf,
    jar: CookieJar,
    transport: Arc<HostTransport>,
    worker: Option<JoinHandle<TransportStats>>,
    dry_run: bool,
}

impl Host {
    /// Prepare the host. `--dry-run` wins over `transport.dry_run`.
    pub async fn open(config: HctConfig, dry_run: bool) -> Result<Self, CliError> {
        let dry_run = dry_run || config.transport.dry_run;
        let data_dir = PathBuf::from(&config.general.data_dir);
        let jar = load_cookie_jar(&data_dir.join(COOKIE_FILE)).await;

        let (forward, worker) = if dry_run {
            (None, None)
        } else {
            let (http, worker) = HttpTransport::spawn(&config.transport)?;
            (Some(http), Some(worker))
        };
        debug!(data_dir = %data_dir.display(), dry_run, "host opened");

        Ok(Self {
            config,
            data_dir,
            jar,
            transport: Arc::new(HostTransport::new(forward)),
            worker,
            dry_run,
        })
    }

    /// The loaded configuration.
    pub fn config(&self) -> &HctConfig {
        &self.config
    }

    /// Build a tracker on the given page without calling `create`.
    pub fn build(&self, page: PageContext) -> Result<Tracker, CliError> {
        let mut builder = TrackerBuilder::new()
            .config(self.tracker_config(StartMode::Quiet))
            .page(page)
            .cookie_jar(self.jar.clone())
            .transport(Arc::clone(&self.transport) as Arc<dyn Transport>);
        if self.config.storage.local_storage {
            builder = builder.local_storage(Arc::new(FileStorage::new(&self.data_dir)));
        }
        Ok(builder.build()?)
    }

    /// Build and start a tracker on the given page.
    pub fn start(&self, page: PageContext, mode: StartMode) -> Result<Tracker, CliError> {
        let config = self.tracker_config(mode);
        let code = config.code.clone();
        let options = config.options.clone();
        let mut tracker = self.build(page)?;
        tracker.create(code.as_deref(), &options)?;
        Ok(tracker)
    }

    fn tracker_config(&self, mode: StartMode) -> TrackerConfig {
        let mut config = TrackerConfig::from_core(&self.config);
        match mode {
            StartMode::Visit { page_view: true } => {}
            StartMode::Visit { page_view: false } => config.options.disable_page_view = true,
            StartMode::Quiet => {
                config.options.disable_page_view = true;
                config.options.trigger_htms = false;
            }
        }
        config
    }

    /// Persist the cookie jar, flush the transport and report what was sent.
    pub async fn finish(self, tracker: Option<Tracker>) -> Result<Delivery, CliError> {
        let now = SystemClock.now_millis();
        drop(tracker);
        save_cookie_jar(&self.data_dir.join(COOKIE_FILE), &self.jar, now).await?;

        self.transport.close();
        let requests: Vec<RequestSummary> = self
            .transport
            .take_requests()
            .into_iter()
            .map(RequestSummary::from)
            .collect();

        let mut delivery = Delivery {
            requests,
            dry_run: self.dry_run,
            ..Default::default()
        };
        if let Some(worker) = self.worker {
            let stats = worker
                .await
                .map_err(|e| CliError::Command(format!("transport worker failed: {e}")))?;
            info!(sent = stats.sent, failed = stats.failed, "transport drained");
            delivery.sent = Some(stats.sent);
            delivery.failed = Some(stats.failed);
        }
        Ok(delivery)
    }
}
