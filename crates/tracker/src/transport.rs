//! 전송 계층 -- fire-and-forget HTTP 전송과 기록용 전송
//!
//! [`HttpTransport`]는 bounded `mpsc` 채널 뒤의 백그라운드 태스크가 `reqwest`로 POST합니다.
//! `send`는 블로킹하지 않으며, 채널이 가득 차거나 닫혀 있으면 요청을 버립니다.
//! 모든 송신자가 drop되면 워커는 남은 요청을 보내고 종료합니다.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hct_core::backend::Transport;
use hct_core::config::TransportConfig;
use hct_core::metrics as m;
use hct_core::types::{CollectPath, FORM_CONTENT_TYPE, OutboundRequest};
use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TrackerError;

/// 워커 종료 시 반환되는 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// 2xx 응답을 받은 요청 수
    pub sent: u64,
    /// 네트워크 오류나 2xx 이외 응답
    pub failed: u64,
}

/// HTTP 전송 계층
pub struct HttpTransport {
    tx: mpsc::Sender<OutboundRequest>,
}

impl HttpTransport {
    /// 클라이언트를 만들고 전송 워커를 스폰합니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn spawn(config: &TransportConfig) -> Result<(Self, JoinHandle<TransportStats>), TrackerError> {
        if config.channel_capacity == 0 {
            return Err(TrackerError::Config {
                field: "transport.channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TrackerError::Transport(format!("no tokio runtime: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TrackerError::Transport(format!("failed to build http client: {e}")))?;

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let worker = runtime.spawn(run_worker(client, rx));
        info!(
            capacity = config.channel_capacity,
            timeout_secs = config.request_timeout_secs,
            "http transport started"
        );
        Ok((Self { tx }, worker))
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    fn send(&self, request: OutboundRequest) {
        let path = request.path;
        match self.tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => dropped(path, "channel_full", &request),
            Err(TrySendError::Closed(request)) => dropped(path, "channel_closed", &request),
        }
    }
}

fn dropped(path: CollectPath, reason: &'static str, request: &OutboundRequest) {
    metrics::counter!(
        m::REQUESTS_DROPPED_TOTAL,
        m::LABEL_PATH => path.label(),
        m::LABEL_REASON => reason
    )
    .increment(1);
    warn!(request_id = %request.id, path = %path, reason, "request dropped");
}

async fn run_worker(client: reqwest::Client, mut rx: mpsc::Receiver<OutboundRequest>) -> TransportStats {
    let mut stats = TransportStats::default();
    while let Some(request) = rx.recv().await {
        let path = request.path;
        let result = client
            .post(&request.url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(request.body.clone())
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                stats.sent += 1;
                metrics::counter!(m::REQUESTS_SENT_TOTAL, m::LABEL_PATH => path.label()).increment(1);
                debug!(request_id = %request.id, url = %request.url, status = %response.status(), "request sent");
            }
            Ok(response) => {
                stats.failed += 1;
                metrics::counter!(m::REQUESTS_FAILED_TOTAL, m::LABEL_PATH => path.label()).increment(1);
                debug!(request_id = %request.id, url = %request.url, status = %response.status(), "collector rejected request");
            }
            Err(e) => {
                stats.failed += 1;
                metrics::counter!(m::REQUESTS_FAILED_TOTAL, m::LABEL_PATH => path.label()).increment(1);
                debug!(request_id = %request.id, url = %request.url, error = %e, "request failed");
            }
        }
    }
    debug!(sent = stats.sent, failed = stats.failed, "transport channel closed, worker exiting");
    stats
}

/// 요청을 메모리에 기록만 하는 전송 계층
///
/// 테스트와 dry-run에 사용합니다.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<OutboundRequest>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OutboundRequest>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 기록된 요청 (순서대로)
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.lock().clone()
    }

    /// 주어진 경로의 요청 수
    pub fn count(&self, path: CollectPath) -> usize {
        self.lock().iter().filter(|r| r.path == path).count()
    }

    /// 기록된 요청 수
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 기록을 비우고 지금까지의 요청을 반환합니다.
    pub fn take(&self) -> Vec<OutboundRequest> {
        std::mem::take(&mut *self.lock())
    }
}

impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    fn send(&self, request: OutboundRequest) {
        debug!(request_id = %request.id, path = %request.path, "request recorded");
        self.lock().push(request);
    }
}
