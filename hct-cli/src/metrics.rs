//! Process-local Prometheus recorder.
//!
//! `hct` runs one page load per invocation, so there is no scrape endpoint:
//! the recorder is installed without a listener and `--metrics` renders
//! the counters of this invocation to stderr once the command finishes.

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global metrics recorder and register metric descriptions.
///
/// This function should be called once per process.
///
/// # Errors
///
/// - Global recorder is already installed
pub fn install_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    hct_core::metrics::describe_all();

    tracing::debug!("prometheus metrics recorder installed");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use hct_core::config::TrackerOptions;
    use hct_core::metrics as m;
    use hct_tracker::{MemoryStorage, PageContext, RecordingTransport, TrackerBuilder};

    #[test]
    fn tracker_counters_render_with_descriptions() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            hct_core::metrics::describe_all();
            let mut tracker = TrackerBuilder::new()
                .page(PageContext::new("https://shop.example/").unwrap())
                .local_storage(Arc::new(MemoryStorage::new()))
                .transport(Arc::new(RecordingTransport::new()))
                .build()
                .unwrap();
            let options = TrackerOptions {
                disable_page_view: true,
                ..Default::default()
            };
            tracker.create(Some("CODE"), &options).unwrap();
            tracker.send_event("signup", serde_json::json!({"plan": "pro"}), true);
            tracker.send_event("signup", serde_json::json!({"plan": "pro"}), true);
        });

        let rendered = handle.render();
        assert!(rendered.contains(&format!("{} 1", m::SESSIONS_MINTED_TOTAL)));
        assert!(rendered.contains(&format!("{} 1", m::EVENTS_DEDUPLICATED_TOTAL)));
        assert!(rendered.contains("# HELP hct_sessions_minted_total Total number of sessions minted"));
    }
}
