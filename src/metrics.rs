use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder (once per process) and describe all series.
    pub fn init() -> anyhow::Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| PrometheusBuilder::new().install_recorder())?
            .clone();
        describe_stream_metrics();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_stream_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "stream_posts_generated_total",
            "Mock posts emitted into the feed."
        );
        describe_counter!(
            "stream_batches_flushed_total",
            "Non-empty analysis queues handed to the classifier."
        );
        describe_counter!(
            "stream_posts_resolved_total",
            "Posts resolved to a terminal sentiment, by sentiment."
        );
        describe_counter!(
            "classifier_fallback_total",
            "Batches degraded to NEUTRAL, by reason."
        );
        describe_counter!(
            "classifier_rate_limited_total",
            "Batches rejected by the remote service for rate limiting."
        );
        describe_histogram!("classifier_batch_ms", "Remote classification latency in milliseconds.");
        describe_gauge!("stream_queue_depth", "Posts waiting in the analysis queue.");
        describe_gauge!("stream_feed_len", "Posts in the visible feed.");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::{counter, gauge};

    #[test]
    fn crate_series_reach_the_exposition() {
        let m = Metrics::init().unwrap();
        counter!("stream_batches_flushed_total").increment(2);
        gauge!("stream_queue_depth").set(5.0);

        let text = m.handle.render();
        assert!(text.contains("stream_batches_flushed_total 2"), "{text}");
        assert!(text.contains("stream_queue_depth 5"), "{text}");
        assert!(text.contains("# HELP stream_queue_depth"), "{text}");
    }
}
