// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod classifier;
pub mod config;
pub mod credential;
pub mod metrics;
pub mod mock_posts;
pub mod presentation;
pub mod stream;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::classifier::{BatchClassifier, ClassifyError};
pub use crate::credential::CredentialStore;
pub use crate::stream::{StreamController, StreamEvent, StreamHandle};
pub use crate::types::{Post, Sentiment, SentimentStats};

use axum::Router;
use tracing::info;

use crate::config::StreamConfig;

/// Gate for `/metrics`: DEBUG_ROUTES=1.
fn debug_routes_enabled() -> bool {
    std::env::var("DEBUG_ROUTES").ok().as_deref() == Some("1")
}

/// Build the full application: config, credential gate, classifier, controller task
/// and router. The controller runs until every handle (router included) is dropped.
pub async fn app() -> anyhow::Result<Router> {
    // recorder first so series described by the controller are kept
    let prom = if debug_routes_enabled() {
        Some(crate::metrics::Metrics::init()?)
    } else {
        None
    };

    let cfg = StreamConfig::load_default()?;
    let credentials = CredentialStore::init_from_env();
    let classifier = classifier::build_classifier(&cfg.classifier)?;
    info!(
        target: "stream",
        provider = classifier.provider_name(),
        post_interval_ms = cfg.post_interval_ms,
        flush_interval_ms = cfg.flush_interval_ms,
        max_posts = cfg.max_posts,
        "app configured"
    );

    let (stream, _join) = StreamController::spawn(&cfg, classifier, credentials.clone());
    let mut router = api::router(AppState {
        stream,
        credentials,
    });

    if let Some(m) = prom {
        router = router.merge(m.router());
    }
    Ok(router)
}
