//! Hashtag Sentiment Stream: binary entrypoint
//! Boots the Axum HTTP server with the stream controller and credential gate.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs, filter from RUST_LOG (default: this crate at info, others warn).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hashtag_sentiment_stream=info,stream=info,classifier=info,credential=info,warn"));

    // Shuttle may already have installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    // Enables GEMINI_API_KEY / STREAM_* / CLASSIFIER_TEST_MODE from .env.
    let _ = dotenvy::dotenv();

    init_tracing();

    let router = hashtag_sentiment_stream::app().await?;
    Ok(router.into())
}
