//! Demo that runs the stream controller against the local keyword classifier
//! on short intervals and prints the resulting dashboard stats.

use std::time::Duration;

use hashtag_sentiment_stream::classifier::{BatchClassifier, MockProvider};
use hashtag_sentiment_stream::config::StreamConfig;
use hashtag_sentiment_stream::mock_posts::MockPostGenerator;
use hashtag_sentiment_stream::presentation::render_dashboard;
use hashtag_sentiment_stream::{CredentialStore, StreamController, StreamEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = StreamConfig {
        post_interval_ms: 200,
        flush_interval_ms: 700,
        ..StreamConfig::default()
    };
    let credentials = CredentialStore::with_key("demo-key")?;
    let (stream, _join) = StreamController::spawn_with_source(
        &cfg,
        BatchClassifier::from_provider(MockProvider),
        credentials,
        Box::new(MockPostGenerator::seeded(2024)),
    );

    let mut events = stream.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(ev) = events.recv().await {
            if let StreamEvent::BatchResolved { size, delta, .. } = ev {
                println!(
                    "batch of {size}: +{} positive, +{} negative, +{} neutral",
                    delta.positive, delta.negative, delta.neutral
                );
            }
        }
    });

    stream.start(Some("RustLang".into())).await?;
    tokio::time::sleep(Duration::from_secs(3)).await;
    stream.stop().await?;
    // let the final flush land
    tokio::time::sleep(Duration::from_millis(200)).await;

    let snap = stream.snapshot().await?;
    let view = render_dashboard(&snap, chrono::Utc::now());
    println!("{}", serde_json::to_string_pretty(&view.charts)?);
    printer.abort();

    println!("stream-demo done");
    Ok(())
}
