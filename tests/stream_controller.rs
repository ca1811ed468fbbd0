// tests/stream_controller.rs
//
// Timer-driven behaviour of the stream controller on a paused tokio clock.
// Intervals: generate every 1s, flush every 2.5s (no tick collisions before 5s).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use hashtag_sentiment_stream::classifier::{
    BatchClassifier, FailingProvider, MockProvider, PostText, ProviderError, SentimentProvider,
};
use hashtag_sentiment_stream::config::StreamConfig;
use hashtag_sentiment_stream::credential::{Credential, CredentialStore};
use hashtag_sentiment_stream::mock_posts::PostSource;
use hashtag_sentiment_stream::stream::{
    StopReason, StreamController, StreamError, StreamEvent, StreamHandle, StreamStatus,
    RATE_LIMIT_MESSAGE,
};
use hashtag_sentiment_stream::types::{ClassificationResult, Post, Sentiment, SentimentStats};
use tokio::sync::broadcast;
use tokio::time::sleep;

/// Sequential ids p1, p2, ...
struct SeqSource(u32);

impl PostSource for SeqSource {
    fn next_post(&mut self, hashtag: &str) -> Post {
        self.0 += 1;
        Post {
            id: format!("p{}", self.0),
            author: "@tester".into(),
            content: format!("post about {hashtag}"),
            created_at: Utc::now(),
            sentiment: Sentiment::Analyzing,
        }
    }
}

/// Answers only for the first item of each batch.
struct FirstOnlyPositive;

#[async_trait::async_trait]
impl SentimentProvider for FirstOnlyPositive {
    async fn classify(
        &self,
        items: &[PostText],
        _credential: &Credential,
    ) -> Result<Vec<ClassificationResult>, ProviderError> {
        Ok(items
            .iter()
            .take(1)
            .map(|it| ClassificationResult {
                id: it.id.clone(),
                sentiment: "POSITIVE".into(),
            })
            .collect())
    }
    fn name(&self) -> &'static str {
        "first-only"
    }
}

/// Sleeps before answering NEGATIVE for everything; records submitted ids.
struct SlowProvider {
    delay: Duration,
    submitted: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl SentimentProvider for SlowProvider {
    async fn classify(
        &self,
        items: &[PostText],
        _credential: &Credential,
    ) -> Result<Vec<ClassificationResult>, ProviderError> {
        self.submitted
            .lock()
            .unwrap()
            .extend(items.iter().map(|it| it.id.clone()));
        tokio::time::sleep(self.delay).await;
        Ok(items
            .iter()
            .map(|it| ClassificationResult {
                id: it.id.clone(),
                sentiment: "NEGATIVE".into(),
            })
            .collect())
    }
    fn name(&self) -> &'static str {
        "slow"
    }
}

fn cfg(max_posts: usize, flush_ms: u64) -> StreamConfig {
    StreamConfig {
        post_interval_ms: 1_000,
        flush_interval_ms: flush_ms,
        max_posts,
        ..StreamConfig::default()
    }
}

fn spawn_with<P: SentimentProvider>(config: &StreamConfig, provider: P) -> StreamHandle {
    let creds = CredentialStore::with_key("test-key").unwrap();
    let (handle, _join) = StreamController::spawn_with_source(
        config,
        BatchClassifier::from_provider(provider),
        creds,
        Box::new(SeqSource(0)),
    );
    handle
}

fn drain(rx: &mut broadcast::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn posts_are_generated_batched_and_resolved() {
    let stream = spawn_with(&cfg(50, 2_500), MockProvider);
    stream.start(Some("rust".into())).await.unwrap();

    sleep(Duration::from_millis(2_600)).await;

    let snap = stream.snapshot().await.unwrap();
    assert_eq!(snap.status, StreamStatus::Streaming);
    assert_eq!(snap.hashtag, "#rust");
    assert_eq!(snap.posts.len(), 2);
    // newest first
    assert_eq!(snap.posts[0].id, "p2");
    assert!(snap.posts.iter().all(|p| p.sentiment.is_terminal()));
    assert_eq!(snap.stats.total(), 2);
    assert_eq!(snap.queue_depth, 0);
    assert_eq!(snap.in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn missing_ids_default_to_neutral() {
    let stream = spawn_with(&cfg(50, 2_500), FirstOnlyPositive);
    stream.start(Some("rust".into())).await.unwrap();

    sleep(Duration::from_millis(2_600)).await;

    let snap = stream.snapshot().await.unwrap();
    let p1 = snap.posts.iter().find(|p| p.id == "p1").unwrap();
    let p2 = snap.posts.iter().find(|p| p.id == "p2").unwrap();
    assert_eq!(p1.sentiment, Sentiment::Positive);
    assert_eq!(p2.sentiment, Sentiment::Neutral);
    assert_eq!(
        snap.stats,
        SentimentStats {
            positive: 1,
            negative: 0,
            neutral: 1
        }
    );
}

#[tokio::test(start_paused = true)]
async fn rate_limit_stops_stream_and_reports_once() {
    let stream = spawn_with(&cfg(50, 2_500), FailingProvider { rate_limited: true });
    let mut events = stream.subscribe();
    stream.start(Some("rust".into())).await.unwrap();

    sleep(Duration::from_millis(2_600)).await;
    // no further generation once stopped
    sleep(Duration::from_secs(10)).await;

    let snap = stream.snapshot().await.unwrap();
    assert_eq!(snap.status, StreamStatus::Idle);
    assert_eq!(snap.posts.len(), 2);
    assert!(snap.posts.iter().all(|p| p.sentiment == Sentiment::Neutral));
    assert_eq!(snap.stats.neutral, 2);
    assert_eq!(snap.error.as_deref(), Some(RATE_LIMIT_MESSAGE));

    let evs = drain(&mut events);
    let errors = evs
        .iter()
        .filter(|e| matches!(e, StreamEvent::Error { .. }))
        .count();
    let forced = evs
        .iter()
        .filter(|e| {
            matches!(
                e,
                StreamEvent::Stopped {
                    reason: StopReason::RateLimited
                }
            )
        })
        .count();
    assert_eq!(errors, 1);
    assert_eq!(forced, 1);

    // manual restart clears the banner
    let restarted = stream.start(None).await.unwrap();
    assert!(restarted.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn stop_flushes_residual_queue() {
    let stream = spawn_with(&cfg(50, 2_500), MockProvider);
    let mut events = stream.subscribe();
    stream.start(Some("rust".into())).await.unwrap();

    sleep(Duration::from_millis(1_100)).await;
    let stopped = stream.stop().await.unwrap();
    assert_eq!(stopped.status, StreamStatus::Idle);
    assert_eq!(stopped.queue_depth, 0);

    sleep(Duration::from_millis(10)).await;
    let snap = stream.snapshot().await.unwrap();
    assert_eq!(snap.posts.len(), 1);
    assert!(snap.posts[0].sentiment.is_terminal());
    assert_eq!(snap.stats.total(), 1);

    let flushed: Vec<usize> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            StreamEvent::BatchFlushed { size, .. } => Some(size),
            _ => None,
        })
        .collect();
    assert_eq!(flushed, vec![1]);

    // stopping again with an empty queue is a no-op
    stream.stop().await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert!(drain(&mut events)
        .iter()
        .all(|e| !matches!(e, StreamEvent::BatchFlushed { .. })));
}

#[tokio::test(start_paused = true)]
async fn slow_batches_never_block_generation_or_resubmit() {
    let submitted = Arc::new(Mutex::new(Vec::new()));
    let provider = SlowProvider {
        delay: Duration::from_secs(4),
        submitted: submitted.clone(),
    };
    let stream = spawn_with(&cfg(50, 2_500), provider);
    stream.start(Some("rust".into())).await.unwrap();

    sleep(Duration::from_millis(10_100)).await;
    let mid = stream.snapshot().await.unwrap();
    assert_eq!(mid.posts.len(), 10, "generation continued during slow calls");
    assert!(mid.in_flight > 0);

    stream.stop().await.unwrap();
    // trailing responses after stop still land
    sleep(Duration::from_secs(5)).await;

    let snap = stream.snapshot().await.unwrap();
    assert!(snap.posts.iter().all(|p| p.sentiment == Sentiment::Negative));
    assert_eq!(snap.stats.negative, 10);
    assert_eq!(snap.in_flight, 0);

    let ids = submitted.lock().unwrap().clone();
    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(ids.len(), 10);
    assert_eq!(unique.len(), 10, "no post submitted twice");
}

#[tokio::test(start_paused = true)]
async fn feed_cap_and_restart_reset() {
    let stream = spawn_with(&cfg(3, 100_000), MockProvider);
    stream.start(Some("rust".into())).await.unwrap();

    sleep(Duration::from_millis(5_500)).await;
    let snap = stream.snapshot().await.unwrap();
    let ids: Vec<&str> = snap.posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["p5", "p4", "p3"]);
    assert_eq!(snap.queue_depth, 5);

    stream.stop().await.unwrap();
    sleep(Duration::from_millis(10)).await;
    // evicted posts still count once resolved
    assert_eq!(stream.snapshot().await.unwrap().stats.total(), 5);

    let fresh = stream.start(None).await.unwrap();
    assert!(fresh.posts.is_empty());
    assert_eq!(fresh.queue_depth, 0);
    assert_eq!(fresh.stats, SentimentStats::default());
}

#[tokio::test(start_paused = true)]
async fn validation_and_credential_errors() {
    let stream = spawn_with(&cfg(50, 2_500), MockProvider);
    assert_eq!(
        stream.start(Some("   ".into())).await.unwrap_err(),
        StreamError::EmptyHashtag
    );
    assert_eq!(
        stream.snapshot().await.unwrap().status,
        StreamStatus::Idle
    );

    assert_eq!(stream.set_hashtag("golang".into()).await.unwrap(), "#golang");
    stream.start(None).await.unwrap();
    assert_eq!(
        stream.set_hashtag("other".into()).await.unwrap_err(),
        StreamError::HashtagLocked
    );
    assert_eq!(
        stream.start(None).await.unwrap_err(),
        StreamError::AlreadyStreaming
    );

    let (no_key, _join) = StreamController::spawn_with_source(
        &cfg(50, 2_500),
        BatchClassifier::from_provider(MockProvider),
        CredentialStore::new(),
        Box::new(SeqSource(0)),
    );
    assert_eq!(
        no_key.start(Some("rust".into())).await.unwrap_err(),
        StreamError::MissingCredential
    );
}
