// src/stream/controller.rs
//! Single-writer actor that owns `StreamState`.
//!
//! Commands, the generation tick, the flush tick and batch resolutions are all
//! processed serially by one task. Classifier calls run in spawned tasks and report
//! back through a channel, so a slow call never delays post generation.

use std::time::Duration;

use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::state::{resolve_batch, Batch, StreamError, StreamSnapshot, StreamState};
use crate::classifier::{BatchClassifier, ClassifyError};
use crate::config::StreamConfig;
use crate::credential::CredentialStore;
use crate::metrics::describe_stream_metrics;
use crate::mock_posts::{MockPostGenerator, PostSource};
use crate::types::{ClassificationResult, Post, SentimentStats};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    User,
    RateLimited,
}

/// Broadcast to observers (SSE/tests/demo).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Started { hashtag: String, session: u64 },
    PostGenerated { post: Post },
    BatchFlushed { session: u64, size: usize },
    BatchResolved {
        session: u64,
        size: usize,
        delta: SentimentStats,
        degraded: bool,
    },
    Stopped { reason: StopReason },
    Error { message: String },
}

enum Command {
    Start {
        hashtag: Option<String>,
        reply: oneshot::Sender<Result<StreamSnapshot, StreamError>>,
    },
    Stop {
        reply: oneshot::Sender<StreamSnapshot>,
    },
    SetHashtag {
        hashtag: String,
        reply: oneshot::Sender<Result<String, StreamError>>,
    },
    Snapshot {
        reply: oneshot::Sender<StreamSnapshot>,
    },
}

struct Resolution {
    batch: Batch,
    outcome: Result<Vec<ClassificationResult>, ClassifyError>,
}

/// Cheap, cloneable handle to the controller task.
#[derive(Clone)]
pub struct StreamHandle {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<StreamEvent>,
}

impl StreamHandle {
    pub async fn start(&self, hashtag: Option<String>) -> Result<StreamSnapshot, StreamError> {
        self.request(|reply| Command::Start { hashtag, reply })
            .await?
    }

    /// Go idle; the residual queue is flushed one last time.
    pub async fn stop(&self) -> Result<StreamSnapshot, StreamError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn set_hashtag(&self, hashtag: String) -> Result<String, StreamError> {
        self.request(|reply| Command::SetHashtag { hashtag, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<StreamSnapshot, StreamError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, StreamError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| StreamError::ControllerGone)?;
        rx.await.map_err(|_| StreamError::ControllerGone)
    }
}

pub struct StreamController {
    state: StreamState,
    source: Box<dyn PostSource>,
    classifier: BatchClassifier,
    credentials: CredentialStore,
    post_interval: Duration,
    flush_interval: Duration,
    events: broadcast::Sender<StreamEvent>,
    resolved_tx: mpsc::UnboundedSender<Resolution>,
}

impl StreamController {
    /// Spawn with the random mock generator.
    pub fn spawn(
        cfg: &StreamConfig,
        classifier: BatchClassifier,
        credentials: CredentialStore,
    ) -> (StreamHandle, JoinHandle<()>) {
        Self::spawn_with_source(cfg, classifier, credentials, Box::new(MockPostGenerator::new()))
    }

    pub fn spawn_with_source(
        cfg: &StreamConfig,
        classifier: BatchClassifier,
        credentials: CredentialStore,
        source: Box<dyn PostSource>,
    ) -> (StreamHandle, JoinHandle<()>) {
        describe_stream_metrics();

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (resolved_tx, resolved_rx) = mpsc::unbounded_channel();

        let controller = StreamController {
            state: StreamState::new(cfg.max_posts, &cfg.default_hashtag),
            source,
            classifier,
            credentials,
            post_interval: cfg.post_interval(),
            flush_interval: cfg.flush_interval(),
            events: events.clone(),
            resolved_tx,
        };
        let join = tokio::spawn(controller.run(rx, resolved_rx));
        (StreamHandle { tx, events }, join)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut resolved: mpsc::UnboundedReceiver<Resolution>,
    ) {
        let mut gen_ticker = ticker(self.post_interval);
        let mut flush_ticker = ticker(self.flush_interval);

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd, &mut gen_ticker, &mut flush_ticker),
                    None => break,
                },
                Some(res) = resolved.recv() => self.on_resolution(res),
                _ = gen_ticker.tick(), if self.state.is_streaming() => self.on_generate_tick(),
                _ = flush_ticker.tick(), if self.state.is_streaming() => self.on_flush_tick(),
            }
            gauge!("stream_queue_depth").set(self.state.queue_depth() as f64);
            gauge!("stream_feed_len").set(self.state.feed_len() as f64);
        }
        debug!(target: "stream", "controller stopped: all handles dropped");
    }

    fn on_command(&mut self, cmd: Command, gen_ticker: &mut Interval, flush_ticker: &mut Interval) {
        match cmd {
            Command::Start { hashtag, reply } => {
                let res = self.start(hashtag.as_deref());
                if res.is_ok() {
                    // first tick one full period after start
                    gen_ticker.reset();
                    flush_ticker.reset();
                }
                let _ = reply.send(res.map(|_| self.state.snapshot()));
            }
            Command::Stop { reply } => {
                self.stop();
                let _ = reply.send(self.state.snapshot());
            }
            Command::SetHashtag { hashtag, reply } => {
                let res = self.state.set_hashtag(&hashtag).map(str::to_string);
                let _ = reply.send(res);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
        }
    }

    fn start(&mut self, hashtag: Option<&str>) -> Result<(), StreamError> {
        if !self.credentials.is_present() {
            return Err(StreamError::MissingCredential);
        }
        if let Err(e) = self.state.start(hashtag) {
            warn!(target: "stream", error = %e, "start rejected");
            if e == StreamError::EmptyHashtag {
                self.emit(StreamEvent::Error {
                    message: e.to_string(),
                });
            }
            return Err(e);
        }
        info!(
            target: "stream",
            hashtag = self.state.hashtag(),
            session = self.state.session(),
            "stream started"
        );
        self.emit(StreamEvent::Started {
            hashtag: self.state.hashtag().to_string(),
            session: self.state.session(),
        });
        Ok(())
    }

    fn stop(&mut self) {
        let was_streaming = self.state.is_streaming();
        if let Some(batch) = self.state.stop() {
            self.dispatch(batch);
        }
        if was_streaming {
            info!(target: "stream", session = self.state.session(), "stream stopped");
            self.emit(StreamEvent::Stopped {
                reason: StopReason::User,
            });
        }
    }

    fn on_generate_tick(&mut self) {
        let post = self.source.next_post(self.state.hashtag());
        counter!("stream_posts_generated_total").increment(1);
        self.state.push_post(post.clone());
        self.emit(StreamEvent::PostGenerated { post });
    }

    fn on_flush_tick(&mut self) {
        if let Some(batch) = self.state.drain_queue() {
            self.dispatch(batch);
        }
    }

    /// Hand a drained batch to the classifier in its own task.
    fn dispatch(&mut self, batch: Batch) {
        counter!("stream_batches_flushed_total").increment(1);
        debug!(target: "stream", session = batch.session, size = batch.len(), "flushing batch");
        self.emit(StreamEvent::BatchFlushed {
            session: batch.session,
            size: batch.len(),
        });

        let classifier = self.classifier.clone();
        let credential = self.credentials.get();
        let tx = self.resolved_tx.clone();
        tokio::spawn(async move {
            let outcome = classifier
                .classify_batch(&batch.posts, credential.as_ref())
                .await;
            // receiver gone means the controller shut down
            let _ = tx.send(Resolution { batch, outcome });
        });
    }

    fn on_resolution(&mut self, res: Resolution) {
        let Resolution { batch, outcome } = res;
        match outcome {
            Ok(results) => {
                let resolved = resolve_batch(&batch, &results);
                let delta = self.state.apply_resolution(&batch, &resolved);
                record_resolved(&delta);
                self.emit(StreamEvent::BatchResolved {
                    session: batch.session,
                    size: batch.len(),
                    delta,
                    degraded: false,
                });
            }
            Err(ClassifyError::RateLimited) => {
                let out = self.state.apply_rate_limit(&batch);
                record_resolved(&out.delta);
                self.emit(StreamEvent::BatchResolved {
                    session: batch.session,
                    size: batch.len(),
                    delta: out.delta,
                    degraded: true,
                });
                if out.stopped {
                    warn!(target: "stream", session = batch.session, "rate limited; stream stopped");
                    self.emit(StreamEvent::Stopped {
                        reason: StopReason::RateLimited,
                    });
                }
                if let Some(message) = out.error {
                    self.emit(StreamEvent::Error { message });
                }
            }
        }
    }

    fn emit(&self, ev: StreamEvent) {
        // no subscribers is fine
        let _ = self.events.send(ev);
    }
}

fn ticker(period: Duration) -> Interval {
    let mut t = time::interval_at(time::Instant::now() + period, period);
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    t
}

fn record_resolved(delta: &SentimentStats) {
    counter!("stream_posts_resolved_total", "sentiment" => "positive").increment(delta.positive);
    counter!("stream_posts_resolved_total", "sentiment" => "negative").increment(delta.negative);
    counter!("stream_posts_resolved_total", "sentiment" => "neutral").increment(delta.neutral);
}
