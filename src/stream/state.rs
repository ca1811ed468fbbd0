//! # Stream State
//! Pure state of one stream session: feed, analysis queue, aggregate stats and
//! the `Idle`/`Streaming` machine. No I/O, no timers; the controller drives it.
//!
//! Invariant: a post is `Analyzing` exactly while it sits in the queue or in an
//! in-flight batch. Draining moves posts out of the queue atomically, so a post is
//! submitted at most once.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::types::{ClassificationResult, Post, Sentiment, SentimentStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Idle,
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Please enter a hashtag to start streaming.")]
    EmptyHashtag,
    #[error("Stream is already running.")]
    AlreadyStreaming,
    #[error("Hashtag can only be changed while the stream is stopped.")]
    HashtagLocked,
    #[error("An API key is required before streaming.")]
    MissingCredential,
    #[error("stream controller is not running")]
    ControllerGone,
}

pub const RATE_LIMIT_MESSAGE: &str =
    "API rate limit reached. Stream stopped. Please wait a moment before starting again.";

/// Posts drained from the queue at one flush, tagged with their session.
#[derive(Debug, Clone)]
pub struct Batch {
    pub session: u64,
    pub posts: Vec<Post>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Outcome of a rate-limited batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitOutcome {
    /// Counts added to the aggregate (batch + locally degraded residual queue).
    pub delta: SentimentStats,
    /// The session was streaming and is now idle.
    pub stopped: bool,
    /// Error banner set by this call (at most once per session).
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamSnapshot {
    pub status: StreamStatus,
    pub hashtag: String,
    pub session: u64,
    pub posts: Vec<Post>,
    pub queue_depth: usize,
    pub in_flight: usize,
    pub stats: SentimentStats,
    pub error: Option<String>,
}

/// Adds a leading `#` if missing. Surrounding whitespace is trimmed.
pub fn normalize_hashtag(raw: &str) -> String {
    let t = raw.trim();
    if t.starts_with('#') {
        t.to_string()
    } else {
        format!("#{t}")
    }
}

fn hashtag_is_blank(tag: &str) -> bool {
    tag.trim().trim_start_matches('#').trim().is_empty()
}

/// Map a batch to terminal sentiments by id. Invalid labels and missing ids become NEUTRAL.
pub fn resolve_batch(batch: &Batch, results: &[ClassificationResult]) -> Vec<(String, Sentiment)> {
    let mut by_id: HashMap<&str, Sentiment> = HashMap::with_capacity(results.len());
    for r in results {
        let s = Sentiment::from_label(&r.sentiment).unwrap_or(Sentiment::Neutral);
        by_id.entry(r.id.as_str()).or_insert(s);
    }
    batch
        .posts
        .iter()
        .map(|p| {
            let s = by_id.get(p.id.as_str()).copied().unwrap_or(Sentiment::Neutral);
            (p.id.clone(), s)
        })
        .collect()
}

#[derive(Debug)]
pub struct StreamState {
    max_posts: usize,
    hashtag: String,
    status: StreamStatus,
    /// Newest first.
    feed: VecDeque<Post>,
    queue: Vec<Post>,
    stats: SentimentStats,
    error: Option<String>,
    session: u64,
    in_flight: usize,
    rate_limit_reported: bool,
}

impl StreamState {
    pub fn new(max_posts: usize, default_hashtag: &str) -> Self {
        let max_posts = max_posts.max(1);
        Self {
            max_posts,
            hashtag: normalize_hashtag(default_hashtag),
            status: StreamStatus::Idle,
            feed: VecDeque::with_capacity(max_posts),
            queue: Vec::new(),
            stats: SentimentStats::default(),
            error: None,
            session: 0,
            in_flight: 0,
            rate_limit_reported: false,
        }
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    pub fn is_streaming(&self) -> bool {
        self.status == StreamStatus::Streaming
    }

    pub fn hashtag(&self) -> &str {
        &self.hashtag
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn stats(&self) -> SentimentStats {
        self.stats
    }

    pub fn feed_len(&self) -> usize {
        self.feed.len()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn set_hashtag(&mut self, raw: &str) -> Result<&str, StreamError> {
        if self.is_streaming() {
            return Err(StreamError::HashtagLocked);
        }
        self.hashtag = normalize_hashtag(raw);
        Ok(&self.hashtag)
    }

    /// Begin a new session. Clears feed, queue, stats and the error banner.
    pub fn start(&mut self, hashtag: Option<&str>) -> Result<(), StreamError> {
        if self.is_streaming() {
            return Err(StreamError::AlreadyStreaming);
        }
        let tag = match hashtag {
            Some(raw) => normalize_hashtag(raw),
            None => self.hashtag.clone(),
        };
        if hashtag_is_blank(&tag) {
            self.error = Some(StreamError::EmptyHashtag.to_string());
            return Err(StreamError::EmptyHashtag);
        }
        self.hashtag = tag;
        self.feed.clear();
        self.queue.clear();
        self.stats = SentimentStats::default();
        self.error = None;
        self.session += 1;
        self.in_flight = 0;
        self.rate_limit_reported = false;
        self.status = StreamStatus::Streaming;
        Ok(())
    }

    /// Go idle and hand back the residual queue for one final flush.
    pub fn stop(&mut self) -> Option<Batch> {
        self.status = StreamStatus::Idle;
        self.drain_queue()
    }

    /// Prepend to the feed (evicting the oldest beyond the cap) and enqueue for analysis.
    pub fn push_post(&mut self, post: Post) {
        self.queue.push(post.clone());
        self.feed.push_front(post);
        while self.feed.len() > self.max_posts {
            self.feed.pop_back();
        }
    }

    /// Take the whole queue. `None` when there is nothing to classify.
    pub fn drain_queue(&mut self) -> Option<Batch> {
        if self.queue.is_empty() {
            return None;
        }
        let posts = std::mem::take(&mut self.queue);
        self.in_flight += posts.len();
        Some(Batch {
            session: self.session,
            posts,
        })
    }

    fn settle(&mut self, batch: &Batch) -> bool {
        let current = batch.session == self.session;
        if current {
            self.in_flight = self.in_flight.saturating_sub(batch.len());
        }
        current
    }

    fn update_feed(&mut self, resolved: &HashMap<&str, Sentiment>) {
        for p in self.feed.iter_mut() {
            if let Some(s) = resolved.get(p.id.as_str()) {
                p.sentiment = *s;
            }
        }
    }

    /// Merge a batch result. Posts evicted from the feed are skipped for the feed but
    /// still counted; batches from an earlier session are not counted.
    pub fn apply_resolution(&mut self, batch: &Batch, resolved: &[(String, Sentiment)]) -> SentimentStats {
        let current = self.settle(batch);
        let map: HashMap<&str, Sentiment> =
            resolved.iter().map(|(id, s)| (id.as_str(), *s)).collect();
        self.update_feed(&map);

        let mut delta = SentimentStats::default();
        for p in &batch.posts {
            delta.record(map.get(p.id.as_str()).copied().unwrap_or(Sentiment::Neutral));
        }
        if current {
            self.stats.merge(&delta);
        }
        delta
    }

    /// Default the whole batch to NEUTRAL.
    pub fn apply_failure(&mut self, batch: &Batch) -> SentimentStats {
        let resolved: Vec<(String, Sentiment)> = batch
            .posts
            .iter()
            .map(|p| (p.id.clone(), Sentiment::Neutral))
            .collect();
        self.apply_resolution(batch, &resolved)
    }

    /// Rate limit: degrade the batch, force `Idle`, degrade the residual queue locally
    /// (no further remote calls) and raise the error banner once per session.
    pub fn apply_rate_limit(&mut self, batch: &Batch) -> RateLimitOutcome {
        let mut out = RateLimitOutcome {
            delta: self.apply_failure(batch),
            ..Default::default()
        };
        if batch.session != self.session {
            return out;
        }
        if self.is_streaming() {
            self.status = StreamStatus::Idle;
            out.stopped = true;
        }
        if let Some(residual) = self.drain_queue() {
            let d = self.apply_failure(&residual);
            out.delta.merge(&d);
        }
        if !self.rate_limit_reported {
            self.rate_limit_reported = true;
            self.error = Some(RATE_LIMIT_MESSAGE.to_string());
            out.error = self.error.clone();
        }
        out
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            status: self.status,
            hashtag: self.hashtag.clone(),
            session: self.session,
            posts: self.feed.iter().cloned().collect(),
            queue_depth: self.queue.len(),
            in_flight: self.in_flight,
            stats: self.stats,
            error: self.error.clone(),
        }
    }
}
