// src/classifier/mod.rs
//! Batch classifier: provider abstraction + degrade policy.
//!
//! `SentimentProvider` does the real remote call and reports every failure.
//! `BatchClassifier` wraps a provider and applies the policy the stream relies on:
//! empty batch → no call, no credential → all NEUTRAL, rate limit → `ClassifyError`,
//! anything else → all NEUTRAL.

pub mod gemini;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::ClassifierConfig;
use crate::credential::Credential;
use crate::types::{all_neutral, ClassificationResult, Post};

pub use gemini::GeminiProvider;

pub const ENV_CLASSIFIER_TEST_MODE: &str = "CLASSIFIER_TEST_MODE";

/// What goes over the wire for each post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostText {
    pub id: String,
    pub content: String,
}

impl From<&Post> for PostText {
    fn from(p: &Post) -> Self {
        Self {
            id: p.id.clone(),
            content: p.content.clone(),
        }
    }
}

/// Low-level failure reported by a provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("remote returned no text")]
    Empty,
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    fn reason(&self) -> &'static str {
        match self {
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::Transport(_) => "transport",
            ProviderError::Status { .. } => "status",
            ProviderError::Empty => "empty",
            ProviderError::Malformed(_) => "malformed",
        }
    }
}

/// The only error the classifier lets through; the stream must stop on it.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("API rate limit exceeded. Please wait and try again.")]
    RateLimited,
}

/// True when an HTTP status or error text means request-rate exhaustion.
pub fn is_rate_limit_signal(status: Option<u16>, text: &str) -> bool {
    status == Some(429) || text.contains("RESOURCE_EXHAUSTED")
}

#[async_trait::async_trait]
pub trait SentimentProvider: Send + Sync + 'static {
    /// One remote call for the whole batch. Results may come in any order.
    async fn classify(
        &self,
        items: &[PostText],
        credential: &Credential,
    ) -> Result<Vec<ClassificationResult>, ProviderError>;
    fn name(&self) -> &'static str;
}

pub type DynProvider = Arc<dyn SentimentProvider>;

#[derive(Clone)]
pub struct BatchClassifier {
    provider: DynProvider,
}

impl BatchClassifier {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }

    pub fn from_provider<P: SentimentProvider>(provider: P) -> Self {
        Self::new(Arc::new(provider))
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Classify a batch. Returns exactly one result per input post (matched by id),
    /// unless the remote service signals rate limiting.
    pub async fn classify_batch(
        &self,
        posts: &[Post],
        credential: Option<&Credential>,
    ) -> Result<Vec<ClassificationResult>, ClassifyError> {
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let Some(credential) = credential else {
            error!(target: "classifier", batch = posts.len(), "no API credential; defaulting batch to NEUTRAL");
            counter!("classifier_fallback_total", "reason" => "no_credential").increment(1);
            return Ok(all_neutral(posts));
        };

        let items: Vec<PostText> = posts.iter().map(PostText::from).collect();
        let started = Instant::now();
        let outcome = self.provider.classify(&items, credential).await;
        histogram!("classifier_batch_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            Ok(raw) => {
                debug!(
                    target: "classifier",
                    provider = self.provider.name(),
                    batch = posts.len(),
                    returned = raw.len(),
                    "batch classified"
                );
                Ok(align_results(posts, raw))
            }
            Err(ProviderError::RateLimited(msg)) => {
                warn!(target: "classifier", provider = self.provider.name(), %msg, "rate limited");
                counter!("classifier_rate_limited_total").increment(1);
                Err(ClassifyError::RateLimited)
            }
            Err(e) => {
                error!(
                    target: "classifier",
                    provider = self.provider.name(),
                    batch = posts.len(),
                    error = %e,
                    "batch classification failed; defaulting to NEUTRAL"
                );
                counter!("classifier_fallback_total", "reason" => e.reason()).increment(1);
                Ok(all_neutral(posts))
            }
        }
    }
}

/// One result per input post, in input order. Unknown ids are dropped, duplicates keep
/// the first answer, missing ids become NEUTRAL. Sentiment strings are passed through.
pub fn align_results(posts: &[Post], raw: Vec<ClassificationResult>) -> Vec<ClassificationResult> {
    let wanted: HashSet<&str> = posts.iter().map(|p| p.id.as_str()).collect();
    let mut by_id: HashMap<String, String> = HashMap::with_capacity(raw.len());
    for r in raw {
        if wanted.contains(r.id.as_str()) {
            by_id.entry(r.id).or_insert(r.sentiment);
        }
    }
    posts
        .iter()
        .map(|p| match by_id.remove(&p.id) {
            Some(sentiment) => ClassificationResult {
                id: p.id.clone(),
                sentiment,
            },
            None => ClassificationResult::neutral(p.id.clone()),
        })
        .collect()
}

// ------------------------------------------------------------
// Local providers (offline runs, demo, tests)
// ------------------------------------------------------------

/// Deterministic keyword classifier; never touches the network.
#[derive(Debug, Clone, Default)]
pub struct MockProvider;

const POSITIVE_HINTS: &[&str] = &[
    "amazing",
    "exciting",
    "game-changer",
    "awesome",
    "the best",
    "solid",
    "productive",
];
const NEGATIVE_HINTS: &[&str] = &["struggling", "bug", "frustrating", "clunky", "ugh"];

impl MockProvider {
    pub fn label_for(content: &str) -> &'static str {
        let lower = content.to_ascii_lowercase();
        let pos = POSITIVE_HINTS.iter().filter(|w| lower.contains(*w)).count();
        let neg = NEGATIVE_HINTS.iter().filter(|w| lower.contains(*w)).count();
        match pos.cmp(&neg) {
            std::cmp::Ordering::Greater => "POSITIVE",
            std::cmp::Ordering::Less => "NEGATIVE",
            std::cmp::Ordering::Equal => "NEUTRAL",
        }
    }
}

#[async_trait::async_trait]
impl SentimentProvider for MockProvider {
    async fn classify(
        &self,
        items: &[PostText],
        _credential: &Credential,
    ) -> Result<Vec<ClassificationResult>, ProviderError> {
        Ok(items
            .iter()
            .map(|it| ClassificationResult {
                id: it.id.clone(),
                sentiment: Self::label_for(&it.content).to_string(),
            })
            .collect())
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Always fails with the given kind; used by `CLASSIFIER_TEST_MODE=error|rate-limit`.
#[derive(Debug, Clone, Copy)]
pub struct FailingProvider {
    pub rate_limited: bool,
}

#[async_trait::async_trait]
impl SentimentProvider for FailingProvider {
    async fn classify(
        &self,
        _items: &[PostText],
        _credential: &Credential,
    ) -> Result<Vec<ClassificationResult>, ProviderError> {
        if self.rate_limited {
            Err(ProviderError::RateLimited("429 RESOURCE_EXHAUSTED (test mode)".into()))
        } else {
            Err(ProviderError::Transport("simulated failure (test mode)".into()))
        }
    }
    fn name(&self) -> &'static str {
        if self.rate_limited {
            "failing-rate-limit"
        } else {
            "failing"
        }
    }
}

/// Factory: build a classifier according to config and environment variables.
///
/// * `CLASSIFIER_TEST_MODE=mock` → deterministic keyword provider.
/// * `CLASSIFIER_TEST_MODE=error` / `rate-limit` → always-failing provider.
/// * otherwise → Gemini.
pub fn build_classifier(cfg: &ClassifierConfig) -> anyhow::Result<BatchClassifier> {
    let mode = std::env::var(ENV_CLASSIFIER_TEST_MODE).unwrap_or_default();
    let classifier = match mode.as_str() {
        "mock" => BatchClassifier::from_provider(MockProvider),
        "error" => BatchClassifier::from_provider(FailingProvider {
            rate_limited: false,
        }),
        "rate-limit" => BatchClassifier::from_provider(FailingProvider { rate_limited: true }),
        _ => BatchClassifier::from_provider(GeminiProvider::new(cfg)?),
    };
    Ok(classifier)
}
