//! Core data model shared by the generator, classifier and stream controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-post sentiment. `Analyzing` is the only non-terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Analyzing,
}

impl Sentiment {
    /// Parse a classifier label. Case-sensitive; only the three terminal labels are accepted.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "POSITIVE" => Some(Sentiment::Positive),
            "NEGATIVE" => Some(Sentiment::Negative),
            "NEUTRAL" => Some(Sentiment::Neutral),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "POSITIVE",
            Sentiment::Negative => "NEGATIVE",
            Sentiment::Neutral => "NEUTRAL",
            Sentiment::Analyzing => "ANALYZING",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Sentiment::Analyzing)
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub sentiment: Sentiment,
}

/// One classifier answer. `sentiment` stays a raw string; validation happens when merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub id: String,
    pub sentiment: String,
}

impl ClassificationResult {
    pub fn neutral(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sentiment: Sentiment::Neutral.as_str().to_string(),
        }
    }
}

/// Every post of the batch mapped to NEUTRAL.
pub fn all_neutral(posts: &[Post]) -> Vec<ClassificationResult> {
    posts
        .iter()
        .map(|p| ClassificationResult::neutral(p.id.clone()))
        .collect()
}

/// Running aggregate over resolved posts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentStats {
    pub positive: u64,
    pub negative: u64,
    pub neutral: u64,
}

impl SentimentStats {
    /// Count one resolved post. `Analyzing` never contributes.
    pub fn record(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Negative => self.negative += 1,
            Sentiment::Neutral => self.neutral += 1,
            Sentiment::Analyzing => {}
        }
    }

    pub fn merge(&mut self, other: &SentimentStats) {
        self.positive += other.positive;
        self.negative += other.negative;
        self.neutral += other.neutral;
    }

    pub fn total(&self) -> u64 {
        self.positive + self.negative + self.neutral
    }
}
