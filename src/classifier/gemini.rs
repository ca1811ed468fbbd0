// src/classifier/gemini.rs
//! Google Gemini `generateContent` provider. One request per batch, JSON-schema
//! constrained output: `[{"id": "...", "sentiment": "POSITIVE|NEGATIVE|NEUTRAL"}]`.

use std::time::Duration;

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use super::{is_rate_limit_signal, PostText, ProviderError, SentimentProvider};
use crate::config::ClassifierConfig;
use crate::credential::Credential;
use crate::types::ClassificationResult;

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("code fence regex"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(4);

pub struct GeminiProvider {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl GeminiProvider {
    pub fn new(cfg: &ClassifierConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent("hashtag-sentiment-stream/0.1");
        if let Some((connect, total)) = client_timeouts(cfg) {
            builder = builder.connect_timeout(connect).timeout(total);
        }
        let http = builder.build().context("building Gemini HTTP client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

/// `(connect, total)` timeouts; none at all unless `request_timeout_ms` is configured.
fn client_timeouts(cfg: &ClassifierConfig) -> Option<(Duration, Duration)> {
    let total = Duration::from_millis(cfg.request_timeout_ms?);
    Some((total.min(CONNECT_TIMEOUT), total))
}

pub(crate) fn build_prompt(items: &[PostText]) -> String {
    let posts = serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Analyze the sentiment of the following social media posts. Classify each as POSITIVE, NEGATIVE, or NEUTRAL.\n\
         Respond with a valid JSON array where each object has an \"id\" (the post ID) and a \"sentiment\" (the classification as an uppercase string).\n\n\
         Example Response:\n\
         [\n  {{\"id\": \"post_123\", \"sentiment\": \"POSITIVE\"}},\n  {{\"id\": \"post_456\", \"sentiment\": \"NEGATIVE\"}}\n]\n\n\
         Posts to analyze:\n{posts}\n"
    )
}

fn request_body(prompt: &str, temperature: f32) -> serde_json::Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "temperature": temperature,
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": { "type": "STRING" },
                        "sentiment": { "type": "STRING" }
                    },
                    "required": ["id", "sentiment"]
                }
            }
        }
    })
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// Concatenated text of the first candidate.
fn response_text(resp: &GenerateResponse) -> String {
    resp.candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|c| {
            c.parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Parse the model text into results. Tolerates a surrounding ```json fence.
pub(crate) fn parse_results(text: &str) -> Result<Vec<ClassificationResult>, ProviderError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::Empty);
    }
    let unfenced = RE_CODE_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);
    serde_json::from_str::<Vec<ClassificationResult>>(unfenced)
        .map_err(|e| ProviderError::Malformed(e.to_string()))
}

#[async_trait::async_trait]
impl SentimentProvider for GeminiProvider {
    async fn classify(
        &self,
        items: &[PostText],
        credential: &Credential,
    ) -> Result<Vec<ClassificationResult>, ProviderError> {
        let body = request_body(&build_prompt(items), self.temperature);

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if is_rate_limit_signal(e.status().map(|s| s.as_u16()), &msg) {
                    ProviderError::RateLimited(msg)
                } else {
                    ProviderError::Transport(msg)
                }
            })?;

        let status = resp.status();
        let raw = resp
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            if is_rate_limit_signal(Some(status.as_u16()), &raw) {
                return Err(ProviderError::RateLimited(format!("HTTP {status}")));
            }
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: raw.chars().take(300).collect(),
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&raw).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parse_results(&response_text(&parsed))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
