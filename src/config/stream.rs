// src/config/stream.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

pub const DEFAULT_STREAM_CONFIG_PATH: &str = "config/stream.toml";
pub const ENV_STREAM_CONFIG_PATH: &str = "STREAM_CONFIG_PATH";

const ENV_POST_INTERVAL_MS: &str = "STREAM_POST_INTERVAL_MS";
const ENV_FLUSH_INTERVAL_MS: &str = "STREAM_FLUSH_INTERVAL_MS";
const ENV_GEMINI_MODEL: &str = "GEMINI_MODEL";
const ENV_GEMINI_BASE_URL: &str = "GEMINI_BASE_URL";

fn default_post_interval_ms() -> u64 {
    5_000
}
fn default_flush_interval_ms() -> u64 {
    10_000
}
fn default_max_posts() -> usize {
    50
}
fn default_hashtag() -> String {
    "#ReactDevs".to_string()
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_temperature() -> f32 {
    0.1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_post_interval_ms")]
    pub post_interval_ms: u64,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Visible feed cap; oldest posts are evicted beyond it.
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,
    #[serde(default = "default_hashtag")]
    pub default_hashtag: String,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Unset means no request timeout (a hung call only blocks its own batch).
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            post_interval_ms: default_post_interval_ms(),
            flush_interval_ms: default_flush_interval_ms(),
            max_posts: default_max_posts(),
            default_hashtag: default_hashtag(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            request_timeout_ms: None,
        }
    }
}

impl StreamConfig {
    pub fn post_interval(&self) -> Duration {
        Duration::from_millis(self.post_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Parse a TOML file. Values are sanitized, env overrides are NOT applied.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading stream config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: StreamConfig = toml::from_str(s).context("parsing stream config")?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Resolution order:
    /// 1) $STREAM_CONFIG_PATH (must exist)
    /// 2) config/stream.toml
    /// 3) built-in defaults
    ///
    /// Env overrides are applied on top in every case.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = env::var(ENV_STREAM_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("STREAM_CONFIG_PATH points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else {
            let fallback = PathBuf::from(DEFAULT_STREAM_CONFIG_PATH);
            if fallback.exists() {
                Self::load_from_file(&fallback)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = parse_env_u64(ENV_POST_INTERVAL_MS) {
            self.post_interval_ms = v;
        }
        if let Some(v) = parse_env_u64(ENV_FLUSH_INTERVAL_MS) {
            self.flush_interval_ms = v;
        }
        if let Ok(v) = env::var(ENV_GEMINI_MODEL) {
            if !v.trim().is_empty() {
                self.classifier.model = v.trim().to_string();
            }
        }
        if let Ok(v) = env::var(ENV_GEMINI_BASE_URL) {
            if !v.trim().is_empty() {
                self.classifier.base_url = v.trim().to_string();
            }
        }
    }

    fn sanitize(&mut self) {
        if self.post_interval_ms == 0 {
            self.post_interval_ms = default_post_interval_ms();
        }
        if self.flush_interval_ms == 0 {
            self.flush_interval_ms = default_flush_interval_ms();
        }
        if self.max_posts == 0 {
            self.max_posts = default_max_posts();
        }
        if !(0.0..=2.0).contains(&self.classifier.temperature) {
            self.classifier.temperature = default_temperature();
        }
        if self.classifier.request_timeout_ms == Some(0) {
            self.classifier.request_timeout_ms = None;
        }
        let base = self.classifier.base_url.trim_end_matches('/').to_string();
        self.classifier.base_url = base;
    }
}

fn parse_env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|s| s.trim().parse::<u64>().ok())
}
