//! Pipeline tuning loaded from an optional YAML file.
//!
//! Secrets (database URL, API keys) never live here, they come from the CLI
//! or the environment (see [`crate::cli::Cli`]). Everything in this file has
//! a default, so a missing file or an empty document yields a working setup.
//!
//! ```yaml
//! schedule:
//!   topic_refresh_secs: 600
//!   article_drain_secs: 120
//!   article_initial_delay_secs: 30
//! topics:
//!   dedup: similarity   # or `exact`
//!   max_selected: 5
//! generation:
//!   model: gemini-1.5-pro-latest
//!   temperature: 0.85
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};

/// Content-provider channel ids the listing is pulled from.
pub const DEFAULT_CHANNEL_IDS: &[u32] = &[
    73, 327, 310, 11, 45, 190, 15, 33, 38, 200, 8, 17, 49, 23, 396, 318, 98, 60, 317,
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub fetcher: FetcherConfig,
    pub generation: GenerationConfig,
    pub topics: TopicsConfig,
    pub images: ImagesConfig,
    pub comments: CommentsConfig,
    pub schedule: ScheduleConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub endpoint: String,
    pub channel_ids: Vec<u32>,
    pub items_per_channel: u32,
    /// Items older than this are skipped. `None` keeps everything.
    pub max_age_minutes: Option<i64>,
    pub concurrency: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://hades-cerberus.v.kakao.com/graphql".to_string(),
            channel_ids: DEFAULT_CHANNEL_IDS.to_vec(),
            items_per_channel: 5,
            max_age_minutes: Some(180),
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub content_selector: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            content_selector: ".news_view".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-pro-latest".to_string(),
            temperature: 0.85,
            top_k: 64,
            top_p: 0.95,
            max_output_tokens: 8192,
            max_attempts: 4,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// How fresh candidates are compared against recently used topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupMode {
    /// Exact title match, then a model-judged topic similarity pass.
    Similarity,
    /// Exact title match only. No generator call is spent on dedup.
    Exact,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    pub dedup: DedupMode,
    pub min_candidates: usize,
    pub max_selected: usize,
    pub recent_window: usize,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            dedup: DedupMode::Similarity,
            min_candidates: 3,
            max_selected: 5,
            recent_window: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// How many results to request from each provider.
    pub per_page: u32,
    /// The random pick is made among the first `top_k` eligible results.
    pub top_k: usize,
    pub placeholder_url: String,
    /// Flickr license codes that allow redistribution.
    pub allowed_licenses: Vec<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            per_page: 10,
            top_k: 5,
            placeholder_url:
                "https://images.unsplash.com/photo-1504711434969-e33886168f5c?w=1080".to_string(),
            // CC BY, CC BY-SA, no known restrictions, CC0, public domain mark
            allowed_licenses: ["4", "5", "7", "9", "10"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommentsConfig {
    pub min_count: usize,
    pub max_count: usize,
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            min_count: 2,
            max_count: 5,
            min_delay_secs: 2 * 60,
            max_delay_secs: 22 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub topic_refresh_secs: u64,
    pub article_drain_secs: u64,
    pub article_initial_delay_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            topic_refresh_secs: 600,
            article_drain_secs: 120,
            article_initial_delay_secs: 30,
        }
    }
}

impl ScheduleConfig {
    pub fn topic_refresh(&self) -> Duration {
        Duration::from_secs(self.topic_refresh_secs)
    }

    pub fn article_drain(&self) -> Duration {
        Duration::from_secs(self.article_drain_secs)
    }

    pub fn article_initial_delay(&self) -> Duration {
        Duration::from_secs(self.article_initial_delay_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

impl PipelineConfig {
    /// Load from `path` if given, otherwise use defaults. The result is validated.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_string(),
                    source,
                })?;
                let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Yaml {
                    path: path.to_string(),
                    source,
                })?;
                info!(path, "Loaded pipeline configuration");
                config
            }
            None => {
                info!("No configuration file given; using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.schedule.topic_refresh_secs == 0 || self.schedule.article_drain_secs == 0 {
            return invalid("schedule intervals must be non-zero");
        }
        if self.topics.recent_window == 0 {
            return invalid("topics.recent_window must be non-zero");
        }
        if self.topics.max_selected == 0 {
            return invalid("topics.max_selected must be non-zero");
        }
        if self.generation.max_attempts == 0 {
            return invalid("generation.max_attempts must be at least 1");
        }
        if self.comments.min_count > self.comments.max_count {
            return invalid("comments.min_count exceeds comments.max_count");
        }
        if self.comments.min_delay_secs > self.comments.max_delay_secs {
            return invalid("comments.min_delay_secs exceeds comments.max_delay_secs");
        }
        if self.images.top_k == 0 {
            return invalid("images.top_k must be non-zero");
        }
        if self.source.channel_ids.is_empty() {
            return invalid("source.channel_ids must not be empty");
        }
        if self.database.max_connections == 0 {
            return invalid("database.max_connections must be non-zero");
        }
        Ok(())
    }
}
