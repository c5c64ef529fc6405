//! Error taxonomy for the pipeline.
//!
//! Each layer gets its own error type so callers can tell a network failure
//! from a model that produced nothing or a response that did not parse:
//!
//! - [`FetchError`]: retrieving a listing or an article page failed
//! - [`GenerationError`]: one raw call to the text-generation backend failed
//! - [`ImageError`]: one stock-photo provider call failed
//! - [`PersistenceError`]: the relational store rejected a statement
//! - [`ConfigError`]: start-up configuration is unreadable or inconsistent
//! - [`PipelineError`]: what orchestration code (topic selection, article
//!   generation) reports when it aborts a stage

use thiserror::Error;

/// Failure retrieving or extracting a remote page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("no element matching `{selector}` in {url}")]
    MissingContent { url: String, selector: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unexpected response shape from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Failure of a single call to the text-generation backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend answered with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend blocked the prompt: {0}")]
    Blocked(String),

    #[error("backend returned no text")]
    Empty,
}

/// Failure of a single stock-photo provider call.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} answered with status {status}")]
    Status { provider: &'static str, status: u16 },

    #[error("{provider} returned an error: {message}")]
    Provider { provider: &'static str, message: String },
}

/// Failure of a parameterized statement against the store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration {index} failed: {source}")]
    Migration {
        index: usize,
        #[source]
        source: sqlx::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Start-up configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Why an orchestration stage gave up on the current item or cycle.
///
/// None of these are fatal to the process. Scheduled ticks log them and move on.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("text generation produced nothing during {stage}")]
    GenerationNull { stage: &'static str },

    #[error("could not parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },

    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl PipelineError {
    pub fn parse(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            what,
            reason: reason.into(),
        }
    }
}
