//! Data models shared across the pipeline.
//!
//! - [`NewsCandidate`]: a scraped listing entry, held only for one refresh cycle
//! - [`Topic`]: a candidate promoted into the generation queue
//! - [`RecentTopic`]: what the recent-topics window remembers for dedup prompts
//! - [`GeneratedArticle`]: the persisted rewrite with its counters
//! - [`ImageRef`]: one or several image URLs attached to an article
//! - [`Comment`]: a real or synthetic comment row

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// A news item as listed by the aggregator.
///
/// Candidates are never persisted. They live in the working set of a single
/// topic refresh cycle and are either dropped or promoted to a [`Topic`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsCandidate {
    pub title: String,
    pub url: String,
    /// Short teaser text, when the listing provides one.
    pub preview: Option<String>,
    /// Age of the item at scrape time.
    pub recency_minutes: Option<i64>,
    pub popularity_score: Option<f64>,
}

impl NewsCandidate {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            preview: None,
            recency_minutes: None,
            popularity_score: None,
        }
    }

    /// One line used when enumerating candidates inside a prompt.
    pub fn prompt_line(&self) -> String {
        match self.preview.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(preview) => format!("{} | {}", self.title.trim(), preview),
            None => self.title.trim().to_string(),
        }
    }
}

/// A candidate waiting in the generation queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub candidate: NewsCandidate,
    pub queued_at: DateTime<Utc>,
}

impl Topic {
    pub fn new(candidate: NewsCandidate) -> Self {
        Self {
            candidate,
            queued_at: Utc::now(),
        }
    }

    pub fn title(&self) -> &str {
        &self.candidate.title
    }

    pub fn url(&self) -> &str {
        &self.candidate.url
    }
}

/// Entry of the recent-topics window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentTopic {
    pub title: String,
    pub preview: Option<String>,
}

impl From<&NewsCandidate> for RecentTopic {
    fn from(candidate: &NewsCandidate) -> Self {
        Self {
            title: candidate.title.clone(),
            preview: candidate.preview.clone(),
        }
    }
}

/// Image reference(s) for an article.
///
/// A single keyword resolves to one URL, several keywords resolve to a list
/// whose positions match the keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    Single(String),
    Many(Vec<String>),
}

impl ImageRef {
    /// Render for the `img` column: a bare URL, or a JSON array for several.
    pub fn to_column(&self) -> Result<String, serde_json::Error> {
        match self {
            ImageRef::Single(url) => Ok(url.clone()),
            ImageRef::Many(urls) => serde_json::to_string(urls),
        }
    }

    pub fn urls(&self) -> Vec<&str> {
        match self {
            ImageRef::Single(url) => vec![url.as_str()],
            ImageRef::Many(urls) => urls.iter().map(String::as_str).collect(),
        }
    }
}

/// A rewritten article as stored in the `news` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedArticle {
    /// Ten hex characters derived from `created_at` (see [`crate::utils::article_id`]).
    pub id: String,
    pub created_at: DateTime<FixedOffset>,
    pub title: String,
    pub body: String,
    pub image: ImageRef,
    pub like_count: i64,
    pub dislike_count: i64,
    pub comment_count: i64,
    pub report_count: i64,
    pub view_count: i64,
    /// Listing URL the rewrite was based on. Not stored.
    #[serde(skip)]
    pub source_url: Option<String>,
}

impl GeneratedArticle {
    pub fn new(
        id: String,
        created_at: DateTime<FixedOffset>,
        title: String,
        body: String,
        image: ImageRef,
    ) -> Self {
        Self {
            id,
            created_at,
            title,
            body,
            image,
            like_count: 0,
            dislike_count: 0,
            comment_count: 0,
            report_count: 0,
            view_count: 0,
            source_url: None,
        }
    }
}

/// A comment attached to a [`GeneratedArticle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub article_id: String,
    pub display_name: String,
    pub text: String,
    pub created_at: DateTime<FixedOffset>,
    pub is_automated: bool,
}
