//! News listing and article scrapers.
//!
//! Scraping is split into two phases:
//!
//! 1. **Listing**: an [`ArticleSource`] collects candidate headlines
//! 2. **Fetching**: an [`ArticleFetcher`] downloads one article and extracts its text
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | Kakao media home | [`kakao`] | GraphQL listing | One request per content-provider channel |
//! | Daum News | [`daum`] | HTML scraping | Body under `.news_view`, captions and tables dropped |
//!
//! Listing never fails as a whole: a channel that errors is logged and
//! skipped. Fetching an article does fail, with [`FetchError`], and the
//! caller decides what to do.

use crate::error::FetchError;
use crate::models::NewsCandidate;
use async_trait::async_trait;

pub mod daum;
pub mod kakao;

/// Produces the candidate set for one topic refresh cycle.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Merge every upstream section into one unordered collection.
    ///
    /// Fails soft: whatever could be fetched is returned.
    async fn fetch_candidates(&self) -> Vec<NewsCandidate>;
}

/// Retrieves the plain-text body of a single article.
#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    async fn fetch_body(&self, url: &str) -> Result<String, FetchError>;
}
