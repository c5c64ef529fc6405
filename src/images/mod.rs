//! Illustration lookup across stock-photo providers.
//!
//! Each keyword goes through a layered fallback chain:
//!
//! 1. Primary provider ([`unsplash`]), premium results excluded
//! 2. Secondary provider ([`flickr`]), only redistribution-friendly licenses
//! 3. The configured placeholder image
//!
//! The final pick is random among the first `top_k` eligible results so that
//! similar articles don't all end up with the same photo.

use crate::config::ImagesConfig;
use crate::error::ImageError;
use crate::models::ImageRef;
use async_trait::async_trait;
use futures::future::join_all;
use rand::rng;
use rand::seq::IndexedRandom;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub mod flickr;
pub mod unsplash;

/// One search result from a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCandidate {
    pub url: String,
    /// Paid/premium result that may not be hot-linked.
    pub premium: bool,
    /// Provider license code, when the provider reports one.
    pub license: Option<String>,
}

impl ImageCandidate {
    #[cfg(test)]
    pub fn free(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            premium: false,
            license: None,
        }
    }
}

/// Keyword search against a stock-photo provider, results in ranking order.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, keyword: &str, limit: u32) -> Result<Vec<ImageCandidate>, ImageError>;
}

/// Picks one image URL per keyword from a primary provider, then an optional
/// license-filtered secondary, then the configured placeholder.
pub struct ImageResolver {
    primary: Arc<dyn ImageProvider>,
    secondary: Option<Arc<dyn ImageProvider>>,
    config: ImagesConfig,
}

impl ImageResolver {
    /// # Arguments
    ///
    /// * `primary` - searched first; premium results are skipped
    /// * `secondary` - searched only when the primary has nothing usable
    /// * `config` - result limit, allowed secondary licenses and placeholder URL
    pub fn new(
        primary: Arc<dyn ImageProvider>,
        secondary: Option<Arc<dyn ImageProvider>>,
        config: ImagesConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            config,
        }
    }

    /// URL used when no provider yields an eligible image.
    pub fn placeholder(&self) -> &str {
        &self.config.placeholder_url
    }

    /// Resolve one image per keyword.
    ///
    /// A single keyword yields [`ImageRef::Single`], several yield
    /// [`ImageRef::Many`] in keyword order. No keyword at all yields the
    /// placeholder. A keyword that finds nothing gets the placeholder in its
    /// slot; the call itself never fails.
    #[instrument(level = "info", skip_all, fields(keywords = ?keywords))]
    pub async fn resolve(&self, keywords: &[String]) -> ImageRef {
        match keywords {
            [] => ImageRef::Single(self.placeholder().to_string()),
            [keyword] => ImageRef::Single(self.resolve_one(keyword).await),
            many => ImageRef::Many(join_all(many.iter().map(|k| self.resolve_one(k))).await),
        }
    }

    pub async fn resolve_one(&self, keyword: &str) -> String {
        let from_primary = self
            .search_eligible(self.primary.as_ref(), keyword, |c| !c.premium)
            .await;
        if let Some(url) = from_primary {
            return url;
        }

        if let Some(secondary) = &self.secondary {
            let allowed = &self.config.allowed_licenses;
            let from_secondary = self
                .search_eligible(secondary.as_ref(), keyword, |c| {
                    !c.premium && c.license.as_ref().is_some_and(|l| allowed.contains(l))
                })
                .await;
            if let Some(url) = from_secondary {
                return url;
            }
        }

        info!(%keyword, "No eligible image found; using placeholder");
        self.placeholder().to_string()
    }

    async fn search_eligible(
        &self,
        provider: &dyn ImageProvider,
        keyword: &str,
        eligible: impl Fn(&ImageCandidate) -> bool,
    ) -> Option<String> {
        let results = match provider.search(keyword, self.config.per_page).await {
            Ok(results) => results,
            Err(e) => {
                warn!(provider = provider.name(), %keyword, error = %e, "Image search failed");
                return None;
            }
        };
        let eligible: Vec<ImageCandidate> = results.into_iter().filter(|c| eligible(c)).collect();
        debug!(provider = provider.name(), %keyword, eligible = eligible.len(), "Image search done");
        pick(&eligible, self.config.top_k)
    }
}

/// Uniform random choice among the first `top_k` candidates.
fn pick(candidates: &[ImageCandidate], top_k: usize) -> Option<String> {
    let window = &candidates[..candidates.len().min(top_k.max(1))];
    window.choose(&mut rng()).map(|c| c.url.clone())
}
