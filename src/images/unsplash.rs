//! Unsplash photo search (primary provider).
//!
//! With an access key the official API is used. Without one the public
//! search endpoint the website itself calls is used instead; it returns the
//! same result shape.

use super::{ImageCandidate, ImageProvider};
use crate::error::ImageError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use tracing::instrument;

const API_URL: &str = "https://api.unsplash.com/search/photos";
const PUBLIC_URL: &str = "https://unsplash.com/napi/search/photos";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    urls: PhotoUrls,
    #[serde(default)]
    premium: Option<bool>,
    #[serde(default)]
    plus: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: String,
}

pub struct UnsplashProvider {
    client: Client,
    access_key: Option<String>,
}

impl UnsplashProvider {
    pub fn new(client: Client, access_key: Option<String>) -> Self {
        Self { client, access_key }
    }

    fn search_url(&self, keyword: &str, limit: u32) -> String {
        let base = if self.access_key.is_some() { API_URL } else { PUBLIC_URL };
        format!(
            "{base}?query={}&per_page={limit}",
            urlencoding::encode(keyword)
        )
    }
}

impl fmt::Debug for UnsplashProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsplashProvider")
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl ImageProvider for UnsplashProvider {
    fn name(&self) -> &'static str {
        "unsplash"
    }

    #[instrument(level = "debug", skip(self))]
    async fn search(&self, keyword: &str, limit: u32) -> Result<Vec<ImageCandidate>, ImageError> {
        let mut request = self.client.get(self.search_url(keyword, limit));
        if let Some(key) = &self.access_key {
            request = request
                .header("Authorization", format!("Client-ID {key}"))
                .header("Accept-Version", "v1");
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Status {
                provider: self.name(),
                status: status.as_u16(),
            });
        }
        let parsed: SearchResponse = response.json().await?;
        Ok(into_candidates(parsed))
    }
}

fn into_candidates(response: SearchResponse) -> Vec<ImageCandidate> {
    response
        .results
        .into_iter()
        .map(|photo| ImageCandidate {
            url: photo.urls.regular,
            premium: photo.premium.unwrap_or(false) || photo.plus.unwrap_or(false),
            license: None,
        })
        .collect()
}
