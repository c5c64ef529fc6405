//! Flickr photo search (secondary provider).
//!
//! Only used when a Flickr API key is configured. The search itself asks for
//! the allowed license codes; the resolver checks the returned codes again.

use super::{ImageCandidate, ImageProvider};
use crate::error::ImageError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use tracing::instrument;

const REST_URL: &str = "https://www.flickr.com/services/rest/";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    stat: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    photos: Option<PhotoPage>,
}

#[derive(Debug, Deserialize)]
struct PhotoPage {
    #[serde(default)]
    photo: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    #[serde(default)]
    url_l: Option<String>,
    #[serde(default)]
    url_c: Option<String>,
    #[serde(default)]
    license: Option<String>,
}

pub struct FlickrProvider {
    client: Client,
    api_key: String,
    licenses: Vec<String>,
}

impl FlickrProvider {
    pub fn new(client: Client, api_key: String, licenses: Vec<String>) -> Self {
        Self {
            client,
            api_key,
            licenses,
        }
    }

    fn search_url(&self, keyword: &str, limit: u32) -> String {
        format!(
            "{REST_URL}?method=flickr.photos.search&api_key={}&text={}&license={}\
             &sort=relevance&content_type=1&media=photos&safe_search=1\
             &extras=url_l,url_c,license&per_page={limit}&format=json&nojsoncallback=1",
            urlencoding::encode(&self.api_key),
            urlencoding::encode(keyword),
            urlencoding::encode(&self.licenses.join(",")),
        )
    }
}

impl fmt::Debug for FlickrProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlickrProvider")
            .field("api_key", &"<redacted>")
            .field("licenses", &self.licenses)
            .finish()
    }
}

#[async_trait]
impl ImageProvider for FlickrProvider {
    fn name(&self) -> &'static str {
        "flickr"
    }

    #[instrument(level = "debug", skip(self))]
    async fn search(&self, keyword: &str, limit: u32) -> Result<Vec<ImageCandidate>, ImageError> {
        let response = self.client.get(self.search_url(keyword, limit)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Status {
                provider: self.name(),
                status: status.as_u16(),
            });
        }
        let parsed: SearchResponse = response.json().await?;
        into_candidates(parsed)
    }
}

fn into_candidates(response: SearchResponse) -> Result<Vec<ImageCandidate>, ImageError> {
    if response.stat != "ok" {
        return Err(ImageError::Provider {
            provider: "flickr",
            message: response.message.unwrap_or(response.stat),
        });
    }
    Ok(response
        .photos
        .map(|page| page.photo)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|photo| {
            let url = photo.url_l.or(photo.url_c)?;
            Some(ImageCandidate {
                url,
                premium: false,
                license: photo.license,
            })
        })
        .collect())
}
