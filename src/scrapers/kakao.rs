//! Kakao media-home listing source.
//!
//! Each content-provider channel (`cpId`) is queried through the media-home
//! GraphQL `page` endpoint for its newest items. Results from all channels are
//! merged and shuffled so that channel order does not bias ranking.
//!
//! # Recency
//!
//! Items come back sorted newest-first. When a `max_age_minutes` cutoff is
//! configured, the first over-age item ends the scan for that channel.

use super::ArticleSource;
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::models::NewsCandidate;
use crate::utils::kst;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use rand::rng;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

const PAGE_KEY: &str = "media_home_news_all";

const LISTING_QUERY: &str = "query ($media_home_tab_news_all_8Key: String!, $media_home_tab_news_all_8Params: Object) {\n  media_home_tab_news_all_8: page(charonKey: $media_home_tab_news_all_8Key, charonParams: $media_home_tab_news_all_8Params) {\n      items {\n      title\n      thumbnail\n      pcLink\n      meta\n      __typename\n    }\n    __typename\n  }\n}\n";

#[derive(Debug, Deserialize)]
struct ListingResponse {
    data: Option<ListingData>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(rename = "media_home_tab_news_all_8")]
    page: Option<ListingPage>,
}

#[derive(Debug, Deserialize)]
struct ListingPage {
    #[serde(default)]
    items: Vec<ListingItem>,
}

#[derive(Debug, Deserialize)]
struct ListingItem {
    title: Option<String>,
    #[serde(rename = "pcLink")]
    pc_link: Option<String>,
    #[serde(default)]
    meta: Option<Value>,
}

/// Listing source backed by the Kakao media-home GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct KakaoSource {
    client: Client,
    config: SourceConfig,
}

impl KakaoSource {
    pub fn new(client: Client, config: SourceConfig) -> Self {
        Self { client, config }
    }

    fn request_body(&self, channel_id: u32) -> Value {
        json!({
            "operationName": null,
            "variables": {
                "media_home_tab_news_all_8Key": PAGE_KEY,
                "media_home_tab_news_all_8Params": {
                    "cpId": channel_id.to_string(),
                    "size": self.config.items_per_channel,
                    "sort": "createDt:desc",
                    "searchId": ""
                }
            },
            "query": LISTING_QUERY,
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_channel(&self, channel_id: u32) -> Result<Vec<NewsCandidate>, FetchError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&self.request_body(channel_id))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.config.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let listing: ListingResponse = response.json().await?;
        parse_listing(
            listing,
            &self.config.endpoint,
            Utc::now(),
            self.config.max_age_minutes,
        )
    }
}

#[async_trait]
impl ArticleSource for KakaoSource {
    #[instrument(level = "info", skip_all, fields(channels = self.config.channel_ids.len()))]
    async fn fetch_candidates(&self) -> Vec<NewsCandidate> {
        let results: Vec<(u32, Result<Vec<NewsCandidate>, FetchError>)> =
            stream::iter(self.config.channel_ids.iter().copied())
                .map(|channel_id| async move { (channel_id, self.fetch_channel(channel_id).await) })
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;

        let mut candidates = Vec::new();
        let mut failed = 0usize;
        for (channel_id, result) in results {
            match result {
                Ok(items) => {
                    debug!(channel_id, count = items.len(), "Listed channel");
                    candidates.extend(items);
                }
                Err(e) => {
                    failed += 1;
                    warn!(channel_id, error = %e, "Channel listing failed; skipping");
                }
            }
        }

        candidates.shuffle(&mut rng());
        info!(count = candidates.len(), failed, "Collected news candidates");
        candidates
    }
}

fn parse_listing(
    listing: ListingResponse,
    endpoint: &str,
    now: DateTime<Utc>,
    max_age_minutes: Option<i64>,
) -> Result<Vec<NewsCandidate>, FetchError> {
    if !listing.errors.is_empty() {
        return Err(FetchError::Decode {
            url: endpoint.to_string(),
            reason: format!("GraphQL errors: {}", Value::Array(listing.errors)),
        });
    }
    let items = listing
        .data
        .and_then(|d| d.page)
        .map(|p| p.items)
        .ok_or_else(|| FetchError::Decode {
            url: endpoint.to_string(),
            reason: "missing data.media_home_tab_news_all_8".to_string(),
        })?;

    let mut candidates = Vec::with_capacity(items.len());
    for item in items {
        let (Some(title), Some(url)) = (item.title, item.pc_link) else {
            continue;
        };
        let title = title.trim().to_string();
        if title.is_empty() || url.is_empty() {
            continue;
        }

        let meta = item.meta.as_ref();
        let recency_minutes = meta
            .and_then(|m| m.get("createDt"))
            .and_then(parse_create_dt)
            .map(|created| (now - created).num_minutes().max(0));

        if let (Some(age), Some(max_age)) = (recency_minutes, max_age_minutes) {
            if age > max_age {
                // newest-first, everything after this is older still
                break;
            }
        }

        let mut candidate = NewsCandidate::new(title, url);
        candidate.recency_minutes = recency_minutes;
        candidate.preview = meta
            .and_then(|m| m.get("summary").or_else(|| m.get("description")))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        candidates.push(candidate);
    }
    Ok(candidates)
}

/// Interpret `meta.createDt`: epoch milliseconds, `YYYYMMDDHHMMSS` in KST,
/// RFC 3339, or `YYYY-MM-DD HH:MM:SS` in KST.
fn parse_create_dt(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(millis) = value.as_i64() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    let raw = value.as_str()?.trim();

    if raw.len() == 13 && raw.bytes().all(|b| b.is_ascii_digit()) {
        return Utc.timestamp_millis_opt(raw.parse().ok()?).single();
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y%m%d%H%M%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y.%m.%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|naive| kst().from_local_datetime(&naive).single())
        .map(|local| local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(json: &str) -> ListingResponse {
        serde_json::from_str(json).unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-08-01T03:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_parse_listing_maps_fields() {
        // 2024-08-01 11:30:00 KST is 02:30 UTC, thirty minutes before `now`
        let response = listing(
            r#"{"data":{"media_home_tab_news_all_8":{"items":[
                {"title":" 폭염 특보 확대 ","thumbnail":null,"pcLink":"https://v.daum.net/v/1","meta":{"createDt":"20240801113000","summary":"전국 무더위"}}
            ]}}}"#,
        );
        let candidates = parse_listing(response, "endpoint", now(), Some(180)).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "폭염 특보 확대");
        assert_eq!(candidates[0].url, "https://v.daum.net/v/1");
        assert_eq!(candidates[0].recency_minutes, Some(30));
        assert_eq!(candidates[0].preview.as_deref(), Some("전국 무더위"));
    }

    #[test]
    fn test_parse_listing_stops_at_first_over_age_item() {
        let response = listing(
            r#"{"data":{"media_home_tab_news_all_8":{"items":[
                {"title":"fresh","pcLink":"https://v.daum.net/v/1","meta":{"createDt":"2024-08-01T02:50:00Z"}},
                {"title":"stale","pcLink":"https://v.daum.net/v/2","meta":{"createDt":"2024-07-31T20:00:00Z"}},
                {"title":"misordered","pcLink":"https://v.daum.net/v/3","meta":{"createDt":"2024-08-01T02:59:00Z"}}
            ]}}}"#,
        );
        let candidates = parse_listing(response, "endpoint", now(), Some(60)).unwrap();
        let titles: Vec<_> = candidates.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["fresh"]);
    }

    #[test]
    fn test_parse_listing_without_cutoff_keeps_everything() {
        let response = listing(
            r#"{"data":{"media_home_tab_news_all_8":{"items":[
                {"title":"a","pcLink":"https://v.daum.net/v/1","meta":{"createDt":"2020-01-01T00:00:00Z"}},
                {"title":"b","pcLink":"https://v.daum.net/v/2"},
                {"title":null,"pcLink":"https://v.daum.net/v/3"}
            ]}}}"#,
        );
        let candidates = parse_listing(response, "endpoint", now(), None).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].recency_minutes, None);
    }

    #[test]
    fn test_parse_listing_graphql_errors() {
        let response = listing(r#"{"data":null,"errors":[{"message":"boom"}]}"#);
        let err = parse_listing(response, "endpoint", now(), None).unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[test]
    fn test_parse_create_dt_formats() {
        let expected = now();
        assert_eq!(parse_create_dt(&json!(expected.timestamp_millis())), Some(expected));
        assert_eq!(parse_create_dt(&json!("20240801120000")), Some(expected));
        assert_eq!(parse_create_dt(&json!("2024-08-01 12:00:00")), Some(expected));
        assert_eq!(parse_create_dt(&json!("2024-08-01T12:00:00+09:00")), Some(expected));
        assert_eq!(parse_create_dt(&json!("yesterday")), None);
    }

    #[test]
    fn test_request_body_targets_channel() {
        let source = KakaoSource::new(Client::new(), SourceConfig::default());
        let body = source.request_body(73);
        let params = &body["variables"]["media_home_tab_news_all_8Params"];
        assert_eq!(params["cpId"], "73");
        assert_eq!(params["size"], 5);
        assert_eq!(params["sort"], "createDt:desc");
    }
}
