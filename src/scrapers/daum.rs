//! Daum News article scraper.
//!
//! Article pages keep their text under a single `.news_view` container.
//! Photo captions, embedded tables and scripts live inside the same
//! container and are dropped while walking the tree. The reporter byline and
//! copyright notice that close every article are trimmed off the end.

use super::ArticleFetcher;
use crate::error::FetchError;
use async_trait::async_trait;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{info, instrument, warn};
use url::Url;

const SKIPPED_TAGS: &[&str] = &["figcaption", "table", "script", "style", "noscript", "button"];
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "figure", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote",
];

/// Reporter contact, copyright or redistribution notice, or a bare `<name> 기자` line.
static TRAILER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)[\w.+-]+@[\w-]+\.[\w.-]+|ⓒ|©|copyright|무단\s*전재|재배포\s*금지|^[^.!?]{0,20}기자\s*$",
    )
    .unwrap()
});

/// Fetches and extracts article bodies from Daum News pages.
#[derive(Debug, Clone)]
pub struct DaumFetcher {
    client: Client,
    content_selector: String,
}

impl DaumFetcher {
    pub fn new(client: Client, content_selector: impl Into<String>) -> Self {
        Self {
            client,
            content_selector: content_selector.into(),
        }
    }
}

#[async_trait]
impl ArticleFetcher for DaumFetcher {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch_body(&self, url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url)?;
        let response = self.client.get(parsed).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response.text().await?;
        let body = extract_body(&html, &self.content_selector, url)?;
        info!(bytes = body.len(), "Parsed article body");
        Ok(body)
    }
}

/// Extract the readable text of the first element matching `selector`.
///
/// Missing sub-elements are fine: whatever text exists is returned. Only a
/// missing container (or an unusable selector) is an error.
pub fn extract_body(html: &str, selector: &str, url: &str) -> Result<String, FetchError> {
    let missing = || FetchError::MissingContent {
        url: url.to_string(),
        selector: selector.to_string(),
    };
    let parsed_selector = Selector::parse(selector).map_err(|_| missing())?;
    let document = Html::parse_document(html);
    let container = document.select(&parsed_selector).next().ok_or_else(missing)?;

    let mut raw = String::new();
    collect_text(container, &mut raw);

    let mut lines: Vec<String> = raw
        .lines()
        .map(|line| line.split_whitespace().join(" "))
        .filter(|line| !line.is_empty())
        .collect();
    while lines.last().is_some_and(|line| TRAILER_LINE.is_match(line)) {
        lines.pop();
    }
    let body = lines.join("\n");

    if body.is_empty() {
        warn!(%url, "Article container had no text");
    }
    Ok(body)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_TAGS.contains(&name) || el.classes().any(|c| c.contains("caption")) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(child_ref, out);
                }
                if BLOCK_TAGS.contains(&name) {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="head_view"><h3>headline</h3></div>
          <div class="news_view">
            <div class="article_view">
              <section>
                <figure class="figure_frm">
                  <img src="x.jpg">
                  <figcaption class="txt_caption">사진 설명입니다</figcaption>
                </figure>
                <p dmcf-ptype="general">첫 번째   문단입니다.</p>
                <p dmcf-ptype="general">두 번째 줄<br>이어지는 줄</p>
                <table><tr><td>표 내용</td></tr></table>
                <span class="sub_caption">작은 캡션</span>
                <p>세 번째 문단</p>
              </section>
            </div>
          </div>
        </body></html>"#;

    #[test]
    fn test_extract_body_strips_captions_and_tables() {
        let body = extract_body(PAGE, ".news_view", "https://v.daum.net/v/1").unwrap();
        assert_eq!(
            body,
            "첫 번째 문단입니다.\n두 번째 줄\n이어지는 줄\n세 번째 문단"
        );
        assert!(!body.contains("사진 설명"));
        assert!(!body.contains("표 내용"));
        assert!(!body.contains("headline"));
    }

    #[test]
    fn test_extract_body_drops_byline_and_copyright() {
        let page = r#"
            <div class="news_view">
              <p>정부가 폭염 대책을 발표했다.</p>
              <p>현장 기자들은 더위에 지쳤다는 반응이다.</p>
              <p>홍길동 기자 hong@example.com</p>
              <p>ⓒ 뉴스사 무단전재 및 재배포 금지</p>
            </div>"#;
        let body = extract_body(page, ".news_view", "u").unwrap();
        assert_eq!(
            body,
            "정부가 폭염 대책을 발표했다.\n현장 기자들은 더위에 지쳤다는 반응이다."
        );
        assert!(!body.contains("hong@example.com"));
    }

    #[test]
    fn test_extract_body_drops_bare_reporter_line() {
        let page = r#"<div class="news_view"><p>본문 문장.</p><p>김철수 기자</p></div>"#;
        assert_eq!(extract_body(page, ".news_view", "u").unwrap(), "본문 문장.");
    }

    #[test]
    fn test_extract_body_missing_container() {
        let err = extract_body("<html><body><p>x</p></body></html>", ".news_view", "u").unwrap_err();
        assert!(matches!(err, FetchError::MissingContent { .. }));
    }

    #[test]
    fn test_extract_body_tolerates_empty_container() {
        let body = extract_body(
            r#"<div class="news_view"><figure><figcaption>only a caption</figcaption></figure></div>"#,
            ".news_view",
            "u",
        )
        .unwrap();
        assert_eq!(body, "");
    }

    #[test]
    fn test_extract_body_bad_selector() {
        assert!(extract_body(PAGE, "!!", "u").is_err());
    }
}
