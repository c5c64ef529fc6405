//! Hand-written test doubles shared by the module tests.

use crate::api::{GenerationParams, PromptPart, TextGenerator};
use crate::comments::CommentScheduler;
use crate::error::{FetchError, ImageError, PersistenceError};
use crate::images::{ImageCandidate, ImageProvider};
use crate::models::{Comment, GeneratedArticle, NewsCandidate};
use crate::scrapers::{ArticleFetcher, ArticleSource};
use crate::storage::PersistenceGateway;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn candidate(title: &str) -> NewsCandidate {
    NewsCandidate::new(title, format!("https://v.daum.net/v/{}", title.to_lowercase()))
}

/// Answers with a fixed script of responses, then `None` forever.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<Vec<PromptPart>>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Option<&str>>) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|r| r.map(str::to_string))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<Vec<PromptPart>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, parts: &[PromptPart], _params: &GenerationParams) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(parts.to_vec());
        self.responses.lock().unwrap().pop_front().flatten()
    }
}

/// Returns the same candidate list on every call.
#[derive(Debug, Default)]
pub struct StaticSource {
    candidates: Vec<NewsCandidate>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(titles: &[&str]) -> Self {
        Self {
            candidates: titles.iter().map(|t| candidate(t)).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArticleSource for StaticSource {
    async fn fetch_candidates(&self) -> Vec<NewsCandidate> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.candidates.clone()
    }
}

#[derive(Debug)]
pub struct StubFetcher {
    body: Option<String>,
}

impl StubFetcher {
    pub fn ok(body: &str) -> Self {
        Self {
            body: Some(body.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { body: None }
    }
}

#[async_trait]
impl ArticleFetcher for StubFetcher {
    async fn fetch_body(&self, url: &str) -> Result<String, FetchError> {
        self.body.clone().ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 503,
        })
    }
}

/// Keyword -> canned results. Unknown keywords yield nothing.
#[derive(Debug)]
pub struct StubImageProvider {
    name: &'static str,
    results: HashMap<String, Vec<ImageCandidate>>,
    fail: bool,
}

impl StubImageProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            results: HashMap::new(),
            fail: false,
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn with(mut self, keyword: &str, results: Vec<ImageCandidate>) -> Self {
        self.results.insert(keyword.to_string(), results);
        self
    }
}

#[async_trait]
impl ImageProvider for StubImageProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn search(&self, keyword: &str, _limit: u32) -> Result<Vec<ImageCandidate>, ImageError> {
        if self.fail {
            return Err(ImageError::Status {
                provider: self.name,
                status: 500,
            });
        }
        Ok(self.results.get(keyword).cloned().unwrap_or_default())
    }
}

/// Records which articles had comments scheduled.
#[derive(Debug, Default)]
pub struct RecordingCommentScheduler {
    scheduled: Mutex<Vec<String>>,
}

impl RecordingCommentScheduler {
    pub fn scheduled(&self) -> Vec<String> {
        self.scheduled.lock().unwrap().clone()
    }
}

impl CommentScheduler for RecordingCommentScheduler {
    fn schedule(&self, article: &GeneratedArticle) {
        self.scheduled.lock().unwrap().push(article.id.clone());
    }
}

/// Rejects every statement.
#[derive(Debug, Default)]
pub struct FailingGateway;

#[async_trait]
impl PersistenceGateway for FailingGateway {
    async fn insert_article(&self, _article: &GeneratedArticle) -> Result<(), PersistenceError> {
        Err(PersistenceError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn insert_comment(&self, _comment: &Comment) -> Result<(), PersistenceError> {
        Err(PersistenceError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn increment_comment_count(&self, _article_id: &str) -> Result<(), PersistenceError> {
        Err(PersistenceError::Database(sqlx::Error::PoolTimedOut))
    }
}
