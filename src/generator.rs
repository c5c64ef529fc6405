//! Article generation: one queued topic in, one stored article out.
//!
//! The steps run strictly in order and every one of them is an await point:
//!
//! 1. fetch the source article body
//! 2. persona rewrite (aborts on `None`)
//! 3. split the rewrite into title and body
//! 4. image keywords from the *original* body (falls back to the placeholder)
//! 5. image resolution
//! 6. KST timestamp and article id
//! 7. insert
//! 8. schedule synthetic comments
//!
//! A failure anywhere before step 7 completes leaves nothing behind.

use crate::api::{GenerationParams, TextGenerator};
use crate::comments::CommentScheduler;
use crate::error::PipelineError;
use crate::images::ImageResolver;
use crate::models::{GeneratedArticle, Topic};
use crate::prompts::{
    AFFECT_MARKER, keyword_prompt, parse_keywords, parse_rewrite, rewrite_prompt,
};
use crate::scrapers::ArticleFetcher;
use crate::storage::PersistenceGateway;
use crate::topics::TopicSelector;
use crate::utils::{article_id, decode_article_id, kst_now, truncate_for_log};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Runs the fetch, rewrite, image and store steps for one topic at a time.
///
/// Holds no per-article state, so one instance is shared by every drain tick.
pub struct ArticleGenerator {
    fetcher: Arc<dyn ArticleFetcher>,
    generator: Arc<dyn TextGenerator>,
    images: Arc<ImageResolver>,
    store: Arc<dyn PersistenceGateway>,
    comments: Arc<dyn CommentScheduler>,
    params: GenerationParams,
}

impl ArticleGenerator {
    /// # Arguments
    ///
    /// * `fetcher` - pulls the source article body
    /// * `generator` - persona rewrite and keyword extraction
    /// * `images` - keyword to image URL resolution
    /// * `store` - where the finished article is written
    /// * `comments` - receives each stored article for delayed comments
    /// * `params` - sampling parameters for both model calls
    pub fn new(
        fetcher: Arc<dyn ArticleFetcher>,
        generator: Arc<dyn TextGenerator>,
        images: Arc<ImageResolver>,
        store: Arc<dyn PersistenceGateway>,
        comments: Arc<dyn CommentScheduler>,
        params: GenerationParams,
    ) -> Self {
        Self {
            fetcher,
            generator,
            images,
            store,
            comments,
            params,
        }
    }

    /// Pop the next topic and generate it. An empty queue is a no-op.
    pub async fn run_next(&self, selector: &TopicSelector) -> Option<GeneratedArticle> {
        let Some(topic) = selector.next_topic().await else {
            info!("Topic queue empty; nothing to generate");
            return None;
        };
        self.generate(topic).await
    }

    /// Turn one topic into a stored article.
    ///
    /// `Some` means exactly one row was persisted and comments were scheduled.
    /// Every failure is logged here and yields `None`.
    #[instrument(level = "info", skip_all, fields(title = %topic.title(), url = %topic.url()))]
    pub async fn generate(&self, topic: Topic) -> Option<GeneratedArticle> {
        match self.try_generate(&topic).await {
            Ok(article) => {
                info!(
                    id = %article.id,
                    title = %article.title,
                    images = ?article.image.urls(),
                    "Article generated"
                );
                Some(article)
            }
            Err(e @ PipelineError::Persistence(_)) => {
                error!(error = %e, "Article generation failed");
                None
            }
            Err(e) => {
                warn!(error = %e, "Article generation aborted");
                None
            }
        }
    }

    async fn try_generate(&self, topic: &Topic) -> Result<GeneratedArticle, PipelineError> {
        let source_body = self.fetcher.fetch_body(topic.url()).await?;
        if source_body.trim().is_empty() {
            return Err(PipelineError::parse("article body", "no text extracted"));
        }

        let rewrite = self
            .generator
            .complete(&rewrite_prompt(&source_body), &self.params)
            .await
            .ok_or(PipelineError::GenerationNull { stage: "rewrite" })?;
        debug!(preview = %truncate_for_log(&rewrite, 200), "Rewrite received");
        let (title, body) = parse_rewrite(&rewrite)?;
        if !body.contains(AFFECT_MARKER) {
            warn!("Rewrite lost the persona marker; storing it anyway");
        }

        let keywords = match self
            .generator
            .complete(&keyword_prompt(&source_body), &self.params)
            .await
        {
            Some(response) => parse_keywords(&response),
            None => {
                warn!("Keyword extraction produced nothing; using placeholder image");
                Vec::new()
            }
        };
        let image = self.images.resolve(&keywords).await;

        let created_at = kst_now();
        let id = article_id(created_at.naive_local());
        if decode_article_id(&id).is_none() {
            return Err(PipelineError::parse("article id", format!("malformed id {id}")));
        }
        let mut article = GeneratedArticle::new(id, created_at, title, body, image);
        article.source_url = Some(topic.url().to_string());

        self.store.insert_article(&article).await?;
        self.comments.schedule(&article);
        Ok(article)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerationConfig, ImagesConfig, TopicsConfig};
    use crate::images::ImageCandidate;
    use crate::models::ImageRef;
    use crate::storage::memory::MemoryGateway;
    use crate::testing::{
        FailingGateway, RecordingCommentScheduler, ScriptedGenerator, StaticSource, StubFetcher,
        StubImageProvider, candidate,
    };
    use crate::utils::ARTICLE_ID_LEN;

    const REWRITE: &str = "**폭염 특보래♡**\n\n\
        전국이 찜통이래♡ 허접들 땀 뻘뻘♡\n\
        물 많이 마셔♡ 안 그럼 쓰러진다♡";

    struct Harness {
        generator: Arc<ScriptedGenerator>,
        store: Arc<MemoryGateway>,
        comments: Arc<RecordingCommentScheduler>,
        article_generator: ArticleGenerator,
    }

    fn resolver() -> Arc<ImageResolver> {
        let primary = StubImageProvider::new("primary")
            .with("heatwave", vec![ImageCandidate::free("https://img.example/heat.jpg")]);
        Arc::new(ImageResolver::new(
            Arc::new(primary),
            None,
            ImagesConfig {
                placeholder_url: "https://img.example/placeholder.jpg".to_string(),
                ..ImagesConfig::default()
            },
        ))
    }

    fn harness(fetcher: StubFetcher, responses: Vec<Option<&str>>) -> Harness {
        let generator = Arc::new(ScriptedGenerator::new(responses));
        let store = Arc::new(MemoryGateway::new());
        let comments = Arc::new(RecordingCommentScheduler::default());
        let article_generator = ArticleGenerator::new(
            Arc::new(fetcher),
            generator.clone(),
            resolver(),
            store.clone(),
            comments.clone(),
            GenerationParams::from_config(&GenerationConfig::default()),
        );
        Harness {
            generator,
            store,
            comments,
            article_generator,
        }
    }

    fn topic() -> Topic {
        Topic::new(candidate("Heatwave"))
    }

    #[tokio::test]
    async fn test_generate_stores_article_and_schedules_comments() {
        let h = harness(StubFetcher::ok("기상청은 폭염 특보를 확대했다."), vec![
            Some(REWRITE),
            Some("heatwave, summer"),
        ]);

        let article = h.article_generator.generate(topic()).await.unwrap();
        assert_eq!(article.title, "폭염 특보래♡");
        assert!(article.body.starts_with("전국이 찜통이래♡"));
        assert_eq!(article.body.lines().count(), 2);
        assert_eq!(article.id.len(), ARTICLE_ID_LEN);
        assert!(decode_article_id(&article.id).is_some());
        assert_eq!(
            article.image,
            ImageRef::Many(vec![
                "https://img.example/heat.jpg".to_string(),
                "https://img.example/placeholder.jpg".to_string(),
            ])
        );
        assert_eq!(article.source_url.as_deref(), Some(topic().url()));

        let stored = h.store.articles().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, article.id);
        assert_eq!(h.comments.scheduled(), vec![article.id.clone()]);
    }

    #[tokio::test]
    async fn test_keywords_come_from_source_body() {
        let h = harness(StubFetcher::ok("원문 본문"), vec![Some(REWRITE), Some("heatwave")]);
        h.article_generator.generate(topic()).await.unwrap();

        let prompts = h.generator.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(
            prompts[1].last(),
            Some(&crate::api::PromptPart::Input("원문 본문".to_string()))
        );
    }

    #[tokio::test]
    async fn test_fetch_error_writes_nothing() {
        let h = harness(StubFetcher::failing(), vec![Some(REWRITE), Some("heatwave")]);

        assert!(h.article_generator.generate(topic()).await.is_none());
        assert_eq!(h.store.calls(), 0);
        assert!(h.comments.scheduled().is_empty());
        assert_eq!(h.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_null_rewrite_writes_nothing() {
        let h = harness(StubFetcher::ok("본문"), vec![None]);

        assert!(h.article_generator.generate(topic()).await.is_none());
        assert_eq!(h.store.calls(), 0);
        assert!(h.comments.scheduled().is_empty());
        assert_eq!(h.generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_rewrite_writes_nothing() {
        let h = harness(StubFetcher::ok("본문"), vec![Some("제목만 있음"), Some("heatwave")]);

        assert!(h.article_generator.generate(topic()).await.is_none());
        assert_eq!(h.store.calls(), 0);
    }

    #[tokio::test]
    async fn test_null_keywords_fall_back_to_placeholder() {
        let h = harness(StubFetcher::ok("본문"), vec![Some(REWRITE), None]);

        let article = h.article_generator.generate(topic()).await.unwrap();
        assert_eq!(
            article.image,
            ImageRef::Single("https://img.example/placeholder.jpg".to_string())
        );
        assert_eq!(h.store.articles().await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_body_aborts_before_generation() {
        let h = harness(StubFetcher::ok("   "), vec![Some(REWRITE)]);

        assert!(h.article_generator.generate(topic()).await.is_none());
        assert_eq!(h.generator.calls(), 0);
        assert_eq!(h.store.calls(), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_schedules_no_comments() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Some(REWRITE), Some("heatwave")]));
        let comments = Arc::new(RecordingCommentScheduler::default());
        let article_generator = ArticleGenerator::new(
            Arc::new(StubFetcher::ok("본문")),
            generator,
            resolver(),
            Arc::new(FailingGateway),
            comments.clone(),
            GenerationParams::from_config(&GenerationConfig::default()),
        );

        assert!(article_generator.generate(topic()).await.is_none());
        assert!(comments.scheduled().is_empty());
    }

    #[tokio::test]
    async fn test_rewrite_without_marker_is_still_stored() {
        let plain = "**폭염 특보**\n\n전국이 덥다.\n물을 마시자.";
        let h = harness(StubFetcher::ok("본문"), vec![Some(plain), Some("heatwave")]);

        let article = h.article_generator.generate(topic()).await.unwrap();
        assert!(!article.body.contains(AFFECT_MARKER));
        assert_eq!(h.store.articles().await.len(), 1);
        assert_eq!(h.comments.scheduled(), vec![article.id]);
    }

    #[tokio::test]
    async fn test_run_next_pops_before_processing() {
        let source = Arc::new(StaticSource::new(&["Heatwave", "Rain", "Snow"]));
        let picker = Arc::new(ScriptedGenerator::new(vec![Some(r#"{"selected": [0, 1]}"#)]));
        let selector = TopicSelector::new(
            source,
            picker,
            GenerationParams::from_config(&GenerationConfig::default()),
            TopicsConfig::default(),
        );
        selector.refresh().await;
        assert_eq!(selector.queue_len().await, 2);

        // the rewrite fails, the topic is still consumed
        let h = harness(StubFetcher::ok("본문"), vec![None]);
        assert!(h.article_generator.run_next(&selector).await.is_none());
        assert_eq!(selector.queued_titles().await, vec!["Rain"]);
    }

    #[tokio::test]
    async fn test_run_next_on_empty_queue_is_noop() {
        let selector = TopicSelector::new(
            Arc::new(StaticSource::new(&[])),
            Arc::new(ScriptedGenerator::new(vec![])),
            GenerationParams::from_config(&GenerationConfig::default()),
            TopicsConfig::default(),
        );
        let h = harness(StubFetcher::ok("본문"), vec![Some(REWRITE)]);

        assert!(h.article_generator.run_next(&selector).await.is_none());
        assert_eq!(h.generator.calls(), 0);
        assert_eq!(h.store.calls(), 0);
    }
}
