use super::PersistenceGateway;
use crate::error::PersistenceError;
use crate::models::{Comment, GeneratedArticle};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::info;

/// Keeps everything in process memory. Used by `--dry-run` and in tests.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    articles: RwLock<Vec<GeneratedArticle>>,
    comments: RwLock<Vec<Comment>>,
    calls: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn articles(&self) -> Vec<GeneratedArticle> {
        self.articles.read().await.clone()
    }

    #[cfg(test)]
    pub async fn comments(&self) -> Vec<Comment> {
        self.comments.read().await.clone()
    }

    /// Total number of gateway calls of any kind.
    #[cfg(test)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn insert_article(&self, article: &GeneratedArticle) -> Result<(), PersistenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        info!(id = %article.id, title = %article.title, "Stored article in memory");
        self.articles.write().await.push(article.clone());
        Ok(())
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<(), PersistenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.comments.write().await.push(comment.clone());
        Ok(())
    }

    async fn increment_comment_count(&self, article_id: &str) -> Result<(), PersistenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut articles = self.articles.write().await;
        if let Some(article) = articles.iter_mut().find(|a| a.id == article_id) {
            article.comment_count += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageRef;
    use crate::utils::kst_now;

    #[tokio::test]
    async fn test_comment_count_increments_matching_article() {
        let gateway = MemoryGateway::new();
        let article = GeneratedArticle::new(
            "3810dd8c80".to_string(),
            kst_now(),
            "t".to_string(),
            "b".to_string(),
            ImageRef::Single("i".to_string()),
        );
        gateway.insert_article(&article).await.unwrap();
        gateway.increment_comment_count("3810dd8c80").await.unwrap();
        gateway.increment_comment_count("ffffffffff").await.unwrap();

        let stored = gateway.articles().await;
        assert_eq!(stored[0].comment_count, 1);
        assert_eq!(gateway.calls(), 3);
    }
}
