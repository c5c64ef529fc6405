//! Delayed synthetic comments.
//!
//! After an article is stored, a handful of filler comments are planned at
//! random offsets and each one is inserted by its own detached task when its
//! timer fires. The tasks are fire-and-forget: nothing tracks or cancels them,
//! and exiting the process drops whatever has not fired yet.

use crate::config::CommentsConfig;
use crate::models::{Comment, GeneratedArticle};
use crate::storage::PersistenceGateway;
use crate::utils::kst_now;
use rand::Rng;
use rand::rng;
use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const FILLER_NAMES: &[&str] = &[
    "지나가던 허접",
    "출근길 독자",
    "뉴스중독자",
    "익명의 구독자",
    "댓글요정",
    "야근하는 직장인",
    "아침형 인간",
    "점심시간 독자",
];

const FILLER_TEXTS: &[&str] = &[
    "오늘도 잘 읽고 갑니다",
    "기자님 말투 중독성 있네요 ㅋㅋ",
    "허접이라니 너무해요",
    "이게 진짜 뉴스지",
    "매일 챙겨보는 중입니다",
    "아침부터 팩폭 당했다",
    "공감 백배 ㅋㅋㅋ",
    "요약 깔끔하네요",
];

/// Schedules synthetic comments for a freshly stored article.
pub trait CommentScheduler: Send + Sync {
    fn schedule(&self, article: &GeneratedArticle);
}

/// One comment to insert once `delay` has elapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedComment {
    pub delay: Duration,
    pub display_name: String,
    pub text: String,
}

/// Pick how many comments to write, who writes them and when.
///
/// Names and texts are not repeated within one article as long as the filler
/// lists are long enough.
pub fn plan_comments<R: Rng>(config: &CommentsConfig, rng: &mut R) -> Vec<PlannedComment> {
    let count = rng.random_range(config.min_count..=config.max_count);
    let names: Vec<&str> = FILLER_NAMES.choose_multiple(rng, count).copied().collect();
    let texts: Vec<&str> = FILLER_TEXTS.choose_multiple(rng, count).copied().collect();

    (0..count)
        .map(|i| PlannedComment {
            delay: Duration::from_secs(
                rng.random_range(config.min_delay_secs..=config.max_delay_secs),
            ),
            display_name: names[i % names.len()].to_string(),
            text: texts[i % texts.len()].to_string(),
        })
        .collect()
}

/// Spawns one tokio task per planned comment.
pub struct DelayedCommentScheduler {
    store: Arc<dyn PersistenceGateway>,
    config: CommentsConfig,
}

impl DelayedCommentScheduler {
    pub fn new(store: Arc<dyn PersistenceGateway>, config: CommentsConfig) -> Self {
        Self { store, config }
    }
}

impl CommentScheduler for DelayedCommentScheduler {
    fn schedule(&self, article: &GeneratedArticle) {
        let plan = plan_comments(&self.config, &mut rng());
        info!(id = %article.id, count = plan.len(), "Scheduling synthetic comments");

        for planned in plan {
            let store = Arc::clone(&self.store);
            let article_id = article.id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(planned.delay).await;
                let comment = Comment {
                    article_id: article_id.clone(),
                    display_name: planned.display_name,
                    text: planned.text,
                    created_at: kst_now(),
                    is_automated: true,
                };
                if let Err(e) = store.insert_comment(&comment).await {
                    warn!(id = %article_id, error = %e, "Synthetic comment insert failed");
                    return;
                }
                if let Err(e) = store.increment_comment_count(&article_id).await {
                    warn!(id = %article_id, error = %e, "Comment counter update failed");
                    return;
                }
                debug!(id = %article_id, "Synthetic comment posted");
            });
        }
    }
}
