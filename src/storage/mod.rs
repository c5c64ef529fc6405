//! Persistence gateway for generated articles and comments.
//!
//! The pipeline only ever writes through three parameterized statements, so
//! the gateway is intentionally narrow. Each call commits on its own; there
//! is no transaction spanning an article insert and later comment updates.
//!
//! - [`postgres::PgGateway`]: production backend on a bounded `sqlx` pool
//! - [`memory::MemoryGateway`]: in-process backend for `--dry-run` and tests

use crate::error::PersistenceError;
use crate::models::{Comment, GeneratedArticle};
use async_trait::async_trait;

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn insert_article(&self, article: &GeneratedArticle) -> Result<(), PersistenceError>;

    async fn insert_comment(&self, comment: &Comment) -> Result<(), PersistenceError>;

    async fn increment_comment_count(&self, article_id: &str) -> Result<(), PersistenceError>;
}
