//! Postgres backend.
//!
//! Tables are created on start-up with `CREATE TABLE IF NOT EXISTS`; the read
//! side of the site queries the same `news` and `comments` tables.

use super::PersistenceGateway;
use crate::error::PersistenceError;
use crate::models::{Comment, GeneratedArticle};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS news (
        id VARCHAR(10) PRIMARY KEY,
        date TIMESTAMPTZ NOT NULL,
        title TEXT NOT NULL,
        article TEXT NOT NULL,
        img TEXT NOT NULL,
        likes BIGINT NOT NULL DEFAULT 0,
        dislikes BIGINT NOT NULL DEFAULT 0,
        comments BIGINT NOT NULL DEFAULT 0,
        reports BIGINT NOT NULL DEFAULT 0,
        views BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id BIGSERIAL PRIMARY KEY,
        article_id VARCHAR(10) NOT NULL REFERENCES news(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        content TEXT NOT NULL,
        date TIMESTAMPTZ NOT NULL,
        automated BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS comments_article_id_idx ON comments (article_id)",
    "CREATE INDEX IF NOT EXISTS news_date_idx ON news (date DESC)",
    // Add future migrations here
];

/// Postgres-backed gateway over a bounded connection pool.
#[derive(Debug, Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    #[instrument(level = "info", skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let gateway = Self { pool };
        gateway.migrate().await?;
        info!("Connected to database");
        Ok(gateway)
    }

    async fn migrate(&self) -> Result<(), PersistenceError> {
        for (index, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&self.pool)
                .await
                .map_err(|source| PersistenceError::Migration { index, source })?;
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for PgGateway {
    #[instrument(level = "info", skip_all, fields(id = %article.id))]
    async fn insert_article(&self, article: &GeneratedArticle) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO news (id, date, title, article, img)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&article.id)
        .bind(article.created_at.with_timezone(&Utc))
        .bind(&article.title)
        .bind(&article.body)
        .bind(article.image.to_column()?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(article_id = %comment.article_id))]
    async fn insert_comment(&self, comment: &Comment) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO comments (article_id, name, content, date, automated)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&comment.article_id)
        .bind(&comment.display_name)
        .bind(&comment.text)
        .bind(comment.created_at.with_timezone(&Utc))
        .bind(comment.is_automated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn increment_comment_count(&self, article_id: &str) -> Result<(), PersistenceError> {
        sqlx::query("UPDATE news SET comments = comments + 1 WHERE id = $1")
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
