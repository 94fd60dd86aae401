//! Repository pattern for database operations
//!
//! Implements the store traits against Postgres. Upserts are expressed as
//! single ON CONFLICT statements so every write is individually atomic and
//! safe to repeat.

use crate::db::models::*;
use crate::db::store::{ArticleRef, ContentStore, PaperUpsert, RateWindowStore};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, Set, Statement,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        &self.pool.primary
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

#[async_trait]
impl ContentStore for Repository {
    async fn upsert_paper(&self, paper: &PaperUpsert) -> Result<Uuid> {
        let now = Utc::now();

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO papers (
                id, source, source_id, title, abstract_text,
                authors, categories, pdf_url, published_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            ON CONFLICT (source, source_id) DO UPDATE SET
                title = EXCLUDED.title,
                abstract_text = EXCLUDED.abstract_text,
                authors = EXCLUDED.authors,
                categories = EXCLUDED.categories,
                pdf_url = EXCLUDED.pdf_url,
                published_at = EXCLUDED.published_at,
                updated_at = EXCLUDED.updated_at
            RETURNING id
            "#,
            vec![
                Uuid::new_v4().into(),
                paper.source.clone().into(),
                paper.source_id.clone().into(),
                paper.title.clone().into(),
                paper.abstract_text.clone().into(),
                serde_json::json!(paper.authors).into(),
                serde_json::json!(paper.categories).into(),
                paper.pdf_url.clone().into(),
                paper.published_at.into(),
                now.into(),
            ],
        );

        let row = self
            .write_conn()
            .query_one(stmt)
            .await?
            .ok_or_else(|| AppError::Internal {
                message: "paper upsert returned no row".to_string(),
            })?;

        row.try_get_by_index::<Uuid>(0)
            .map_err(sea_orm::DbErr::from)
            .map_err(Into::into)
    }

    async fn ensure_article(&self, paper_id: Uuid, slug: &str, title: &str) -> Result<ArticleRef> {
        let now = Utc::now();

        let insert = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO articles (id, paper_id, slug, status, title, created_at, updated_at)
            VALUES ($1, $2, $3, 'draft', $4, $5, $5)
            ON CONFLICT (slug) DO NOTHING
            "#,
            vec![
                Uuid::new_v4().into(),
                paper_id.into(),
                slug.into(),
                title.into(),
                now.into(),
            ],
        );
        self.write_conn().execute(insert).await?;

        let article = ArticleEntity::find()
            .filter(ArticleColumn::Slug.eq(slug))
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::Internal {
                message: format!("article {} missing after ensure", slug),
            })?;

        let status = article.article_status();
        Ok(ArticleRef {
            id: article.id,
            slug: article.slug,
            status,
            cover_key: article.cover_key,
        })
    }

    async fn publish_article(
        &self,
        article_id: Uuid,
        description: &str,
        body: &str,
        published_at: DateTime<Utc>,
    ) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE articles
            SET status = 'published',
                description = $2,
                body = $3,
                published_at = $4,
                updated_at = $5
            WHERE id = $1
            "#,
            vec![
                article_id.into(),
                description.into(),
                body.into(),
                published_at.into(),
                Utc::now().into(),
            ],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    async fn set_article_cover(&self, article_id: Uuid, cover_key: &str) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE articles SET cover_key = $2, updated_at = $3 WHERE id = $1",
            vec![article_id.into(), cover_key.into(), Utc::now().into()],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    async fn start_job(&self, kind: &str, input: serde_json::Value) -> Result<Uuid> {
        let job_id = Uuid::new_v4();
        let now = Utc::now();

        let job = PipelineJobActiveModel {
            id: Set(job_id),
            kind: Set(kind.to_string()),
            status: Set(String::from(JobStatus::Running)),
            input: Set(input),
            output: Set(None),
            error: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        job.insert(self.write_conn()).await?;
        Ok(job_id)
    }

    async fn complete_job(&self, job_id: Uuid, output: serde_json::Value) -> Result<()> {
        // Status transitions are monotonic: only rows still running move.
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE pipeline_jobs
            SET status = 'done', output = $2, updated_at = $3
            WHERE id = $1 AND status = 'running'
            "#,
            vec![job_id.into(), output.into(), Utc::now().into()],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE pipeline_jobs
            SET status = 'failed', error = $2, updated_at = $3
            WHERE id = $1 AND status = 'running'
            "#,
            vec![job_id.into(), error.into(), Utc::now().into()],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }
}

#[async_trait]
impl RateWindowStore for Repository {
    async fn purge_entries_before(
        &self,
        client_key: &str,
        endpoint: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let result = RateLimitEntryEntity::delete_many()
            .filter(RateLimitEntryColumn::ClientKey.eq(client_key))
            .filter(RateLimitEntryColumn::Endpoint.eq(endpoint))
            .filter(RateLimitEntryColumn::RequestedAt.lt(cutoff))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }

    async fn window_usage(
        &self,
        client_key: &str,
        endpoint: &str,
    ) -> Result<(u64, Option<DateTime<Utc>>)> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT COUNT(*), MIN(requested_at)
            FROM rate_limit_entries
            WHERE client_key = $1 AND endpoint = $2
            "#,
            vec![client_key.into(), endpoint.into()],
        );

        let row = self
            .read_conn()
            .query_one(stmt)
            .await?
            .ok_or_else(|| AppError::Internal {
                message: "rate limit count returned no row".to_string(),
            })?;

        let count = row
            .try_get_by_index::<i64>(0)
            .map_err(sea_orm::DbErr::from)?;
        let oldest = row
            .try_get_by_index::<Option<DateTime<Utc>>>(1)
            .map_err(sea_orm::DbErr::from)?;

        Ok((count.max(0) as u64, oldest))
    }

    async fn record_request(
        &self,
        client_key: &str,
        endpoint: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = RateLimitEntryActiveModel {
            id: Set(Uuid::new_v4()),
            client_key: Set(client_key.to_string()),
            endpoint: Set(endpoint.to_string()),
            requested_at: Set(at.into()),
        };

        entry.insert(self.write_conn()).await?;
        Ok(())
    }
}
