//! Store traits consumed by the pipeline and the rate limiter
//!
//! The core is written against these traits rather than the concrete
//! repository so the orchestrator and limiter can be exercised with the
//! in-memory store. All operations are individually atomic; no
//! multi-statement transactions are assumed.

use crate::db::models::ArticleStatus;
use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Paper fields written by the pipeline, keyed by (source, source_id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperUpsert {
    pub source: String,
    pub source_id: String,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub pdf_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Minimal view of an article needed by pipeline steps
#[derive(Debug, Clone)]
pub struct ArticleRef {
    pub id: Uuid,
    pub slug: String,
    pub status: ArticleStatus,
    pub cover_key: Option<String>,
}

/// Persistence operations for papers, articles, and the job ledger
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert or update the paper for its (source, source_id) key.
    /// Returns the stable paper id.
    async fn upsert_paper(&self, paper: &PaperUpsert) -> Result<Uuid>;

    /// Create the article draft for a paper if absent; a second call for
    /// the same slug is a no-op. Returns the current article either way.
    async fn ensure_article(&self, paper_id: Uuid, slug: &str, title: &str) -> Result<ArticleRef>;

    /// Promote an article to published with its generated content.
    async fn publish_article(
        &self,
        article_id: Uuid,
        description: &str,
        body: &str,
        published_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Record the asset-store key of a generated cover image.
    async fn set_article_cover(&self, article_id: Uuid, cover_key: &str) -> Result<()>;

    /// Open a ledger row for a step invocation. Mints a fresh id.
    async fn start_job(&self, kind: &str, input: serde_json::Value) -> Result<Uuid>;

    /// Mark a running job as done with its output payload.
    async fn complete_job(&self, job_id: Uuid, output: serde_json::Value) -> Result<()>;

    /// Mark a running job as failed with its error message.
    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<()>;
}

/// Persistence operations for sliding-window rate limiting
#[async_trait]
pub trait RateWindowStore: Send + Sync {
    /// Delete entries for this key/endpoint older than the cutoff.
    /// Returns the number of rows removed.
    async fn purge_entries_before(
        &self,
        client_key: &str,
        endpoint: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64>;

    /// Count remaining entries and return the oldest timestamp among them.
    async fn window_usage(
        &self,
        client_key: &str,
        endpoint: &str,
    ) -> Result<(u64, Option<DateTime<Utc>>)>;

    /// Record an admitted request.
    async fn record_request(
        &self,
        client_key: &str,
        endpoint: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;
}
