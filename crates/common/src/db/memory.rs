//! In-memory store for tests and local development
//!
//! Implements the same store traits as [`Repository`](super::Repository) so
//! the pipeline and rate limiter can be exercised without Postgres.

use crate::db::models::{ArticleStatus, JobStatus};
use crate::db::store::{ArticleRef, ContentStore, PaperUpsert, RateWindowStore};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// A paper row held by the memory store
#[derive(Debug, Clone)]
pub struct StoredPaper {
    pub id: Uuid,
    pub fields: PaperUpsert,
}

/// An article row held by the memory store
#[derive(Debug, Clone)]
pub struct StoredArticle {
    pub id: Uuid,
    pub paper_id: Uuid,
    pub slug: String,
    pub status: ArticleStatus,
    pub title: String,
    pub description: Option<String>,
    pub body: Option<String>,
    pub cover_key: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// A job ledger row held by the memory store
#[derive(Debug, Clone)]
pub struct StoredJob {
    pub id: Uuid,
    pub kind: String,
    pub status: JobStatus,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct RateEntry {
    client_key: String,
    endpoint: String,
    requested_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    papers: Vec<StoredPaper>,
    articles: Vec<StoredArticle>,
    jobs: Vec<StoredJob>,
    rate_entries: Vec<RateEntry>,
}

/// In-memory implementation of the store traits
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    /// Snapshot of all papers
    pub fn papers(&self) -> Vec<StoredPaper> {
        self.lock().papers.clone()
    }

    /// Look up a paper by its feed key
    pub fn paper(&self, source: &str, source_id: &str) -> Option<StoredPaper> {
        self.lock()
            .papers
            .iter()
            .find(|p| p.fields.source == source && p.fields.source_id == source_id)
            .cloned()
    }

    /// Snapshot of all articles
    pub fn articles(&self) -> Vec<StoredArticle> {
        self.lock().articles.clone()
    }

    /// Look up an article by slug
    pub fn article(&self, slug: &str) -> Option<StoredArticle> {
        self.lock().articles.iter().find(|a| a.slug == slug).cloned()
    }

    /// Snapshot of the job ledger
    pub fn jobs(&self) -> Vec<StoredJob> {
        self.lock().jobs.clone()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn upsert_paper(&self, paper: &PaperUpsert) -> Result<Uuid> {
        let mut inner = self.lock();

        if let Some(existing) = inner
            .papers
            .iter_mut()
            .find(|p| p.fields.source == paper.source && p.fields.source_id == paper.source_id)
        {
            existing.fields = paper.clone();
            return Ok(existing.id);
        }

        let id = Uuid::new_v4();
        inner.papers.push(StoredPaper {
            id,
            fields: paper.clone(),
        });
        Ok(id)
    }

    async fn ensure_article(&self, paper_id: Uuid, slug: &str, title: &str) -> Result<ArticleRef> {
        let mut inner = self.lock();

        if let Some(existing) = inner.articles.iter().find(|a| a.slug == slug) {
            return Ok(ArticleRef {
                id: existing.id,
                slug: existing.slug.clone(),
                status: existing.status.clone(),
                cover_key: existing.cover_key.clone(),
            });
        }

        let article = StoredArticle {
            id: Uuid::new_v4(),
            paper_id,
            slug: slug.to_string(),
            status: ArticleStatus::Draft,
            title: title.to_string(),
            description: None,
            body: None,
            cover_key: None,
            published_at: None,
        };
        let article_ref = ArticleRef {
            id: article.id,
            slug: article.slug.clone(),
            status: article.status.clone(),
            cover_key: None,
        };
        inner.articles.push(article);
        Ok(article_ref)
    }

    async fn publish_article(
        &self,
        article_id: Uuid,
        description: &str,
        body: &str,
        published_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.lock();
        let article = inner
            .articles
            .iter_mut()
            .find(|a| a.id == article_id)
            .ok_or_else(|| AppError::Internal {
                message: format!("article {} not found", article_id),
            })?;

        article.status = ArticleStatus::Published;
        article.description = Some(description.to_string());
        article.body = Some(body.to_string());
        article.published_at = Some(published_at);
        Ok(())
    }

    async fn set_article_cover(&self, article_id: Uuid, cover_key: &str) -> Result<()> {
        let mut inner = self.lock();
        let article = inner
            .articles
            .iter_mut()
            .find(|a| a.id == article_id)
            .ok_or_else(|| AppError::Internal {
                message: format!("article {} not found", article_id),
            })?;

        article.cover_key = Some(cover_key.to_string());
        Ok(())
    }

    async fn start_job(&self, kind: &str, input: serde_json::Value) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.lock().jobs.push(StoredJob {
            id,
            kind: kind.to_string(),
            status: JobStatus::Running,
            input,
            output: None,
            error: None,
        });
        Ok(id)
    }

    async fn complete_job(&self, job_id: Uuid, output: serde_json::Value) -> Result<()> {
        let mut inner = self.lock();
        if let Some(job) = inner
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Running)
        {
            job.status = JobStatus::Done;
            job.output = Some(output);
        }
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut inner = self.lock();
        if let Some(job) = inner
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Running)
        {
            job.status = JobStatus::Failed;
            job.error = Some(error.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl RateWindowStore for MemoryStore {
    async fn purge_entries_before(
        &self,
        client_key: &str,
        endpoint: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let mut inner = self.lock();
        let before = inner.rate_entries.len();
        inner.rate_entries.retain(|e| {
            !(e.client_key == client_key && e.endpoint == endpoint && e.requested_at < cutoff)
        });
        Ok((before - inner.rate_entries.len()) as u64)
    }

    async fn window_usage(
        &self,
        client_key: &str,
        endpoint: &str,
    ) -> Result<(u64, Option<DateTime<Utc>>)> {
        let inner = self.lock();
        let mut count = 0u64;
        let mut oldest: Option<DateTime<Utc>> = None;
        for entry in inner
            .rate_entries
            .iter()
            .filter(|e| e.client_key == client_key && e.endpoint == endpoint)
        {
            count += 1;
            if oldest.map(|t| entry.requested_at < t).unwrap_or(true) {
                oldest = Some(entry.requested_at);
            }
        }
        Ok((count, oldest))
    }

    async fn record_request(
        &self,
        client_key: &str,
        endpoint: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.lock().rate_entries.push(RateEntry {
            client_key: client_key.to_string(),
            endpoint: endpoint.to_string(),
            requested_at: at,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_paper(title: &str) -> PaperUpsert {
        PaperUpsert {
            source: "arxiv".to_string(),
            source_id: "2401.01234v1".to_string(),
            title: title.to_string(),
            abstract_text: "An abstract.".to_string(),
            authors: vec!["A. Author".to_string()],
            categories: vec!["q-bio.NC".to_string()],
            pdf_url: None,
            published_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::new();

        let first = store.upsert_paper(&sample_paper("Original title")).await.unwrap();
        let second = store.upsert_paper(&sample_paper("Revised title")).await.unwrap();

        assert_eq!(first, second);
        let papers = store.papers();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].fields.title, "Revised title");
    }

    #[tokio::test]
    async fn test_ensure_article_second_call_is_noop() {
        let store = MemoryStore::new();
        let paper_id = Uuid::new_v4();

        let first = store.ensure_article(paper_id, "arxiv-2401-01234v1", "Title").await.unwrap();
        let second = store.ensure_article(paper_id, "arxiv-2401-01234v1", "Title").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.articles().len(), 1);
    }

    #[tokio::test]
    async fn test_job_transitions_are_monotonic() {
        let store = MemoryStore::new();

        let id = store
            .start_job("summarize", serde_json::json!({"slug": "x"}))
            .await
            .unwrap();
        store.fail_job(id, "boom").await.unwrap();
        // A second transition on a terminal row is ignored.
        store.complete_job(id, serde_json::json!({})).await.unwrap();

        let jobs = store.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert_eq!(jobs[0].error.as_deref(), Some("boom"));
    }
}
