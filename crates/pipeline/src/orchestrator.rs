//! Pipeline orchestrator
//!
//! Executes one ingestion tick end-to-end: fetch from every feed adapter,
//! upsert a bounded prefix of candidates, and enrich each into a published
//! article. Failures are isolated per feed and per entry; the tick always
//! returns a summary instead of raising.

use crate::feeds::{FeedAdapter, FetchError, SourceEntry};
use crate::steps::{Step, StepTracker};
use chrono::Utc;
use paperwire_common::assets::AssetStore;
use paperwire_common::config::PipelineConfig;
use paperwire_common::db::{ArticleRef, ContentStore, PaperUpsert};
use paperwire_common::errors::{AppError, Result};
use paperwire_common::generation::{ChatMessage, ResilientClient};
use paperwire_common::metrics;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Volume knobs for one tick
#[derive(Debug, Clone)]
pub struct TickOptions {
    /// Maximum entries requested from each feed
    pub max_results: usize,
    /// Maximum entries given full processing
    pub max_papers_to_process: usize,
}

impl TickOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_results: config.max_results,
            max_papers_to_process: config.max_papers_to_process,
        }
    }
}

/// Aggregate result of one tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickSummary {
    /// Total entries seen across all feeds
    pub fetched: usize,
    /// Entries that completed at least the upsert and draft steps
    pub processed: usize,
    /// All collected error messages
    pub errors: Vec<String>,
    /// Wall-clock time for the whole tick
    pub duration_ms: u64,
}

/// Per-entry working state threaded through the steps
struct EntryCtx {
    slug: String,
    paper_id: Option<Uuid>,
    article: Option<ArticleRef>,
}

struct EntryOutcome {
    processed: bool,
    errors: Vec<String>,
}

/// Drives one ingestion tick
pub struct Orchestrator {
    store: Arc<dyn ContentStore>,
    assets: Arc<dyn AssetStore>,
    client: Arc<ResilientClient>,
    adapters: Vec<Arc<dyn FeedAdapter>>,
    fetch_retries: u32,
    fetch_retry_delay: Duration,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ContentStore>,
        assets: Arc<dyn AssetStore>,
        client: Arc<ResilientClient>,
        adapters: Vec<Arc<dyn FeedAdapter>>,
    ) -> Self {
        Self {
            store,
            assets,
            client,
            adapters,
            fetch_retries: 2,
            fetch_retry_delay: Duration::from_millis(500),
        }
    }

    /// Override the adapter-level retry settings
    pub fn with_fetch_retry(mut self, retries: u32, delay: Duration) -> Self {
        self.fetch_retries = retries;
        self.fetch_retry_delay = delay;
        self
    }

    /// Run one ingestion tick and return its summary.
    ///
    /// Never returns an error: every failure is folded into the summary's
    /// error list.
    pub async fn run_tick(&self, options: &TickOptions) -> TickSummary {
        let started = Instant::now();
        let mut errors: Vec<String> = Vec::new();
        let mut entries: Vec<SourceEntry> = Vec::new();

        for adapter in &self.adapters {
            match self
                .fetch_with_retry(adapter.as_ref(), options.max_results)
                .await
            {
                Ok(batch) => {
                    info!(source = adapter.source(), count = batch.len(), "Feed fetched");
                    entries.extend(batch);
                }
                Err(e) => {
                    warn!(
                        source = adapter.source(),
                        error = %e,
                        "Feed fetch failed, skipping source"
                    );
                    errors.push(format!("fetch {}: {}", adapter.source(), e));
                }
            }
        }

        let fetched = entries.len();
        let mut processed = 0;

        for entry in entries.into_iter().take(options.max_papers_to_process) {
            let outcome = self.process_entry(&entry).await;
            if outcome.processed {
                processed += 1;
            }
            errors.extend(outcome.errors);
        }

        let duration = started.elapsed();
        metrics::record_tick(duration.as_secs_f64(), fetched, processed, errors.len());
        info!(
            fetched,
            processed,
            error_count = errors.len(),
            duration_ms = duration.as_millis() as u64,
            "Ingestion tick complete"
        );

        TickSummary {
            fetched,
            processed,
            errors,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Call one adapter with bounded retries and a linear delay.
    ///
    /// Distinct from the generation breaker: feed failures are not
    /// breaker-governed.
    async fn fetch_with_retry(
        &self,
        adapter: &dyn FeedAdapter,
        max_results: usize,
    ) -> std::result::Result<Vec<SourceEntry>, FetchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match adapter.fetch(max_results).await {
                Ok(entries) => return Ok(entries),
                Err(e) if attempt <= self.fetch_retries => {
                    let delay = self.fetch_retry_delay * attempt;
                    warn!(
                        source = adapter.source(),
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Feed fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run the step sequence for one entry; failures are collected, never
    /// propagated.
    #[instrument(skip(self, entry), fields(source = %entry.source, source_id = %entry.source_id))]
    async fn process_entry(&self, entry: &SourceEntry) -> EntryOutcome {
        let mut tracker = StepTracker::new();
        let mut errors = Vec::new();
        let mut ctx = EntryCtx {
            slug: article_slug(&entry.source, &entry.source_id),
            paper_id: None,
            article: None,
        };

        for step in Step::SEQUENCE {
            if !tracker.ready(step) {
                debug!(step = step.job_kind(), "Skipping step with unmet dependency");
                continue;
            }

            match self.exec_step(step, entry, &mut ctx).await {
                Ok(()) => tracker.mark_ok(step),
                Err(e) => errors.push(format!(
                    "{} {}/{}: {}",
                    step.job_kind(),
                    entry.source,
                    entry.source_id,
                    e
                )),
            }
        }

        EntryOutcome {
            processed: tracker.ok(Step::UpsertPaper) && tracker.ok(Step::EnsureDraft),
            errors,
        }
    }

    /// Run one step with its ledger bookkeeping. Ledger write failures are
    /// warnings, never step failures.
    async fn exec_step(&self, step: Step, entry: &SourceEntry, ctx: &mut EntryCtx) -> Result<()> {
        let input = json!({
            "source": entry.source,
            "source_id": entry.source_id,
            "slug": ctx.slug,
        });
        let job_id = match self.store.start_job(step.job_kind(), input).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(step = step.job_kind(), error = %e, "Job ledger start failed");
                None
            }
        };

        let result = match step {
            Step::UpsertPaper => self.step_upsert(entry, ctx).await,
            Step::EnsureDraft => self.step_ensure_draft(entry, ctx).await,
            Step::Summarize => self.step_summarize(entry, ctx).await,
            Step::GenerateCover => self.step_cover(entry, ctx).await,
        };

        if let Some(job_id) = job_id {
            let ledger = match &result {
                Ok(output) => self.store.complete_job(job_id, output.clone()).await,
                Err(e) => self.store.fail_job(job_id, &e.to_string()).await,
            };
            if let Err(e) = ledger {
                warn!(step = step.job_kind(), error = %e, "Job ledger update failed");
            }
        }

        result.map(|_| ())
    }

    async fn step_upsert(
        &self,
        entry: &SourceEntry,
        ctx: &mut EntryCtx,
    ) -> Result<serde_json::Value> {
        let paper = PaperUpsert {
            source: entry.source.clone(),
            source_id: entry.source_id.clone(),
            title: entry.title.clone(),
            abstract_text: entry.abstract_text.clone(),
            authors: entry.authors.clone(),
            categories: entry.categories.clone(),
            pdf_url: entry.pdf_url.clone(),
            published_at: entry.published_at,
        };

        let paper_id = self.store.upsert_paper(&paper).await?;
        ctx.paper_id = Some(paper_id);
        Ok(json!({ "paper_id": paper_id }))
    }

    async fn step_ensure_draft(
        &self,
        entry: &SourceEntry,
        ctx: &mut EntryCtx,
    ) -> Result<serde_json::Value> {
        let paper_id = ctx.paper_id.ok_or_else(|| AppError::Internal {
            message: "draft step ran without a paper id".to_string(),
        })?;

        let article = self
            .store
            .ensure_article(paper_id, &ctx.slug, &entry.title)
            .await?;
        let output = json!({ "article_id": article.id, "slug": article.slug });
        ctx.article = Some(article);
        Ok(output)
    }

    async fn step_summarize(
        &self,
        entry: &SourceEntry,
        ctx: &mut EntryCtx,
    ) -> Result<serde_json::Value> {
        let article = ctx.article.as_ref().ok_or_else(|| AppError::Internal {
            message: "summarize step ran without an article".to_string(),
        })?;

        let raw = self.client.complete(&summary_messages(entry)).await?;
        let summary = parse_summary(&raw)?;

        self.store
            .publish_article(
                article.id,
                &summary.one_sentence,
                &summary.to_markdown(entry),
                Utc::now(),
            )
            .await?;

        info!(slug = %article.slug, "Article published");
        Ok(json!({ "article_id": article.id }))
    }

    async fn step_cover(
        &self,
        entry: &SourceEntry,
        ctx: &mut EntryCtx,
    ) -> Result<serde_json::Value> {
        let article = ctx.article.as_ref().ok_or_else(|| AppError::Internal {
            message: "cover step ran without an article".to_string(),
        })?;

        // Checked before calling the backend to avoid redundant spend.
        if article.cover_key.is_some() {
            debug!(slug = %article.slug, "Cover already present, skipping generation");
            return Ok(json!({ "skipped": "cover already present" }));
        }

        let image = self.client.generate_image(&cover_prompt(entry)).await?;
        let key = format!("covers/{}.png", ctx.slug);
        self.assets
            .put(&key, &image.bytes, &image.content_type)
            .await?;
        self.store.set_article_cover(article.id, &key).await?;

        Ok(json!({ "cover_key": key }))
    }
}

/// Generated summary sections for one paper
#[derive(Debug, Deserialize)]
pub struct PaperSummary {
    pub one_sentence: String,
    pub code_angle: String,
    pub bio_inspiration: String,
}

impl PaperSummary {
    /// Render the article body as markdown
    pub fn to_markdown(&self, entry: &SourceEntry) -> String {
        let mut body = format!(
            "## One-sentence summary\n\n{}\n\n## The \"code\" angle\n\n{}\n\n## Bio-inspiration\n\n{}\n\n## Source\n\n- Title: {}\n- Source: {}:{}\n- Published: {}\n",
            self.one_sentence,
            self.code_angle,
            self.bio_inspiration,
            entry.title,
            entry.source,
            entry.source_id,
            entry.published_at.to_rfc3339(),
        );
        if let Some(ref pdf) = entry.pdf_url {
            body.push_str(&format!("- PDF: {}\n", pdf));
        }
        body
    }
}

/// Article slug: a pure function of the source paper key, so re-ingestion
/// of the same paper never creates a duplicate article.
pub fn article_slug(source: &str, source_id: &str) -> String {
    let mut s = slug::slugify(format!("{}-{}", source, source_id));
    s.truncate(80);
    s
}

fn summary_messages(entry: &SourceEntry) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You summarize neuroscience and neural-computation papers for a technical blog. \
             Respond with a JSON object containing exactly these string fields: \
             one_sentence, code_angle, bio_inspiration. No markdown, no extra keys.",
        ),
        ChatMessage::user(format!(
            "Title: {}\n\nAbstract: {}",
            entry.title, entry.abstract_text
        )),
    ]
}

fn cover_prompt(entry: &SourceEntry) -> String {
    format!(
        "Minimalist abstract cover illustration for a research article titled \"{}\". \
         Clean geometric shapes, muted colors, no text.",
        entry.title
    )
}

/// Parse the backend's summary response, tolerating markdown code fences.
fn parse_summary(raw: &str) -> Result<PaperSummary> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);

    serde_json::from_str(trimmed.trim()).map_err(|e| AppError::Generation {
        message: format!("summary response was not valid JSON: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use paperwire_common::assets::MemoryAssetStore;
    use paperwire_common::db::models::{ArticleStatus, JobStatus};
    use paperwire_common::db::MemoryStore;
    use paperwire_common::generation::{
        BackendError, BreakerConfig, GeneratedImage, GenerativeBackend, RetryPolicy,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Feed returning a fixed set of entries
    struct StaticFeed {
        name: &'static str,
        entries: Vec<SourceEntry>,
    }

    #[async_trait]
    impl FeedAdapter for StaticFeed {
        fn source(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, max_results: usize) -> std::result::Result<Vec<SourceEntry>, FetchError> {
            Ok(self.entries.iter().take(max_results).cloned().collect())
        }
    }

    /// Feed that always fails, counting attempts
    struct FailingFeed {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl FeedAdapter for FailingFeed {
        fn source(&self) -> &'static str {
            "broken"
        }

        async fn fetch(&self, _max_results: usize) -> std::result::Result<Vec<SourceEntry>, FetchError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Status {
                feed: "broken",
                status: 502,
            })
        }
    }

    /// Backend that fails summarization when the prompt contains a marker
    struct TestBackend {
        fail_marker: Option<String>,
        complete_calls: AtomicU32,
        image_calls: AtomicU32,
    }

    impl TestBackend {
        fn new(fail_marker: Option<&str>) -> Self {
            Self {
                fail_marker: fail_marker.map(String::from),
                complete_calls: AtomicU32::new(0),
                image_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerativeBackend for TestBackend {
        async fn complete(
            &self,
            messages: &[ChatMessage],
        ) -> std::result::Result<String, BackendError> {
            self.complete_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ref marker) = self.fail_marker {
                if messages.iter().any(|m| m.content.contains(marker)) {
                    return Err(BackendError::Http {
                        status: 500,
                        message: "forced failure".to_string(),
                    });
                }
            }
            Ok(serde_json::json!({
                "one_sentence": "A summary.",
                "code_angle": "An implementation sketch.",
                "bio_inspiration": "A biological link."
            })
            .to_string())
        }

        async fn generate_image(
            &self,
            _prompt: &str,
        ) -> std::result::Result<GeneratedImage, BackendError> {
            self.image_calls.fetch_add(1, Ordering::SeqCst);
            Ok(GeneratedImage {
                bytes: vec![1, 2, 3],
                content_type: "image/png".to_string(),
            })
        }

        fn text_model(&self) -> &str {
            "test"
        }
    }

    fn entry(n: u32) -> SourceEntry {
        SourceEntry {
            source: "arxiv".to_string(),
            source_id: format!("2601.0000{}v1", n),
            title: format!("Entry {}", n),
            abstract_text: format!("Abstract for entry {}.", n),
            authors: vec!["A. Author".to_string()],
            categories: vec!["q-bio.NC".to_string()],
            pdf_url: None,
            published_at: Utc::now(),
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        assets: Arc<MemoryAssetStore>,
        backend: Arc<TestBackend>,
        orchestrator: Orchestrator,
    }

    fn harness(backend: TestBackend, adapters: Vec<Arc<dyn FeedAdapter>>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let assets = Arc::new(MemoryAssetStore::new());
        let backend = Arc::new(backend);

        let client = Arc::new(ResilientClient::new(
            backend.clone(),
            BreakerConfig {
                failure_threshold: 50,
                cooldown: Duration::from_secs(60),
            },
            RetryPolicy {
                max_attempts: 1,
                initial_delay: Duration::from_millis(1),
                multiplier: 1.0,
                randomization_factor: 0.0,
                max_delay: Duration::from_millis(1),
            },
        ));

        let orchestrator = Orchestrator::new(store.clone(), assets.clone(), client, adapters)
            .with_fetch_retry(2, Duration::from_millis(1));

        Harness {
            store,
            assets,
            backend,
            orchestrator,
        }
    }

    fn options(max_results: usize, max_process: usize) -> TickOptions {
        TickOptions {
            max_results,
            max_papers_to_process: max_process,
        }
    }

    #[test]
    fn test_article_slug_is_deterministic() {
        assert_eq!(article_slug("arxiv", "2401.01234v1"), "arxiv-2401-01234v1");
        assert_eq!(
            article_slug("arxiv", "2401.01234v1"),
            article_slug("arxiv", "2401.01234v1")
        );
    }

    #[test]
    fn test_parse_summary_tolerates_fences() {
        let fenced = "```json\n{\"one_sentence\":\"a\",\"code_angle\":\"b\",\"bio_inspiration\":\"c\"}\n```";
        let summary = parse_summary(fenced).unwrap();
        assert_eq!(summary.one_sentence, "a");

        assert!(parse_summary("not json").is_err());
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let feed = StaticFeed {
            name: "arxiv",
            entries: vec![entry(1), entry(2), entry(3)],
        };
        let h = harness(TestBackend::new(Some("Entry 2")), vec![Arc::new(feed)]);

        let summary = h.orchestrator.run_tick(&options(10, 10)).await;

        // All three papers and drafts exist despite the forced failure.
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.processed, 3);
        assert_eq!(h.store.papers().len(), 3);
        assert_eq!(h.store.articles().len(), 3);

        // Entry 2 stays a draft but still received a cover.
        let failed = h.store.article(&article_slug("arxiv", "2601.00002v1")).unwrap();
        assert_eq!(failed.status, ArticleStatus::Draft);
        assert!(failed.cover_key.is_some());

        let ok = h.store.article(&article_slug("arxiv", "2601.00001v1")).unwrap();
        assert_eq!(ok.status, ArticleStatus::Published);
        assert!(ok.body.as_deref().unwrap_or("").contains("One-sentence summary"));

        // Cover generation ran for every entry.
        assert_eq!(h.backend.image_calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.assets.len(), 3);

        // Exactly one error, naming the summarize step.
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("summarize"));

        // The ledger recorded the failed step.
        let failed_jobs: Vec<_> = h
            .store
            .jobs()
            .into_iter()
            .filter(|j| j.status == JobStatus::Failed)
            .collect();
        assert_eq!(failed_jobs.len(), 1);
        assert_eq!(failed_jobs[0].kind, "summarize");
    }

    #[tokio::test]
    async fn test_bounded_processing() {
        let entries: Vec<SourceEntry> = (1..=9).map(entry).collect();
        let mut all = entries.clone();
        all.push(entry(10));
        let feed = StaticFeed {
            name: "arxiv",
            entries: all,
        };
        let h = harness(TestBackend::new(None), vec![Arc::new(feed)]);

        let summary = h.orchestrator.run_tick(&options(10, 2)).await;

        assert_eq!(summary.fetched, 10);
        assert_eq!(summary.processed, 2);
        assert!(summary.errors.is_empty());
        assert_eq!(h.store.papers().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_abort_other_feeds() {
        let broken = Arc::new(FailingFeed {
            attempts: AtomicU32::new(0),
        });
        let healthy = StaticFeed {
            name: "arxiv",
            entries: vec![entry(1), entry(2)],
        };
        let h = harness(
            TestBackend::new(None),
            vec![broken.clone() as Arc<dyn FeedAdapter>, Arc::new(healthy)],
        );

        let summary = h.orchestrator.run_tick(&options(10, 10)).await;

        // First attempt plus two retries, then the source is skipped.
        assert_eq!(broken.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("fetch broken"));
    }

    #[tokio::test]
    async fn test_reingestion_is_idempotent() {
        let first = StaticFeed {
            name: "arxiv",
            entries: vec![entry(1)],
        };
        let h = harness(TestBackend::new(None), vec![Arc::new(first)]);

        h.orchestrator.run_tick(&options(10, 10)).await;
        let second = h.orchestrator.run_tick(&options(10, 10)).await;

        assert_eq!(second.processed, 1);
        assert_eq!(h.store.papers().len(), 1);
        assert_eq!(h.store.articles().len(), 1);

        // The cover was generated once; the second tick skipped it.
        assert_eq!(h.backend.image_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.assets.len(), 1);
    }
}
