//! Paperwire Pipeline Service
//!
//! Runs the scheduled ingestion tick:
//! 1. Fetches candidate papers from the configured feeds
//! 2. Upserts them into the content store
//! 3. Summarizes and illustrates each through the generation client
//! 4. Records every step in the job ledger

use paperwire_common::assets::{AssetStore, FsAssetStore};
use paperwire_common::config::AppConfig;
use paperwire_common::db::{ContentStore, DbPool, Repository};
use paperwire_common::generation::{self, BreakerConfig, ResilientClient, RetryPolicy};
use paperwire_common::metrics;
use paperwire_common::VERSION;
use paperwire_pipeline::feeds::{ArxivFeed, FeedAdapter, OpenReviewFeed};
use paperwire_pipeline::{Orchestrator, TickOptions};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(true)
        .json()
        .init();

    info!("Starting Paperwire Pipeline v{}", VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(%addr, "Metrics exporter listening");
    }

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let store: Arc<dyn ContentStore> = Arc::new(Repository::new(db));

    // One resilient client per process: the breaker state inside it is the
    // single view of the generative backend's health.
    let backend = generation::create_backend(&config.generation)?;
    let client = Arc::new(ResilientClient::new(
        backend,
        BreakerConfig {
            failure_threshold: config.generation.breaker_failure_threshold,
            cooldown: config.generation.breaker_cooldown(),
        },
        RetryPolicy {
            max_attempts: config.generation.max_attempts,
            initial_delay: config.generation.retry_initial_delay(),
            ..RetryPolicy::default()
        },
    ));

    let assets: Arc<dyn AssetStore> = Arc::new(FsAssetStore::new(&config.pipeline.asset_dir));

    let mut adapters: Vec<Arc<dyn FeedAdapter>> = vec![Arc::new(ArxivFeed::new(
        config.feeds.arxiv_url.clone(),
        config.feeds.arxiv_categories.clone(),
        config.feeds.fetch_timeout(),
    ))];
    if !config.feeds.openreview_invitations.is_empty() {
        adapters.push(Arc::new(OpenReviewFeed::new(
            config.feeds.openreview_url.clone(),
            config.feeds.openreview_invitations.clone(),
            config.feeds.fetch_timeout(),
        )));
    }

    let orchestrator = Orchestrator::new(store, assets, client, adapters).with_fetch_retry(
        config.feeds.fetch_retries,
        config.feeds.fetch_retry_delay(),
    );

    let options = TickOptions::from_config(&config.pipeline);

    if config.pipeline.run_once {
        let summary = orchestrator.run_tick(&options).await;
        info!(
            fetched = summary.fetched,
            processed = summary.processed,
            errors = ?summary.errors,
            "Tick complete"
        );
        return Ok(());
    }

    let mut interval = tokio::time::interval(Duration::from_secs(config.pipeline.interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        interval_secs = config.pipeline.interval_secs,
        "Pipeline scheduler running"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // The tick never raises; its errors live in the summary.
                let summary = orchestrator.run_tick(&options).await;
                if !summary.errors.is_empty() {
                    error!(
                        fetched = summary.fetched,
                        processed = summary.processed,
                        errors = ?summary.errors,
                        "Tick completed with errors"
                    );
                } else {
                    info!(
                        fetched = summary.fetched,
                        processed = summary.processed,
                        duration_ms = summary.duration_ms,
                        "Tick complete"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Pipeline service shutting down");
                break;
            }
        }
    }

    Ok(())
}
