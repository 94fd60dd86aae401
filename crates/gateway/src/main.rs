//! Paperwire API Gateway
//!
//! The external HTTP surface for the system. Handles:
//! - Admin ingestion trigger (credential gated)
//! - Public ask endpoint, rate limited and backed by the same resilient
//!   generation client the pipeline uses
//! - Health and readiness probes
//! - Observability (logging, metrics, request ids)

mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use paperwire_common::assets::{AssetStore, FsAssetStore};
use paperwire_common::config::AppConfig;
use paperwire_common::db::{ContentStore, DbPool, Repository};
use paperwire_common::generation::{self, BreakerConfig, ResilientClient, RetryPolicy};
use paperwire_common::metrics;
use paperwire_common::ratelimit::SlidingWindowLimiter;
use paperwire_pipeline::feeds::{ArxivFeed, FeedAdapter, OpenReviewFeed};
use paperwire_pipeline::Orchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub orchestrator: Arc<Orchestrator>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub generation: Arc<ResilientClient>,
}

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

    info!("Starting Paperwire API Gateway v{}", paperwire_common::VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;
    let config = Arc::new(config);

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
    let repository = Repository::new(db.clone());

    // One resilient client per process, shared by the ask endpoint and the
    // admin-triggered pipeline so breaker state is a single view.
    let backend = generation::create_backend(&config.generation)?;
    let generation = Arc::new(ResilientClient::new(
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

    let store: Arc<dyn ContentStore> = Arc::new(repository.clone());
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

    let orchestrator = Arc::new(
        Orchestrator::new(store, assets, generation.clone(), adapters).with_fetch_retry(
            config.feeds.fetch_retries,
            config.feeds.fetch_retry_delay(),
        ),
    );

    let limiter = Arc::new(SlidingWindowLimiter::new(Arc::new(repository)));

    // Create app state
    let state = AppState {
        config: config.clone(),
        db,
        orchestrator,
        limiter,
        generation,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Public ask endpoint (rate limited)
        .route("/ask", post(handlers::ask::ask))
        // Admin endpoints (credential gated)
        .route("/admin/ingest", post(handlers::admin::trigger_ingest));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
