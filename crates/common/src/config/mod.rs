//! Configuration management for Paperwire services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Generative backend configuration
    pub generation: GenerationConfig,

    /// Upstream feed configuration
    pub feeds: FeedsConfig,

    /// Pipeline tick configuration
    pub pipeline: PipelineConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Generation provider: openai, mock
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    /// API key for the generative backend
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Text-generation model
    #[serde(default = "default_text_model")]
    pub text_model: String,

    /// Image-generation model
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per call (first try included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial retry delay in milliseconds
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    /// Consecutive failures before the circuit opens
    #[serde(default = "default_breaker_threshold")]
    pub breaker_failure_threshold: u32,

    /// Cooldown before a trial call is allowed, in seconds
    #[serde(default = "default_breaker_cooldown")]
    pub breaker_cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedsConfig {
    /// arXiv Atom API endpoint
    #[serde(default = "default_arxiv_url")]
    pub arxiv_url: String,

    /// arXiv categories to query
    #[serde(default = "default_arxiv_categories")]
    pub arxiv_categories: Vec<String>,

    /// OpenReview API endpoint
    #[serde(default = "default_openreview_url")]
    pub openreview_url: String,

    /// OpenReview invitations to query
    #[serde(default)]
    pub openreview_invitations: Vec<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Retries per adapter call after the first attempt
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    /// Base delay between adapter retries, in milliseconds (scales linearly)
    #[serde(default = "default_fetch_retry_delay_ms")]
    pub fetch_retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Maximum entries requested from each feed per tick
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Maximum entries given full processing per tick
    #[serde(default = "default_max_papers_to_process")]
    pub max_papers_to_process: usize,

    /// Seconds between scheduled ticks
    #[serde(default = "default_tick_interval")]
    pub interval_secs: u64,

    /// Run a single tick and exit (for cron-style deployment)
    #[serde(default)]
    pub run_once: bool,

    /// Root directory for generated assets (covers)
    #[serde(default = "default_asset_dir")]
    pub asset_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,

    /// Requests allowed per window on the ask endpoint
    #[serde(default = "default_ask_limit")]
    pub ask_limit: u32,

    /// Window length for the ask endpoint, in seconds
    #[serde(default = "default_ask_window")]
    pub ask_window_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// SHA-256 hex digest of the admin bearer token
    pub admin_token_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 50 }
fn default_min_connections() -> u32 { 5 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_generation_provider() -> String { "openai".to_string() }
fn default_text_model() -> String { crate::DEFAULT_TEXT_MODEL.to_string() }
fn default_image_model() -> String { crate::DEFAULT_IMAGE_MODEL.to_string() }
fn default_generation_timeout() -> u64 { 60 }
fn default_max_attempts() -> u32 { 3 }
fn default_retry_initial_delay_ms() -> u64 { 200 }
fn default_breaker_threshold() -> u32 { 5 }
fn default_breaker_cooldown() -> u64 { 60 }
fn default_arxiv_url() -> String { "https://export.arxiv.org/api/query".to_string() }
fn default_arxiv_categories() -> Vec<String> {
    vec!["q-bio.NC".to_string(), "cs.NE".to_string()]
}
fn default_openreview_url() -> String { "https://api2.openreview.net".to_string() }
fn default_fetch_timeout() -> u64 { 20 }
fn default_fetch_retries() -> u32 { 2 }
fn default_fetch_retry_delay_ms() -> u64 { 500 }
fn default_max_results() -> usize { 10 }
fn default_max_papers_to_process() -> usize { 2 }
fn default_tick_interval() -> u64 { 86_400 }
fn default_asset_dir() -> String { "data/assets".to_string() }
fn default_rate_limit_enabled() -> bool { true }
fn default_ask_limit() -> u32 { 10 }
fn default_ask_window() -> u64 { 60 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "paperwire".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl GenerationConfig {
    /// Breaker cooldown as a Duration
    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }

    /// Initial retry delay as a Duration
    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }
}

impl FeedsConfig {
    /// Per-request feed timeout as a Duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Base retry delay as a Duration
    pub fn fetch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_delay_ms)
    }
}

impl RateLimitConfig {
    /// Ask-endpoint window as a Duration
    pub fn ask_window(&self) -> Duration {
        Duration::from_secs(self.ask_window_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/paperwire".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            generation: GenerationConfig {
                provider: default_generation_provider(),
                api_key: None,
                api_base: None,
                text_model: default_text_model(),
                image_model: default_image_model(),
                timeout_secs: default_generation_timeout(),
                max_attempts: default_max_attempts(),
                retry_initial_delay_ms: default_retry_initial_delay_ms(),
                breaker_failure_threshold: default_breaker_threshold(),
                breaker_cooldown_secs: default_breaker_cooldown(),
            },
            feeds: FeedsConfig {
                arxiv_url: default_arxiv_url(),
                arxiv_categories: default_arxiv_categories(),
                openreview_url: default_openreview_url(),
                openreview_invitations: Vec::new(),
                fetch_timeout_secs: default_fetch_timeout(),
                fetch_retries: default_fetch_retries(),
                fetch_retry_delay_ms: default_fetch_retry_delay_ms(),
            },
            pipeline: PipelineConfig {
                max_results: default_max_results(),
                max_papers_to_process: default_max_papers_to_process(),
                interval_secs: default_tick_interval(),
                run_once: false,
                asset_dir: default_asset_dir(),
            },
            rate_limit: RateLimitConfig {
                enabled: default_rate_limit_enabled(),
                ask_limit: default_ask_limit(),
                ask_window_secs: default_ask_window(),
            },
            auth: AuthConfig {
                admin_token_hash: None,
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
        }
    }
}
