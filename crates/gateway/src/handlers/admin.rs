//! Admin handlers
//!
//! The ingestion trigger runs a full pipeline tick synchronously and
//! returns its summary. It is gated by a bearer token whose SHA-256 hash
//! lives in configuration.

use crate::AppState;
use axum::{extract::State, http::HeaderMap, Json};
use paperwire_common::auth;
use paperwire_common::errors::{AppError, Result};
use paperwire_pipeline::{TickOptions, TickSummary};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

/// Trigger request; omitted fields fall back to configured defaults.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct IngestRequest {
    #[validate(range(min = 1, max = 100))]
    pub max_results: Option<usize>,

    #[validate(range(min = 1, max = 100))]
    pub max_papers_to_process: Option<usize>,
}

/// Verify the admin bearer token against the configured hash.
///
/// Fails closed: no configured hash means no admin access.
fn require_admin(headers: &HeaderMap, admin_token_hash: Option<&str>) -> Result<()> {
    let stored_hash = admin_token_hash.ok_or_else(|| AppError::Unauthorized {
        message: "Admin access is not configured".to_string(),
    })?;

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(auth::extract_bearer)
        .ok_or_else(|| AppError::Unauthorized {
            message: "Missing bearer token".to_string(),
        })?;

    if !auth::validate_token(token, stored_hash) {
        return Err(AppError::Unauthorized {
            message: "Invalid admin token".to_string(),
        });
    }

    Ok(())
}

/// Run one ingestion tick and return its summary
pub async fn trigger_ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IngestRequest>,
) -> Result<Json<TickSummary>> {
    require_admin(&headers, state.config.auth.admin_token_hash.as_deref())?;
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
    })?;

    let options = TickOptions {
        max_results: request
            .max_results
            .unwrap_or(state.config.pipeline.max_results),
        max_papers_to_process: request
            .max_papers_to_process
            .unwrap_or(state.config.pipeline.max_papers_to_process),
    };

    info!(
        max_results = options.max_results,
        max_papers_to_process = options.max_papers_to_process,
        "Admin-triggered ingestion tick"
    );

    // The tick itself never raises; its errors are in the summary.
    let summary = state.orchestrator.run_tick(&options).await;

    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_token(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_require_admin_accepts_valid_token() {
        let hash = auth::hash_token("pw_secret");
        let headers = headers_with_token("pw_secret");
        assert!(require_admin(&headers, Some(&hash)).is_ok());
    }

    #[test]
    fn test_require_admin_rejects_bad_token() {
        let hash = auth::hash_token("pw_secret");
        let headers = headers_with_token("pw_wrong");
        assert!(require_admin(&headers, Some(&hash)).is_err());
    }

    #[test]
    fn test_require_admin_fails_closed_without_config() {
        let headers = headers_with_token("pw_secret");
        assert!(require_admin(&headers, None).is_err());
    }

    #[test]
    fn test_require_admin_rejects_missing_header() {
        let hash = auth::hash_token("pw_secret");
        assert!(require_admin(&HeaderMap::new(), Some(&hash)).is_err());
    }
}
