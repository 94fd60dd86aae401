//! Public ask endpoint
//!
//! Answers reader questions through the same resilient generation client
//! the pipeline uses, so one flaky backend trips one shared breaker. The
//! sliding-window limiter guards spend per client; limiter store failures
//! fail open rather than blocking traffic on a protection-subsystem
//! outage.

use crate::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use paperwire_common::errors::{AppError, Result};
use paperwire_common::generation::ChatMessage;
use serde::{Deserialize, Serialize};
use tracing::warn;
use validator::Validate;

/// Endpoint name recorded on rate-limit entries
const ENDPOINT: &str = "/v1/ask";

#[derive(Debug, Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 3, max = 2000))]
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
}

/// Derive the rate-limit key for a request: explicit API key first, then
/// the forwarded client address.
fn client_key(headers: &HeaderMap) -> String {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        if !key.is_empty() {
            return format!("key:{}", key);
        }
    }

    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| format!("ip:{}", ip.trim()))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Answer a question about the published corpus
pub async fn ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AskRequest>,
) -> Result<Response> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
    })?;

    let key = client_key(&headers);
    let mut remaining_header: Option<u32> = None;

    if state.config.rate_limit.enabled {
        let check = state
            .limiter
            .check(
                &key,
                ENDPOINT,
                state.config.rate_limit.ask_limit,
                state.config.rate_limit.ask_window(),
            )
            .await;

        match check {
            Ok(decision) if !decision.allowed => {
                let retry_after = (decision.reset_at - Utc::now()).num_seconds().max(1) as u64;
                let mut response = AppError::RateLimited {
                    retry_after_secs: retry_after,
                }
                .into_response();
                let headers = response.headers_mut();
                headers.insert("retry-after", HeaderValue::from(retry_after));
                headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
                return Ok(response);
            }
            Ok(decision) => {
                remaining_header = Some(decision.remaining);
            }
            Err(e) => {
                // Fail open: the limiter protects the backend, it must not
                // take the endpoint down with it.
                warn!(error = %e, client_key = %key, "Rate limiter unavailable, failing open");
            }
        }
    }

    let messages = [
        ChatMessage::system(
            "You are the research assistant for a neural-coding paper digest. \
             Answer concisely and note when a question is outside the corpus.",
        ),
        ChatMessage::user(request.question),
    ];

    let answer = state.generation.complete(&messages).await?;

    let mut response = (StatusCode::OK, Json(AskResponse { answer })).into_response();
    if let Some(remaining) = remaining_header {
        response
            .headers_mut()
            .insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    }
    Ok(response)
}
