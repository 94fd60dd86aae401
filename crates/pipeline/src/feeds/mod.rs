//! Feed adapters for external scholarly sources
//!
//! Adapters are pure fetch-and-transform: no persistence, no retries.
//! Malformed upstream records are dropped; network and parse failures
//! surface as [`FetchError`] for the orchestrator to retry.

mod arxiv;
mod openreview;

pub use arxiv::ArxivFeed;
pub use openreview::OpenReviewFeed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A candidate record pulled from an upstream feed.
///
/// Ephemeral: folded into a paper upsert and discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub source: String,
    pub source_id: String,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub pdf_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Typed, retryable feed failure
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{feed} feed request failed: {message}")]
    Request { feed: &'static str, message: String },

    #[error("{feed} feed returned HTTP {status}")]
    Status { feed: &'static str, status: u16 },

    #[error("{feed} feed response could not be parsed: {message}")]
    Parse { feed: &'static str, message: String },
}

/// Trait for feed adapters
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    /// Stable source name recorded on every paper, e.g. "arxiv"
    fn source(&self) -> &'static str;

    /// Fetch up to `max_results` entries, newest first
    async fn fetch(&self, max_results: usize) -> Result<Vec<SourceEntry>, FetchError>;
}

/// Collapse runs of whitespace (upstream titles and abstracts carry
/// newlines and indentation).
pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalize_whitespace("A title\n  split over\nlines"),
            "A title split over lines"
        );
        assert_eq!(normalize_whitespace("  already clean "), "already clean");
    }
}
