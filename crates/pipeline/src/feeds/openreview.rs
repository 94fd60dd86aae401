//! OpenReview notes feed adapter

use super::{normalize_whitespace, FeedAdapter, FetchError, SourceEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

const SOURCE: &str = "openreview";

/// Adapter for the OpenReview notes API (one query per invitation)
pub struct OpenReviewFeed {
    client: reqwest::Client,
    base_url: String,
    invitations: Vec<String>,
}

/// OpenReview wraps every content field in a `{"value": ...}` object.
#[derive(Debug, Deserialize)]
struct NotesResponse {
    #[serde(default)]
    notes: Vec<Note>,
}

#[derive(Debug, Deserialize)]
struct Note {
    id: String,
    /// Creation time, epoch milliseconds
    #[serde(default)]
    cdate: Option<i64>,
    #[serde(default)]
    content: NoteContent,
}

#[derive(Debug, Default, Deserialize)]
struct NoteContent {
    title: Option<TextValue>,
    #[serde(rename = "abstract")]
    abstract_text: Option<TextValue>,
    authors: Option<ListValue>,
    keywords: Option<ListValue>,
    pdf: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ListValue {
    #[serde(default)]
    value: Vec<String>,
}

impl OpenReviewFeed {
    pub fn new(base_url: String, invitations: Vec<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url,
            invitations,
        }
    }

    /// Convert notes into entries, dropping malformed ones and ids already
    /// seen in this invocation.
    fn convert_notes(notes: Vec<Note>, seen: &mut HashSet<String>) -> Vec<SourceEntry> {
        let mut out = Vec::with_capacity(notes.len());

        for note in notes {
            if note.id.is_empty() || !seen.insert(note.id.clone()) {
                continue;
            }

            let title = note
                .content
                .title
                .map(|t| normalize_whitespace(&t.value))
                .unwrap_or_default();
            let abstract_text = note
                .content
                .abstract_text
                .map(|a| normalize_whitespace(&a.value))
                .unwrap_or_default();
            let published_at = note
                .cdate
                .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms));

            let Some(published_at) = published_at else {
                debug!(source = SOURCE, note_id = %note.id, "Dropping note without a date");
                continue;
            };
            if title.is_empty() || abstract_text.is_empty() {
                debug!(source = SOURCE, note_id = %note.id, "Dropping malformed note");
                continue;
            }

            let pdf_url = note.content.pdf.map(|p| {
                if p.value.starts_with('/') {
                    format!("https://openreview.net{}", p.value)
                } else {
                    p.value
                }
            });

            out.push(SourceEntry {
                source: SOURCE.to_string(),
                source_id: note.id,
                title,
                abstract_text,
                authors: note.content.authors.map(|a| a.value).unwrap_or_default(),
                categories: note.content.keywords.map(|k| k.value).unwrap_or_default(),
                pdf_url,
                published_at,
            });
        }

        out
    }
}

#[async_trait]
impl FeedAdapter for OpenReviewFeed {
    fn source(&self) -> &'static str {
        SOURCE
    }

    async fn fetch(&self, max_results: usize) -> Result<Vec<SourceEntry>, FetchError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut merged: Vec<SourceEntry> = Vec::new();

        for invitation in &self.invitations {
            let url = format!("{}/notes", self.base_url);
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("invitation", invitation.as_str()),
                    ("limit", &max_results.to_string()),
                    ("sort", "cdate:desc"),
                ])
                .send()
                .await
                .map_err(|e| FetchError::Request {
                    feed: SOURCE,
                    message: e.to_string(),
                })?;

            if !response.status().is_success() {
                return Err(FetchError::Status {
                    feed: SOURCE,
                    status: response.status().as_u16(),
                });
            }

            let parsed: NotesResponse =
                response.json().await.map_err(|e| FetchError::Parse {
                    feed: SOURCE,
                    message: e.to_string(),
                })?;

            merged.extend(Self::convert_notes(parsed.notes, &mut seen));
        }

        // Invitations are fetched independently; restore newest-first order
        // across the merged set.
        merged.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        merged.truncate(max_results);

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_NOTES: &str = r#"{
        "notes": [
            {
                "id": "note-b",
                "cdate": 1767348000000,
                "content": {
                    "title": {"value": "Newer  note"},
                    "abstract": {"value": "Abstract B."},
                    "authors": {"value": ["B. Author"]},
                    "keywords": {"value": ["neuromorphic"]},
                    "pdf": {"value": "/pdf/note-b.pdf"}
                }
            },
            {
                "id": "note-a",
                "cdate": 1767261600000,
                "content": {
                    "title": {"value": "Older note"},
                    "abstract": {"value": "Abstract A."}
                }
            },
            {
                "id": "note-broken",
                "cdate": 1767261600000,
                "content": {
                    "title": {"value": "Missing abstract"}
                }
            }
        ]
    }"#;

    #[test]
    fn test_convert_notes() {
        let parsed: NotesResponse = serde_json::from_str(SAMPLE_NOTES).unwrap();
        let mut seen = HashSet::new();
        let entries = OpenReviewFeed::convert_notes(parsed.notes, &mut seen);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source_id, "note-b");
        assert_eq!(entries[0].title, "Newer note");
        assert_eq!(
            entries[0].pdf_url.as_deref(),
            Some("https://openreview.net/pdf/note-b.pdf")
        );
        assert_eq!(entries[0].categories, vec!["neuromorphic"]);
        assert_eq!(entries[1].source_id, "note-a");
    }

    #[test]
    fn test_seen_set_deduplicates_across_invitations() {
        let parsed: NotesResponse = serde_json::from_str(SAMPLE_NOTES).unwrap();
        let mut seen = HashSet::new();
        seen.insert("note-b".to_string());

        let entries = OpenReviewFeed::convert_notes(parsed.notes, &mut seen);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_id, "note-a");
    }
}
