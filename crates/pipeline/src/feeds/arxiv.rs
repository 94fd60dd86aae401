//! arXiv Atom feed adapter

use super::{normalize_whitespace, FeedAdapter, FetchError, SourceEntry};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

const SOURCE: &str = "arxiv";

/// Adapter for the arXiv Atom query API
pub struct ArxivFeed {
    client: reqwest::Client,
    base_url: String,
    categories: Vec<String>,
}

impl ArxivFeed {
    pub fn new(base_url: String, categories: Vec<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url,
            categories,
        }
    }

    /// Convert a fetched Atom document into entries, newest first.
    ///
    /// Records missing an id, title, abstract, or date are dropped; the
    /// feed already sorts by submission date descending.
    fn parse_feed(&self, body: &[u8]) -> Result<Vec<SourceEntry>, FetchError> {
        let feed = feed_rs::parser::parse(body).map_err(|e| FetchError::Parse {
            feed: SOURCE,
            message: e.to_string(),
        })?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::with_capacity(feed.entries.len());

        for entry in feed.entries {
            // Entry ids look like http://arxiv.org/abs/2401.01234v1
            let source_id = entry
                .id
                .rsplit('/')
                .next()
                .unwrap_or(entry.id.as_str())
                .to_string();
            if source_id.is_empty() || !seen.insert(source_id.clone()) {
                continue;
            }

            let title = entry
                .title
                .map(|t| normalize_whitespace(&t.content))
                .unwrap_or_default();
            let abstract_text = entry
                .summary
                .map(|s| normalize_whitespace(&s.content))
                .unwrap_or_default();
            let Some(published_at) = entry.published.or(entry.updated) else {
                debug!(source = SOURCE, source_id = %source_id, "Dropping feed entry without a date");
                continue;
            };
            if title.is_empty() || abstract_text.is_empty() {
                debug!(source = SOURCE, source_id = %source_id, "Dropping malformed feed entry");
                continue;
            }

            let pdf_url = entry
                .links
                .iter()
                .find(|l| l.media_type.as_deref() == Some("application/pdf"))
                .map(|l| l.href.clone());

            out.push(SourceEntry {
                source: SOURCE.to_string(),
                source_id,
                title,
                abstract_text,
                authors: entry
                    .authors
                    .iter()
                    .map(|p| p.name.clone())
                    .filter(|n| !n.is_empty())
                    .collect(),
                categories: entry.categories.iter().map(|c| c.term.clone()).collect(),
                pdf_url,
                published_at,
            });
        }

        Ok(out)
    }
}

#[async_trait]
impl FeedAdapter for ArxivFeed {
    fn source(&self) -> &'static str {
        SOURCE
    }

    async fn fetch(&self, max_results: usize) -> Result<Vec<SourceEntry>, FetchError> {
        let query = self
            .categories
            .iter()
            .map(|c| format!("cat:{}", c))
            .collect::<Vec<_>>()
            .join(" OR ");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("search_query", query.as_str()),
                ("start", "0"),
                ("max_results", &max_results.to_string()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
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

        let body = response.bytes().await.map_err(|e| FetchError::Request {
            feed: SOURCE,
            message: e.to_string(),
        })?;

        self.parse_feed(body.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> ArxivFeed {
        ArxivFeed::new(
            "https://export.arxiv.org/api/query".to_string(),
            vec!["q-bio.NC".to_string()],
            Duration::from_secs(5),
        )
    }

    const SAMPLE_ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query Results</title>
  <id>http://arxiv.org/api/example</id>
  <updated>2026-01-02T00:00:00Z</updated>
  <entry>
    <id>http://arxiv.org/abs/2601.00002v1</id>
    <updated>2026-01-02T10:00:00Z</updated>
    <published>2026-01-02T10:00:00Z</published>
    <title>Spike timing as a
  population code</title>
    <summary>We study how
  spike timing carries information.</summary>
    <author><name>B. Researcher</name></author>
    <link href="http://arxiv.org/abs/2601.00002v1" rel="alternate" type="text/html"/>
    <link href="http://arxiv.org/pdf/2601.00002v1" rel="related" type="application/pdf"/>
    <category term="q-bio.NC" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2601.00001v1</id>
    <updated>2026-01-01T10:00:00Z</updated>
    <published>2026-01-01T10:00:00Z</published>
    <title>Older paper</title>
    <summary>An older abstract.</summary>
    <author><name>A. Author</name></author>
    <category term="cs.NE" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2601.00003v1</id>
    <updated>2026-01-03T10:00:00Z</updated>
    <published>2026-01-03T10:00:00Z</published>
    <title>No abstract here</title>
    <summary></summary>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2601.00001v1</id>
    <updated>2026-01-01T10:00:00Z</updated>
    <published>2026-01-01T10:00:00Z</published>
    <title>Duplicate id</title>
    <summary>Should be deduplicated.</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed() {
        let entries = adapter().parse_feed(SAMPLE_ATOM.as_bytes()).unwrap();

        // Malformed (empty abstract) and duplicate entries are dropped.
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.source, "arxiv");
        assert_eq!(first.source_id, "2601.00002v1");
        assert_eq!(first.title, "Spike timing as a population code");
        assert_eq!(
            first.abstract_text,
            "We study how spike timing carries information."
        );
        assert_eq!(first.authors, vec!["B. Researcher"]);
        assert_eq!(first.categories, vec!["q-bio.NC"]);
        assert_eq!(
            first.pdf_url.as_deref(),
            Some("http://arxiv.org/pdf/2601.00002v1")
        );

        assert_eq!(entries[1].source_id, "2601.00001v1");
        assert_eq!(entries[1].title, "Older paper");
    }

    #[test]
    fn test_parse_garbage_is_an_error() {
        let err = adapter().parse_feed(b"not xml at all");
        assert!(matches!(err, Err(FetchError::Parse { .. })));
    }
}
