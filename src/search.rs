use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// One hit from the search API. Consumed by the final summary only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchEnvelope {
    items: Vec<SearchResult>,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Thin client for the Google Custom Search JSON API.
pub struct SearchClient {
    client: Client,
    base_url: String,
    api_key: String,
    cx: String,
}

impl SearchClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        cx: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            cx: cx.into(),
        }
    }

    /// Run a web search. Long model-written queries are cut down to their
    /// first ten words before hitting the API.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let simplified = simplify_query(query);
        debug!(query = %simplified, "search request");

        let envelope: SearchEnvelope = self
            .client
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cx.as_str()),
                ("q", simplified.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!(hits = envelope.items.len(), "search results fetched");
        Ok(envelope.items)
    }
}

fn simplify_query(query: &str) -> String {
    query
        .split_whitespace()
        .take(10)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_queries_pass_through() {
        assert_eq!(simplify_query("vegan restaurants"), "vegan restaurants");
    }

    #[test]
    fn long_queries_keep_the_first_ten_tokens() {
        let query = "vegan restaurant near me with a really long query exceeding ten words";
        assert_eq!(
            simplify_query(query),
            "vegan restaurant near me with a really long query exceeding"
        );
    }

    #[test]
    fn whitespace_runs_collapse_during_simplification() {
        assert_eq!(simplify_query("  a \n b\t c  "), "a b c");
    }

    #[test]
    fn result_decoding_tolerates_missing_fields() {
        let envelope: SearchEnvelope =
            serde_json::from_str(r#"{"items": [{"title": "Doc"}]}"#).unwrap();
        assert_eq!(envelope.items.len(), 1);
        assert_eq!(envelope.items[0].title, "Doc");
        assert_eq!(envelope.items[0].link, "");

        let empty: SearchEnvelope = serde_json::from_str("{}").unwrap();
        assert!(empty.items.is_empty());
    }
}
