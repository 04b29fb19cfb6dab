//! Web search over the Tavily HTTP API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use coordination::{CollaboratorError, SearchProvider, SearchResult};

use crate::config::ProviderConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest error body echoed into an error message.
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
}

pub struct TavilySearch {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl TavilySearch {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build search HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Self::new(&config.search_url, &config.search_api_key)
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, CollaboratorError> {
        debug!(query, max_results, "Searching the web");
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SearchRequest { query, max_results })
            .send()
            .await
            .map_err(|e| CollaboratorError::Search(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CollaboratorError::Search(e.to_string()))?;

        if !status.is_success() {
            warn!(%status, "Search request rejected");
            return Err(status_error(status, &body));
        }
        parse_results(&body, max_results)
    }
}

/// Error for a non-2xx response.
fn status_error(status: StatusCode, body: &str) -> CollaboratorError {
    let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
    let message = format!("HTTP {status}: {snippet}");
    if status == StatusCode::TOO_MANY_REQUESTS {
        CollaboratorError::RateLimited(message)
    } else {
        CollaboratorError::Search(message)
    }
}

/// Decode a search response body, keeping hits that carry a URL.
fn parse_results(body: &str, max_results: usize) -> Result<Vec<SearchResult>, CollaboratorError> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| CollaboratorError::Search(format!("malformed search response: {e}")))?;
    Ok(response
        .results
        .into_iter()
        .filter(|hit| !hit.url.is_empty())
        .take(max_results)
        .map(|hit| SearchResult {
            text: hit.content,
            url: hit.url,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_results_in_order() {
        let body = r#"{
            "query": "fusion",
            "results": [
                {"title": "A", "url": "https://a.example", "content": "alpha", "score": 0.9},
                {"title": "B", "url": "https://b.example", "content": "beta", "score": 0.8}
            ]
        }"#;
        let results = parse_results(body, 5).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://a.example");
        assert_eq!(results[0].text, "alpha");
        assert_eq!(results[1].url, "https://b.example");
    }

    #[test]
    fn truncates_and_skips_urlless_hits() {
        let body = r#"{"results": [
            {"content": "no url"},
            {"url": "https://1.example", "content": "1"},
            {"url": "https://2.example", "content": "2"},
            {"url": "https://3.example", "content": "3"}
        ]}"#;
        let results = parse_results(body, 2).unwrap();
        let urls: Vec<_> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://1.example", "https://2.example"]);
    }

    #[test]
    fn empty_results_are_fine() {
        assert!(parse_results("{}", 5).unwrap().is_empty());
        assert!(parse_results(r#"{"results": []}"#, 5).unwrap().is_empty());
    }

    #[test]
    fn malformed_body_is_search_error() {
        let err = parse_results("<html>bad gateway</html>", 5).unwrap_err();
        assert!(matches!(err, CollaboratorError::Search(_)));
    }

    #[test]
    fn status_mapping() {
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, CollaboratorError::RateLimited(_)));
        assert!(err.to_string().contains("slow down"));

        let err = status_error(StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(err, CollaboratorError::Search(_)));
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn long_error_bodies_are_clipped() {
        let body = "x".repeat(5_000);
        let err = status_error(StatusCode::BAD_GATEWAY, &body);
        assert!(err.to_string().len() < 400);
    }

    #[test]
    fn request_body_shape() {
        let json = serde_json::to_value(SearchRequest {
            query: "fusion",
            max_results: 5,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"query": "fusion", "max_results": 5}));
    }
}
