//! Web search collaborator.
//!
//! The orchestrator and the `web_search` tool only see [`SearchService`];
//! [`TavilySearch`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

/// One hit from a search backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    Transport(String),

    #[error("Search API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Could not decode search response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait SearchService: Send + Sync {
    /// Return up to `limit` results for `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError>;
}

/// Tavily API request body.
#[derive(Debug, Serialize)]
struct TavilySearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    include_answer: bool,
    include_raw_content: bool,
}

/// Tavily API response.
#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

/// Search over the Tavily API.
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl TavilySearch {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            endpoint: TAVILY_SEARCH_URL.to_string(),
        })
    }

    /// Send requests to a different search endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchService for TavilySearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        let request = TavilySearchRequest {
            api_key: &self.api_key,
            query,
            max_results: limit,
            include_answer: false,
            include_raw_content: false,
        };

        tracing::debug!("Tavily search: '{}' (max {})", query, limit);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TavilySearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;

        let total = parsed.results.len();
        let results: Vec<SearchResult> = parsed
            .results
            .into_iter()
            .filter(|r| !r.url.trim().is_empty())
            .take(limit)
            .map(|r| SearchResult {
                title: r.title,
                url: r.url,
                snippet: r.content,
            })
            .collect();

        if results.len() < total {
            tracing::debug!(
                "Dropped {} search results without a usable url",
                total - results.len()
            );
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{}/search", addr)
    }

    #[tokio::test]
    async fn maps_results_and_skips_empty_urls() {
        let router = Router::new().route(
            "/search",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["query"], "rust async");
                assert_eq!(body["max_results"], 3);
                Json(json!({
                    "answer": null,
                    "results": [
                        {"title": "A", "url": "https://a.example", "content": "alpha", "score": 0.9},
                        {"title": "No url", "url": "", "content": "x", "score": 0.5},
                        {"title": "B", "url": "https://b.example", "content": "beta", "score": 0.4}
                    ]
                }))
            }),
        );
        let endpoint = spawn(router).await;
        let search = TavilySearch::new("k".to_string(), Duration::from_secs(5))
            .expect("client")
            .with_endpoint(endpoint);

        let results = search.search("rust async", 3).await.expect("search");
        assert_eq!(
            results,
            vec![
                SearchResult {
                    title: "A".to_string(),
                    url: "https://a.example".to_string(),
                    snippet: "alpha".to_string(),
                },
                SearchResult {
                    title: "B".to_string(),
                    url: "https://b.example".to_string(),
                    snippet: "beta".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn api_errors_carry_status() {
        let router = Router::new().route(
            "/search",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let endpoint = spawn(router).await;
        let search = TavilySearch::new("k".to_string(), Duration::from_secs(5))
            .expect("client")
            .with_endpoint(endpoint);

        let err = search.search("q", 5).await.expect_err("should fail");
        assert!(matches!(err, SearchError::Api { status: 401, .. }));
    }
}
