//! OpenRouter chat-completions client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ChatRequest, ChatResponse, LlmClient, LlmError, RetryPolicy, TokenUsage};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    endpoint: String,
    retry: RetryPolicy,
}

impl OpenRouterClient {
    /// `timeout` bounds each attempt, connect through the last body byte.
    pub fn new(api_key: String, timeout: Duration, retry: RetryPolicy) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            endpoint: OPENROUTER_API_URL.to_string(),
            retry,
        })
    }

    /// Send requests to another OpenAI-compatible chat-completions URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Seconds form only; HTTP-date values are ignored.
    fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", "researchd")
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        let retry_after = Self::retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), body, retry_after));
        }

        let parsed: CompletionBody = serde_json::from_str(&body)
            .map_err(|e| LlmError::Malformed(format!("{}: {}", e, body)))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Malformed("response has no choices".to_string()))?;

        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                "OpenRouter {}: {} tokens ({} prompt + {} completion)",
                request.model,
                usage.total(),
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        Ok(ChatResponse {
            content: choice.message.content,
            usage: parsed.usage,
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
        })
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            let error = match self.send_once(request).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(
                            "OpenRouter {} succeeded after {} retries",
                            request.model,
                            attempt
                        );
                    }
                    return Ok(response);
                }
                Err(error) => error,
            };

            match self.retry.next_delay(&error, attempt, started) {
                Some(delay) => {
                    tracing::warn!(
                        "OpenRouter {} attempt {} failed, retrying in {:?}: {}",
                        request.model,
                        attempt + 1,
                        delay,
                        error
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    tracing::error!("OpenRouter {} failed: {}", request.model, error);
                    return Err(error);
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{}/v1/chat/completions", addr)
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "model": "test/model",
            "choices": [{
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        })
    }

    fn local_client(endpoint: String, retry: RetryPolicy) -> OpenRouterClient {
        OpenRouterClient::new("key".to_string(), Duration::from_secs(10), retry)
            .expect("client")
            .with_endpoint(endpoint)
    }

    fn hello() -> ChatRequest {
        ChatRequest::new("test/model", vec![ChatMessage::user("hi")])
    }

    /// Counts hits; answers with `first` once, then with a completion.
    fn counting_router(first: StatusCode, hits: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/v1/chat/completions",
                post(move |State(hits): State<Arc<AtomicUsize>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (first, [("retry-after", "0")], Json(serde_json::json!({"error": "no"})))
                    } else {
                        (StatusCode::OK, [("retry-after", "0")], Json(completion("ok")))
                    }
                }),
            )
            .with_state(hits)
    }

    #[tokio::test]
    async fn parses_content_and_usage() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(completion("hello")) }),
        );
        let endpoint = spawn_server(router).await;
        let client = local_client(endpoint, RetryPolicy::none());

        let response = client.complete(&hello()).await.expect("completion");
        assert_eq!(response.content.as_deref(), Some("hello"));
        assert_eq!(response.usage.map(|u| u.total()), Some(15));
        assert_eq!(response.model, "test/model");
    }

    #[tokio::test]
    async fn no_retry_policy_fails_on_first_server_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let endpoint =
            spawn_server(counting_router(StatusCode::SERVICE_UNAVAILABLE, Arc::clone(&hits))).await;
        let client = local_client(endpoint, RetryPolicy::none());

        let err = client.complete(&hello()).await.expect_err("should fail");
        assert!(matches!(err, LlmError::Server { status: 503, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_rate_limit_using_retry_after() {
        let hits = Arc::new(AtomicUsize::new(0));
        let endpoint =
            spawn_server(counting_router(StatusCode::TOO_MANY_REQUESTS, Arc::clone(&hits))).await;
        let client = local_client(endpoint, RetryPolicy::new(2));

        let response = client
            .complete(&hello())
            .await
            .expect("second attempt succeeds");
        assert_eq!(response.content.as_deref(), Some("ok"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejected_requests_are_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let endpoint =
            spawn_server(counting_router(StatusCode::UNAUTHORIZED, Arc::clone(&hits))).await;
        let client = local_client(endpoint, RetryPolicy::new(3));

        let err = client.complete(&hello()).await.expect_err("should fail");
        assert!(matches!(err, LlmError::Rejected { status: 401, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stalled_provider_times_out_as_network_error() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(completion("late"))
            }),
        );
        let endpoint = spawn_server(router).await;
        let client = OpenRouterClient::new(
            "key".to_string(),
            Duration::from_millis(300),
            RetryPolicy::none(),
        )
        .expect("client")
        .with_endpoint(endpoint);

        let started = Instant::now();
        let err = client.complete(&hello()).await.expect_err("should time out");
        assert!(matches!(err, LlmError::Network(_)), "{err:?}");
        assert!(err.is_transient());
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
