//! Text-generation collaborator.
//!
//! Each research role (curator, summarizer, writer) holds its own
//! [`TextGenerationService`]. Structured calls come back as a
//! [`StructuredOutcome`] so callers branch on parse failures explicitly.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::llm::{ChatMessage, ChatRequest, LlmClient};

/// System instructions plus the user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Expected shape of a structured response, as a JSON schema.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: &'static str,
    pub schema: Value,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation service unavailable: {0}")]
    Unavailable(String),

    #[error("Generation request failed: {0}")]
    Request(String),

    #[error("Generation returned no content")]
    EmptyResponse,
}

/// Result of a structured generation call.
#[derive(Debug)]
pub enum StructuredOutcome {
    /// The response parsed as a JSON object.
    Ok(Value),
    /// The service answered, but not with a JSON object. Holds the raw text.
    ParseError(String),
    /// The call itself failed.
    ServiceError(GenerationError),
}

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Ask for a JSON object shaped like `schema`.
    async fn generate_structured(&self, prompt: &Prompt, schema: &OutputSchema)
        -> StructuredOutcome;

    /// Ask for plain text.
    async fn generate_text(&self, prompt: &Prompt) -> Result<String, GenerationError>;
}

/// Extract a JSON object from model output.
///
/// Accepts bare JSON, JSON inside a Markdown code fence, or a single object
/// surrounded by stray prose.
pub fn parse_json_object(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    let unfenced = strip_fence(trimmed);

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(unfenced) {
        return Some(value);
    }

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&unfenced[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// [`TextGenerationService`] backed by an [`LlmClient`] and one model id.
pub struct LlmGenerationService {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl LlmGenerationService {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        let request = ChatRequest::new(
            self.model.clone(),
            vec![ChatMessage::system(system), ChatMessage::user(user)],
        );
        let response = self
            .client
            .complete(&request)
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        match response.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(GenerationError::EmptyResponse),
        }
    }
}

#[async_trait]
impl TextGenerationService for LlmGenerationService {
    async fn generate_structured(
        &self,
        prompt: &Prompt,
        schema: &OutputSchema,
    ) -> StructuredOutcome {
        let schema_text =
            serde_json::to_string_pretty(&schema.schema).unwrap_or_else(|_| schema.schema.to_string());
        let system = format!(
            "{}\n\nRespond with a single JSON object ({}) matching this JSON schema:\n{}\n\
             Do not include any preamble or explanation outside of the JSON object.",
            prompt.system.trim_end(),
            schema.name,
            schema_text
        );

        let raw = match self.complete(&system, &prompt.user).await {
            Ok(raw) => raw,
            Err(e) => return StructuredOutcome::ServiceError(e),
        };

        match parse_json_object(&raw) {
            Some(value) => StructuredOutcome::Ok(value),
            None => {
                tracing::debug!(
                    "Model {} returned non-JSON output for {} ({} chars)",
                    self.model,
                    schema.name,
                    raw.len()
                );
                StructuredOutcome::ParseError(raw)
            }
        }
    }

    async fn generate_text(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        self.complete(&prompt.system, &prompt.user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, LlmError};
    use serde_json::json;
    use std::sync::Mutex;

    struct CannedClient {
        reply: Option<String>,
        seen_system: Mutex<Vec<String>>,
    }

    impl CannedClient {
        fn new(reply: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                seen_system: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            if let Some(system) = request.messages.first() {
                self.seen_system.lock().unwrap().push(system.content.clone());
            }
            match &self.reply {
                Some(reply) => Ok(ChatResponse {
                    content: Some(reply.clone()),
                    usage: None,
                    model: request.model.clone(),
                }),
                None => Err(LlmError::Network("connection refused".to_string())),
            }
        }
    }

    fn schema() -> OutputSchema {
        OutputSchema {
            name: "Example",
            schema: json!({"type": "object", "properties": {"a": {"type": "integer"}}}),
        }
    }

    #[test]
    fn parses_bare_fenced_and_embedded_objects() {
        assert_eq!(parse_json_object(r#"{"a": 1}"#), Some(json!({"a": 1})));
        assert_eq!(
            parse_json_object("```json\n{\"a\": 2}\n```"),
            Some(json!({"a": 2}))
        );
        assert_eq!(
            parse_json_object("Here you go:\n{\"a\": 3}\nThanks"),
            Some(json!({"a": 3}))
        );
        assert_eq!(parse_json_object("[1, 2]"), None);
        assert_eq!(parse_json_object("not json at all"), None);
    }

    #[tokio::test]
    async fn structured_call_parses_and_sends_schema() {
        let client = CannedClient::new(Some("```json\n{\"a\": 7}\n```"));
        let service = LlmGenerationService::new(client.clone(), "test/model");

        let outcome = service
            .generate_structured(&Prompt::new("Pick one.", "go"), &schema())
            .await;
        assert!(matches!(outcome, StructuredOutcome::Ok(ref v) if v == &json!({"a": 7})));

        let seen = client.seen_system.lock().unwrap();
        assert!(seen[0].starts_with("Pick one."));
        assert!(seen[0].contains("\"integer\""));
    }

    #[tokio::test]
    async fn structured_call_reports_raw_text_on_parse_failure() {
        let client = CannedClient::new(Some("I cannot comply."));
        let service = LlmGenerationService::new(client, "test/model");

        match service
            .generate_structured(&Prompt::new("s", "u"), &schema())
            .await
        {
            StructuredOutcome::ParseError(raw) => assert_eq!(raw, "I cannot comply."),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn transport_failures_become_service_errors() {
        let service = LlmGenerationService::new(CannedClient::new(None), "test/model");

        let outcome = service
            .generate_structured(&Prompt::new("s", "u"), &schema())
            .await;
        assert!(matches!(
            outcome,
            StructuredOutcome::ServiceError(GenerationError::Request(_))
        ));
        let err = service
            .generate_text(&Prompt::new("s", "u"))
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn blank_text_is_an_empty_response() {
        let service = LlmGenerationService::new(CannedClient::new(Some("  \n")), "m");
        let err = service
            .generate_text(&Prompt::new("s", "u"))
            .await
            .expect_err("should fail");
        assert!(matches!(err, GenerationError::EmptyResponse));
    }
}
