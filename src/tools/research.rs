//! Deep research tool: runs the full research pipeline from a JSON request.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::Tool;
use crate::research::{ResearchOrchestrator, ResearchRequest};

pub struct DeepResearch {
    orchestrator: Arc<ResearchOrchestrator>,
}

impl DeepResearch {
    pub fn new(orchestrator: Arc<ResearchOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Accepts a JSON request, or a bare query string for convenience.
    fn parse_request(input: &str) -> anyhow::Result<ResearchRequest> {
        let trimmed = input.trim();
        if trimmed.starts_with('{') {
            serde_json::from_str(trimmed)
                .map_err(|e| anyhow::anyhow!("Invalid JSON input for deep research: {}", e))
        } else if trimmed.is_empty() {
            anyhow::bail!("Missing research query")
        } else {
            Ok(ResearchRequest::new(trimmed))
        }
    }
}

#[async_trait]
impl Tool for DeepResearch {
    fn name(&self) -> &str {
        "deep_research_synthesizer"
    }

    fn description(&self) -> &str {
        "Performs an in-depth, multi-step research investigation on a topic: broad web search, \
        source curation, content extraction, summarization when needed, and a synthesized \
        Markdown report. Use for complex questions that need a detailed overview. Input is a \
        JSON object such as {\"query\": \"...\", \"num_sources_to_deep_dive\": 3}."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The research topic or question"},
                "num_initial_sources_to_consider": {"type": "integer", "default": 7},
                "num_sources_to_deep_dive": {"type": "integer", "default": 3},
                "desired_report_sections": {"type": "array", "items": {"type": "string"}},
                "max_tokens_per_summary": {"type": "integer", "default": 1500},
                "max_total_tokens_for_writer": {"type": "integer", "default": 100000}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &str) -> anyhow::Result<String> {
        let request = Self::parse_request(input)?;
        Ok(self.orchestrator.run(&request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_and_bare_queries() {
        let request =
            DeepResearch::parse_request(r#"{"query": "tides", "num_sources_to_deep_dive": 2}"#)
                .expect("json");
        assert_eq!(request.query, "tides");
        assert_eq!(request.num_sources_to_deep_dive, 2);
        assert_eq!(request.num_initial_sources_to_consider, 7);

        let bare = DeepResearch::parse_request("  ocean tides \n").expect("bare");
        assert_eq!(bare, ResearchRequest::new("ocean tides"));

        assert!(DeepResearch::parse_request("{not json").is_err());
        assert!(DeepResearch::parse_request("   ").is_err());
    }
}
