//! Multi-phase web research pipeline.
//!
//! `Init → Search → Curate → Extract → Budget → Synthesize → Done`
//!
//! Every phase is awaited in sequence and any phase can end the run with a
//! [`ResearchError`]. Individual fetch or summary failures are logged and
//! skipped; they only become terminal when nothing is left to work with.
//!
//! Collaborators are trait objects ([`SearchService`], [`PageFetcher`],
//! [`TextGenerationService`]) shared read-only across runs.

mod budget;
mod generation;
mod prompts;
mod search;

pub use budget::{estimate_text_tokens, estimate_tokens, fits_verbatim, SummaryBudget};
pub use generation::{
    parse_json_object, GenerationError, LlmGenerationService, OutputSchema, Prompt,
    StructuredOutcome, TextGenerationService,
};
pub use search::{SearchError, SearchResult, SearchService, TavilySearch};

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::tools::PageFetcher;
use crate::util::take_chars;

/// Characters of raw writer output quoted in a synthesis failure.
const RAW_EXCERPT_CHARS: usize = 200;

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters for one research run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
    #[serde(default = "default_initial_sources")]
    pub num_initial_sources_to_consider: usize,
    #[serde(default = "default_deep_dive")]
    pub num_sources_to_deep_dive: usize,
    #[serde(default)]
    pub desired_report_sections: Option<Vec<String>>,
    #[serde(default = "default_tokens_per_summary")]
    pub max_tokens_per_summary: usize,
    #[serde(default = "default_writer_tokens")]
    pub max_total_tokens_for_writer: usize,
}

fn default_initial_sources() -> usize {
    7
}

fn default_deep_dive() -> usize {
    3
}

fn default_tokens_per_summary() -> usize {
    1500
}

fn default_writer_tokens() -> usize {
    100_000
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            num_initial_sources_to_consider: default_initial_sources(),
            num_sources_to_deep_dive: default_deep_dive(),
            desired_report_sections: None,
            max_tokens_per_summary: default_tokens_per_summary(),
            max_total_tokens_for_writer: default_writer_tokens(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline entities
// ─────────────────────────────────────────────────────────────────────────────

/// URLs chosen by the curator, in the curator's order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuratedSelection {
    pub selected_urls: Vec<String>,
    pub reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CuratorOutput {
    selected_urls: Vec<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

impl CuratedSelection {
    /// Validate a structured curator response.
    ///
    /// One non-http(s) url rejects the whole response. Duplicates are
    /// dropped, keeping the first occurrence.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let output: CuratorOutput = serde_json::from_value(value)
            .map_err(|e| format!("curator response has the wrong shape: {}", e))?;

        let mut seen = BTreeSet::new();
        let mut selected_urls = Vec::with_capacity(output.selected_urls.len());
        for url in output.selected_urls {
            let url = url.trim().to_string();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!(
                    "each url must start with http:// or https://, found '{}'",
                    url
                ));
            }
            if seen.insert(url.clone()) {
                selected_urls.push(url);
            }
        }

        Ok(Self {
            selected_urls,
            reasoning: output.reasoning,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    Success,
    Error,
}

/// Outcome of fetching one curated url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSource {
    pub url: String,
    pub status: ExtractionStatus,
    /// Extracted text on success, error text otherwise.
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Full,
    Summary,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Full => "full_text",
            ContentKind::Summary => "summary",
        }
    }
}

/// Text handed to the writer for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUnit {
    pub url: String,
    pub text: String,
    pub kind: ContentKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: String,
    pub content: String,
}

/// The synthesized report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub title: String,
    pub executive_summary: String,
    pub sections: Vec<ReportSection>,
    /// Sorted, unique urls of the content fed to the writer.
    pub sources_consulted: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WriterOutput {
    report_title: String,
    executive_summary: String,
    sections: Vec<WriterSection>,
}

#[derive(Debug, Deserialize)]
struct WriterSection {
    section_title: String,
    section_content: String,
}

impl ResearchReport {
    fn from_writer(value: Value, units: &[ContentUnit]) -> Result<Self, String> {
        let output: WriterOutput = serde_json::from_value(value)
            .map_err(|e| format!("writer response has the wrong shape: {}", e))?;
        if output.sections.is_empty() {
            return Err("writer response has no sections".to_string());
        }

        let sources_consulted = units
            .iter()
            .map(|u| u.url.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Ok(Self {
            title: output.report_title,
            executive_summary: output.executive_summary,
            sections: output
                .sections
                .into_iter()
                .map(|s| ReportSection {
                    title: s.section_title,
                    content: s.section_content,
                })
                .collect(),
            sources_consulted,
        })
    }

    /// Render as a Markdown document.
    pub fn to_markdown(&self) -> String {
        let mut out = format!(
            "# {}\n\n## Executive Summary\n{}\n\n",
            self.title, self.executive_summary
        );
        for section in &self.sections {
            out.push_str(&format!("## {}\n{}\n\n", section.title, section.content));
        }
        out.push_str("## Sources Consulted\n");
        for url in &self.sources_consulted {
            out.push_str(&format!("- <{}>\n", url));
        }
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors and phases
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("Invalid research request: {0}")]
    InvalidRequest(String),

    #[error("Search service is not available (no search backend configured)")]
    SearchUnavailable,

    #[error("Search for '{query}' failed: {source}")]
    SearchError {
        query: String,
        #[source]
        source: SearchError,
    },

    #[error("Search for '{0}' returned no results")]
    NoResults(String),

    #[error("Source curation for '{0}' did not select any URLs")]
    CurationEmpty(String),

    #[error("Source curation for '{query}' failed: {reason}")]
    CurationFailed { query: String, reason: String },

    #[error("No content could be extracted from the {attempted} curated sources for '{query}'")]
    ExtractionTotalFailure { query: String, attempted: usize },

    #[error("No content left for synthesis of '{0}' after summarization")]
    NoContentForSynthesis(String),

    #[error("Report synthesis for '{query}' failed: {reason}{}", raw_suffix(.raw_excerpt))]
    SynthesisFailed {
        query: String,
        reason: String,
        raw_excerpt: Option<String>,
    },
}

fn raw_suffix(raw_excerpt: &Option<String>) -> String {
    match raw_excerpt {
        Some(raw) => format!(". Raw output: {}...", raw),
        None => String::new(),
    }
}

/// Pipeline position of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchPhase {
    Init,
    Search,
    Curate,
    Extract,
    Budget,
    Synthesize,
    Done,
    Failed,
}

impl fmt::Display for ResearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResearchPhase::Init => "init",
            ResearchPhase::Search => "search",
            ResearchPhase::Curate => "curate",
            ResearchPhase::Extract => "extract",
            ResearchPhase::Budget => "budget",
            ResearchPhase::Synthesize => "synthesize",
            ResearchPhase::Done => "done",
            ResearchPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Logs every phase transition of one run.
struct PhaseTracker<'a> {
    query: &'a str,
    current: ResearchPhase,
}

impl<'a> PhaseTracker<'a> {
    fn new(query: &'a str) -> Self {
        Self {
            query,
            current: ResearchPhase::Init,
        }
    }

    fn enter(&mut self, next: ResearchPhase) {
        info!(
            "Research '{}': {} -> {}",
            self.query, self.current, next
        );
        self.current = next;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Collaborator handles, constructed once and shared across runs.
#[derive(Clone)]
pub struct ResearchServices {
    pub search: Option<Arc<dyn SearchService>>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub curator: Arc<dyn TextGenerationService>,
    pub summarizer: Arc<dyn TextGenerationService>,
    pub writer: Arc<dyn TextGenerationService>,
}

#[derive(Debug, Clone)]
pub struct ResearchSettings {
    /// Pause between consecutive page fetches.
    pub fetch_delay: Duration,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            fetch_delay: Duration::from_millis(500),
        }
    }
}

/// Drives the research pipeline.
pub struct ResearchOrchestrator {
    services: ResearchServices,
    settings: ResearchSettings,
}

impl ResearchOrchestrator {
    pub fn new(services: ResearchServices, settings: ResearchSettings) -> Self {
        Self { services, settings }
    }

    /// Run the pipeline and render the report as Markdown.
    pub async fn run(&self, request: &ResearchRequest) -> Result<String, ResearchError> {
        self.run_report(request).await.map(|r| r.to_markdown())
    }

    /// Run the pipeline and return the structured report.
    pub async fn run_report(
        &self,
        request: &ResearchRequest,
    ) -> Result<ResearchReport, ResearchError> {
        let query = request.query.trim();
        let mut phases = PhaseTracker::new(query);

        match self.execute(query, request, &mut phases).await {
            Ok(report) => {
                phases.enter(ResearchPhase::Done);
                Ok(report)
            }
            Err(e) => {
                error!(
                    "Research '{}' failed during {}: {}",
                    query, phases.current, e
                );
                phases.enter(ResearchPhase::Failed);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        query: &str,
        request: &ResearchRequest,
        phases: &mut PhaseTracker<'_>,
    ) -> Result<ResearchReport, ResearchError> {
        if query.is_empty() {
            return Err(ResearchError::InvalidRequest("query is empty".to_string()));
        }

        phases.enter(ResearchPhase::Search);
        let results = self
            .search(query, request.num_initial_sources_to_consider)
            .await?;

        phases.enter(ResearchPhase::Curate);
        let selection = self
            .curate(query, &results, request.num_sources_to_deep_dive)
            .await?;

        phases.enter(ResearchPhase::Extract);
        let extracted = self.extract(&selection.selected_urls).await;
        let successes: Vec<&ExtractedSource> = extracted
            .iter()
            .filter(|s| s.status == ExtractionStatus::Success)
            .collect();
        info!(
            "Extracted content from {}/{} sources for '{}'",
            successes.len(),
            extracted.len(),
            query
        );
        if successes.is_empty() {
            return Err(ResearchError::ExtractionTotalFailure {
                query: query.to_string(),
                attempted: extracted.len(),
            });
        }

        phases.enter(ResearchPhase::Budget);
        let units = self.allocate(query, &successes, request).await;
        if units.is_empty() {
            return Err(ResearchError::NoContentForSynthesis(query.to_string()));
        }

        phases.enter(ResearchPhase::Synthesize);
        let sections = request.desired_report_sections.as_deref().unwrap_or(&[]);
        self.synthesize(query, &units, sections).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ResearchError> {
        let search = self
            .services
            .search
            .as_ref()
            .ok_or(ResearchError::SearchUnavailable)?;

        let results = search
            .search(query, limit)
            .await
            .map_err(|source| ResearchError::SearchError {
                query: query.to_string(),
                source,
            })?;

        info!("Search for '{}' returned {} results", query, results.len());
        if results.is_empty() {
            return Err(ResearchError::NoResults(query.to_string()));
        }
        Ok(results)
    }

    async fn curate(
        &self,
        query: &str,
        results: &[SearchResult],
        requested: usize,
    ) -> Result<CuratedSelection, ResearchError> {
        let count = requested.min(results.len()).max(1);
        let prompt = prompts::curator_prompt(query, results, count);
        let failed = |reason: String| ResearchError::CurationFailed {
            query: query.to_string(),
            reason,
        };

        let value = match self
            .services
            .curator
            .generate_structured(&prompt, &prompts::curator_schema())
            .await
        {
            StructuredOutcome::Ok(value) => value,
            StructuredOutcome::ParseError(raw) => {
                warn!(
                    "Curator output for '{}' was not JSON: {}",
                    query,
                    take_chars(&raw, 300)
                );
                return Err(failed("curator output was not valid JSON".to_string()));
            }
            StructuredOutcome::ServiceError(e) => return Err(failed(e.to_string())),
        };

        let selection = CuratedSelection::from_value(value).map_err(failed)?;
        if selection.selected_urls.is_empty() {
            warn!("Curator selected no URLs for '{}'", query);
            return Err(ResearchError::CurationEmpty(query.to_string()));
        }

        info!(
            "Curator selected {} URLs for '{}': {:?}",
            selection.selected_urls.len(),
            query,
            selection.selected_urls
        );
        if let Some(reasoning) = &selection.reasoning {
            debug!("Curator reasoning: {}", reasoning);
        }
        Ok(selection)
    }

    /// Fetch each url in order, pausing between fetches.
    async fn extract(&self, urls: &[String]) -> Vec<ExtractedSource> {
        let mut extracted = Vec::with_capacity(urls.len());

        for (i, url) in urls.iter().enumerate() {
            if i > 0 && !self.settings.fetch_delay.is_zero() {
                tokio::time::sleep(self.settings.fetch_delay).await;
            }

            info!("Extracting {}/{}: {}", i + 1, urls.len(), url);
            let source = match self.services.fetcher.fetch(url).await {
                Ok(content) => {
                    debug!("Extracted {} chars from {}", content.len(), url);
                    ExtractedSource {
                        url: url.clone(),
                        status: ExtractionStatus::Success,
                        content,
                    }
                }
                Err(e) => {
                    warn!("Failed to read {}: {}", url, e);
                    ExtractedSource {
                        url: url.clone(),
                        status: ExtractionStatus::Error,
                        content: format!("Error: {}", e),
                    }
                }
            };
            extracted.push(source);
        }

        extracted
    }

    /// Decide what the writer sees for each successful source.
    async fn allocate(
        &self,
        query: &str,
        sources: &[&ExtractedSource],
        request: &ResearchRequest,
    ) -> Vec<ContentUnit> {
        let ceiling = request.max_total_tokens_for_writer;
        if fits_verbatim(sources.iter().map(|s| s.content.as_str()), ceiling) {
            info!(
                "Full texts for '{}' fit the writer limit of {} tokens",
                query, ceiling
            );
            return sources
                .iter()
                .map(|s| ContentUnit {
                    url: s.url.clone(),
                    text: s.content.clone(),
                    kind: ContentKind::Full,
                })
                .collect();
        }

        warn!(
            "Full texts for '{}' exceed the writer limit of {} tokens, summarizing",
            query, ceiling
        );
        let per_summary = request.max_tokens_per_summary;
        let input_limit = budget::summary_input_limit(per_summary);
        let mut tally = SummaryBudget::new(ceiling, per_summary);
        let mut units = Vec::new();

        for (i, source) in sources.iter().enumerate() {
            if !tally.has_room() {
                warn!(
                    "Writer budget exhausted at ~{} tokens; dropping {} remaining sources starting at {}",
                    tally.used() as u64,
                    sources.len() - i,
                    source.url
                );
                break;
            }

            let text = take_chars(&source.content, input_limit);
            let prompt = prompts::summarizer_prompt(query, text, per_summary);
            match self.services.summarizer.generate_text(&prompt).await {
                Ok(summary) => {
                    tally.record(&summary);
                    debug!(
                        "Summarized {} to {} chars (running ~{} tokens)",
                        source.url,
                        summary.len(),
                        tally.used() as u64
                    );
                    units.push(ContentUnit {
                        url: source.url.clone(),
                        text: summary,
                        kind: ContentKind::Summary,
                    });
                }
                Err(e) => {
                    warn!("Skipping failed summary for {}: {}", source.url, e);
                }
            }
        }

        info!(
            "Using {} summaries for '{}' (~{} tokens)",
            units.len(),
            query,
            tally.used() as u64
        );
        units
    }

    async fn synthesize(
        &self,
        query: &str,
        units: &[ContentUnit],
        desired_sections: &[String],
    ) -> Result<ResearchReport, ResearchError> {
        let prompt = prompts::writer_prompt(query, units, desired_sections);
        let outcome = self
            .services
            .writer
            .generate_structured(&prompt, &prompts::writer_schema())
            .await;

        let reason = match outcome {
            StructuredOutcome::Ok(value) => match ResearchReport::from_writer(value, units) {
                Ok(report) => {
                    info!(
                        "Report for '{}' synthesized with {} sections",
                        query,
                        report.sections.len()
                    );
                    return Ok(report);
                }
                Err(reason) => reason,
            },
            StructuredOutcome::ParseError(_) => "writer output was not valid JSON".to_string(),
            StructuredOutcome::ServiceError(e) => {
                return Err(ResearchError::SynthesisFailed {
                    query: query.to_string(),
                    reason: e.to_string(),
                    raw_excerpt: None,
                });
            }
        };

        // Diagnostic only: the phase has already failed.
        let raw_excerpt = match self.services.writer.generate_text(&prompt).await {
            Ok(raw) => {
                error!(
                    "Raw writer output for '{}': {}",
                    query,
                    take_chars(&raw, 1000)
                );
                Some(take_chars(&raw, RAW_EXCERPT_CHARS).to_string())
            }
            Err(e) => {
                warn!("Could not fetch raw writer output for '{}': {}", query, e);
                None
            }
        };

        Err(ResearchError::SynthesisFailed {
            query: query.to_string(),
            reason,
            raw_excerpt,
        })
    }
}
