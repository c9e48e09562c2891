//! Web access tools: read pages and search.
//!
//! Pages are fetched over HTTP(S), stripped of markup and cut to a fixed
//! length. Remote pages are excerpt sources, so unlike local files they are
//! always truncated.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::Tool;
use crate::research::SearchService;
use crate::util::take_chars;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; researchd/0.1)";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid input. Expected a non-empty URL string.")]
    InvalidInput,

    #[error("Timeout fetching URL.")]
    Timeout,

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Could not fetch URL{}: {message}", http_status(.status))]
    RequestFailed {
        status: Option<u16>,
        message: String,
    },

    #[error("Cannot parse content type '{0}'. Only HTML is supported.")]
    UnsupportedContentType(String),

    #[error("Could not extract meaningful text from the page.")]
    NoExtractableText,
}

fn http_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

/// Anything that can turn a URL into plain text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Clean up a caller-supplied URL.
///
/// Removes control whitespace and wrapping backticks, and assumes `https://`
/// when no scheme is given.
pub fn normalize_url(raw: &str) -> Result<String, FetchError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\t'))
        .collect();
    let cleaned = cleaned.trim().trim_matches('`').trim();
    if cleaned.is_empty() {
        return Err(FetchError::InvalidInput);
    }

    let has_scheme = cleaned
        .split_once("://")
        .map(|(scheme, _)| !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or(false);
    if has_scheme {
        Ok(cleaned.to_string())
    } else {
        tracing::info!("No scheme found, prepending https:// to '{}'", cleaned);
        Ok(format!("https://{}", cleaned))
    }
}

// ============================================================================
// HTML → text
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Start(String),
    End(String),
    Text(String),
}

/// Elements whose content is never page text.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Elements whose text makes up the extracted content.
const TEXT_BLOCKS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "td", "th"];

/// Preferred content containers, in order.
const CONTAINERS: &[&str] = &["article", "main", "body"];

fn tokenize(html: &str) -> Vec<Token> {
    let lower = html.to_ascii_lowercase();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < html.len() {
        let Some(offset) = html[pos..].find('<') else {
            tokens.push(Token::Text(html[pos..].to_string()));
            break;
        };
        if offset > 0 {
            tokens.push(Token::Text(html[pos..pos + offset].to_string()));
        }
        let tag_start = pos + offset;
        let rest = &html[tag_start..];

        if rest.starts_with("<!--") {
            pos = match rest.find("-->") {
                Some(end) => tag_start + end + 3,
                None => html.len(),
            };
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            pos = match rest.find('>') {
                Some(end) => tag_start + end + 1,
                None => html.len(),
            };
            continue;
        }

        let is_end = rest.starts_with("</");
        let name_start = tag_start + if is_end { 2 } else { 1 };
        let name_len = html[name_start..]
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(html.len() - name_start);
        if name_len == 0 {
            // A stray '<' in text.
            tokens.push(Token::Text("<".to_string()));
            pos = tag_start + 1;
            continue;
        }
        let name = lower[name_start..name_start + name_len].to_string();

        // Find the closing '>' outside attribute quotes.
        let mut quote: Option<char> = None;
        let mut tag_end = html.len();
        for (i, c) in html[name_start + name_len..].char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"') | (None, '\'') => quote = Some(c),
                (None, '>') => {
                    tag_end = name_start + name_len + i + 1;
                    break;
                }
                _ => {}
            }
        }
        pos = tag_end;

        if is_end {
            tokens.push(Token::End(name));
            continue;
        }
        let self_closing = html[tag_start..tag_end].trim_end_matches('>').ends_with('/');
        if SKIPPED_ELEMENTS.contains(&name.as_str()) && !self_closing {
            let close = format!("</{}", name);
            pos = match lower[pos..].find(&close) {
                Some(idx) => match html[pos + idx..].find('>') {
                    Some(gt) => pos + idx + gt + 1,
                    None => html.len(),
                },
                None => html.len(),
            };
            continue;
        }
        tokens.push(Token::Start(name.clone()));
        if self_closing {
            tokens.push(Token::End(name));
        }
    }

    tokens
}

/// Decode the common named and numeric character references.
fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        let decoded = after.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &after[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity.strip_prefix('#').and_then(|num| {
                    let code = match num.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }),
            };
            ch.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &after[consumed..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn clean_text(raw: &str) -> String {
    decode_entities(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Index range (exclusive of the tags) of the first `name` element.
fn element_range(tokens: &[Token], name: &str) -> Option<(usize, usize)> {
    let start = tokens
        .iter()
        .position(|t| matches!(t, Token::Start(n) if n == name))?;
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(start + 1) {
        match token {
            Token::Start(n) if n == name => depth += 1,
            Token::End(n) if n == name => {
                if depth == 0 {
                    return Some((start + 1, i));
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    Some((start + 1, tokens.len()))
}

/// Text of the block-level elements inside `tokens`, one per line.
fn block_texts(tokens: &[Token]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let Token::Start(name) = &tokens[i] else {
            i += 1;
            continue;
        };
        if !TEXT_BLOCKS.contains(&name.as_str()) {
            i += 1;
            continue;
        }

        let mut parts = Vec::new();
        let mut depth = 0usize;
        let mut j = i + 1;
        while j < tokens.len() {
            match &tokens[j] {
                Token::Start(n) if n == name => {
                    // An unclosed <p>/<li> is implicitly closed by its next sibling.
                    if depth == 0 {
                        break;
                    }
                    depth += 1;
                }
                Token::End(n) if n == name => {
                    if depth == 0 {
                        j += 1;
                        break;
                    }
                    depth -= 1;
                }
                Token::Text(text) => parts.push(text.as_str()),
                _ => {}
            }
            j += 1;
        }

        let text = clean_text(&parts.join(" "));
        if !text.is_empty() {
            lines.push(text);
        }
        i = j.max(i + 1);
    }
    lines
}

/// Extract readable text from HTML.
///
/// Prefers `<article>`, then `<main>`, then `<body>`, collecting paragraph,
/// heading, list and table-cell text. Falls back to all document text.
pub fn extract_text_from_html(html: &str) -> String {
    let tokens = tokenize(html);

    let structured = CONTAINERS
        .iter()
        .find_map(|name| element_range(&tokens, name))
        .map(|(start, end)| block_texts(&tokens[start..end]))
        .unwrap_or_default();
    if !structured.is_empty() {
        return structured.join("\n");
    }

    tokens
        .iter()
        .filter_map(|t| match t {
            Token::Text(text) => Some(clean_text(text)),
            _ => None,
        })
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Fetcher
// ============================================================================

/// HTTP page fetcher returning bounded plain text.
pub struct ContentFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_length: usize,
}

impl ContentFetcher {
    pub fn new(timeout: Duration, max_length: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            timeout,
            max_length,
        })
    }

    fn map_request_error(e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_builder() {
            FetchError::InvalidUrl(e.to_string())
        } else {
            FetchError::RequestFailed {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl PageFetcher for ContentFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let url = normalize_url(url)?;
        let parsed = url::Url::parse(&url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        tracing::info!("Fetching {} (timeout: {:?})", parsed, self.timeout);
        let response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| {
                let err = Self::map_request_error(e);
                tracing::error!("Fetching {} failed: {}", parsed, err);
                err
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("HTTP error fetching {}: {}", parsed, status);
            return Err(FetchError::RequestFailed {
                status: Some(status.as_u16()),
                message: status.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        if !content_type.contains("html") {
            tracing::warn!(
                "Cannot parse content type '{}' for {}",
                content_type,
                parsed
            );
            return Err(FetchError::UnsupportedContentType(content_type));
        }

        let body = response.text().await.map_err(Self::map_request_error)?;
        let text = extract_text_from_html(&body);
        if text.is_empty() {
            tracing::warn!("Could not extract meaningful text from {}", parsed);
            return Err(FetchError::NoExtractableText);
        }

        let truncated = take_chars(&text, self.max_length);
        let result = if truncated.len() < text.len() {
            format!("{}...", truncated)
        } else {
            text
        };
        tracing::info!(
            "Extracted ~{} chars from {}",
            result.chars().count(),
            parsed
        );
        Ok(result)
    }
}

// ============================================================================
// Tools
// ============================================================================

/// Read a web page as plain text.
pub struct FetchUrl {
    fetcher: Arc<dyn PageFetcher>,
}

impl FetchUrl {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Tool for FetchUrl {
    fn name(&self) -> &str {
        "web_page_reader"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its main text content (truncated). Input MUST be a single URL string. \
        Only HTML pages are supported."
    }

    async fn execute(&self, input: &str) -> anyhow::Result<String> {
        Ok(self.fetcher.fetch(input).await?)
    }
}

/// Search the web via the configured search service.
pub struct WebSearch {
    search: Arc<dyn SearchService>,
}

impl WebSearch {
    const DEFAULT_RESULTS: usize = 5;

    pub fn new(search: Arc<dyn SearchService>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Tool for WebSearch {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for real-time information. Input is the search query. \
        Returns numbered results with titles, URLs and snippets."
    }

    async fn execute(&self, input: &str) -> anyhow::Result<String> {
        let query = input.trim();
        if query.is_empty() {
            anyhow::bail!("Missing search query");
        }

        let results = self.search.search(query, Self::DEFAULT_RESULTS).await?;
        if results.is_empty() {
            return Ok(format!("No results found for: {}", query));
        }

        let mut output = String::new();
        for (i, result) in results.iter().enumerate() {
            output.push_str(&format!(
                "### {}. {}\n**URL:** {}\n\n{}\n\n",
                i + 1,
                result.title,
                result.url,
                result.snippet
            ));
        }
        Ok(output.trim_end().to_string())
    }
}
