//! Prompt builders for the curator, summarizer and writer roles.

use serde_json::json;

use super::generation::{OutputSchema, Prompt};
use super::{ContentUnit, SearchResult};

const CURATOR_SYSTEM: &str = "\
You are a research assistant acting as a source curator.
Analyze the web search results below (titles, URLs and snippets) and pick the most
promising, authoritative sources for an in-depth research report.
Report topic: \"{topic}\"
Select the top {count} URLs.
Favor primary research, reputable institutions, comprehensive reviews and official reports.
Skip forums, social media, thin blog posts and short news items unless they are uniquely relevant.
Do not select duplicates. Prefer open sources over paywalled ones when quality is similar.
Every selected URL must be copied exactly from the results and start with http:// or https://.";

const SUMMARIZER_SYSTEM: &str = "\
You are a research summarizer. Read the text extracted from a web page and write a concise,
factual summary of what it says about the research topic: \"{topic}\".
Cover key findings, arguments, data points and examples.
Aim for about {max_tokens} tokens (roughly {max_words} words).
Stay neutral and rely ONLY on the provided text; add no outside information or opinions.
Output the summary directly as plain text.

Provided text:
---
{text}
---
Summary:";

const WRITER_SYSTEM: &str = "\
You are a research report writer. Synthesize the provided content (full texts or summaries
from several web sources) into a well-structured report on the topic: \"{topic}\".
Base the report ONLY on the provided content; do not invent facts or use outside knowledge.
Report structure:
1. An executive summary giving a concise overview of the main findings.
2. If desired sections are listed below, use them. Otherwise choose logical sections from the
   content, such as Introduction, Key Findings, Perspectives, Limitations and Outlook.
3. In each section, synthesize across sources and cite several when they cover the same point.
4. Keep a neutral, analytical tone. Section content is Markdown.
Desired report sections: {sections}

Provided content:
---
{content}
---";

/// `Result i:` blocks, 1-based, in search order.
pub fn format_search_results(results: &[SearchResult]) -> String {
    let mut out = String::new();
    for (i, result) in results.iter().enumerate() {
        out.push_str(&format!(
            "Result {}:\nTitle: {}\nURL: {}\nSnippet: {}\n---\n",
            i + 1,
            non_empty(&result.title),
            non_empty(&result.url),
            non_empty(&result.snippet)
        ));
    }
    out
}

/// One delimited block per unit, tagged with its kind and url.
pub fn format_content_units(units: &[ContentUnit]) -> String {
    let mut out = String::new();
    for (i, unit) in units.iter().enumerate() {
        out.push_str(&format!(
            "--- Source {n} (Type: {kind}, URL: {url}) ---\n{text}\n--- End Source {n} ---\n\n",
            n = i + 1,
            kind = unit.kind.as_str(),
            url = unit.url,
            text = unit.text
        ));
    }
    out.trim_end().to_string()
}

fn non_empty(value: &str) -> &str {
    if value.trim().is_empty() {
        "N/A"
    } else {
        value
    }
}

pub fn curator_prompt(topic: &str, results: &[SearchResult], count: usize) -> Prompt {
    let system = CURATOR_SYSTEM
        .replace("{topic}", topic)
        .replace("{count}", &count.to_string());
    let user = format!(
        "Please select the best sources from these results:\n\n{}",
        format_search_results(results)
    );
    Prompt::new(system, user)
}

/// Approximate word target for a summary of `max_tokens` tokens.
pub fn summary_word_target(max_tokens: usize) -> usize {
    if max_tokens > 100 {
        max_tokens / 3
    } else {
        250
    }
}

pub fn summarizer_prompt(topic: &str, text: &str, max_tokens: usize) -> Prompt {
    // `{text}` goes last so page content cannot inject the other placeholders.
    let system = SUMMARIZER_SYSTEM
        .replace("{topic}", topic)
        .replace("{max_tokens}", &max_tokens.to_string())
        .replace("{max_words}", &summary_word_target(max_tokens).to_string())
        .replace("{text}", text);
    Prompt::new(system, "Summarize the provided text now.")
}

pub fn writer_prompt(topic: &str, units: &[ContentUnit], desired_sections: &[String]) -> Prompt {
    let sections = if desired_sections.is_empty() {
        "Not specified; use logical sections based on the content.".to_string()
    } else {
        desired_sections.join(", ")
    };
    let system = WRITER_SYSTEM
        .replace("{topic}", topic)
        .replace("{sections}", &sections)
        .replace("{content}", &format_content_units(units));
    Prompt::new(
        system,
        "Based on the instructions and content above, generate the research report now.",
    )
}

pub fn curator_schema() -> OutputSchema {
    OutputSchema {
        name: "CuratedSources",
        schema: json!({
            "type": "object",
            "properties": {
                "selected_urls": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "The most relevant and authoritative URLs to deep dive into."
                },
                "reasoning": {
                    "type": "string",
                    "description": "Brief reasoning for selecting these URLs."
                }
            },
            "required": ["selected_urls", "reasoning"]
        }),
    }
}

pub fn writer_schema() -> OutputSchema {
    OutputSchema {
        name: "ResearchReport",
        schema: json!({
            "type": "object",
            "properties": {
                "report_title": {"type": "string"},
                "executive_summary": {"type": "string"},
                "sections": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "section_title": {"type": "string"},
                            "section_content": {
                                "type": "string",
                                "description": "Markdown content of the section."
                            }
                        },
                        "required": ["section_title", "section_content"]
                    }
                }
            },
            "required": ["report_title", "executive_summary", "sections"]
        }),
    }
}
