//! File operation tools: read and write files inside the task workspace.
//!
//! ## Wire formats
//!
//! - write: `relative/path.txt:::content` → `SUCCESS::write_file:::relative/path.txt`
//! - read: `relative/path.txt` (only the first line is used)
//!
//! Local files are returned in full. PDFs above the warning threshold get a
//! visible warning appended instead of being cut.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{resolve_path, PathRejection, Tool};
use crate::util::strip_quotes;
use crate::workspace::TaskWorkspace;

/// Delimiter between path and content in write input.
pub const WRITE_DELIMITER: &str = ":::";

/// Extensions read verbatim as text.
pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "py", "js", "css", "html", "json", "csv", "md", "log", "yaml", "yml",
];

#[derive(Debug, Error)]
pub enum FileAccessError {
    #[error("Invalid input format: {0}")]
    MalformedInput(String),

    #[error("Invalid file path '{0}'. Path must be relative and within the workspace.")]
    PathTraversal(String),

    #[error("File not found at path '{0}'.")]
    NotFound(String),

    #[error("Path '{0}' is not a file.")]
    NotAFile(String),

    #[error("Cannot read file. Unsupported file extension: '{extension}'. Supported text: {supported}, .pdf")]
    UnsupportedType {
        extension: String,
        supported: String,
    },

    #[error("Error reading PDF '{path}': {reason}")]
    UnreadablePdf { path: String, reason: String },

    #[error("Failed to read file '{path}': {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Limits applied when reading local files.
#[derive(Debug, Clone)]
pub struct ReadLimits {
    /// PDF text longer than this (in chars) gets a warning suffix.
    pub pdf_warning_length: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            pdf_warning_length: 20_000,
        }
    }
}

// ============================================================================
// Input cleaning
// ============================================================================

/// Strip workspace prefixes a model tends to hallucinate onto relative paths.
///
/// Handles `workspace/<task>/`, `<task>/` and a bare `workspace/`, with either
/// separator and an optional leading separator.
fn strip_workspace_prefix<'a>(path: &'a str, task_id: &str) -> &'a str {
    fn strip_dir<'p>(s: &'p str, dir: &str) -> Option<&'p str> {
        let rest = s.strip_prefix(dir)?;
        rest.strip_prefix('/').or_else(|| rest.strip_prefix('\\'))
    }

    let unrooted = path.trim_start_matches(['/', '\\']);

    let after_workspace = strip_dir(unrooted, "workspace");
    if let Some(rest) = after_workspace.and_then(|r| strip_dir(r, task_id)) {
        return rest;
    }
    if let Some(rest) = strip_dir(unrooted, task_id) {
        return rest;
    }
    if let Some(mut rest) = after_workspace {
        while let Some(next) = strip_dir(rest, "workspace") {
            rest = next;
        }
        return rest;
    }
    path
}

/// Decode backslash escape sequences.
///
/// Returns `None` when a sequence is malformed so the caller can fall back to
/// the raw text. Unknown escapes are kept as written.
fn decode_escapes(raw: &str) -> Option<String> {
    fn hex_char(chars: &mut std::str::Chars<'_>, digits: usize) -> Option<char> {
        let hex: String = chars.by_ref().take(digits).collect();
        if hex.len() != digits {
            return None;
        }
        u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'x' => out.push(hex_char(&mut chars, 2)?),
            'u' => out.push(hex_char(&mut chars, 4)?),
            'U' => out.push(hex_char(&mut chars, 8)?),
            '\n' => {}
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Some(out)
}

/// Remove a leading ```` ```lang ```` line and a trailing ```` ``` ```` line.
///
/// Whitespace after the closing fence is ignored, as is a CRLF before it.
fn strip_code_fence(content: &str) -> &str {
    let mut text = content;
    if let Some(rest) = text.strip_prefix("```") {
        let lang_end = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let after_lang = &rest[lang_end..];
        let trimmed = after_lang.trim_start_matches([' ', '\t', '\r']);
        if let Some(body) = trimmed.strip_prefix('\n') {
            text = body;
        }
    }
    if let Some(body) = text.trim_end().strip_suffix("```") {
        if let Some(body) = body.strip_suffix('\n') {
            text = body.strip_suffix('\r').unwrap_or(body);
        }
    }
    text
}

fn reject(path: &str, rejection: PathRejection) -> FileAccessError {
    error!(
        "Security: refused path '{}' ({:?}) for workspace access",
        path, rejection
    );
    FileAccessError::PathTraversal(path.to_string())
}

// ============================================================================
// Write
// ============================================================================

/// Write `path:::content` into the workspace, overwriting any existing file.
///
/// Returns `SUCCESS::write_file:::<cleaned relative path>`.
pub async fn write_file(input: &str, workspace: &TaskWorkspace) -> Result<String, FileAccessError> {
    debug!(
        "write_file: {} bytes of input for workspace '{}'",
        input.len(),
        workspace.task_id()
    );
    let (raw_path, raw_content) = input.split_once(WRITE_DELIMITER).ok_or_else(|| {
        FileAccessError::MalformedInput("expected 'file_path:::text_content'".to_string())
    })?;

    let quoted = strip_quotes(raw_path.trim());
    let relative = strip_workspace_prefix(quoted, workspace.task_id());
    if relative != quoted {
        info!("write_file: stripped workspace prefix, using '{}'", relative);
    }
    if relative.is_empty() {
        return Err(FileAccessError::MalformedInput(
            "file path cannot be empty after cleaning".to_string(),
        ));
    }

    let decoded = decode_escapes(raw_content).unwrap_or_else(|| {
        warn!("write_file: could not decode escapes, using raw content");
        raw_content.to_string()
    });
    let content = strip_code_fence(&decoded).trim();

    let full_path = resolve_path(relative, workspace.root()).map_err(|r| reject(relative, r))?;

    let write_failed = |source: std::io::Error| {
        error!("write_file: failed writing '{}': {}", relative, source);
        FileAccessError::WriteFailed {
            path: relative.to_string(),
            source,
        }
    };
    if let Some(parent) = full_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }
    tokio::fs::write(&full_path, content)
        .await
        .map_err(write_failed)?;

    info!(
        "write_file: wrote {} bytes to '{}'",
        content.len(),
        full_path.display()
    );
    Ok(format!("SUCCESS::write_file:::{}", relative))
}

// ============================================================================
// Read
// ============================================================================

/// Read a text or PDF file from the workspace.
pub async fn read_file(
    input: &str,
    workspace: &TaskWorkspace,
    limits: &ReadLimits,
) -> Result<String, FileAccessError> {
    let first_line = input.lines().next().unwrap_or("");
    let relative = strip_quotes(first_line.trim());
    if relative.is_empty() {
        return Err(FileAccessError::MalformedInput(
            "expected a non-empty relative file path".to_string(),
        ));
    }

    let full_path = resolve_path(relative, workspace.root()).map_err(|r| reject(relative, r))?;

    if !full_path.exists() {
        warn!("read_file: not found at {}", full_path.display());
        return Err(FileAccessError::NotFound(relative.to_string()));
    }
    if !full_path.is_file() {
        return Err(FileAccessError::NotAFile(relative.to_string()));
    }

    let extension = full_path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if extension == "pdf" {
        let path = full_path.clone();
        let rel_path = relative.to_string();
        let text = tokio::task::spawn_blocking(move || extract_pdf_text(&path, &rel_path))
            .await
            .map_err(|e| FileAccessError::UnreadablePdf {
                path: relative.to_string(),
                reason: e.to_string(),
            })??;
        info!(
            "read_file: read {} chars from PDF '{}'",
            text.chars().count(),
            relative
        );
        return Ok(append_pdf_warning(text, limits.pdf_warning_length));
    }

    if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        let bytes = tokio::fs::read(&full_path)
            .await
            .map_err(|source| FileAccessError::ReadFailed {
                path: relative.to_string(),
                source,
            })?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        info!(
            "read_file: read {} chars from '{}'",
            content.chars().count(),
            relative
        );
        return Ok(content);
    }

    warn!("read_file: unsupported extension '{}'", extension);
    Err(FileAccessError::UnsupportedType {
        extension: if extension.is_empty() {
            String::new()
        } else {
            format!(".{}", extension)
        },
        supported: TEXT_EXTENSIONS
            .iter()
            .map(|e| format!(".{}", e))
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Extract text page by page; a bad page becomes an inline marker.
fn extract_pdf_text(path: &Path, rel_path: &str) -> Result<String, FileAccessError> {
    let document = lopdf::Document::load(path).map_err(|e| {
        error!("read_file: cannot parse PDF '{}': {}", rel_path, e);
        FileAccessError::UnreadablePdf {
            path: rel_path.to_string(),
            reason: e.to_string(),
        }
    })?;

    let pages = document.get_pages();
    info!("read_file: reading {} pages from PDF '{}'", pages.len(), rel_path);

    let mut text = String::new();
    for page_number in pages.keys() {
        let page = document.extract_text(&[*page_number]);
        push_page_text(&mut text, *page_number, page, rel_path);
    }
    Ok(text.trim().to_string())
}

fn push_page_text(
    text: &mut String,
    page_number: u32,
    page: Result<String, lopdf::Error>,
    rel_path: &str,
) {
    match page {
        Ok(page_text) => {
            if !page_text.is_empty() {
                text.push_str(&page_text);
                text.push('\n');
            }
        }
        Err(e) => {
            warn!(
                "read_file: error extracting page {} of '{}': {}",
                page_number, rel_path, e
            );
            text.push_str(&format!("\n--- Error reading page {} ---\n", page_number));
        }
    }
}

fn append_pdf_warning(mut text: String, warning_length: usize) -> String {
    let length = text.chars().count();
    if length > warning_length {
        warn!(
            "read_file: PDF content length ({}) exceeds warning threshold ({})",
            length, warning_length
        );
        text.push_str(&format!(
            "\n\n[SYSTEM WARNING: Full PDF content read ({} chars), exceeds warning threshold of {} chars.]",
            length, warning_length
        ));
    }
    text
}

// ============================================================================
// Tools
// ============================================================================

/// Read a file from the task workspace.
pub struct ReadFile {
    workspace: TaskWorkspace,
    limits: ReadLimits,
    description: String,
}

impl ReadFile {
    pub fn new(workspace: TaskWorkspace, limits: ReadLimits) -> Self {
        let description = format!(
            "Read the entire contents of a text or PDF file in the current task's workspace. \
            Input MUST be the relative path from the workspace root (e.g., 'my_data.csv', 'report.pdf', \
            'scripts/analysis.py'). For PDFs, a warning is appended if the content exceeds {} characters.",
            limits.pdf_warning_length
        );
        Self {
            workspace,
            limits,
            description,
        }
    }
}

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, input: &str) -> anyhow::Result<String> {
        Ok(read_file(input, &self.workspace, &self.limits).await?)
    }
}

/// Write content to a file in the task workspace (create or overwrite).
pub struct WriteFile {
    workspace: TaskWorkspace,
}

impl WriteFile {
    pub fn new(workspace: TaskWorkspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write or overwrite text content to a file within the current task's workspace. \
        Input MUST be a single string 'relative_file_path:::text_content' \
        (e.g., 'results.txt:::Analysis complete.\\nFinal score: 95'). Creates subdirectories. \
        Do NOT prefix the path with the workspace directory."
    }

    async fn execute(&self, input: &str) -> anyhow::Result<String> {
        Ok(write_file(input, &self.workspace).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceSandbox;

    fn workspace(temp: &tempfile::TempDir, task: &str) -> TaskWorkspace {
        WorkspaceSandbox::new(temp.path())
            .resolve(task)
            .expect("workspace")
    }

    #[test]
    fn strips_hallucinated_prefixes() {
        assert_eq!(strip_workspace_prefix("workspace/t1/a.txt", "t1"), "a.txt");
        assert_eq!(strip_workspace_prefix("/workspace/t1/a.txt", "t1"), "a.txt");
        assert_eq!(strip_workspace_prefix("workspace\\t1\\a.txt", "t1"), "a.txt");
        assert_eq!(strip_workspace_prefix("t1/sub/a.txt", "t1"), "sub/a.txt");
        assert_eq!(strip_workspace_prefix("workspace/a.txt", "t1"), "a.txt");
        assert_eq!(strip_workspace_prefix("notes/a.txt", "t1"), "notes/a.txt");
        assert_eq!(strip_workspace_prefix("t1x/a.txt", "t1"), "t1x/a.txt");
    }

    #[test]
    fn decodes_escapes_or_gives_up() {
        assert_eq!(decode_escapes("a\\nb\\t\\\\").as_deref(), Some("a\nb\t\\"));
        assert_eq!(decode_escapes("\\x41\\u00e9").as_deref(), Some("Aé"));
        assert_eq!(decode_escapes("keep \\d").as_deref(), Some("keep \\d"));
        assert_eq!(decode_escapes("bad \\xZZ"), None);
        assert_eq!(decode_escapes("trailing \\"), None);
    }

    #[test]
    fn strips_code_fences() {
        assert_eq!(strip_code_fence("```python\nprint(1)\n```"), "print(1)");
        assert_eq!(strip_code_fence("```\nplain\n```"), "plain");
        assert_eq!(strip_code_fence("no fence"), "no fence");
    }

    #[test]
    fn closing_fence_tolerates_trailing_whitespace_and_crlf() {
        assert_eq!(strip_code_fence("```python\nprint(1)\n```\n"), "print(1)");
        assert_eq!(strip_code_fence("```\nplain\n```  \n\n"), "plain");
        assert_eq!(strip_code_fence("```js\r\nlet a = 1;\r\n```\r\n"), "let a = 1;");
        // A fence glued to the last line is content, not a closer.
        assert_eq!(strip_code_fence("```\nx```"), "x```");
    }

    #[tokio::test]
    async fn write_requires_delimiter() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&temp, "t");

        let err = write_file("just-a-path.txt", &ws).await.expect_err("no delimiter");
        assert!(matches!(err, FileAccessError::MalformedInput(_)));
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&temp, "t");

        let token = write_file("a/b.txt:::hello", &ws).await.expect("write");
        assert_eq!(token, "SUCCESS::write_file:::a/b.txt");

        let content = read_file("a/b.txt", &ws, &ReadLimits::default())
            .await
            .expect("read");
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn write_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&temp, "t");

        let first = write_file("'notes.md':::# Title", &ws).await.expect("first");
        let second = write_file("'notes.md':::# Title", &ws).await.expect("second");
        assert_eq!(first, second);
        let on_disk = std::fs::read_to_string(ws.root().join("notes.md")).expect("read");
        assert_eq!(on_disk, "# Title");
    }

    #[tokio::test]
    async fn write_cleans_fences_and_escapes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&temp, "t");

        write_file("workspace/t/run.py:::```python\\nprint('hi')\\n```", &ws)
            .await
            .expect("write");
        let on_disk = std::fs::read_to_string(ws.root().join("run.py")).expect("read");
        assert_eq!(on_disk, "print('hi')");
    }

    #[tokio::test]
    async fn write_strips_fence_followed_by_newline() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&temp, "t");

        write_file("run.py:::```python\nprint('hi')\n```\n", &ws)
            .await
            .expect("write");
        let on_disk = std::fs::read_to_string(ws.root().join("run.py")).expect("read");
        assert_eq!(on_disk, "print('hi')");
    }

    #[tokio::test]
    async fn traversal_is_rejected_for_read_and_write() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&temp, "t");

        for path in ["../escape.txt", "a/../../escape.txt", "/tmp/abs.txt"] {
            let err = write_file(&format!("{}:::x", path), &ws)
                .await
                .expect_err(path);
            assert!(matches!(err, FileAccessError::PathTraversal(_)), "{path}");

            let err = read_file(path, &ws, &ReadLimits::default())
                .await
                .expect_err(path);
            assert!(matches!(err, FileAccessError::PathTraversal(_)), "{path}");
        }
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn read_uses_first_line_and_strips_quotes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&temp, "t");
        std::fs::write(ws.root().join("data.csv"), "a,b\n1,2").expect("seed");

        let content = read_file("`data.csv`\nplease read this", &ws, &ReadLimits::default())
            .await
            .expect("read");
        assert_eq!(content, "a,b\n1,2");
    }

    #[tokio::test]
    async fn read_replaces_invalid_utf8() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&temp, "t");
        std::fs::write(ws.root().join("bin.txt"), [b'o', b'k', 0xff]).expect("seed");

        let content = read_file("bin.txt", &ws, &ReadLimits::default())
            .await
            .expect("read");
        assert_eq!(content, "ok\u{FFFD}");
    }

    #[tokio::test]
    async fn read_error_cases() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&temp, "t");
        std::fs::create_dir(ws.root().join("dir.txt")).expect("dir");
        std::fs::write(ws.root().join("image.png"), [0u8; 4]).expect("png");
        std::fs::write(ws.root().join("broken.pdf"), "not a pdf").expect("pdf");
        let limits = ReadLimits::default();

        assert!(matches!(
            read_file("  \n", &ws, &limits).await,
            Err(FileAccessError::MalformedInput(_))
        ));
        assert!(matches!(
            read_file("missing.txt", &ws, &limits).await,
            Err(FileAccessError::NotFound(_))
        ));
        assert!(matches!(
            read_file("dir.txt", &ws, &limits).await,
            Err(FileAccessError::NotAFile(_))
        ));
        assert!(matches!(
            read_file("image.png", &ws, &limits).await,
            Err(FileAccessError::UnsupportedType { .. })
        ));
        assert!(matches!(
            read_file("broken.pdf", &ws, &limits).await,
            Err(FileAccessError::UnreadablePdf { .. })
        ));
    }

    /// Write a PDF with one Helvetica text line per page.
    fn write_pdf(path: &Path, pages: &[&str]) {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for line in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let stream = Stream::new(dictionary! {}, content.encode().expect("encode"));
            let content_id = doc.add_object(stream);
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).expect("save pdf");
    }

    #[tokio::test]
    async fn reads_pdf_pages_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&temp, "t");
        write_pdf(&ws.root().join("paper.pdf"), &["First page text", "Second page text"]);

        let text = read_file("paper.pdf", &ws, &ReadLimits::default())
            .await
            .expect("read pdf");
        let first = text.find("First page text").expect("page 1 text");
        let second = text.find("Second page text").expect("page 2 text");
        assert!(first < second, "{text}");
        assert!(!text.contains("SYSTEM WARNING"), "{text}");
        assert!(!text.ends_with('\n'));
    }

    #[tokio::test]
    async fn long_pdf_gets_warning_suffix_through_read_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&temp, "t");
        write_pdf(&ws.root().join("long.pdf"), &["A fairly long line of PDF text"]);
        let limits = ReadLimits {
            pdf_warning_length: 5,
        };

        let text = read_file("long.pdf", &ws, &limits).await.expect("read pdf");
        assert!(text.starts_with("A fairly long line of PDF text"), "{text}");
        assert!(
            text.ends_with("exceeds warning threshold of 5 chars.]"),
            "{text}"
        );
    }

    #[test]
    fn failed_page_becomes_inline_marker() {
        let mut text = String::new();
        push_page_text(&mut text, 1, Ok("intro".to_string()), "doc.pdf");
        push_page_text(&mut text, 2, Err(lopdf::Error::PageNumberNotFound(2)), "doc.pdf");
        push_page_text(&mut text, 3, Ok("outro".to_string()), "doc.pdf");
        push_page_text(&mut text, 4, Ok(String::new()), "doc.pdf");

        assert_eq!(
            text.trim(),
            "intro\n\n--- Error reading page 2 ---\noutro"
        );
    }

    #[test]
    fn pdf_warning_is_appended_not_truncated() {
        let text = "x".repeat(50);
        let out = append_pdf_warning(text.clone(), 10);
        assert!(out.starts_with(&text));
        assert!(out.contains("[SYSTEM WARNING: Full PDF content read (50 chars)"));

        assert_eq!(append_pdf_warning(text.clone(), 50), text);
    }

    #[tokio::test]
    async fn tool_wraps_errors_as_text_through_registry() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&temp, "t");
        let mut registry = super::super::ToolRegistry::empty();
        registry.register(std::sync::Arc::new(WriteFile::new(ws)));

        let out = registry
            .execute("write_file", "../x.txt:::nope")
            .await
            .expect("known tool");
        assert!(out.starts_with("Error: Invalid file path"));
    }
}
