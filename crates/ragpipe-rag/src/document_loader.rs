//! Directory loader for plain text, Markdown and HTML sources

use async_trait::async_trait;
use pulldown_cmark::{Event, Parser, TagEnd};
use regex::Regex;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

use ragpipe_core::{Document, DocumentLoader, Error, Result};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n+").unwrap());

const HTML_BLOCKS: &str = "h1, h2, h3, h4, h5, h6, p, li, pre, td, th";

/// Source formats the loader understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Text,
    Markdown,
    Html,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "txt" => Some(SourceFormat::Text),
            "md" | "markdown" => Some(SourceFormat::Markdown),
            "html" | "htm" => Some(SourceFormat::Html),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Text => "text",
            SourceFormat::Markdown => "markdown",
            SourceFormat::Html => "html",
        }
    }

    /// Convert raw file contents to plain text
    pub fn extract(&self, raw: &str) -> String {
        let text = match self {
            SourceFormat::Text => raw.to_string(),
            SourceFormat::Markdown => markdown_to_text(raw),
            SourceFormat::Html => html_to_text(raw),
        };
        normalize_whitespace(&text)
    }
}

fn markdown_to_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for event in Parser::new(raw) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::CodeBlock) => out.push_str("\n\n"),
            _ => {}
        }
    }
    out
}

fn html_to_text(raw: &str) -> String {
    let document = Html::parse_document(raw);
    let blocks: Vec<String> = match Selector::parse(HTML_BLOCKS) {
        Ok(selector) => document
            .select(&selector)
            .map(|element| element.text().collect::<Vec<_>>().join(" "))
            .filter(|text| !text.trim().is_empty())
            .collect(),
        Err(_) => Vec::new(),
    };

    if blocks.is_empty() {
        document.root_element().text().collect::<Vec<_>>().join(" ")
    } else {
        blocks.join("\n\n")
    }
}

fn normalize_whitespace(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text, " ");
    let paragraphs = BLANK_LINES.replace_all(&collapsed, "\n\n");
    paragraphs
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Loads every supported file below a directory, in path order
#[derive(Debug, Default, Clone)]
pub struct DirectoryLoader;

impl DirectoryLoader {
    pub fn new() -> Self {
        Self
    }

    async fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
        let mut pending = vec![root.to_path_buf()];
        let mut files = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    fn document_id(root: &Path, path: &Path) -> String {
        let relative = path.strip_prefix(root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[async_trait]
impl DocumentLoader for DirectoryLoader {
    async fn load(&self, dir: &Path) -> Result<Vec<Document>> {
        if !tokio::fs::metadata(dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(Error::DocumentLoader(format!(
                "data directory not found: {}",
                dir.display()
            )));
        }

        let mut documents = Vec::new();
        for path in Self::collect_files(dir).await? {
            let Some(format) = SourceFormat::from_path(&path) else {
                debug!("Skipping unsupported file {}", path.display());
                continue;
            };

            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping unreadable file {}: {}", path.display(), e);
                    continue;
                }
            };

            let text = format.extract(&raw);
            if text.is_empty() {
                warn!("Skipping empty document {}", path.display());
                continue;
            }

            let id = Self::document_id(dir, &path);
            documents.push(
                Document::new(id.clone(), text)
                    .with_metadata("source", id)
                    .with_metadata("path", path.display().to_string())
                    .with_metadata("format", format.as_str()),
            );
        }

        debug!("Loaded {} documents from {}", documents.len(), dir.display());
        Ok(documents)
    }
}
