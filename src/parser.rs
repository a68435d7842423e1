//! File-level ingestion: open, extract, optionally save, chunk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::chunker::{Chunk, MarkdownChunker};
use crate::document::{sha256_hex, Document, DocumentFormat};
use crate::ocr::OcrProvider;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("provided location is not a file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("document of file type {0:?} is not supported yet")]
    UnsupportedFileType(String),
    #[error("document {0} has no extracted text yet")]
    NotExtracted(String),
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(String),
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("text extraction failed: {0:#}")]
    Ocr(anyhow::Error),
}

/// Result of ingesting one document.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedDocument {
    pub doc_id: String,
    pub name: String,
    pub format: DocumentFormat,
    pub provider: Option<String>,
    pub total_pages: Option<u32>,
    pub markdown_hash: String,
    pub markdown: String,
    pub chunks: Vec<Chunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<PathBuf>,
}

/// Drives documents through extraction and chunking.
pub struct Parser {
    provider: Arc<dyn OcrProvider>,
    chunker: MarkdownChunker,
    /// When set, combined Markdown is written here as `{name}.md`.
    docs_dir: Option<PathBuf>,
}

impl Parser {
    pub fn new(provider: Arc<dyn OcrProvider>, chunker: MarkdownChunker) -> Self {
        Self {
            provider,
            chunker,
            docs_dir: None,
        }
    }

    pub fn with_docs_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.docs_dir = dir;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Parse a single file from the local filesystem.
    pub async fn parse_file(&self, path: &Path) -> Result<ParsedDocument, ParseError> {
        info!("Reading the document at location: {}", path.display());
        let document = Document::open(path)?;
        self.parse_document(document).await
    }

    /// Parse several files in order, stopping at the first failure.
    pub async fn parse_files(&self, paths: &[PathBuf]) -> Result<Vec<ParsedDocument>, ParseError> {
        let mut parsed = Vec::with_capacity(paths.len());
        for path in paths {
            parsed.push(self.parse_file(path).await?);
        }
        Ok(parsed)
    }

    /// Extract, optionally save, and chunk an already-opened document.
    pub async fn parse_document(
        &self,
        mut document: Document,
    ) -> Result<ParsedDocument, ParseError> {
        document.extract_text(self.provider.as_ref()).await?;
        info!("Extracted text from {} file", document.name);

        let saved_to = match (&self.docs_dir, document.format) {
            // Re-saving Markdown input would just copy it.
            (Some(dir), DocumentFormat::Pdf) => match document.save_markdown(dir) {
                Ok(path) => {
                    info!("Saved the markdown file to {}", path.display());
                    Some(path)
                }
                Err(e) => {
                    warn!("Could not save markdown for {}: {}", document.name, e);
                    None
                }
            },
            _ => None,
        };

        let chunks = document.chunk_text(&self.chunker)?;
        let markdown = document.text().unwrap_or_default().to_string();
        info!("Chunked {} into {} chunks", document.doc_id, chunks.len());

        Ok(ParsedDocument {
            doc_id: document.doc_id.clone(),
            name: document.name.clone(),
            format: document.format,
            provider: document.provider().map(str::to_string),
            total_pages: document.total_pages(),
            markdown_hash: sha256_hex(markdown.as_bytes()),
            markdown,
            chunks,
            saved_to,
        })
    }
}
