//! Source documents and per-format text extraction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::chunker::{Chunk, MarkdownChunker, Metadata};
use crate::ocr::{OcrInput, OcrProvider};
use crate::parser::ParseError;

/// Supported input formats, dispatched on file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Sent through an OCR provider.
    Pdf,
    /// Already Markdown (e.g. a previously saved OCR dump); read as-is.
    Markdown,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(ext).ok_or_else(|| ParseError::UnsupportedFileType(ext.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Markdown => "markdown",
        }
    }
}

/// A single source document and, once extracted, its Markdown text.
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: String,
    /// File stem, e.g. `report` for `/tmp/report.pdf`.
    pub name: String,
    pub filename: String,
    pub format: DocumentFormat,
    pub metadata: Metadata,
    bytes: Vec<u8>,
    text: Option<String>,
    total_pages: Option<u32>,
    provider: Option<String>,
}

impl Document {
    /// Open a document from the local filesystem.
    pub fn open(path: &Path) -> Result<Self, ParseError> {
        if !path.is_file() {
            return Err(ParseError::NotAFile(path.to_path_buf()));
        }
        let format = DocumentFormat::from_path(path)?;
        let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut doc = Self::with_format(&filename, format, bytes);
        doc.metadata.insert(
            "source_path".to_string(),
            serde_json::Value::String(path.display().to_string()),
        );
        Ok(doc)
    }

    /// Build a document from uploaded bytes. The format comes from `filename`.
    pub fn from_bytes(filename: &str, bytes: Vec<u8>) -> Result<Self, ParseError> {
        let format = DocumentFormat::from_path(Path::new(filename))?;
        Ok(Self::with_format(filename, format, bytes))
    }

    fn with_format(filename: &str, format: DocumentFormat, bytes: Vec<u8>) -> Self {
        let name = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());

        let mut metadata = Metadata::new();
        metadata.insert("name".to_string(), name.clone().into());
        metadata.insert("filename".to_string(), filename.into());
        metadata.insert("format".to_string(), format.as_str().into());
        metadata.insert("content_hash".to_string(), sha256_hex(&bytes).into());

        Self {
            doc_id: name.clone(),
            name,
            filename: filename.to_string(),
            format,
            metadata,
            bytes,
            text: None,
            total_pages: None,
            provider: None,
        }
    }

    /// Override the document id used as the chunk id prefix.
    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = doc_id.into();
        self
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    /// Name of whatever produced the text (`mistral_ocr`, `local`, `markdown`).
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Extract Markdown text, running OCR where the format needs it.
    pub async fn extract_text(&mut self, provider: &dyn OcrProvider) -> Result<&str, ParseError> {
        let (text, pages, used) = match self.format {
            DocumentFormat::Pdf => {
                let input = OcrInput {
                    filename: self.filename.clone(),
                    data: self.bytes.clone(),
                };
                let ocr = provider.process(&input).await.map_err(ParseError::Ocr)?;
                debug!("OCR metadata for {}: {}", self.filename, ocr.metadata);
                info!(
                    "Extracted {} pages ({} images) from {} via {}",
                    ocr.total_pages,
                    ocr.image_count(),
                    self.filename,
                    ocr.provider_name
                );
                (ocr.combined_markdown(), Some(ocr.total_pages), ocr.provider_name)
            }
            DocumentFormat::Markdown => {
                let text = String::from_utf8(self.bytes.clone())
                    .map_err(|_| ParseError::InvalidUtf8(self.filename.clone()))?;
                (text, None, "markdown".to_string())
            }
        };

        self.total_pages = pages;
        self.provider = Some(used);
        Ok(self.text.insert(text).as_str())
    }

    /// Split the extracted text into heading-aligned chunks.
    pub fn chunk_text(&self, chunker: &MarkdownChunker) -> Result<Vec<Chunk>, ParseError> {
        let text = self
            .text
            .as_deref()
            .ok_or_else(|| ParseError::NotExtracted(self.doc_id.clone()))?;
        Ok(chunker.chunk(text, &self.doc_id, &self.metadata))
    }

    /// Write the extracted Markdown to `{dir}/{name}.md`, creating `dir` if needed.
    pub fn save_markdown(&self, dir: &Path) -> Result<PathBuf, ParseError> {
        let text = self
            .text
            .as_deref()
            .ok_or_else(|| ParseError::NotExtracted(self.doc_id.clone()))?;
        std::fs::create_dir_all(dir).map_err(|source| ParseError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(format!("{}.md", self.name));
        std::fs::write(&path, text).map_err(|source| ParseError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Saved markdown for {} to {}", self.doc_id, path.display());
        Ok(path)
    }

    /// Replace the extracted text with Markdown previously saved to disk.
    pub fn load_markdown(&mut self, path: &Path) -> Result<&str, ParseError> {
        let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.provider = Some("markdown".to_string());
        Ok(self.text.insert(text).as_str())
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
