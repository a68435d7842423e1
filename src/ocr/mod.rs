//! Modular OCR provider abstraction.
//!
//! Defines the [`OcrProvider`] trait and unified page types so different
//! backends (Mistral OCR, local lopdf text extraction) can be swapped by name.

pub mod local;
pub mod mistral;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::OcrConfig;
use crate::inline;

/// An image extracted from a page, keyed by the id used in its placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageImage {
    pub id: String,
    /// Embeddable payload, usually a `data:image/...;base64,` URI.
    pub payload: String,
}

/// Per-page OCR output. `index` is 0-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageFragment {
    pub index: u32,
    pub markdown: String,
    #[serde(default)]
    pub images: Vec<PageImage>,
}

/// Unified OCR result returned by every provider.
#[derive(Debug, Clone)]
pub struct OcrResult {
    pub pages: Vec<PageFragment>,
    pub total_pages: u32,
    pub metadata: serde_json::Value,
    pub provider_name: String,
}

impl OcrResult {
    /// Image-inlined Markdown for the whole document, pages in order.
    pub fn combined_markdown(&self) -> String {
        inline::combine_pages(&self.pages)
    }

    pub fn image_count(&self) -> usize {
        self.pages.iter().map(|p| p.images.len()).sum()
    }
}

/// Raw document bytes handed to an OCR provider.
pub struct OcrInput {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn process(&self, input: &OcrInput) -> anyhow::Result<OcrResult>;
}

/// Known provider identifiers used for registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcrProviderKind {
    MistralOcr,
    Local,
}

impl OcrProviderKind {
    /// Parse a query-parameter / CLI string into a provider kind.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "mistral_ocr" | "mistral" => Some(Self::MistralOcr),
            "local" => Some(Self::Local),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MistralOcr => "mistral_ocr",
            Self::Local => "local",
        }
    }
}

/// Construct a provider from explicit configuration.
pub fn build_provider(
    kind: OcrProviderKind,
    config: &OcrConfig,
) -> anyhow::Result<Arc<dyn OcrProvider>> {
    Ok(match kind {
        OcrProviderKind::MistralOcr => Arc::new(mistral::MistralOcrProvider::new(config.clone())?),
        OcrProviderKind::Local => Arc::new(local::LocalPdfProvider::new()),
    })
}
