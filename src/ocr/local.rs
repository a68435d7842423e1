//! Offline provider: plain text extraction with lopdf.
//!
//! No OCR and no images; useful for born-digital PDFs and for running the
//! pipeline without credentials.

use super::{OcrInput, OcrProvider, OcrResult, PageFragment};
use std::io::Cursor;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct LocalPdfProvider;

impl LocalPdfProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl OcrProvider for LocalPdfProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn process(&self, input: &OcrInput) -> anyhow::Result<OcrResult> {
        let data = input.data.clone();
        // lopdf parsing is CPU-bound.
        let pages = tokio::task::spawn_blocking(move || extract_pages(&data)).await??;
        info!(
            "LocalPdfProvider: extracted {} pages from {}",
            pages.len(),
            input.filename
        );

        Ok(OcrResult {
            total_pages: pages.len() as u32,
            pages,
            metadata: serde_json::Value::Null,
            provider_name: "local".to_string(),
        })
    }
}

/// Extract text from each page of a PDF using lopdf.
fn extract_pages(data: &[u8]) -> anyhow::Result<Vec<PageFragment>> {
    use lopdf::Document;

    let doc = Document::load_from(Cursor::new(data))
        .map_err(|e| anyhow::anyhow!("Failed to load PDF: {}", e))?;

    let mut pages = Vec::new();
    for (index, (page_num, _)) in doc.get_pages().into_iter().enumerate() {
        let markdown = match doc.extract_text(&[page_num]) {
            Ok(text) => text.trim_end().to_string(),
            Err(e) => {
                warn!("LocalPdfProvider: page {} has no extractable text: {}", page_num, e);
                String::new()
            }
        };
        pages.push(PageFragment {
            index: index as u32,
            markdown,
            images: Vec::new(),
        });
    }

    Ok(pages)
}
