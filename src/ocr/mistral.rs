//! Mistral OCR provider (uses Mistral's OCR API).

use super::{OcrInput, OcrProvider, OcrResult, PageFragment, PageImage};
use crate::config::OcrConfig;
use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub struct MistralOcrProvider {
    api_key: String,
    config: OcrConfig,
    client: reqwest::Client,
}

impl MistralOcrProvider {
    pub fn new(config: OcrConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Missing Mistral API key (MISTRAL_API_KEY)"))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            api_key,
            config,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }
}

// ── Mistral API request/response types ──────────────────────────────────────

#[derive(Serialize)]
struct OcrRequest {
    model: String,
    document: DocumentSource,
    include_image_base64: bool,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum DocumentSource {
    #[serde(rename = "document_url")]
    Url { document_url: String },
}

#[derive(Deserialize)]
struct OcrResponse {
    pages: Vec<MistralPage>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage_info: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct MistralPage {
    index: u32,
    markdown: String,
    #[serde(default)]
    images: Vec<MistralImage>,
}

#[derive(Deserialize)]
struct MistralImage {
    id: String,
    #[serde(default)]
    image_base64: Option<String>,
}

#[derive(Deserialize)]
struct FileUploadResponse {
    id: String,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    url: String,
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for MistralOcrProvider {
    fn name(&self) -> &str {
        "mistral_ocr"
    }

    async fn process(&self, input: &OcrInput) -> anyhow::Result<OcrResult> {
        let document_url = if self.config.inline_upload {
            pdf_data_uri(&input.data)
        } else {
            let file_id = self.upload_file(&input.filename, &input.data).await?;
            self.signed_url(&file_id).await?
        };

        let body = OcrRequest {
            model: self.config.model.clone(),
            document: DocumentSource::Url { document_url },
            include_image_base64: self.config.include_images,
        };

        info!(
            "MistralOcrProvider: calling OCR API for {} (model={})",
            input.filename,
            self.config.model
        );

        let resp = self
            .client
            .post(self.url("ocr"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Mistral OCR")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Mistral OCR API error ({}): {}", status, text);
        }

        let raw_text = resp.text().await?;
        debug!(
            "MistralOcrProvider: raw response ({} bytes): {}",
            raw_text.len(),
            preview(&raw_text, 500)
        );
        let ocr: OcrResponse =
            serde_json::from_str(&raw_text).context("Failed to parse Mistral OCR response")?;

        Ok(into_result(ocr))
    }
}

impl MistralOcrProvider {
    /// Upload raw bytes to Mistral Files API, return the file_id.
    async fn upload_file(&self, filename: &str, data: &[u8]) -> anyhow::Result<String> {
        use reqwest::multipart::{Form, Part};

        info!(
            "MistralOcrProvider: uploading {} ({} bytes) to Files API",
            filename,
            data.len()
        );

        let part = Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/pdf")?;

        let form = Form::new().part("file", part).text("purpose", "ocr");

        let resp = self
            .client
            .post(self.url("files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Mistral Files API error ({}): {}", status, text);
        }

        let upload: FileUploadResponse = resp.json().await?;
        info!("MistralOcrProvider: uploaded file_id={}", upload.id);
        Ok(upload.id)
    }

    /// Get a short-lived download URL for an uploaded file.
    async fn signed_url(&self, file_id: &str) -> anyhow::Result<String> {
        let resp = self
            .client
            .get(self.url(&format!("files/{}/url", file_id)))
            .query(&[("expiry", self.config.signed_url_expiry_hours)])
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Mistral signed URL error ({}): {}", status, text);
        }

        let signed: SignedUrlResponse = resp.json().await?;
        debug!("MistralOcrProvider: signed URL issued for file_id={}", file_id);
        Ok(signed.url)
    }
}

fn into_result(ocr: OcrResponse) -> OcrResult {
    let total_pages = ocr.pages.len() as u32;

    let mut pages: Vec<PageFragment> = ocr
        .pages
        .into_iter()
        .map(|p| PageFragment {
            index: p.index,
            markdown: p.markdown,
            // Images returned without a payload have nothing to inline.
            images: p
                .images
                .into_iter()
                .filter_map(|img| {
                    img.image_base64.map(|payload| PageImage {
                        id: img.id,
                        payload,
                    })
                })
                .collect(),
        })
        .collect();
    pages.sort_by_key(|p| p.index);

    let metadata = serde_json::json!({
        "model": ocr.model,
        "usage_info": ocr.usage_info,
    });

    OcrResult {
        pages,
        total_pages,
        metadata,
        provider_name: "mistral_ocr".to_string(),
    }
}

fn pdf_data_uri(data: &[u8]) -> String {
    format!("data:application/pdf;base64,{}", BASE64.encode(data))
}

fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ocr_response() {
        let raw = r##"{
            "pages": [
                {"index": 1, "markdown": "second", "images": []},
                {"index": 0, "markdown": "# Title\n![img-0.jpeg](img-0.jpeg)", "images": [
                    {"id": "img-0.jpeg", "top_left_x": 0, "image_base64": "data:image/jpeg;base64,/9j/"},
                    {"id": "img-1.jpeg", "image_base64": null}
                ]}
            ],
            "model": "mistral-ocr-2505",
            "usage_info": {"pages_processed": 2}
        }"##;
        let ocr: OcrResponse = serde_json::from_str(raw).unwrap();
        let result = into_result(ocr);

        assert_eq!(result.total_pages, 2);
        assert_eq!(result.pages[0].index, 0);
        assert_eq!(result.pages[0].images.len(), 1);
        assert_eq!(result.metadata["model"], "mistral-ocr-2505");
        assert_eq!(
            result.combined_markdown(),
            "# Title\n![img-0.jpeg](data:image/jpeg;base64,/9j/)\n\nsecond"
        );
    }

    #[test]
    fn test_missing_api_key() {
        assert!(MistralOcrProvider::new(OcrConfig::default()).is_err());
    }

    #[test]
    fn test_endpoint_override() {
        let provider = MistralOcrProvider::new(OcrConfig {
            api_key: Some("k".to_string()),
            endpoint: "http://localhost:8080/v1/".to_string(),
            ..OcrConfig::default()
        })
        .unwrap();
        assert_eq!(provider.url("ocr"), "http://localhost:8080/v1/ocr");
    }

    #[test]
    fn test_pdf_data_uri() {
        assert_eq!(pdf_data_uri(b"%PDF"), "data:application/pdf;base64,JVBERg==");
    }
}
