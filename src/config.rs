//! Runtime configuration.
//!
//! Everything the pipeline needs is carried in explicit structs. Only
//! [`AppConfig::from_env`] touches the process environment, and it is called
//! once from `main`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::chunker::ChunkNumbering;
use crate::ocr::OcrProviderKind;

pub const DEFAULT_MISTRAL_ENDPOINT: &str = "https://api.mistral.ai/v1";
pub const DEFAULT_OCR_MODEL: &str = "mistral-ocr-latest";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Options handed to an OCR provider constructor.
#[derive(Clone)]
pub struct OcrConfig {
    /// Authentication credential. Required by remote providers only.
    pub api_key: Option<String>,
    /// Base URL override, without trailing slash.
    pub endpoint: String,
    /// Per-request deadline.
    pub timeout: Duration,
    pub model: String,
    /// Ask the service to return extracted images as base64.
    pub include_images: bool,
    /// Send the PDF as a base64 data URI instead of going through the Files API.
    pub inline_upload: bool,
    pub signed_url_expiry_hours: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_MISTRAL_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            model: DEFAULT_OCR_MODEL.to_string(),
            include_images: true,
            inline_upload: false,
            signed_url_expiry_hours: 1,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("model", &self.model)
            .field("include_images", &self.include_images)
            .field("inline_upload", &self.inline_upload)
            .field("signed_url_expiry_hours", &self.signed_url_expiry_hours)
            .finish()
    }
}

/// Top-level application settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ocr: OcrConfig,
    pub provider: OcrProviderKind,
    /// Where combined Markdown is written when `save_markdown` is set.
    pub docs_dir: PathBuf,
    pub save_markdown: bool,
    pub bind_addr: String,
    pub chunk_numbering: ChunkNumbering,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ocr: OcrConfig::default(),
            provider: OcrProviderKind::MistralOcr,
            docs_dir: PathBuf::from("docs"),
            save_markdown: true,
            bind_addr: "0.0.0.0:3000".to_string(),
            chunk_numbering: ChunkNumbering::default(),
        }
    }
}

impl AppConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Unset or empty keys fall
    /// back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.ocr.api_key = get("MISTRAL_API_KEY");
        if let Some(endpoint) = get("MISTRAL_ENDPOINT") {
            config.ocr.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        if let Some(model) = get("MISTRAL_OCR_MODEL") {
            config.ocr.model = model;
        }
        if let Some(secs) = get("OCR_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    key: "OCR_TIMEOUT_SECS",
                    value: secs.clone(),
                    reason: e.to_string(),
                }
            })?;
            config.ocr.timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get("OCR_INCLUDE_IMAGES") {
            config.ocr.include_images = parse_bool("OCR_INCLUDE_IMAGES", &v)?;
        }
        if let Some(v) = get("OCR_INLINE_UPLOAD") {
            config.ocr.inline_upload = parse_bool("OCR_INLINE_UPLOAD", &v)?;
        }
        if let Some(v) = get("OCR_PROVIDER") {
            config.provider =
                OcrProviderKind::from_str(&v).ok_or_else(|| ConfigError::Invalid {
                    key: "OCR_PROVIDER",
                    value: v.clone(),
                    reason: "expected mistral_ocr or local".to_string(),
                })?;
        }
        if let Some(dir) = get("DOCS_DIR") {
            config.docs_dir = PathBuf::from(dir);
        }
        if let Some(v) = get("SAVE_MARKDOWN") {
            config.save_markdown = parse_bool("SAVE_MARKDOWN", &v)?;
        }
        if let Some(addr) = get("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(v) = get("CHUNK_NUMBERING") {
            config.chunk_numbering =
                ChunkNumbering::from_str(&v).ok_or_else(|| ConfigError::Invalid {
                    key: "CHUNK_NUMBERING",
                    value: v.clone(),
                    reason: "expected dense or positional".to_string(),
                })?;
        }

        Ok(config)
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.ocr.api_key.is_none());
        assert_eq!(config.ocr.endpoint, DEFAULT_MISTRAL_ENDPOINT);
        assert_eq!(config.ocr.model, DEFAULT_OCR_MODEL);
        assert_eq!(config.ocr.timeout, Duration::from_secs(120));
        assert!(config.ocr.include_images);
        assert_eq!(config.provider, OcrProviderKind::MistralOcr);
        assert_eq!(config.docs_dir, PathBuf::from("docs"));
        assert!(config.save_markdown);
        assert_eq!(config.chunk_numbering, ChunkNumbering::Dense);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("MISTRAL_API_KEY", "secret"),
            ("MISTRAL_ENDPOINT", "http://localhost:9000/v1/"),
            ("OCR_TIMEOUT_SECS", "5"),
            ("OCR_PROVIDER", "local"),
            ("SAVE_MARKDOWN", "no"),
            ("CHUNK_NUMBERING", "positional"),
        ]))
        .unwrap();
        assert_eq!(config.ocr.api_key.as_deref(), Some("secret"));
        assert_eq!(config.ocr.endpoint, "http://localhost:9000/v1");
        assert_eq!(config.ocr.timeout, Duration::from_secs(5));
        assert_eq!(config.provider, OcrProviderKind::Local);
        assert!(!config.save_markdown);
        assert_eq!(config.chunk_numbering, ChunkNumbering::Positional);
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("MISTRAL_API_KEY", "  ")])).unwrap();
        assert!(config.ocr.api_key.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("OCR_TIMEOUT_SECS", "soon")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("OCR_PROVIDER", "docling")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("SAVE_MARKDOWN", "maybe")])).is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = OcrConfig {
            api_key: Some("sk-very-secret".to_string()),
            ..OcrConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
