//! In-memory store of parsed documents with paginated Markdown access.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::chunker::Chunk;
use crate::parser::ParsedDocument;

/// A window of a document's combined Markdown.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MarkdownPage {
    pub doc_id: String,
    pub content: String,
    pub offset: usize,
    pub limit: usize,
    pub total_chars: usize,
    pub has_more: bool,
}

/// Parsed documents keyed by `doc_id`. Cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    inner: Arc<RwLock<HashMap<String, ParsedDocument>>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document, replacing any earlier one with the same id.
    pub fn insert(&self, doc: ParsedDocument) -> Option<ParsedDocument> {
        let doc_id = doc.doc_id.clone();
        let chunks = doc.chunks.len();
        let previous = self.inner.write().unwrap().insert(doc_id.clone(), doc);
        tracing::debug!("DocumentStore: stored '{}' ({} chunks)", doc_id, chunks);
        previous
    }

    pub fn get(&self, doc_id: &str) -> Option<ParsedDocument> {
        self.inner.read().unwrap().get(doc_id).cloned()
    }

    pub fn chunks(&self, doc_id: &str) -> Option<Vec<Chunk>> {
        self.inner
            .read()
            .unwrap()
            .get(doc_id)
            .map(|d| d.chunks.clone())
    }

    /// Sorted list of stored ids.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.read().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn remove(&self, doc_id: &str) -> bool {
        self.inner.write().unwrap().remove(doc_id).is_some()
    }

    /// Retrieve Markdown by character offset/limit (UTF-8 safe).
    pub fn markdown(&self, doc_id: &str, offset: usize, limit: usize) -> Option<MarkdownPage> {
        let store = self.inner.read().unwrap();
        let markdown = &store.get(doc_id)?.markdown;

        let total_chars = markdown.chars().count();
        let content: String = markdown.chars().skip(offset).take(limit).collect();
        let end = offset.saturating_add(limit).min(total_chars);

        Some(MarkdownPage {
            doc_id: doc_id.to_string(),
            content,
            offset,
            limit,
            total_chars,
            has_more: end < total_chars,
        })
    }
}
