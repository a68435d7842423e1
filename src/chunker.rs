//! Heading-aligned Markdown chunking.
//!
//! A document is cut in front of every ATX heading line. Each segment is the
//! heading line plus everything up to the next heading; text before the first
//! heading forms its own leading segment. Segments are verbatim slices of the
//! input, so concatenating all of them (dropped ones included) gives the
//! original text back.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum number of characters kept in [`Chunk::section_title`].
pub const MAX_TITLE_CHARS: usize = 50;

/// Opaque key-value bag attached to every chunk of a document.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A heading-aligned unit of document text ready for indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub section_title: String,
    pub content: String,
    pub metadata: Metadata,
}

/// How the numeric suffix of `chunk_id` is assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkNumbering {
    /// `0..n` over emitted chunks only.
    #[default]
    Dense,
    /// Raw segment position; dropped whitespace-only segments leave gaps.
    Positional,
}

impl ChunkNumbering {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense" => Some(Self::Dense),
            "positional" => Some(Self::Positional),
            _ => None,
        }
    }
}

/// Splits combined Markdown into [`Chunk`]s.
#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    heading: Regex,
    numbering: ChunkNumbering,
}

impl Default for MarkdownChunker {
    fn default() -> Self {
        Self::new(ChunkNumbering::default())
    }
}

impl MarkdownChunker {
    pub fn new(numbering: ChunkNumbering) -> Self {
        Self {
            // Pattern is a literal and always compiles.
            heading: Regex::new(r"^#+ ").unwrap(),
            numbering,
        }
    }

    /// Returns true if `line` (without its line terminator) is an ATX heading.
    pub fn is_heading(&self, line: &str) -> bool {
        self.heading.is_match(line)
    }

    /// Split `text` into verbatim segments at heading boundaries.
    ///
    /// The first segment is the text before the first heading and may be
    /// empty; no other segment is empty.
    pub fn segments<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut segments = Vec::new();
        let mut start = 0;
        let mut offset = 0;

        for line in text.split_inclusive('\n') {
            if offset > 0 && self.is_heading(strip_line_ending(line)) {
                segments.push(&text[start..offset]);
                start = offset;
            } else if offset == 0 && self.is_heading(strip_line_ending(line)) {
                // Document opens with a heading: empty leading segment.
                segments.push("");
            }
            offset += line.len();
        }
        if start < text.len() || segments.is_empty() {
            segments.push(&text[start..]);
        }
        segments
    }

    /// Chunk a combined Markdown document.
    ///
    /// Whitespace-only segments are dropped. Never fails: empty input yields
    /// no chunks and heading-less input yields exactly one.
    pub fn chunk(&self, text: &str, doc_id: &str, metadata: &Metadata) -> Vec<Chunk> {
        let segments = self.segments(text);
        let mut chunks = Vec::with_capacity(segments.len());

        for (position, segment) in segments.iter().enumerate() {
            if segment.trim().is_empty() {
                continue;
            }
            let index = match self.numbering {
                ChunkNumbering::Dense => chunks.len(),
                ChunkNumbering::Positional => position,
            };
            chunks.push(Chunk {
                chunk_id: format!("{}-{}", doc_id, index),
                doc_id: doc_id.to_string(),
                section_title: section_title(segment),
                content: segment.to_string(),
                metadata: metadata.clone(),
            });
        }

        debug!(
            "MarkdownChunker: {} segments -> {} chunks for doc '{}'",
            segments.len(),
            chunks.len(),
            doc_id
        );
        chunks
    }
}

/// First non-blank line of a segment, hard-truncated to [`MAX_TITLE_CHARS`].
///
/// For heading segments this is always the heading line itself. A leading
/// (pre-heading) segment that opens with blank lines takes its title from
/// the first line with text, not from the literal first line, so it never
/// gets an empty title.
pub fn section_title(segment: &str) -> String {
    let line = segment
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default();
    truncate_chars(strip_line_ending(line), MAX_TITLE_CHARS).to_string()
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> Metadata {
        let mut m = Metadata::new();
        m.insert("source".to_string(), serde_json::json!("paper.pdf"));
        m
    }

    #[test]
    fn test_two_headings() {
        let chunker = MarkdownChunker::default();
        let chunks = chunker.chunk("# A\ntext1\n# B\ntext2", "doc", &meta());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section_title, "# A");
        assert_eq!(chunks[0].content, "# A\ntext1\n");
        assert_eq!(chunks[1].section_title, "# B");
        assert_eq!(chunks[1].content, "# B\ntext2");
        assert_eq!(chunks[0].chunk_id, "doc-0");
        assert_eq!(chunks[1].chunk_id, "doc-1");
        assert!(chunks.iter().all(|c| c.doc_id == "doc" && c.metadata == meta()));
    }

    #[test]
    fn test_whitespace_segments_dropped() {
        let chunker = MarkdownChunker::default();
        let chunks = chunker.chunk("\n  \n# A\n\n\n# B\ncontent", "doc", &meta());
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| !c.content.trim().is_empty()));
        assert_eq!(chunks[0].content, "# A\n\n\n");
        assert_eq!(chunks[1].content, "# B\ncontent");
    }

    #[test]
    fn test_dense_vs_positional_numbering() {
        let text = "\n\n# A\nbody\n# B\nbody";
        let dense = MarkdownChunker::new(ChunkNumbering::Dense).chunk(text, "d", &meta());
        let positional =
            MarkdownChunker::new(ChunkNumbering::Positional).chunk(text, "d", &meta());

        let ids = |cs: &[Chunk]| cs.iter().map(|c| c.chunk_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&dense), vec!["d-0", "d-1"]);
        assert_eq!(ids(&positional), vec!["d-1", "d-2"]);
    }

    #[test]
    fn test_leading_text_is_own_chunk() {
        let chunker = MarkdownChunker::default();
        let chunks = chunker.chunk("\nIntro line\nmore\n## Methods\nstuff", "d", &meta());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section_title, "Intro line");
        assert_eq!(chunks[0].content, "\nIntro line\nmore\n");
        assert_eq!(chunks[1].section_title, "## Methods");
    }

    #[test]
    fn test_leading_blank_lines_skipped_in_title() {
        assert_eq!(section_title("\n\n  \nIntro\nmore"), "Intro");
        assert_eq!(section_title("\r\nIntro\r\n"), "Intro");

        let chunks = MarkdownChunker::default().chunk("\n\nIntro\n# A\nx", "d", &meta());
        assert_eq!(chunks[0].section_title, "Intro");
        assert_eq!(chunks[0].content, "\n\nIntro\n");
    }

    #[test]
    fn test_title_truncated_content_untouched() {
        let heading = format!("# {}", "x".repeat(80));
        let text = format!("{}\nbody", heading);
        let chunks = MarkdownChunker::default().chunk(&text, "d", &meta());
        assert_eq!(chunks[0].section_title.chars().count(), MAX_TITLE_CHARS);
        assert_eq!(chunks[0].section_title, &heading[..MAX_TITLE_CHARS]);
        assert_eq!(chunks[0].content, text);
    }

    #[test]
    fn test_title_truncation_is_char_based() {
        let heading = format!("# {}", "é".repeat(60));
        let chunks = MarkdownChunker::default().chunk(&heading, "d", &meta());
        let title = &chunks[0].section_title;
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
        assert!(heading.starts_with(title.as_str()));
    }

    #[test]
    fn test_idempotent() {
        let text = "pre\n# A\n![img](data:xyz)\n## B\n\n### C\nend\n";
        let chunker = MarkdownChunker::default();
        assert_eq!(chunker.chunk(text, "d", &meta()), chunker.chunk(text, "d", &meta()));
    }

    #[test]
    fn test_no_headings_single_chunk() {
        let text = "just some text\nacross lines\n";
        let chunks = MarkdownChunker::default().chunk(text, "d", &meta());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].section_title, "just some text");
    }

    #[test]
    fn test_empty_input() {
        let chunker = MarkdownChunker::default();
        assert!(chunker.chunk("", "d", &meta()).is_empty());
        assert!(chunker.chunk("  \n\t\n", "d", &meta()).is_empty());
    }

    #[test]
    fn test_heading_detection() {
        let chunker = MarkdownChunker::default();
        assert!(chunker.is_heading("# Title"));
        assert!(chunker.is_heading("###### Deep"));
        assert!(!chunker.is_heading("#hashtag"));
        assert!(!chunker.is_heading(" # indented"));
        assert!(!chunker.is_heading("text # not heading"));
    }

    #[test]
    fn test_segments_reassemble_input() {
        let text = "\n\nintro\r\n# A\r\nbody\r\n\r\n## B\n# C";
        let chunker = MarkdownChunker::default();
        let segments = chunker.segments(text);
        assert_eq!(segments.concat(), text);
        assert_eq!(segments.len(), 4);
        assert_eq!(section_title(segments[1]), "# A");
    }

    #[test]
    fn test_consecutive_headings() {
        let chunks = MarkdownChunker::default().chunk("# A\n## B\n### C", "d", &meta());
        let titles: Vec<_> = chunks.iter().map(|c| c.section_title.as_str()).collect();
        assert_eq!(titles, vec!["# A", "## B", "### C"]);
    }

    #[test]
    fn test_numbering_from_str() {
        assert_eq!(ChunkNumbering::from_str("Dense"), Some(ChunkNumbering::Dense));
        assert_eq!(
            ChunkNumbering::from_str("positional"),
            Some(ChunkNumbering::Positional)
        );
        assert_eq!(ChunkNumbering::from_str("sparse"), None);
    }
}
