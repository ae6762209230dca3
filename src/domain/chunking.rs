//! Overlapping fixed-size chunking.
//!
//! Text is cut into windows of at most `chunk_size` characters. Every window
//! after the first starts exactly `chunk_overlap` characters before the end of
//! the previous one. Window ends prefer natural boundaries (paragraph, line,
//! sentence, word) and fall back to a hard cut.

use serde::{Deserialize, Serialize};

use crate::domain::{Document, DocumentChunk, DomainError, Result};

/// Boundaries in order of preference. A window ends right after the separator.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(DomainError::validation("chunk_size must be at least 1"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(DomainError::validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkingConfig,
}

impl TextSplitter {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Splits `text` into `(start_offset, content)` pairs, offsets counted in
    /// characters.
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.config.chunk_size {
            return vec![(0, text.to_string())];
        }

        self.windows(&chars)
            .into_iter()
            .map(|span| (span.start, chars[span.start..span.end].iter().collect()))
            .collect()
    }

    pub fn split_document(&self, document: &Document) -> Vec<DocumentChunk> {
        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(index, (offset, content))| {
                DocumentChunk::new(document, content, index).with_start_offset(offset)
            })
            .collect()
    }

    fn windows(&self, chars: &[char]) -> Vec<Span> {
        let ChunkingConfig {
            chunk_size,
            chunk_overlap,
        } = self.config;
        let len = chars.len();

        let mut spans = Vec::new();
        let mut start = 0;
        loop {
            let hard_end = (start + chunk_size).min(len);
            if hard_end == len {
                let tail = Span { start, end: len };
                // A trailing window of pure whitespace carries nothing to index.
                let blank = chars[start..len].iter().all(|c| c.is_whitespace());
                if !blank || spans.is_empty() {
                    spans.push(tail);
                }
                break;
            }

            let end = self.find_break(chars, start, hard_end);
            spans.push(Span { start, end });
            start = end - chunk_overlap;
        }
        spans
    }

    /// Picks the window end in `[lower, hard_end]`. `lower` stays above
    /// `start + chunk_overlap` so the next window always advances.
    fn find_break(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let lower = start + (self.config.chunk_overlap + 1).max(self.config.chunk_size / 2);

        for separator in SEPARATORS {
            let sep: Vec<char> = separator.chars().collect();
            let found = (lower..=hard_end)
                .rev()
                .find(|&end| end >= sep.len() && chars[end - sep.len()..end] == sep[..]);
            if let Some(end) = found {
                return end;
            }
        }

        hard_end
    }
}

/// Splits every document in order; output preserves document order and
/// in-document position.
pub fn split_documents(documents: &[Document], splitter: &TextSplitter) -> Vec<DocumentChunk> {
    documents
        .iter()
        .flat_map(|doc| splitter.split_document(doc))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DocumentMetadata;

    fn splitter(size: usize, overlap: usize) -> TextSplitter {
        TextSplitter::new(ChunkingConfig::new(size, overlap)).unwrap()
    }

    fn doc(text: &str, source: &str) -> Document {
        Document::new(text, DocumentMetadata::new(source, "text"))
    }

    fn sample_text() -> String {
        let mut text = String::new();
        for p in 0..12 {
            for s in 0..(3 + p % 4) {
                text.push_str(&format!("Sentence {s} of paragraph {p} talks about item{p}x{s}. "));
            }
            text.push_str(if p % 3 == 0 { "\n\n" } else { "\n" });
        }
        text.push_str(&"unbrokenrunofcharacters".repeat(20));
        text
    }

    fn assert_invariants(text: &str, size: usize, overlap: usize) {
        let chunks = splitter(size, overlap).split_text(text);
        let chars: Vec<char> = text.chars().collect();

        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].0, 0);
        for (offset, content) in &chunks {
            let len = content.chars().count();
            assert!(len <= size, "chunk of {len} chars exceeds {size}");
            let expected: String = chars[*offset..offset + len].iter().collect();
            assert_eq!(&expected, content);
        }
        for pair in chunks.windows(2) {
            let (start_a, ref a) = pair[0];
            let (start_b, _) = pair[1];
            let end_a = start_a + a.chars().count();
            assert!(start_b + overlap <= end_a, "next chunk starts after end - overlap");
            assert!(start_b > start_a, "chunks must advance");
        }
        let (last_start, last) = chunks.last().unwrap();
        assert_eq!(last_start + last.chars().count(), chars.len());
    }

    #[test]
    fn test_config_validation() {
        assert!(ChunkingConfig::new(100, 10).validate().is_ok());
        assert!(ChunkingConfig::new(100, 100).validate().is_err());
        assert!(ChunkingConfig::new(0, 0).validate().is_err());
        assert!(TextSplitter::new(ChunkingConfig::new(10, 20)).is_err());
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let s = splitter(100, 10);
        assert!(s.split_text("").is_empty());
        assert!(s.split_text("  \n\n \t ").is_empty());
        assert!(s.split_document(&doc("", "a.txt")).is_empty());
    }

    #[test]
    fn test_short_text_is_single_unchanged_chunk() {
        let s = splitter(100, 10);
        let text = "  Short text.\n\nWith two paragraphs.  ";
        let chunks = s.split_text(text);
        assert_eq!(chunks, vec![(0, text.to_string())]);

        let again = s.split_text(&chunks[0].1);
        assert_eq!(again, chunks);
    }

    #[test]
    fn test_size_and_overlap_invariants() {
        let text = sample_text();
        for (size, overlap) in [(50, 0), (50, 10), (120, 30), (200, 199), (333, 100), (1000, 100)] {
            assert_invariants(&text, size, overlap);
        }
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let text = "x".repeat(95);
        let chunks = splitter(40, 10).split_text(&text);

        let offsets: Vec<usize> = chunks.iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![0, 30, 60]);
        assert_eq!(chunks[0].1.len(), 40);
        assert_eq!(chunks[2].1.len(), 35);
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let first = "a".repeat(60);
        let second = "b ".repeat(40);
        let text = format!("{first}\n\n{second}");
        let chunks = splitter(80, 5).split_text(&text);

        assert!(chunks[0].1.ends_with("\n\n"));
        assert_eq!(chunks[0].1.chars().count(), 62);
        assert_eq!(chunks[1].0, 57);
    }

    #[test]
    fn test_falls_back_to_word_boundary() {
        let text = "word ".repeat(50);
        let chunks = splitter(23, 0).split_text(&text);
        for (_, content) in &chunks[..chunks.len() - 1] {
            assert!(content.ends_with(' '), "chunk {content:?} should end at a space");
        }
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let text = "ñandú ".repeat(30);
        assert_invariants(&text, 25, 5);
    }

    #[test]
    fn test_split_documents_preserves_order() {
        let s = splitter(30, 5);
        let docs = vec![
            doc(&"first document words ".repeat(5), "a.txt"),
            doc("", "empty.txt"),
            doc(&"second document words ".repeat(5), "b.txt"),
        ];
        let chunks = split_documents(&docs, &s);

        let sources: Vec<&str> = chunks.iter().map(|c| c.metadata.source.as_str()).collect();
        let switch = sources.iter().position(|s| *s == "b.txt").unwrap();
        assert!(sources[..switch].iter().all(|s| *s == "a.txt"));
        assert!(sources[switch..].iter().all(|s| *s == "b.txt"));

        for chunk in chunks.iter().filter(|c| c.document_id == docs[0].id) {
            assert_eq!(chunk.metadata, docs[0].metadata);
        }
        let indexes: Vec<usize> = chunks[..switch].iter().map(|c| c.chunk_index).collect();
        assert_eq!(indexes, (0..switch).collect::<Vec<_>>());
    }
}
