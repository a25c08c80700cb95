//! Overlapping text chunker.
//!
//! Splits document text into passages of at most `chunk_size` characters.
//! Consecutive passages share `chunk_overlap` characters so a sentence that
//! straddles a boundary survives intact in at least one of them. Lengths are
//! counted in `char`s, so multi-byte text never gets cut mid-codepoint.

use serde::{Deserialize, Serialize};

use crate::{Chunk, CoreError, Document, Result};

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Preferred break points, strongest first.
const SEPARATORS: [&[char]; 3] = [&['\n', '\n'], &['\n'], &[' ']];

/// Chunk sizing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let config = Self {
            chunk_size,
            chunk_overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// Overlap must be strictly smaller than the chunk size, otherwise the
    /// window never advances.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(CoreError::InvalidChunking {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }
        Ok(())
    }
}

/// A slice of the input text, with character offsets `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Split `text` into overlapping spans.
///
/// The spans cover the whole input: the first span followed by each later
/// span's characters past the previous span's `end` reproduces `text`.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Result<Vec<TextSpan>> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut spans = Vec::new();
    if len == 0 {
        return Ok(spans);
    }

    let mut start = 0;
    loop {
        let hard_end = (start + config.chunk_size).min(len);
        let end = if hard_end == len {
            len
        } else {
            find_break(&chars, start, hard_end, config.chunk_overlap)
        };

        spans.push(TextSpan {
            text: chars[start..end].iter().collect(),
            start,
            end,
        });

        if end == len {
            break;
        }
        start = end.saturating_sub(config.chunk_overlap).max(start + 1);
    }

    Ok(spans)
}

/// Last position in `(start + overlap, hard_end]` that sits right after a
/// separator, falling back to a hard cut.
fn find_break(chars: &[char], start: usize, hard_end: usize, overlap: usize) -> usize {
    let min_end = start + overlap + 1;

    for separator in SEPARATORS {
        let width = separator.len();
        let mut end = hard_end;
        while end >= min_end && end >= start + width {
            if &chars[end - width..end] == separator {
                return end;
            }
            end -= 1;
        }
    }

    hard_end
}

/// Chunk a document, keeping provenance on every chunk.
///
/// Whitespace-only spans carry nothing to embed and are dropped; the
/// remaining chunks are numbered contiguously from zero.
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let spans = split_text(&document.text, config)?;

    Ok(spans
        .into_iter()
        .filter(|span| !span.text.trim().is_empty())
        .enumerate()
        .map(|(index, span)| Chunk::from_span(document, index, span))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceType;

    fn reassemble(spans: &[TextSpan]) -> String {
        let mut out = String::new();
        let mut covered = 0;
        for span in spans {
            let skip = covered - span.start;
            out.extend(span.text.chars().skip(skip));
            covered = span.end;
        }
        out
    }

    #[test]
    fn test_rejects_degenerate_overlap() {
        assert!(ChunkingConfig::new(10, 10).is_err());
        assert!(ChunkingConfig::new(10, 20).is_err());
        assert!(ChunkingConfig::new(0, 0).is_err());
        assert!(split_text("abc", &ChunkingConfig { chunk_size: 5, chunk_overlap: 5 }).is_err());
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let spans = split_text("", &ChunkingConfig::default()).unwrap();
        assert!(spans.is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let spans = split_text("short", &ChunkingConfig::default()).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "short");
    }

    #[test]
    fn test_sky_sentence_splits_on_space() {
        let config = ChunkingConfig::new(20, 5).unwrap();
        let spans = split_text("The sky is blue. Water is wet.", &config).unwrap();

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "The sky is blue. ");
        assert_eq!(spans[1].text, "blue. Water is wet.");
        assert!(spans.iter().all(|s| s.text.chars().count() <= 20));
    }

    #[test]
    fn test_bounds_overlap_and_reconstruction() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.\n\n\
                    Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.\n\
                    Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris.";
        for (size, overlap) in [(20, 5), (33, 0), (50, 49), (7, 3), (1000, 200)] {
            let config = ChunkingConfig::new(size, overlap).unwrap();
            let spans = split_text(text, &config).unwrap();

            assert_eq!(reassemble(&spans), text, "size={size} overlap={overlap}");
            for span in &spans {
                let n = span.text.chars().count();
                assert!(n > 0 && n <= size);
                assert_eq!(n, span.end - span.start);
            }
            for pair in spans.windows(2) {
                assert!(pair[1].start > pair[0].start);
                assert!(pair[0].end - pair[1].start <= overlap);
            }
        }
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        let text = "Мир труд май. Снег идёт тихо. Ёжик в тумане.";
        let config = ChunkingConfig::new(12, 4).unwrap();
        let spans = split_text(text, &config).unwrap();

        assert_eq!(reassemble(&spans), text);
        assert!(spans.iter().all(|s| s.text.chars().count() <= 12));
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let text = "first paragraph\n\nsecond one here";
        let config = ChunkingConfig::new(24, 2).unwrap();
        let spans = split_text(text, &config).unwrap();

        assert_eq!(spans[0].text, "first paragraph\n\n");
    }

    #[test]
    fn test_deterministic() {
        let text = "a b c d e f g h i j k l m n o p q r s t u v w x y z ".repeat(20);
        let config = ChunkingConfig::new(40, 10).unwrap();
        let first = split_text(&text, &config).unwrap();
        let second = split_text(&text, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_chunk_document_keeps_provenance() {
        let doc = Document::new("The sky is blue. Water is wet.", "sky.pdf", SourceType::Pdf);
        let chunks = chunk_document(&doc, &ChunkingConfig::new(20, 5).unwrap()).unwrap();

        assert_eq!(chunks.len(), 2);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.document_id, doc.id);
            assert_eq!(chunk.source, "sky.pdf");
        }
    }

    #[test]
    fn test_chunk_document_drops_blank_spans() {
        let text = format!("alpha{}omega", " ".repeat(30));
        let doc = Document::new(text, "gap.txt", SourceType::Text);
        let chunks = chunk_document(&doc, &ChunkingConfig::new(10, 2).unwrap()).unwrap();

        assert!(chunks.iter().all(|c| !c.text.trim().is_empty()));
        assert_eq!(chunks.first().map(|c| c.index), Some(0));
        assert_eq!(chunks.last().map(|c| c.index), Some(chunks.len() - 1));
    }
}
