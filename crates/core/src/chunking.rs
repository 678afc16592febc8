use crate::error::LoadError;
use crate::extractor::PageSpan;
use crate::models::{Chunk, ChunkingConfig};

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.target_tokens == 0 {
            return Err(LoadError::InvalidChunkConfig(
                "target_tokens must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.overlap_ratio) {
            return Err(LoadError::InvalidChunkConfig(format!(
                "overlap_ratio must be in [0, 1), got {}",
                self.overlap_ratio
            )));
        }
        Ok(())
    }

    /// Distance between consecutive window starts, never below one token.
    pub fn step(&self) -> usize {
        let step = (self.target_tokens as f64 * (1.0 - self.overlap_ratio)).floor();
        (step as usize).max(1)
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits text into overlapping windows of whitespace-delimited tokens.
pub fn chunk_by_tokens(text: &str, config: ChunkingConfig) -> Vec<String> {
    let tokens = text.split_whitespace().collect::<Vec<_>>();
    let total = tokens.len();
    let step = config.step();
    let size = config.target_tokens.max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + size).min(total);
        chunks.push(tokens[start..end].join(" "));
        if end == total {
            break;
        }
        start += step;
    }

    chunks
}

/// Turns the page spans of one document into chunks with ids `{doc_id}-{n}`,
/// numbered across the whole document.
pub fn build_chunks(
    doc_id: &str,
    filename: &str,
    spans: &[PageSpan],
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, LoadError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut cursor = 0usize;

    for span in spans {
        let normalized = normalize_whitespace(&span.text);
        if normalized.is_empty() {
            continue;
        }

        for text in chunk_by_tokens(&normalized, config) {
            chunks.push(Chunk {
                doc_id: doc_id.to_string(),
                filename: filename.to_string(),
                page_start: span.page_start,
                page_end: span.page_end,
                chunk_id: format!("{doc_id}-{cursor}"),
                text,
            });
            cursor += 1;
        }
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(count: usize) -> String {
        (0..count)
            .map(|index| format!("w{index}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof \u{a0}\u{a0} spacing  ";
        let normalized = normalize_whitespace(input);
        assert_eq!(normalized, "A lot of spacing");
        assert!(!normalized.contains('\u{a0}'));
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = ["", "  x  ", "a\u{a0}b\n\nc\t\td", "already normal"];
        for sample in samples {
            let once = normalize_whitespace(sample);
            assert_eq!(normalize_whitespace(&once), once);
            assert!(!once.contains("  "));
        }
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_by_tokens("", ChunkingConfig::default()).is_empty());
        assert!(chunk_by_tokens("   \n ", ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_by_tokens("The cat sat. The dog ran.", ChunkingConfig::default());
        assert_eq!(chunks, vec!["The cat sat. The dog ran.".to_string()]);
    }

    #[test]
    fn windows_overlap_and_end_exactly_at_the_last_token() {
        let config = ChunkingConfig {
            target_tokens: 10,
            overlap_ratio: 0.2,
        };
        assert_eq!(config.step(), 8);

        let chunks = chunk_by_tokens(&words(25), config);
        // starts at 0, 8, 16; the window at 16 reaches token 25
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].starts_with("w0 ") && chunks[0].ends_with(" w9"));
        assert!(chunks[1].starts_with("w8 ") && chunks[1].ends_with(" w17"));
        assert!(chunks[2].starts_with("w16 ") && chunks[2].ends_with(" w24"));
        assert_eq!(
            chunks.iter().filter(|chunk| chunk.ends_with(" w24")).count(),
            1
        );
    }

    #[test]
    fn windows_cover_every_token() {
        let config = ChunkingConfig {
            target_tokens: 7,
            overlap_ratio: 0.5,
        };
        let total = 40;
        let chunks = chunk_by_tokens(&words(total), config);

        let mut covered = vec![false; total];
        for (window, chunk) in chunks.iter().enumerate() {
            let start = window * config.step();
            for offset in 0..chunk.split_whitespace().count() {
                covered[start + offset] = true;
            }
        }
        assert!(covered.iter().all(|seen| *seen));
    }

    #[test]
    fn exact_multiple_does_not_emit_a_contained_tail() {
        let config = ChunkingConfig {
            target_tokens: 5,
            overlap_ratio: 0.0,
        };
        let chunks = chunk_by_tokens(&words(10), config);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn tiny_windows_still_advance() {
        let config = ChunkingConfig {
            target_tokens: 1,
            overlap_ratio: 0.9,
        };
        assert_eq!(config.step(), 1);
        assert_eq!(chunk_by_tokens("a b c", config).len(), 3);
    }

    #[test]
    fn invalid_overlap_is_rejected() {
        let config = ChunkingConfig {
            target_tokens: 10,
            overlap_ratio: 1.0,
        };
        let spans = vec![PageSpan {
            page_start: 1,
            page_end: 1,
            text: "text".to_string(),
        }];
        assert!(matches!(
            build_chunks("doc", "a.txt", &spans, config),
            Err(LoadError::InvalidChunkConfig(_))
        ));
    }

    #[test]
    fn chunk_ids_are_numbered_across_pages() {
        let spans = vec![
            PageSpan {
                page_start: 1,
                page_end: 1,
                text: "first\u{a0}page   text".to_string(),
            },
            PageSpan {
                page_start: 2,
                page_end: 2,
                text: "   ".to_string(),
            },
            PageSpan {
                page_start: 3,
                page_end: 3,
                text: "third page".to_string(),
            },
        ];

        let chunks = build_chunks("doc-1", "manual.pdf", &spans, ChunkingConfig::default())
            .expect("valid config");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_id, "doc-1-0");
        assert_eq!(chunks[0].text, "first page text");
        assert_eq!(chunks[1].chunk_id, "doc-1-1");
        assert_eq!((chunks[1].page_start, chunks[1].page_end), (3, 3));
        assert!(chunks.iter().all(|chunk| chunk.filename == "manual.pdf"));
    }
}
