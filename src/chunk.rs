//! Recursive-separator text chunker with exact character overlap.
//!
//! Splits a journal document into [`Chunk`]s no longer than
//! `chunking.max_chars`, preferring the coarsest separator that still fits
//! (paragraph, line, sentence, word) and falling back to a hard character
//! cut. Consecutive chunks share exactly `chunking.overlap_chars` characters.
//!
//! # Algorithm
//!
//! 1. If the unconsumed text fits in `max_chars`, emit it as the final chunk.
//! 2. Otherwise look at the window of `max_chars` characters starting at the
//!    current position and cut after the *last* occurrence of the coarsest
//!    separator that leaves more than `overlap_chars` characters in the chunk.
//!    If no separator qualifies, cut at the window end.
//! 3. The next chunk starts `overlap_chars` characters before that cut.
//!
//! Chunks are contiguous spans of the source text, so dropping the leading
//! `overlap_chars` characters of every chunk but the first and concatenating
//! reconstructs the document exactly.
//!
//! The carried-over overlap does not count against the final chunk's budget:
//! every non-final chunk is at most `max_chars` long, the final chunk at most
//! `max_chars + overlap_chars`.
//!
//! Lengths are counted in `char`s, never bytes.
//!
//! # Example
//!
//! ```rust
//! use journal_memory::chunk::split_text;
//!
//! let seps = vec!["\n\n".to_string(), String::new()];
//! let pieces = split_text("Hello world.\n\nSecond paragraph.", 20, 4, &seps);
//! assert_eq!(pieces, vec!["Hello world.\n\n", "d.\n\nSecond paragraph."]);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, JournalDocument};

/// Chunk one document with the configured size, overlap, and separators.
///
/// Returns chunks with contiguous indices starting at 0. An empty document
/// yields no chunks.
pub fn chunk_document(doc: &JournalDocument, config: &ChunkingConfig) -> Vec<Chunk> {
    chunk_text(&doc.source, &doc.body, config)
}

/// Chunk raw text on behalf of `source`.
pub fn chunk_text(source: &str, text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    split_text(
        text,
        config.max_chars,
        config.overlap_chars,
        &config.separators,
    )
    .into_iter()
    .enumerate()
    .map(|(i, piece)| make_chunk(source, i as i64, piece))
    .collect()
}

/// Split `text` into overlapping slices.
///
/// `separators` are tried from first (coarsest) to last (finest). An empty
/// separator means "any character boundary" and ends the search.
/// `overlap_chars` is clamped below `max_chars` so the split always advances.
pub fn split_text<'t>(
    text: &'t str,
    max_chars: usize,
    overlap_chars: usize,
    separators: &[String],
) -> Vec<&'t str> {
    if text.is_empty() {
        return Vec::new();
    }

    let max_chars = max_chars.max(1);
    let overlap_chars = overlap_chars.min(max_chars - 1);

    // Byte offset of every char boundary, including the end of the text.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = offsets.len() - 1;

    let mut pieces = Vec::new();
    let mut start = 0usize;

    loop {
        let fresh_from = if pieces.is_empty() {
            start
        } else {
            start + overlap_chars
        };

        if total - fresh_from <= max_chars {
            pieces.push(&text[offsets[start]..]);
            break;
        }

        let window_end = start + max_chars;
        let min_end = start + overlap_chars + 1;
        let end = find_cut(text, &offsets, start, min_end, window_end, separators);

        pieces.push(&text[offsets[start]..offsets[end]]);
        start = end - overlap_chars;
    }

    pieces
}

/// Pick the char index to cut at, in `[min_end, window_end]`.
///
/// Tries the first separator; if its last occurrence in the window would
/// leave too short a chunk (or it does not occur), recurses on the finer
/// separators. Runs out into a hard cut at `window_end`.
fn find_cut(
    text: &str,
    offsets: &[usize],
    start: usize,
    min_end: usize,
    window_end: usize,
    separators: &[String],
) -> usize {
    let Some((sep, finer)) = separators.split_first() else {
        return window_end;
    };
    if sep.is_empty() {
        return window_end;
    }

    let base = offsets[start];
    let window = &text[base..offsets[window_end]];

    if let Some(pos) = window.rfind(sep.as_str()) {
        let cut_byte = base + pos + sep.len();
        if let Ok(cut) = offsets.binary_search(&cut_byte) {
            if cut >= min_end {
                return cut;
            }
        }
    }

    find_cut(text, offsets, start, min_end, window_end, finer)
}

/// Create a single [`Chunk`] with a UUID and SHA-256 content hash.
fn make_chunk(source: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seps(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn default_seps() -> Vec<String> {
        ChunkingConfig::default().separators
    }

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    fn head(s: &str, n: usize) -> String {
        s.chars().take(n).collect()
    }

    fn tail(s: &str, n: usize) -> String {
        let len = char_len(s);
        s.chars().skip(len.saturating_sub(n)).collect()
    }

    /// Check coverage, overlap, and size bounds for one split.
    fn assert_invariants(text: &str, pieces: &[&str], max: usize, overlap: usize) {
        if text.is_empty() {
            assert!(pieces.is_empty());
            return;
        }

        let mut rebuilt = String::new();
        for (i, p) in pieces.iter().enumerate() {
            if i == 0 {
                rebuilt.push_str(p);
            } else {
                rebuilt.extend(p.chars().skip(overlap));
            }
        }
        assert_eq!(rebuilt, text, "coverage broken");

        for pair in pieces.windows(2) {
            assert_eq!(tail(pair[0], overlap), head(pair[1], overlap), "overlap broken");
        }

        let last = pieces.len() - 1;
        for (i, p) in pieces.iter().enumerate() {
            if i < last {
                assert!(char_len(p) <= max, "chunk {} has {} chars", i, char_len(p));
            } else {
                assert!(char_len(p) <= max + overlap);
            }
        }
    }

    /// Deterministic pseudo-random journal-ish text.
    fn generated_text(seed: u64, words: usize) -> String {
        const VOCAB: &[&str] = &[
            "today", "I", "felt", "tired", "after", "yoga", "café", "Ünïcode", "😊", "walked",
            "with", "Sam", "and", "thought", "about", "work", "ankle", "better", "grateful",
        ];
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let mut out = String::new();
        for _ in 0..words {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let r = (state >> 33) as usize;
            out.push_str(VOCAB[r % VOCAB.len()]);
            out.push_str(match r % 23 {
                0 => ".\n\n",
                1 | 2 => "\n",
                3..=5 => ". ",
                _ => " ",
            });
        }
        out
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text("", 100, 10, &default_seps()).is_empty());
        let cfg = ChunkingConfig::default();
        assert!(chunk_text("a.txt", "", &cfg).is_empty());
    }

    #[test]
    fn short_text_single_chunk_without_overlap() {
        let pieces = split_text("Hello, world!", 1500, 150, &default_seps());
        assert_eq!(pieces, vec!["Hello, world!"]);
    }

    #[test]
    fn text_exactly_max_is_single_chunk() {
        let text = "x".repeat(50);
        assert_eq!(split_text(&text, 50, 5, &default_seps()).len(), 1);
    }

    #[test]
    fn prefers_paragraph_over_finer_separators() {
        let text = "Alpha line one.\nAlpha line two.\n\nBeta paragraph here.";
        let pieces = split_text(text, 40, 0, &default_seps());
        assert_eq!(pieces[0], "Alpha line one.\nAlpha line two.\n\n");
        assert_invariants(text, &pieces, 40, 0);
    }

    #[test]
    fn falls_back_to_hard_cut_without_separators() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let pieces = split_text(text, 10, 3, &seps(&["\n\n", " "]));
        assert_eq!(pieces[0], "abcdefghij");
        assert_eq!(pieces[1], "hijklmnopq");
        assert_invariants(text, &pieces, 10, 3);
    }

    #[test]
    fn separator_inside_overlap_region_is_skipped() {
        // The only paragraph break sits within the first `overlap` chars, so
        // cutting there would not advance; a finer separator must be used.
        let text = "ab\n\ncdefgh ijklmnop qrstuv";
        let pieces = split_text(text, 12, 5, &seps(&["\n\n", " ", ""]));
        assert_eq!(pieces[0], "ab\n\ncdefgh ");
        assert_invariants(text, &pieces, 12, 5);
    }

    #[test]
    fn multibyte_text_counts_chars_not_bytes() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let pieces = split_text(text, 7, 2, &default_seps());
        assert!(pieces.len() > 1);
        assert_invariants(text, &pieces, 7, 2);
    }

    #[test]
    fn chunk_indices_contiguous_and_sourced() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let cfg = ChunkingConfig {
            max_chars: 60,
            overlap_chars: 10,
            separators: default_seps(),
        };
        let chunks = chunk_text("2024-01-01.md", &text, &cfg);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
            assert_eq!(c.source, "2024-01-01.md");
            assert_eq!(c.hash.len(), 64);
        }
    }

    #[test]
    fn deterministic_text_and_hashes() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let cfg = ChunkingConfig {
            max_chars: 8,
            overlap_chars: 2,
            separators: default_seps(),
        };
        let c1 = chunk_text("d", text, &cfg);
        let c2 = chunk_text("d", text, &cfg);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
        }
    }

    #[test]
    fn invariants_hold_over_generated_corpus() {
        let configs = [(1500, 150), (200, 20), (64, 0), (33, 32), (10, 9), (1, 0)];
        for seed in 0..40u64 {
            let text = generated_text(seed, 50 + (seed as usize * 37) % 600);
            for &(max, overlap) in &configs {
                let pieces = split_text(&text, max, overlap, &default_seps());
                assert_invariants(&text, &pieces, max, overlap);
            }
            let pieces = split_text(&text, 120, 30, &seps(&["\n\n", ""]));
            assert_invariants(&text, &pieces, 120, 30);
        }
    }

    #[test]
    fn three_document_scenario() {
        let cfg = ChunkingConfig {
            max_chars: 1500,
            overlap_chars: 150,
            separators: seps(&["\n\n", ""]),
        };

        let doc1 = format!("{}\n\n{}", "a".repeat(999), "b".repeat(999));
        let doc2 = "m".repeat(800);
        let doc3 = format!("{}\n\n{}", "c".repeat(1498), "d".repeat(1500));
        assert_eq!(char_len(&doc1), 2000);
        assert_eq!(char_len(&doc3), 3000);

        let c1 = chunk_text("1.txt", &doc1, &cfg);
        assert_eq!(c1.len(), 2);
        assert!(c1.iter().all(|c| char_len(&c.text) <= 1500));
        assert_eq!(tail(&c1[0].text, 150), head(&c1[1].text, 150));

        let c2 = chunk_text("2.txt", &doc2, &cfg);
        assert_eq!(c2.len(), 1);
        assert_eq!(c2[0].text, doc2);

        let c3 = chunk_text("3.txt", &doc3, &cfg);
        assert_eq!(c3.len(), 2);
        assert_eq!(char_len(&c3[0].text), 1500);
        assert_eq!(tail(&c3[0].text, 150), head(&c3[1].text, 150));

        for (text, chunks) in [(&doc1, &c1), (&doc2, &c2), (&doc3, &c3)] {
            let pieces: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
            assert_invariants(text, &pieces, 1500, 150);
        }
    }
}
