//! Chunker capability and registry (spec §4.3).
//!
//! Both built-in strategies are deterministic: identical input text and
//! identical config always yield identical chunks in identical order.
//! Chunk content hashing is performed by the caller via [`crate::hash::Hasher`]
//! — a chunker only produces text, index, and an approximate token count.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ChunkingConfig, ChunkingSplitter};

/// One piece of chunked text, not yet hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPiece {
    pub chunk_index: i32,
    pub text: String,
    pub token_count: i32,
}

fn approx_token_count(text: &str) -> i32 {
    text.split_whitespace().count() as i32
}

pub trait Chunker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Split `text` into ordered chunks per `config`.
    fn chunk(&self, text: &str, config: &ChunkingConfig) -> Vec<ChunkPiece>;
}

/// Priority-ordered separator list used by [`RecursiveChunker`].
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// Splits on a priority list of separators, greedily packing text under
/// `chunk_size`, falling back to a hard split when no separator applies.
/// The trailing `chunk_overlap` characters of each chunk are carried
/// forward as leading context on the next chunk.
pub struct RecursiveChunker;

impl RecursiveChunker {
    fn split_recursive(text: &str, separators: &[&str], chunk_size: usize) -> Vec<String> {
        if text.chars().count() <= chunk_size {
            if text.is_empty() {
                return Vec::new();
            }
            return vec![text.to_string()];
        }

        let Some((sep, rest)) = separators.split_first() else {
            // No separator left: hard split at chunk_size characters.
            return Self::hard_split(text, chunk_size);
        };

        if !text.contains(sep) {
            return Self::split_recursive(text, rest, chunk_size);
        }

        let parts: Vec<&str> = text.split(sep).collect();
        let mut chunks = Vec::new();
        let mut buffer = String::new();

        for (i, part) in parts.iter().enumerate() {
            let candidate_len = if buffer.is_empty() {
                part.chars().count()
            } else {
                buffer.chars().count() + sep.chars().count() + part.chars().count()
            };

            if candidate_len <= chunk_size {
                if !buffer.is_empty() {
                    buffer.push_str(sep);
                }
                buffer.push_str(part);
            } else {
                if !buffer.is_empty() {
                    chunks.push(std::mem::take(&mut buffer));
                }
                if part.chars().count() > chunk_size {
                    chunks.extend(Self::split_recursive(part, rest, chunk_size));
                } else {
                    buffer.push_str(part);
                }
            }

            let is_last = i + 1 == parts.len();
            if is_last && !buffer.is_empty() {
                chunks.push(std::mem::take(&mut buffer));
            }
        }

        chunks
    }

    fn hard_split(text: &str, chunk_size: usize) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars.chunks(chunk_size.max(1)).map(|c| c.iter().collect()).collect()
    }

    /// Prefix each chunk (after the first) with the trailing `overlap`
    /// characters of its predecessor's own content.
    fn apply_overlap(chunks: Vec<String>, overlap: usize) -> Vec<String> {
        if overlap == 0 || chunks.len() < 2 {
            return chunks;
        }
        let mut out = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push(chunk.clone());
                continue;
            }
            let prev = &chunks[i - 1];
            let prev_chars: Vec<char> = prev.chars().collect();
            let take_from = prev_chars.len().saturating_sub(overlap);
            let context: String = prev_chars[take_from..].iter().collect();
            out.push(format!("{context}{chunk}"));
        }
        out
    }
}

impl Chunker for RecursiveChunker {
    fn name(&self) -> &'static str {
        "recursive"
    }

    fn chunk(&self, text: &str, config: &ChunkingConfig) -> Vec<ChunkPiece> {
        let base = Self::split_recursive(text, SEPARATORS, config.chunk_size);
        let overlapped = Self::apply_overlap(base, config.chunk_overlap);

        overlapped
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let token_count = approx_token_count(&text);
                ChunkPiece { chunk_index: i as i32, text, token_count }
            })
            .collect()
    }
}

/// Fixed-width sliding window: `chunk_size` characters per chunk, stride
/// `chunk_size - chunk_overlap`.
pub struct CharacterChunker;

impl Chunker for CharacterChunker {
    fn name(&self) -> &'static str {
        "character"
    }

    fn chunk(&self, text: &str, config: &ChunkingConfig) -> Vec<ChunkPiece> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let stride = config.chunk_size.saturating_sub(config.chunk_overlap).max(1);
        let mut pieces = Vec::new();
        let mut start = 0usize;
        let mut index = 0i32;

        loop {
            let end = (start + config.chunk_size).min(chars.len());
            let text: String = chars[start..end].iter().collect();
            let token_count = approx_token_count(&text);
            pieces.push(ChunkPiece { chunk_index: index, text, token_count });
            index += 1;

            if end >= chars.len() {
                break;
            }
            start += stride;
        }

        pieces
    }
}

/// Maps a strategy name to a [`Chunker`].
#[derive(Clone)]
pub struct ChunkerRegistry {
    chunkers: HashMap<&'static str, Arc<dyn Chunker>>,
}

impl ChunkerRegistry {
    pub fn new() -> Self {
        ChunkerRegistry { chunkers: HashMap::new() }
    }

    pub fn register(&mut self, chunker: Arc<dyn Chunker>) {
        self.chunkers.insert(chunker.name(), chunker);
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RecursiveChunker));
        registry.register(Arc::new(CharacterChunker));
        registry
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Chunker>> {
        self.chunkers.get(name).cloned()
    }
}

impl Default for ChunkerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingSplitter;

    fn config(chunk_size: usize, chunk_overlap: usize, splitter: ChunkingSplitter) -> ChunkingConfig {
        ChunkingConfig { enabled: true, chunk_size, chunk_overlap, splitter, store_chunk_content: true }
    }

    #[test]
    fn character_chunker_covers_entire_text_no_overlap() {
        let cfg = config(5, 0, ChunkingSplitter::Character);
        let chunker = CharacterChunker;
        let text = "abcdefghij";
        let pieces = chunker.chunk(text, &cfg);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].text, "abcde");
        assert_eq!(pieces[1].text, "fghij");
        assert_eq!(pieces[0].chunk_index, 0);
        assert_eq!(pieces[1].chunk_index, 1);
    }

    #[test]
    fn character_chunker_applies_stride_with_overlap() {
        let cfg = config(5, 2, ChunkingSplitter::Character);
        let chunker = CharacterChunker;
        let text = "abcdefghij"; // stride = 3
        let pieces = chunker.chunk(text, &cfg);
        let texts: Vec<&str> = pieces.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["abcde", "defgh", "ghij"]);
    }

    #[test]
    fn character_chunker_is_deterministic() {
        let cfg = config(4, 1, ChunkingSplitter::Character);
        let chunker = CharacterChunker;
        let a = chunker.chunk("the quick brown fox jumps", &cfg);
        let b = chunker.chunk("the quick brown fox jumps", &cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn recursive_chunker_splits_on_paragraphs_first() {
        let cfg = config(20, 0, ChunkingSplitter::Recursive);
        let chunker = RecursiveChunker;
        let text = "first paragraph here\n\nsecond paragraph here";
        let pieces = chunker.chunk(text, &cfg);
        assert!(pieces.len() >= 2);
        for p in &pieces {
            assert!(p.text.chars().count() <= 20 || !p.text.contains("\n\n"));
        }
    }

    #[test]
    fn recursive_chunker_hard_splits_when_no_separator_fits() {
        let cfg = config(5, 0, ChunkingSplitter::Recursive);
        let chunker = RecursiveChunker;
        let text = "abcdefghijklmno";
        let pieces = chunker.chunk(text, &cfg);
        for p in &pieces {
            assert!(p.text.chars().count() <= 5);
        }
        let joined: String = pieces.iter().map(|p| p.text.clone()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn recursive_chunker_is_deterministic() {
        let cfg = config(10, 2, ChunkingSplitter::Recursive);
        let chunker = RecursiveChunker;
        let text = "one two three four five six seven eight";
        let a = chunker.chunk(text, &cfg);
        let b = chunker.chunk(text, &cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn registry_resolves_by_name() {
        let registry = ChunkerRegistry::with_defaults();
        assert!(registry.resolve("recursive").is_some());
        assert!(registry.resolve("character").is_some());
        assert!(registry.resolve("nonexistent").is_none());
    }
}
