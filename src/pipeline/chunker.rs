use uuid::Uuid;

use crate::models::material::Chunk;

/// Fixed window size in characters.
pub const CHUNK_SIZE: usize = 1200;
/// Overlap between consecutive windows.
pub const CHUNK_OVERLAP: usize = 200;

/// Collapse runs of whitespace to single spaces and trim.
///
/// Chunking always runs over normalized text so re-chunking the same
/// material is byte-for-byte deterministic.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Slide a fixed window across normalized text.
///
/// Pure function: identical input yields identical chunk sequences. The
/// final partial window is included once the text is exhausted; empty
/// input yields no chunks.
pub fn chunk_text(material_id: &Uuid, text: &str) -> Vec<Chunk> {
    chunk_with(material_id, text, CHUNK_SIZE, CHUNK_OVERLAP)
}

pub fn chunk_with(material_id: &Uuid, text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Vec::new();
    }
    // A step of zero would never terminate; single-chunk texts exit early.
    let step = size.saturating_sub(overlap).max(1);

    let chars: Vec<char> = normalized.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0u32;

    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(Chunk {
            material_id: *material_id,
            index,
            content: chars[start..end].iter().collect(),
        });
        index += 1;
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Rough token estimate used for embedding budgets: `ceil(len/3)`.
/// Deliberately conservative for mixed-language student text.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        let id = Uuid::new_v4();
        assert!(chunk_text(&id, "").is_empty());
        assert!(chunk_text(&id, "   \n\t  ").is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let id = Uuid::new_v4();
        let chunks = chunk_text(&id, "A short reference passage.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].content, "A short reference passage.");
    }

    #[test]
    fn windows_have_expected_size_and_overlap() {
        let id = Uuid::new_v4();
        let text = "abcdefghij".repeat(50); // 500 chars, no whitespace
        let chunks = chunk_with(&id, &text, 200, 50);

        assert!(chunks.len() > 1);
        for c in &chunks[..chunks.len() - 1] {
            assert_eq!(c.content.chars().count(), 200);
        }
        // Consecutive windows share exactly the overlap region.
        let first: Vec<char> = chunks[0].content.chars().collect();
        let second: Vec<char> = chunks[1].content.chars().collect();
        assert_eq!(&first[150..], &second[..50]);
    }

    #[test]
    fn chunking_is_deterministic() {
        let id = Uuid::new_v4();
        let text = "Reference material sentence. ".repeat(120);
        let a = chunk_text(&id, &text);
        let b = chunk_text(&id, &text);
        assert_eq!(a, b);
    }

    #[test]
    fn overlap_removal_reconstructs_normalized_text() {
        let id = Uuid::new_v4();
        let text = "word ".repeat(900);
        let normalized = normalize_whitespace(&text);
        let chunks = chunk_text(&id, &text);

        let step = CHUNK_SIZE - CHUNK_OVERLAP;
        let mut rebuilt = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let chars: Vec<char> = chunk.content.chars().collect();
            if i + 1 < chunks.len() {
                rebuilt.extend(&chars[..step]);
            } else {
                rebuilt.extend(&chars);
            }
        }
        assert_eq!(rebuilt, normalized);
    }

    #[test]
    fn indices_are_sequential() {
        let id = Uuid::new_v4();
        let chunks = chunk_text(&id, &"x ".repeat(3000));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index as usize, i);
        }
    }

    #[test]
    fn token_estimate_is_ceiling_of_thirds() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("ab"), 1);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(9000)), 3000);
    }
}
