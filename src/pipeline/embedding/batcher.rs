use super::provider::EmbeddingProvider;
use super::EmbeddingError;
use crate::pipeline::chunker::estimate_tokens;

/// Maximum items per embedding call.
pub const MAX_BATCH_ITEMS: usize = 100;
/// Maximum estimated tokens per embedding call.
pub const MAX_BATCH_TOKENS: usize = 8_000;

/// One planned embedding call.
#[derive(Debug, PartialEq)]
pub struct Batch {
    /// Indices into the caller's text slice, in order.
    pub items: Vec<usize>,
    /// Set when a single oversized text was truncated and sent alone.
    pub truncated: bool,
}

/// Group texts into batches under the simultaneous item-count and
/// token-budget caps. A single text whose estimate exceeds the whole
/// budget is truncated to a safe length and planned alone.
pub fn plan_batches(texts: &[&str], max_items: usize, max_tokens: usize) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut current_tokens = 0usize;

    for (i, text) in texts.iter().enumerate() {
        let tokens = estimate_tokens(text);

        if tokens > max_tokens {
            if !current.is_empty() {
                batches.push(Batch {
                    items: std::mem::take(&mut current),
                    truncated: false,
                });
                current_tokens = 0;
            }
            tracing::warn!(
                item = i,
                estimated_tokens = tokens,
                budget = max_tokens,
                "Chunk exceeds the per-batch token budget — truncating and sending alone"
            );
            batches.push(Batch {
                items: vec![i],
                truncated: true,
            });
            continue;
        }

        if current.len() == max_items || current_tokens + tokens > max_tokens {
            batches.push(Batch {
                items: std::mem::take(&mut current),
                truncated: false,
            });
            current_tokens = 0;
        }
        current.push(i);
        current_tokens += tokens;
    }

    if !current.is_empty() {
        batches.push(Batch {
            items: current,
            truncated: false,
        });
    }
    batches
}

/// Characters kept when an oversized text is truncated: the token budget
/// mapped back through the `ceil(len/3)` estimate.
fn safe_char_len(max_tokens: usize) -> usize {
    max_tokens * 3
}

/// Embed every text, batching under the default caps. Returns one vector
/// per input, order-preserving.
pub fn embed_chunks(
    provider: &dyn EmbeddingProvider,
    texts: &[&str],
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let plan = plan_batches(texts, MAX_BATCH_ITEMS, MAX_BATCH_TOKENS);
    let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];

    for batch in &plan {
        let truncated_storage: Vec<String>;
        let inputs: Vec<&str> = if batch.truncated {
            truncated_storage = batch
                .items
                .iter()
                .map(|&i| {
                    let limit = safe_char_len(MAX_BATCH_TOKENS);
                    texts[i].chars().take(limit).collect()
                })
                .collect();
            truncated_storage.iter().map(String::as_str).collect()
        } else {
            batch.items.iter().map(|&i| texts[i]).collect()
        };

        let vectors = provider.embed_batch(&inputs)?;
        if vectors.len() != batch.items.len() {
            return Err(EmbeddingError::CountMismatch {
                sent: batch.items.len(),
                received: vectors.len(),
            });
        }
        for (slot, vector) in batch.items.iter().zip(vectors) {
            out[*slot] = Some(vector);
        }
    }

    Ok(out.into_iter().flatten().collect())
}
