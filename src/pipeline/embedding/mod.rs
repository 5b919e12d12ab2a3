pub mod provider;
pub mod batcher;

pub use batcher::{embed_chunks, plan_batches, MAX_BATCH_ITEMS, MAX_BATCH_TOKENS};
pub use provider::{EmbeddingProvider, HttpEmbeddingProvider, MockEmbedder, EMBEDDING_DIM};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding provider connection failed: {0}")]
    Connection(String),

    #[error("Embedding provider returned error (status {status}): {body}")]
    Provider { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    /// The provider's true token limit was exceeded. Distinguished so the
    /// lifecycle controller can route the material to `needs_review`
    /// instead of `failed`.
    #[error("Token limit exceeded: {count} tokens, limit {limit}")]
    TokenLimit { count: u32, limit: u32 },

    #[error("Embedding count mismatch: sent {sent}, received {received}")]
    CountMismatch { sent: usize, received: usize },
}

/// Recognize a provider error body that reports a token-limit violation,
/// pulling out the reported count and limit when present.
pub fn parse_token_limit(body: &str) -> Option<EmbeddingError> {
    let lowered = body.to_ascii_lowercase();
    if !lowered.contains("token") || !lowered.contains("limit") {
        return None;
    }
    let re = regex::Regex::new(r"(?i)(\d+)\s+tokens?.{0,40}?limit\D{0,10}(\d+)").ok()?;
    if let Some(caps) = re.captures(body) {
        let count = caps[1].parse().unwrap_or(0);
        let limit = caps[2].parse().unwrap_or(0);
        return Some(EmbeddingError::TokenLimit { count, limit });
    }
    Some(EmbeddingError::TokenLimit { count: 0, limit: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_count_and_limit_from_message() {
        let err = parse_token_limit("input of 12000 tokens exceeds the model limit of 8192")
            .unwrap();
        match err {
            EmbeddingError::TokenLimit { count, limit } => {
                assert_eq!(count, 12_000);
                assert_eq!(limit, 8_192);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn token_limit_without_numbers_still_matches() {
        let err = parse_token_limit("request exceeded the token limit").unwrap();
        assert!(matches!(
            err,
            EmbeddingError::TokenLimit { count: 0, limit: 0 }
        ));
    }

    #[test]
    fn unrelated_errors_do_not_match() {
        assert!(parse_token_limit("internal server error").is_none());
        assert!(parse_token_limit("rate limit exceeded").is_none());
    }
}
