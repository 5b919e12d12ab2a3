use serde::{Deserialize, Serialize};

use super::{parse_token_limit, EmbeddingError};

/// Default embedding dimension for the hosted text model.
pub const EMBEDDING_DIM: usize = 768;

/// Dense-vector embedding provider. One vector per input text,
/// order-preserving.
pub trait EmbeddingProvider {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text])?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            sent: 1,
            received: 0,
        })
    }
}

/// HTTP embedding client.
///
/// Speaks the `/api/embed` shape: `{model, input: [...]}` in,
/// `{embeddings: [[...]]}` out. Connection, timeout, and status errors
/// are distinguished; a token-limit status body becomes
/// [`EmbeddingError::TokenLimit`].
pub struct HttpEmbeddingProvider {
    base_url: String,
    model: String,
    dimension: usize,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: &str, model: &str, dimension: usize, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
            client,
        }
    }
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                EmbeddingError::Connection(self.base_url.clone())
            } else {
                EmbeddingError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            if let Some(token_err) = parse_token_limit(&body) {
                return Err(token_err);
            }
            return Err(EmbeddingError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbedResponse = response
            .json()
            .map_err(|e| EmbeddingError::ResponseParsing(e.to_string()))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                sent: texts.len(),
                received: parsed.embeddings.len(),
            });
        }
        Ok(parsed.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Mock embedding provider for testing — deterministic unit vectors, with
/// an optional scripted failure.
pub struct MockEmbedder {
    dimension: usize,
    failure: Option<fn() -> EmbeddingError>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
            failure: None,
        }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            failure: None,
        }
    }

    /// Every call fails with the given error constructor.
    pub fn failing(failure: fn() -> EmbeddingError) -> Self {
        Self {
            dimension: EMBEDDING_DIM,
            failure: Some(failure),
        }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingProvider for MockEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if let Some(f) = self.failure {
            return Err(f());
        }
        Ok(texts
            .iter()
            .map(|t| deterministic_vector(t, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Generate a deterministic unit vector from text (for testing).
fn deterministic_vector(text: &str, dim: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dim];
    let bytes = text.as_bytes();

    for (i, slot) in vec.iter_mut().enumerate() {
        let byte_idx = i % bytes.len().max(1);
        *slot = (bytes.get(byte_idx).copied().unwrap_or(0) as f32 + i as f32) / 255.0;
    }

    // L2 normalize
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in &mut vec {
            *val /= norm;
        }
    }

    vec
}
