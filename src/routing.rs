//! Model routing configuration.
//!
//! One record names the provider endpoint for every model role the
//! pipeline calls. Callers hold it behind a [`ConfigCache`] with a TTL
//! and explicit invalidation on writes — no ambient mutable state.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::pipeline::embedding::{HttpEmbeddingProvider, EMBEDDING_DIM};
use crate::pipeline::extraction::HttpOcrProvider;
use crate::pipeline::grading::orchestrator::{ADJUDICATOR_TIMEOUT_SECS, PRIMARY_TIMEOUT_SECS};
use crate::pipeline::grading::{GradingOrchestrator, HttpChatModel};

/// Routing entries are considered fresh for this long.
pub const ROUTING_TTL_SECS: u64 = 300;

/// Request timeout for embedding calls.
pub const EMBEDDING_TIMEOUT_SECS: u64 = 30;

/// Request timeout for OCR calls; scanned parts can take a while.
pub const OCR_TIMEOUT_SECS: u64 = 120;

/// One provider endpoint and the model to request from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEndpoint {
    pub base_url: String,
    pub model: String,
    /// Whether the provider enforces JSON output natively; without it
    /// the tolerant parser carries the load.
    #[serde(default)]
    pub json_mode: bool,
}

impl ModelEndpoint {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            model: model.to_string(),
            json_mode: false,
        }
    }
}

/// Which model backs each role. Grader A and B are independently
/// swappable and need not be the same model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRouting {
    pub grader_a: ModelEndpoint,
    pub grader_b: ModelEndpoint,
    pub adjudicator: ModelEndpoint,
    pub embedding: ModelEndpoint,
    pub ocr: ModelEndpoint,
}

impl ModelRouting {
    /// Build the dual-grader orchestrator from the grader and
    /// adjudicator endpoints.
    pub fn grading_orchestrator(&self) -> GradingOrchestrator {
        GradingOrchestrator::new(
            Arc::new(self.chat_model(&self.grader_a, PRIMARY_TIMEOUT_SECS)),
            Arc::new(self.chat_model(&self.grader_b, PRIMARY_TIMEOUT_SECS)),
            Arc::new(self.chat_model(&self.adjudicator, ADJUDICATOR_TIMEOUT_SECS)),
        )
    }

    pub fn embedding_provider(&self) -> HttpEmbeddingProvider {
        HttpEmbeddingProvider::new(
            &self.embedding.base_url,
            &self.embedding.model,
            EMBEDDING_DIM,
            EMBEDDING_TIMEOUT_SECS,
        )
    }

    pub fn ocr_provider(&self) -> HttpOcrProvider {
        HttpOcrProvider::new(&self.ocr.base_url, OCR_TIMEOUT_SECS)
    }

    fn chat_model(&self, endpoint: &ModelEndpoint, timeout_secs: u64) -> HttpChatModel {
        HttpChatModel::new(&endpoint.base_url, &endpoint.model, timeout_secs)
    }
}

impl Default for ModelRouting {
    fn default() -> Self {
        let local = "http://localhost:11434";
        Self {
            grader_a: ModelEndpoint::new(local, "llama3.1:8b"),
            grader_b: ModelEndpoint::new(local, "qwen2.5:7b"),
            adjudicator: ModelEndpoint::new(local, "llama3.1:70b"),
            embedding: ModelEndpoint::new(local, "nomic-embed-text"),
            ocr: ModelEndpoint::new(local, "llava:13b"),
        }
    }
}

/// Explicit `{value, fetched_at}` cache with a TTL.
///
/// Injected into whatever needs the routing record; writes go through
/// [`ConfigCache::invalidate`] so the next read refetches.
pub struct ConfigCache<T> {
    ttl: Duration,
    state: Mutex<Option<(T, Instant)>>,
}

impl<T: Clone> ConfigCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(None),
        }
    }

    /// Return the cached value if fresh, otherwise run `fetch` and
    /// cache its result.
    pub fn get_or_fetch<E>(&self, fetch: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((value, fetched_at)) = state.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                return Ok(value.clone());
            }
        }
        let value = fetch()?;
        *state = Some((value.clone(), Instant::now()));
        Ok(value)
    }

    /// Drop the cached value; the next read refetches.
    pub fn invalidate(&self) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }

    /// Replace the cached value directly, resetting its age.
    pub fn put(&self, value: T) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = Some((value, Instant::now()));
    }
}

impl<T: Clone> Default for ConfigCache<T> {
    fn default() -> Self {
        Self::new(Duration::from_secs(ROUTING_TTL_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn fresh_value_is_not_refetched() {
        let cache: ConfigCache<u32> = ConfigCache::new(Duration::from_secs(60));
        let mut fetches = 0;
        for _ in 0..3 {
            let v: Result<u32, Infallible> = cache.get_or_fetch(|| {
                fetches += 1;
                Ok(7)
            });
            assert_eq!(v.unwrap(), 7);
        }
        assert_eq!(fetches, 1);
    }

    #[test]
    fn expired_value_is_refetched() {
        let cache: ConfigCache<u32> = ConfigCache::new(Duration::ZERO);
        let mut fetches = 0;
        for _ in 0..2 {
            let _: Result<u32, Infallible> = cache.get_or_fetch(|| {
                fetches += 1;
                Ok(7)
            });
        }
        assert_eq!(fetches, 2);
    }

    #[test]
    fn invalidation_forces_a_refetch() {
        let cache: ConfigCache<ModelRouting> = ConfigCache::new(Duration::from_secs(60));
        let mut fetches = 0;
        let mut fetch = || -> Result<ModelRouting, Infallible> {
            fetches += 1;
            Ok(ModelRouting::default())
        };
        cache.get_or_fetch(&mut fetch).unwrap();
        cache.invalidate();
        cache.get_or_fetch(&mut fetch).unwrap();
        assert_eq!(fetches, 2);
    }

    #[test]
    fn failed_fetch_leaves_the_cache_empty() {
        let cache: ConfigCache<u32> = ConfigCache::new(Duration::from_secs(60));
        let err: Result<u32, &str> = cache.get_or_fetch(|| Err("config store down"));
        assert!(err.is_err());
        let ok: Result<u32, &str> = cache.get_or_fetch(|| Ok(9));
        assert_eq!(ok.unwrap(), 9);
    }

    #[test]
    fn put_replaces_without_fetching() {
        let cache: ConfigCache<u32> = ConfigCache::new(Duration::from_secs(60));
        cache.put(42);
        let v: Result<u32, Infallible> = cache.get_or_fetch(|| unreachable!());
        assert_eq!(v.unwrap(), 42);
    }

    #[test]
    fn default_routing_names_every_role() {
        let routing = ModelRouting::default();
        assert_ne!(routing.grader_a.model, routing.grader_b.model);
        assert!(!routing.embedding.model.is_empty());
    }

    #[test]
    fn routing_record_builds_every_provider() {
        use crate::pipeline::embedding::EmbeddingProvider;

        let routing = ModelRouting::default();
        let embedder = routing.embedding_provider();
        assert_eq!(embedder.dimension(), EMBEDDING_DIM);
        let _orchestrator = routing.grading_orchestrator();
        let _ocr = routing.ocr_provider();
    }
}
