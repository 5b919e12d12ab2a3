use std::collections::HashMap;
use std::sync::Mutex;

use super::adapter::{Datapoint, Neighbor, RetrievalIndex};
use super::IndexError;

/// In-memory nearest-neighbor index — cosine similarity over a flat map.
/// Used in tests and as the local single-process mode.
pub struct InMemoryVectorIndex {
    entries: Mutex<HashMap<String, StoredPoint>>,
}

struct StoredPoint {
    vector: Vec<f32>,
    namespace: String,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RetrievalIndex for InMemoryVectorIndex {
    fn upsert(&self, points: &[Datapoint]) -> Result<(), IndexError> {
        let mut entries = self.entries.lock().unwrap();
        for p in points {
            entries.insert(
                p.key.clone(),
                StoredPoint {
                    vector: p.vector.clone(),
                    namespace: p.namespace.clone(),
                },
            );
        }
        Ok(())
    }

    fn remove(&self, keys: &[String]) -> Result<(), IndexError> {
        let mut entries = self.entries.lock().unwrap();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    fn search(
        &self,
        vector: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<Neighbor>, IndexError> {
        let entries = self.entries.lock().unwrap();
        let mut scored: Vec<Neighbor> = entries
            .iter()
            .filter(|(_, p)| p.namespace == namespace)
            .map(|(key, p)| Neighbor {
                key: key.clone(),
                score: cosine_similarity(vector, &p.vector),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
