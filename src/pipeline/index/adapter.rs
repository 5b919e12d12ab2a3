use rusqlite::Connection;
use uuid::Uuid;

use super::IndexError;
use crate::db::repository;
use crate::models::material::{chunk_key, Chunk};
use crate::pipeline::embedding::provider::EmbeddingProvider;

/// Nearest-neighbor index batch ceiling.
pub const MAX_UPSERT_BATCH: usize = 50;
/// Neighbors requested per retrieval query.
pub const TOP_K: usize = 6;
/// Materials pulled verbatim when retrieval degrades to the fallback.
pub const FALLBACK_MATERIALS: usize = 6;

/// One vector to upsert, tagged with its owning agent's namespace so
/// cross-agent reads are impossible at the index level.
#[derive(Debug, Clone)]
pub struct Datapoint {
    pub key: String,
    pub vector: Vec<f32>,
    pub namespace: String,
}

#[derive(Debug, Clone)]
pub struct Neighbor {
    pub key: String,
    pub score: f32,
}

/// External nearest-neighbor index. Every write and every query carries
/// the agent namespace restrict.
pub trait RetrievalIndex {
    fn upsert(&self, points: &[Datapoint]) -> Result<(), IndexError>;
    fn remove(&self, keys: &[String]) -> Result<(), IndexError>;
    fn search(
        &self,
        vector: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<Neighbor>, IndexError>;
}

/// Where a retrieved context block came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextSource {
    /// Nearest-neighbor hits resolved to stored chunks.
    Semantic { chunk_keys: Vec<String> },
    /// Index unavailable or empty — recent ready materials verbatim.
    FallbackMaterials { count: usize },
    /// No materials exist at all.
    None,
}

#[derive(Debug, Clone)]
pub struct RetrievedContext {
    /// Labeled reference block ready for prompt assembly. Empty when
    /// `source` is `None`.
    pub text: String,
    pub source: ContextSource,
}

/// Upsert a material's chunk vectors in bounded batches.
pub fn index_material_chunks(
    index: &dyn RetrievalIndex,
    agent_id: &Uuid,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
) -> Result<usize, IndexError> {
    if chunks.len() != vectors.len() {
        return Err(IndexError::Backend(format!(
            "chunk/vector count mismatch: {} vs {}",
            chunks.len(),
            vectors.len()
        )));
    }

    let namespace = agent_id.to_string();
    let points: Vec<Datapoint> = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| Datapoint {
            key: chunk.key(),
            vector: vector.clone(),
            namespace: namespace.clone(),
        })
        .collect();

    for batch in points.chunks(MAX_UPSERT_BATCH) {
        index.upsert(batch)?;
    }
    Ok(points.len())
}

/// Remove a material's datapoints by its stored chunk keys, in bounded
/// batches. Callers treat failures as best-effort.
pub fn remove_material_datapoints(
    index: &dyn RetrievalIndex,
    conn: &Connection,
    material_id: &Uuid,
) -> Result<usize, IndexError> {
    let keys = repository::list_chunk_keys(conn, material_id)
        .map_err(|e| IndexError::Backend(e.to_string()))?;

    for batch in keys.chunks(MAX_UPSERT_BATCH) {
        index.remove(batch)?;
    }
    Ok(keys.len())
}

/// Retrieve reference context for a student text.
///
/// Embeds the query once, asks the index for the agent-scoped top-K, and
/// resolves hits to stored chunks. Retrieval never hard-fails: an
/// unconfigured index, a failed embedding or query, or an empty hit set
/// all degrade to the most recent ready materials' previews verbatim.
pub fn retrieve_context(
    conn: &Connection,
    agent_id: &Uuid,
    query_text: &str,
    embedder: &dyn EmbeddingProvider,
    index: Option<&dyn RetrievalIndex>,
) -> RetrievedContext {
    let Some(index) = index else {
        tracing::debug!(agent_id = %agent_id, "No retrieval index configured — fallback");
        return fallback_context(conn, agent_id);
    };

    let query_vector = match embedder.embed(query_text) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(agent_id = %agent_id, error = %e, "Query embedding failed — fallback");
            return fallback_context(conn, agent_id);
        }
    };

    let neighbors = match index.search(&query_vector, &agent_id.to_string(), TOP_K) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(agent_id = %agent_id, error = %e, "Index query failed — fallback");
            return fallback_context(conn, agent_id);
        }
    };

    if neighbors.is_empty() {
        return fallback_context(conn, agent_id);
    }

    let keys: Vec<String> = neighbors.iter().map(|n| n.key.clone()).collect();
    let chunks = match repository::get_chunks_by_keys(conn, &keys) {
        Ok(c) if !c.is_empty() => c,
        Ok(_) => return fallback_context(conn, agent_id),
        Err(e) => {
            tracing::warn!(agent_id = %agent_id, error = %e, "Chunk fetch failed — fallback");
            return fallback_context(conn, agent_id);
        }
    };

    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        text.push_str(&format!(
            "[Reference {} | material {} | part {}]\n{}\n\n",
            i + 1,
            chunk.material_id,
            chunk.index,
            chunk.content
        ));
    }

    RetrievedContext {
        text: text.trim_end().to_string(),
        source: ContextSource::Semantic {
            chunk_keys: chunks.iter().map(|c| chunk_key(&c.material_id, c.index)).collect(),
        },
    }
}

/// Degraded path: the most recent up to [`FALLBACK_MATERIALS`] ready
/// materials' extracted previews, verbatim.
fn fallback_context(conn: &Connection, agent_id: &Uuid) -> RetrievedContext {
    let materials = repository::list_ready_materials(conn, agent_id, FALLBACK_MATERIALS)
        .unwrap_or_default();

    let mut text = String::new();
    let mut count = 0usize;
    for material in &materials {
        if let Some(preview) = material.extracted_text.as_deref() {
            if preview.trim().is_empty() {
                continue;
            }
            count += 1;
            text.push_str(&format!(
                "[Reference {} | material {}]\n{}\n\n",
                count, material.id, preview
            ));
        }
    }

    if count == 0 {
        return RetrievedContext {
            text: String::new(),
            source: ContextSource::None,
        };
    }

    RetrievedContext {
        text: text.trim_end().to_string(),
        source: ContextSource::FallbackMaterials { count },
    }
}
