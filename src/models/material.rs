use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{MaterialErrorCode, MaterialStatus};

/// One uploaded reference document owned by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: Uuid,
    pub agent_id: Uuid,
    /// Pointer into the blob store; opaque to the pipeline.
    pub storage_path: String,
    pub mime_type: String,
    pub status: MaterialStatus,
    /// Bounded preview of the normalized extracted text (≤ 20,000 chars).
    pub extracted_text: Option<String>,
    pub chunk_count: u32,
    pub token_count: u32,
    /// Set by the teacher to requeue a needs_review material under the
    /// trimmed token budget.
    pub force_trim: bool,
    pub reprocess_requested: bool,
    /// True when the trimmed requeue dropped trailing chunks.
    pub trimmed: bool,
    pub error_code: Option<MaterialErrorCode>,
    pub error_message: Option<String>,
    /// Populated on a token-limit embedding failure, for diagnostics.
    pub observed_tokens: Option<u32>,
    pub token_limit: Option<u32>,
    pub uploaded_at: DateTime<Utc>,
}

impl Material {
    /// New material in the initial `uploaded` state.
    pub fn new(agent_id: Uuid, storage_path: &str, mime_type: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            storage_path: storage_path.to_string(),
            mime_type: mime_type.to_string(),
            status: MaterialStatus::Uploaded,
            extracted_text: None,
            chunk_count: 0,
            token_count: 0,
            force_trim: false,
            reprocess_requested: false,
            trimmed: false,
            error_code: None,
            error_message: None,
            observed_tokens: None,
            token_limit: None,
            uploaded_at: Utc::now(),
        }
    }
}

/// A fixed-size slice of a material's normalized text. Keyed by
/// `{material_id}-{index}` in both the chunk store and the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub material_id: Uuid,
    pub index: u32,
    pub content: String,
}

impl Chunk {
    pub fn key(&self) -> String {
        chunk_key(&self.material_id, self.index)
    }
}

/// Canonical chunk key shared by the chunk store and the vector index.
pub fn chunk_key(material_id: &Uuid, index: u32) -> String {
    format!("{material_id}-{index}")
}
