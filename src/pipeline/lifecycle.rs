//! Material lifecycle controller.
//!
//! State machine: `uploaded → processing → {ready | failed |
//! needs_review}`. `needs_review` is reached only on a token-limit
//! embedding error and can be requeued under a trimmed token budget;
//! `failed` is terminal.

use rusqlite::Connection;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::{Material, MaterialErrorCode, MaterialStatus};
use crate::pipeline::chunker;
use crate::pipeline::embedding::{batcher, EmbeddingError, EmbeddingProvider};
use crate::pipeline::extraction::{extract_text, OcrProvider};
use crate::pipeline::index::{self, RetrievalIndex};

/// Stored preview ceiling for the normalized extracted text.
pub const PREVIEW_MAX_CHARS: usize = 20_000;

/// Token budget a `force_trim` requeue caps embedding at.
pub const TRIM_TOKEN_BUDGET: usize = 9_000;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Material {id} is {status}; only needs_review materials can be requeued")]
    NotRequeueable { id: Uuid, status: String },
}

/// Process an uploaded material end to end: extract, chunk, embed,
/// index, then mark `ready`.
///
/// Only the `uploaded` state enters processing; a call landing on a
/// material already `processing` or in any settled state is ignored so
/// redundant triggers cannot duplicate work. Pipeline failures settle
/// the material's status; only storage errors propagate.
pub fn ingest_material(
    conn: &Connection,
    material_id: &Uuid,
    bytes: &[u8],
    ocr: &dyn OcrProvider,
    embedder: &dyn EmbeddingProvider,
    vector_index: Option<&dyn RetrievalIndex>,
) -> Result<MaterialStatus, LifecycleError> {
    let mut material = repository::get_material(conn, material_id)?
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "Material".into(),
            id: material_id.to_string(),
        })?;

    if material.status != MaterialStatus::Uploaded {
        info!(
            material_id = %material_id,
            status = material.status.as_str(),
            "ingest skipped, material is not in uploaded state"
        );
        return Ok(material.status);
    }

    material.status = MaterialStatus::Processing;
    repository::update_material(conn, &material)?;

    let text = match extract_text(bytes, &material.mime_type, ocr) {
        Ok(text) => chunker::normalize_whitespace(&text),
        Err(e) => {
            warn!(material_id = %material_id, error = %e, "extraction failed");
            return settle_failure(conn, material, MaterialErrorCode::ExtractionFailed, &e.to_string());
        }
    };
    if text.trim().is_empty() {
        return settle_failure(
            conn,
            material,
            MaterialErrorCode::ExtractionEmpty,
            "no text could be extracted from the document",
        );
    }

    let mut chunks = chunker::chunk_text(material_id, &text);
    let mut trimmed = false;
    if material.force_trim {
        let kept = cap_to_token_budget(&chunks, TRIM_TOKEN_BUDGET);
        if kept < chunks.len() {
            warn!(
                material_id = %material_id,
                total = chunks.len(),
                kept,
                "trim requeue dropped trailing chunks"
            );
            chunks.truncate(kept);
            trimmed = true;
        }
    }
    let token_count: usize = chunks.iter().map(|c| chunker::estimate_tokens(&c.content)).sum();

    if let Err(e) = repository::replace_chunks(conn, material_id, &chunks) {
        return settle_failure(conn, material, MaterialErrorCode::IndexingFailed, &e.to_string());
    }

    let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    let vectors = match batcher::embed_chunks(embedder, &texts) {
        Ok(vectors) => vectors,
        Err(EmbeddingError::TokenLimit { count, limit }) => {
            warn!(
                material_id = %material_id,
                observed = count,
                limit,
                "embedding hit the model token limit, downgrading to needs_review"
            );
            repository::delete_chunks_for_material(conn, material_id)?;
            material.status = MaterialStatus::NeedsReview;
            material.error_code = Some(MaterialErrorCode::TokenLimit);
            material.error_message =
                Some(format!("embedding input of {count} tokens exceeds the limit of {limit}"));
            material.observed_tokens = Some(count);
            material.token_limit = Some(limit);
            repository::update_material(conn, &material)?;
            return Ok(MaterialStatus::NeedsReview);
        }
        Err(e) => {
            return settle_failure(conn, material, MaterialErrorCode::EmbeddingFailed, &e.to_string());
        }
    };

    if let Some(vector_index) = vector_index {
        if let Err(e) =
            index::index_material_chunks(vector_index, &material.agent_id, &chunks, &vectors)
        {
            return settle_failure(conn, material, MaterialErrorCode::IndexingFailed, &e.to_string());
        }
    }

    material.status = MaterialStatus::Ready;
    material.extracted_text = Some(text.chars().take(PREVIEW_MAX_CHARS).collect());
    material.chunk_count = chunks.len() as u32;
    material.token_count = token_count as u32;
    material.trimmed = trimmed;
    material.force_trim = false;
    material.reprocess_requested = false;
    material.error_code = None;
    material.error_message = None;
    material.observed_tokens = None;
    material.token_limit = None;
    repository::update_material(conn, &material)?;

    info!(
        material_id = %material_id,
        chunks = material.chunk_count,
        tokens = material.token_count,
        trimmed,
        "material ready"
    );
    Ok(MaterialStatus::Ready)
}

/// Requeue a `needs_review` material under the trimmed token budget.
/// Clears the error fields and re-enters the uploaded state so the next
/// ingest run caps what gets embedded.
pub fn requeue_with_trim(conn: &Connection, material_id: &Uuid) -> Result<(), LifecycleError> {
    let mut material = repository::get_material(conn, material_id)?
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "Material".into(),
            id: material_id.to_string(),
        })?;

    if material.status != MaterialStatus::NeedsReview {
        return Err(LifecycleError::NotRequeueable {
            id: *material_id,
            status: material.status.as_str().to_string(),
        });
    }

    material.status = MaterialStatus::Uploaded;
    material.force_trim = true;
    material.reprocess_requested = true;
    material.error_code = None;
    material.error_message = None;
    material.observed_tokens = None;
    material.token_limit = None;
    repository::update_material(conn, &material)?;
    info!(material_id = %material_id, "material requeued with trim budget");
    Ok(())
}

/// Delete a material, its stored chunks, and its index datapoints.
/// Index removal is best-effort; a failure is logged, never propagated.
pub fn remove_material(
    conn: &Connection,
    material_id: &Uuid,
    vector_index: Option<&dyn RetrievalIndex>,
) -> Result<(), LifecycleError> {
    if let Some(vector_index) = vector_index {
        if let Err(e) = index::remove_material_datapoints(vector_index, conn, material_id) {
            warn!(
                material_id = %material_id,
                error = %e,
                "index cleanup failed, datapoints may be orphaned"
            );
        }
    }
    repository::delete_chunks_for_material(conn, material_id)?;
    repository::delete_material(conn, material_id)?;
    info!(material_id = %material_id, "material removed");
    Ok(())
}

/// Longest chunk prefix whose summed token estimate fits the budget.
fn cap_to_token_budget(chunks: &[crate::models::Chunk], budget: usize) -> usize {
    let mut total = 0usize;
    let mut kept = 0usize;
    for chunk in chunks {
        let tokens = chunker::estimate_tokens(&chunk.content);
        if kept > 0 && total + tokens > budget {
            break;
        }
        total += tokens;
        kept += 1;
    }
    kept
}

/// Chunks exist only while their parent material is ready, so every
/// non-ready settle clears whatever the run had already stored.
fn settle_failure(
    conn: &Connection,
    mut material: Material,
    code: MaterialErrorCode,
    message: &str,
) -> Result<MaterialStatus, LifecycleError> {
    repository::delete_chunks_for_material(conn, &material.id)?;
    material.status = MaterialStatus::Failed;
    material.error_code = Some(code);
    material.error_message = Some(message.to_string());
    repository::update_material(conn, &material)?;
    Ok(MaterialStatus::Failed)
}
