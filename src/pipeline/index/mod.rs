pub mod adapter;
pub mod memory;

pub use adapter::{
    index_material_chunks, remove_material_datapoints, retrieve_context, ContextSource,
    Datapoint, Neighbor, RetrievalIndex, RetrievedContext, MAX_UPSERT_BATCH, TOP_K,
};
pub use memory::InMemoryVectorIndex;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index connection failed: {0}")]
    Connection(String),

    #[error("Index returned error: {0}")]
    Backend(String),

    #[error("Dimension mismatch: index expects {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
