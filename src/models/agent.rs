use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Stringency;

/// One gradeable criterion in an agent's criteria matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Machine-checkable indicator text the graders must anchor on.
    pub indicator: String,
    /// A submission cannot pass while any mandatory criterion is unmet.
    pub mandatory: bool,
    /// Bloom taxonomy level name, e.g. "analyze".
    pub bloom_level: String,
    /// Bloom taxonomy index, 1 (remember) through 6 (create).
    pub bloom_index: u8,
    /// How reliably this criterion can be machine-assessed, in [0, 1].
    pub reliability: f64,
    /// Relative weight in the final score, > 0.
    pub weight: f64,
}

/// An assessment configuration: rubric, thresholds, and the stable
/// verification prefix used by the code codec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub criteria_matrix: Vec<Criterion>,
    pub min_words: u32,
    pub max_words: u32,
    pub stringency: Stringency,
    /// Pass threshold on the 0–100,000 score scale.
    pub pass_threshold: u32,
    /// Stable once assigned; integer in [200, 998]. None until first use.
    pub verification_prefix: Option<u32>,
    pub owner_id: String,
    /// Identities allowed to see this agent besides the owner.
    pub visibility: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Agent {
    /// Sum of criterion weights. Zero only for an empty matrix.
    pub fn total_weight(&self) -> f64 {
        self.criteria_matrix.iter().map(|c| c.weight).sum()
    }

    pub fn criterion(&self, id: &str) -> Option<&Criterion> {
        self.criteria_matrix.iter().find(|c| c.id == id)
    }
}
