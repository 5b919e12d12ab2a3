use serde::{Deserialize, Serialize};

use super::GradingError;
use crate::models::submission::TeacherInsights;

/// One chat completion request. Providers translate this into their own
/// wire shape; the pipeline never sees vendor-specific fields.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
}

/// A chat-capable model behind any provider. Implementations must be
/// shareable across the orchestrator's call threads.
pub trait ChatModel: Send + Sync {
    fn complete(&self, request: &ChatRequest) -> Result<String, GradingError>;

    /// Stable identifier for logging and latency records.
    fn model_id(&self) -> &str;
}

/// Formal checks the grader reports before any criterion judgment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Formalia {
    #[serde(default)]
    pub word_count: u32,
    #[serde(default)]
    pub within_word_bounds: bool,
    #[serde(default)]
    pub on_topic: bool,
    #[serde(default)]
    pub notes: String,
}

/// One criterion verdict exactly as the model emitted it, before
/// normalization or evidence checking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCriterionResult {
    pub id: String,
    pub met: bool,
    /// Documented contract: integer in [0, 100]. Values in (0, 1] are
    /// rescaled defensively downstream; see the arbitration engine.
    pub score: f64,
    #[serde(default)]
    pub evidence_quote: String,
    #[serde(default)]
    pub self_reflection_score: f64,
}

/// The fixed structured-output schema every grading call must satisfy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradingOutput {
    #[serde(default)]
    pub formalia: Formalia,
    pub criteria: Vec<RawCriterionResult>,
    #[serde(default)]
    pub insights: TeacherInsights,
}
