use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::agent::Criterion;
use super::enums::{DecisionSource, PassFail, ReviewTrigger, Stringency};

/// Final per-criterion verdict after normalization and evidence checking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionVerdict {
    pub criterion_id: String,
    pub met: bool,
    /// Normalized score in [0, 100].
    pub score: f64,
    pub evidence_quote: String,
    /// Whether the quote survived the evidence validator.
    pub evidence_valid: bool,
    /// Model-reported confidence in [0, 100].
    pub self_reflection: f64,
}

/// Escalation/uncertainty signals computed by the arbitration engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageSignals {
    /// 1.0 when the two models reached different pass/fail outcomes.
    pub disagreement_score: f64,
    /// 1.0 when any per-criterion score landed within ±5 of the cutoff.
    pub boundary_score: f64,
    /// Fraction of criteria, across both models, with invalid evidence.
    pub evidence_gap_score: f64,
    /// Inverted average self-reported confidence; higher = less confident.
    pub self_reflection_score: f64,
    /// Weighted sum of the above, clamped to [0, 1].
    pub difficulty_score: f64,
    pub is_escalated: bool,
    pub review_trigger: ReviewTrigger,
}

/// Structured pedagogical observations for the teacher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeacherInsights {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub misconceptions: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

/// Immutable record of one grading event.
///
/// Carries the rubric snapshot used at grading time so later rubric edits
/// never retroactively alter past grades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub agent_id: Uuid,
    /// Derived digest of the access-session token, not the raw token.
    pub session_digest: String,
    /// Final weighted score on the 0–100,000 scale.
    pub score: u32,
    pub pass_fail: PassFail,
    pub stringency: Stringency,
    pub decision_source: DecisionSource,
    /// The exact criteria matrix in force when this grading ran.
    pub rubric_snapshot: Vec<Criterion>,
    pub criterion_verdicts: Vec<CriterionVerdict>,
    pub triage: TriageSignals,
    pub insights: TeacherInsights,
    pub verification_code: i64,
    pub created_at: DateTime<Utc>,
}
