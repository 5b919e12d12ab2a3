//! Arbitration engine — reconciles the two primary gradings.
//!
//! Normalizes each model's raw output, derives the triage signals,
//! escalates to the adjudicator on disagreement or high difficulty, and
//! produces the final pass/fail and weighted score. When every model
//! path fails the case is marked `HUMAN_REQUIRED` instead of guessing.

use tracing::{info, warn};

use crate::models::{
    Agent, CriterionVerdict, DecisionSource, PassFail, ReviewTrigger, TeacherInsights,
    TriageSignals,
};
use crate::pipeline::evidence;
use crate::pipeline::grading::{DualGrading, GradingOutput, ModelRun};

/// Per-criterion cutoff the boundary signal measures proximity to.
const PASS_BOUNDARY: f64 = 70.0;
const BOUNDARY_MARGIN: f64 = 5.0;

/// Difficulty above this escalates even without outright disagreement.
const DIFFICULTY_ESCALATION_THRESHOLD: f64 = 0.7;

const W_DISAGREEMENT: f64 = 0.5;
const W_BOUNDARY: f64 = 0.2;
const W_SELF_REFLECTION: f64 = 0.15;
const W_EVIDENCE_GAP: f64 = 0.15;

/// One model's grading after normalization and evidence checking,
/// aligned to the agent's criteria matrix order.
#[derive(Debug, Clone)]
pub struct NormalizedGrading {
    pub model_id: String,
    pub verdicts: Vec<CriterionVerdict>,
    pub outcome: PassFail,
    pub insights: TeacherInsights,
}

/// The arbitration engine's final word on a submission.
#[derive(Debug, Clone)]
pub struct ArbitrationOutcome {
    pub pass_fail: PassFail,
    /// Weighted score on the 0–100,000 scale.
    pub score: u32,
    pub decision_source: DecisionSource,
    pub criterion_verdicts: Vec<CriterionVerdict>,
    pub insights: TeacherInsights,
    pub triage: TriageSignals,
}

/// Normalize one model's raw output against the agent's rubric.
///
/// Scores in (0, 1] are treated as fractions a model emitted despite the
/// 0-100 contract and rescaled; everything is clamped to [0, 100].
/// Criteria the model skipped become unmet zero-score verdicts.
pub fn normalize_grading(
    agent: &Agent,
    student_text: &str,
    model_id: &str,
    output: &GradingOutput,
) -> NormalizedGrading {
    let mut verdicts = Vec::with_capacity(agent.criteria_matrix.len());

    for criterion in &agent.criteria_matrix {
        let raw = output.criteria.iter().find(|r| r.id == criterion.id);
        let verdict = match raw {
            Some(raw) => {
                let quote = raw.evidence_quote.trim().to_string();
                CriterionVerdict {
                    criterion_id: criterion.id.clone(),
                    met: raw.met,
                    score: coerce_score(model_id, &criterion.id, raw.score),
                    evidence_valid: evidence::validate_quote(student_text, &quote),
                    evidence_quote: quote,
                    self_reflection: coerce_score(
                        model_id,
                        &criterion.id,
                        raw.self_reflection_score,
                    ),
                }
            }
            None => {
                warn!(
                    model = model_id,
                    criterion = %criterion.id,
                    "model omitted a rubric criterion, recording it as unmet"
                );
                CriterionVerdict {
                    criterion_id: criterion.id.clone(),
                    met: false,
                    score: 0.0,
                    evidence_quote: String::new(),
                    evidence_valid: false,
                    self_reflection: 0.0,
                }
            }
        };
        verdicts.push(verdict);
    }

    let outcome = matrix_outcome(agent, &verdicts);
    NormalizedGrading {
        model_id: model_id.to_string(),
        verdicts,
        outcome,
        insights: output.insights.clone(),
    }
}

/// All mandatory criteria met ⇒ pass.
fn matrix_outcome(agent: &Agent, verdicts: &[CriterionVerdict]) -> PassFail {
    let all_mandatory_met = agent
        .criteria_matrix
        .iter()
        .zip(verdicts)
        .filter(|(c, _)| c.mandatory)
        .all(|(_, v)| v.met);
    if all_mandatory_met {
        PassFail::G
    } else {
        PassFail::U
    }
}

fn coerce_score(model_id: &str, criterion_id: &str, raw: f64) -> f64 {
    let rescaled = if raw > 0.0 && raw <= 1.0 {
        warn!(
            model = model_id,
            criterion = criterion_id,
            score = raw,
            "fractional score rescaled to the 0-100 contract"
        );
        raw * 100.0
    } else {
        raw
    };
    rescaled.clamp(0.0, 100.0)
}

/// Derive the triage signals from the surviving normalized gradings.
pub fn compute_signals(gradings: &[&NormalizedGrading]) -> TriageSignals {
    let disagreement_score = match gradings {
        [a, b] if a.outcome != b.outcome => 1.0,
        _ => 0.0,
    };

    let all_verdicts: Vec<&CriterionVerdict> =
        gradings.iter().flat_map(|g| g.verdicts.iter()).collect();

    let boundary_score = if all_verdicts
        .iter()
        .any(|v| (v.score - PASS_BOUNDARY).abs() <= BOUNDARY_MARGIN)
    {
        1.0
    } else {
        0.0
    };

    let (evidence_gap_score, self_reflection_score) = if all_verdicts.is_empty() {
        (0.0, 0.0)
    } else {
        let invalid = all_verdicts.iter().filter(|v| !v.evidence_valid).count();
        let gap = invalid as f64 / all_verdicts.len() as f64;
        let avg_confidence = all_verdicts.iter().map(|v| v.self_reflection).sum::<f64>()
            / all_verdicts.len() as f64;
        (gap, (100.0 - avg_confidence) / 100.0)
    };

    let difficulty_score = (W_DISAGREEMENT * disagreement_score
        + W_BOUNDARY * boundary_score
        + W_SELF_REFLECTION * self_reflection_score
        + W_EVIDENCE_GAP * evidence_gap_score)
        .clamp(0.0, 1.0);

    let review_trigger = if gradings.len() < 2 {
        ReviewTrigger::ModelFailure
    } else if disagreement_score == 1.0 {
        ReviewTrigger::Disagreement
    } else if difficulty_score > DIFFICULTY_ESCALATION_THRESHOLD {
        ReviewTrigger::HighDifficulty
    } else {
        ReviewTrigger::None
    };

    TriageSignals {
        disagreement_score,
        boundary_score,
        evidence_gap_score,
        self_reflection_score,
        difficulty_score,
        is_escalated: review_trigger != ReviewTrigger::None,
        review_trigger,
    }
}

/// Run the full arbitration flow over a dual grading.
///
/// `escalate` is invoked at most once, with the surviving prior outputs,
/// when the signals call for the adjudicator.
pub fn arbitrate<F>(
    agent: &Agent,
    student_text: &str,
    dual: &DualGrading,
    escalate: F,
) -> ArbitrationOutcome
where
    F: FnOnce(&[(&str, &GradingOutput)]) -> ModelRun,
{
    let survivors = dual.surviving_outputs();

    if survivors.is_empty() {
        warn!("both primary gradings failed, marking submission for human review");
        return human_required(ReviewTrigger::ModelFailure);
    }

    let normalized: Vec<NormalizedGrading> = survivors
        .iter()
        .map(|(model_id, output)| normalize_grading(agent, student_text, model_id, output))
        .collect();
    let refs: Vec<&NormalizedGrading> = normalized.iter().collect();
    let signals = compute_signals(&refs);

    if !signals.is_escalated {
        let [a, b] = [&normalized[0], &normalized[1]];
        info!(outcome = %a.outcome.as_str(), "consensus grading accepted");
        return consensus_outcome(agent, a, b, signals);
    }

    info!(
        trigger = %signals.review_trigger.as_str(),
        difficulty = signals.difficulty_score,
        "escalating to adjudicator"
    );
    let adjudication = escalate(&survivors);
    match &adjudication.output {
        Some(output) => {
            let final_grading =
                normalize_grading(agent, student_text, &adjudication.model_id, output);
            adjudicated_outcome(agent, final_grading, signals)
        }
        None => {
            warn!(
                error = adjudication.error.as_deref().unwrap_or("unknown"),
                "adjudicator failed, marking submission for human review"
            );
            human_required(signals.review_trigger)
        }
    }
}

/// Both models agreed: average the per-criterion scores, meet a
/// criterion only when both models met it, and keep whichever evidence
/// quote validated.
fn consensus_outcome(
    agent: &Agent,
    a: &NormalizedGrading,
    b: &NormalizedGrading,
    signals: TriageSignals,
) -> ArbitrationOutcome {
    let verdicts: Vec<CriterionVerdict> = a
        .verdicts
        .iter()
        .zip(&b.verdicts)
        .map(|(va, vb)| {
            let (quote, valid) = if va.evidence_valid || !vb.evidence_valid {
                (va.evidence_quote.clone(), va.evidence_valid)
            } else {
                (vb.evidence_quote.clone(), vb.evidence_valid)
            };
            CriterionVerdict {
                criterion_id: va.criterion_id.clone(),
                met: va.met && vb.met,
                score: (va.score + vb.score) / 2.0,
                evidence_quote: quote,
                evidence_valid: valid,
                self_reflection: (va.self_reflection + vb.self_reflection) / 2.0,
            }
        })
        .collect();

    let pass_fail = matrix_outcome(agent, &verdicts);
    let score = weighted_score(agent, &verdicts);
    ArbitrationOutcome {
        pass_fail,
        score,
        decision_source: DecisionSource::ModelsAb,
        criterion_verdicts: verdicts,
        insights: merge_insights(&a.insights, &b.insights),
        triage: signals,
    }
}

fn adjudicated_outcome(
    agent: &Agent,
    grading: NormalizedGrading,
    signals: TriageSignals,
) -> ArbitrationOutcome {
    let score = weighted_score(agent, &grading.verdicts);
    ArbitrationOutcome {
        pass_fail: grading.outcome,
        score,
        decision_source: DecisionSource::Adjudicator,
        criterion_verdicts: grading.verdicts,
        insights: grading.insights,
        triage: signals,
    }
}

fn human_required(trigger: ReviewTrigger) -> ArbitrationOutcome {
    ArbitrationOutcome {
        pass_fail: PassFail::U,
        score: 0,
        decision_source: DecisionSource::HumanRequired,
        criterion_verdicts: vec![],
        insights: TeacherInsights::default(),
        triage: TriageSignals {
            disagreement_score: 0.0,
            boundary_score: 0.0,
            evidence_gap_score: 0.0,
            self_reflection_score: 0.0,
            difficulty_score: 1.0,
            is_escalated: true,
            review_trigger: trigger,
        },
    }
}

/// Σ(score × weight) / Σ(weight), scaled ×1000 to the 0–100,000 range.
fn weighted_score(agent: &Agent, verdicts: &[CriterionVerdict]) -> u32 {
    let total_weight = agent.total_weight();
    if total_weight <= 0.0 || verdicts.is_empty() {
        return 0;
    }
    let weighted: f64 = agent
        .criteria_matrix
        .iter()
        .zip(verdicts)
        .map(|(c, v)| v.score * c.weight)
        .sum();
    let scaled = (weighted / total_weight * 1000.0).round();
    scaled.clamp(0.0, 100_000.0) as u32
}

fn merge_insights(a: &TeacherInsights, b: &TeacherInsights) -> TeacherInsights {
    let mut merged = a.clone();
    for (into, from) in [
        (&mut merged.strengths, &b.strengths),
        (&mut merged.weaknesses, &b.weaknesses),
        (&mut merged.misconceptions, &b.misconceptions),
        (&mut merged.next_steps, &b.next_steps),
    ] {
        for item in from {
            if !into.contains(item) {
                into.push(item.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Criterion, Stringency};
    use crate::pipeline::grading::{Formalia, RawCriterionResult};

    const STUDENT_TEXT: &str = "Water evaporates from oceans and lakes when heated by \
        the sun, rises as vapor into the cooler upper air, condenses into clouds, and \
        finally falls back to the surface as rain or snow, completing the cycle.";

    fn criterion(id: &str, mandatory: bool, weight: f64) -> Criterion {
        Criterion {
            id: id.to_string(),
            name: format!("Criterion {id}"),
            description: "Explains one stage of the water cycle".into(),
            indicator: "Names the stage and its physical cause".into(),
            mandatory,
            bloom_level: "understand".into(),
            bloom_index: 2,
            reliability: 0.9,
            weight,
        }
    }

    fn agent(criteria: Vec<Criterion>) -> Agent {
        Agent {
            id: uuid::Uuid::new_v4(),
            name: "water cycle".into(),
            criteria_matrix: criteria,
            min_words: 50,
            max_words: 500,
            stringency: Stringency::Standard,
            pass_threshold: 70_000,
            verification_prefix: None,
            owner_id: "teacher-1".into(),
            visibility: vec![],
            created_at: chrono::Utc::now(),
        }
    }

    fn raw(id: &str, met: bool, score: f64, quote: &str, reflection: f64) -> RawCriterionResult {
        RawCriterionResult {
            id: id.to_string(),
            met,
            score,
            evidence_quote: quote.to_string(),
            self_reflection_score: reflection,
        }
    }

    fn output(criteria: Vec<RawCriterionResult>) -> GradingOutput {
        GradingOutput {
            formalia: Formalia::default(),
            criteria,
            insights: TeacherInsights::default(),
        }
    }

    fn run(model_id: &str, output: Option<GradingOutput>) -> ModelRun {
        ModelRun {
            model_id: model_id.to_string(),
            output,
            latency_ms: 100,
            error: None,
        }
    }

    fn passing_output() -> GradingOutput {
        output(vec![raw(
            "c1",
            true,
            85.0,
            "Water evaporates from oceans and lakes when heated by the sun",
            90.0,
        )])
    }

    fn failing_output() -> GradingOutput {
        output(vec![raw(
            "c1",
            false,
            40.0,
            "condenses into clouds, and finally falls back to the surface",
            88.0,
        )])
    }

    #[test]
    fn fractional_scores_are_rescaled() {
        let a = agent(vec![criterion("c1", true, 1.0)]);
        let out = output(vec![raw(
            "c1",
            true,
            0.85,
            "Water evaporates from oceans and lakes when heated by the sun",
            0.9,
        )]);
        let normalized = normalize_grading(&a, STUDENT_TEXT, "m", &out);
        assert!((normalized.verdicts[0].score - 85.0).abs() < 1e-9);
        assert!((normalized.verdicts[0].self_reflection - 90.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        let a = agent(vec![criterion("c1", true, 1.0)]);
        let out = output(vec![raw(
            "c1",
            true,
            140.0,
            "Water evaporates from oceans and lakes when heated by the sun",
            -5.0,
        )]);
        let normalized = normalize_grading(&a, STUDENT_TEXT, "m", &out);
        assert_eq!(normalized.verdicts[0].score, 100.0);
        assert_eq!(normalized.verdicts[0].self_reflection, 0.0);
    }

    #[test]
    fn omitted_criterion_is_unmet() {
        let a = agent(vec![criterion("c1", true, 1.0), criterion("c2", false, 1.0)]);
        let out = output(vec![raw(
            "c1",
            true,
            85.0,
            "Water evaporates from oceans and lakes when heated by the sun",
            90.0,
        )]);
        let normalized = normalize_grading(&a, STUDENT_TEXT, "m", &out);
        assert_eq!(normalized.verdicts.len(), 2);
        assert!(!normalized.verdicts[1].met);
        assert!(!normalized.verdicts[1].evidence_valid);
        // c2 is not mandatory, so the matrix outcome still passes.
        assert_eq!(normalized.outcome, PassFail::G);
    }

    #[test]
    fn fabricated_quote_fails_evidence_check() {
        let a = agent(vec![criterion("c1", true, 1.0)]);
        let out = output(vec![raw(
            "c1",
            true,
            85.0,
            "Plants absorb groundwater through their roots and release it as vapor",
            90.0,
        )]);
        let normalized = normalize_grading(&a, STUDENT_TEXT, "m", &out);
        assert!(!normalized.verdicts[0].evidence_valid);
    }

    #[test]
    fn unmet_mandatory_criterion_fails_the_matrix() {
        let a = agent(vec![criterion("c1", true, 1.0), criterion("c2", false, 1.0)]);
        let out = output(vec![
            raw(
                "c1",
                false,
                60.0,
                "Water evaporates from oceans and lakes when heated by the sun",
                80.0,
            ),
            raw(
                "c2",
                true,
                90.0,
                "condenses into clouds, and finally falls back to the surface",
                85.0,
            ),
        ]);
        let normalized = normalize_grading(&a, STUDENT_TEXT, "m", &out);
        assert_eq!(normalized.outcome, PassFail::U);
    }

    #[test]
    fn agreement_produces_consensus_without_escalation() {
        let a = agent(vec![criterion("c1", true, 1.0)]);
        let dual = DualGrading {
            a: run("grader-a", Some(passing_output())),
            b: run("grader-b", Some(passing_output())),
        };
        let outcome = arbitrate(&a, STUDENT_TEXT, &dual, |_| {
            panic!("escalation must not fire on consensus")
        });
        assert_eq!(outcome.decision_source, DecisionSource::ModelsAb);
        assert_eq!(outcome.pass_fail, PassFail::G);
        assert!(!outcome.triage.is_escalated);
        // 85 × 1000, single criterion.
        assert_eq!(outcome.score, 85_000);
    }

    #[test]
    fn disagreement_escalates_and_adjudicator_decides() {
        let a = agent(vec![criterion("c1", true, 1.0)]);
        let dual = DualGrading {
            a: run("grader-a", Some(passing_output())),
            b: run("grader-b", Some(failing_output())),
        };
        let outcome = arbitrate(&a, STUDENT_TEXT, &dual, |prior| {
            assert_eq!(prior.len(), 2);
            run("adjudicator", Some(passing_output()))
        });
        assert_eq!(outcome.decision_source, DecisionSource::Adjudicator);
        assert_eq!(outcome.pass_fail, PassFail::G);
        assert!(outcome.triage.is_escalated);
        assert_eq!(outcome.triage.review_trigger, ReviewTrigger::Disagreement);
        assert_eq!(outcome.triage.disagreement_score, 1.0);
    }

    #[test]
    fn single_survivor_still_escalates() {
        let a = agent(vec![criterion("c1", true, 1.0)]);
        let dual = DualGrading {
            a: run("grader-a", Some(passing_output())),
            b: run("grader-b", None),
        };
        let outcome = arbitrate(&a, STUDENT_TEXT, &dual, |prior| {
            assert_eq!(prior.len(), 1);
            run("adjudicator", Some(passing_output()))
        });
        assert_eq!(outcome.decision_source, DecisionSource::Adjudicator);
        assert_eq!(outcome.triage.review_trigger, ReviewTrigger::ModelFailure);
    }

    #[test]
    fn both_failures_require_human_review() {
        let a = agent(vec![criterion("c1", true, 1.0)]);
        let dual = DualGrading {
            a: run("grader-a", None),
            b: run("grader-b", None),
        };
        let outcome = arbitrate(&a, STUDENT_TEXT, &dual, |_| {
            panic!("no escalation when nothing survived")
        });
        assert_eq!(outcome.decision_source, DecisionSource::HumanRequired);
        assert_eq!(outcome.pass_fail, PassFail::U);
        assert_eq!(outcome.score, 0);
    }

    #[test]
    fn adjudicator_failure_requires_human_review() {
        let a = agent(vec![criterion("c1", true, 1.0)]);
        let dual = DualGrading {
            a: run("grader-a", Some(passing_output())),
            b: run("grader-b", Some(failing_output())),
        };
        let outcome = arbitrate(&a, STUDENT_TEXT, &dual, |_| run("adjudicator", None));
        assert_eq!(outcome.decision_source, DecisionSource::HumanRequired);
    }

    #[test]
    fn boundary_score_fires_near_the_cutoff() {
        let near = output(vec![raw(
            "c1",
            true,
            72.0,
            "Water evaporates from oceans and lakes when heated by the sun",
            90.0,
        )]);
        let a = agent(vec![criterion("c1", true, 1.0)]);
        let g = normalize_grading(&a, STUDENT_TEXT, "m", &near);
        let signals = compute_signals(&[&g, &g]);
        assert_eq!(signals.boundary_score, 1.0);

        let far = normalize_grading(&a, STUDENT_TEXT, "m", &passing_output());
        let signals = compute_signals(&[&far, &far]);
        assert_eq!(signals.boundary_score, 0.0);
    }

    #[test]
    fn difficulty_weights_sum_as_specified() {
        // Disagreeing outcomes, scores near the boundary, all evidence
        // invalid, zero confidence: every component saturates.
        let a = agent(vec![criterion("c1", true, 1.0)]);
        let pass = normalize_grading(
            &a,
            STUDENT_TEXT,
            "m1",
            &output(vec![raw("c1", true, 71.0, "too short", 0.0)]),
        );
        let fail = normalize_grading(
            &a,
            STUDENT_TEXT,
            "m2",
            &output(vec![raw("c1", false, 68.0, "too short", 0.0)]),
        );
        let signals = compute_signals(&[&pass, &fail]);
        assert_eq!(signals.disagreement_score, 1.0);
        assert_eq!(signals.boundary_score, 1.0);
        assert_eq!(signals.evidence_gap_score, 1.0);
        assert_eq!(signals.self_reflection_score, 1.0);
        assert!((signals.difficulty_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn weighted_score_respects_criterion_weights() {
        let a = agent(vec![criterion("c1", true, 3.0), criterion("c2", false, 1.0)]);
        let out = output(vec![
            raw(
                "c1",
                true,
                100.0,
                "Water evaporates from oceans and lakes when heated by the sun",
                90.0,
            ),
            raw(
                "c2",
                true,
                60.0,
                "condenses into clouds, and finally falls back to the surface",
                90.0,
            ),
        ]);
        let dual = DualGrading {
            a: run("grader-a", Some(out.clone())),
            b: run("grader-b", Some(out)),
        };
        let outcome = arbitrate(&a, STUDENT_TEXT, &dual, |_| unreachable!());
        // (100×3 + 60×1) / 4 = 90 → 90,000.
        assert_eq!(outcome.score, 90_000);
    }

    #[test]
    fn consensus_merges_insights_without_duplicates() {
        let mut left = passing_output();
        left.insights.strengths = vec!["clear sequence".into()];
        let mut right = passing_output();
        right.insights.strengths = vec!["clear sequence".into(), "good vocabulary".into()];
        let a = agent(vec![criterion("c1", true, 1.0)]);
        let dual = DualGrading {
            a: run("grader-a", Some(left)),
            b: run("grader-b", Some(right)),
        };
        let outcome = arbitrate(&a, STUDENT_TEXT, &dual, |_| unreachable!());
        assert_eq!(
            outcome.insights.strengths,
            vec!["clear sequence".to_string(), "good vocabulary".to_string()]
        );
    }
}
