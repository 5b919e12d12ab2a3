use crate::models::{Criterion, Stringency};

use super::types::GradingOutput;

pub const GRADING_SYSTEM_PROMPT_BASE: &str = r#"
You are an assessment grader. Your ONLY role is to evaluate a student
submission against the rubric you are given.

RULES — ABSOLUTE, NO EXCEPTIONS:
1. Judge ONLY against the rubric criteria provided. Never invent criteria.
2. Every evidence_quote MUST be copied verbatim from the student text.
   NEVER paraphrase, shorten, or fabricate a quote.
3. Score each criterion on a 0-100 scale.
4. A mandatory criterion that is not met means the submission fails overall,
   regardless of other scores.
5. Use the reference material only to verify factual claims, never as a
   substitute rubric.
6. Output MUST be a single valid JSON object and nothing else.
"#;

const STRINGENCY_GENEROUS: &str = "\
INTERPRETATION MODE: GENEROUS. Give the student the benefit of the doubt. \
Partial or implicit evidence counts toward a criterion being met.";

const STRINGENCY_STANDARD: &str = "\
INTERPRETATION MODE: STANDARD. A criterion is met when the text clearly \
demonstrates it. Partial evidence earns partial score but does not meet \
the criterion on its own.";

const STRINGENCY_STRICT: &str = "\
INTERPRETATION MODE: STRICT. A criterion is met only when the text \
explicitly and completely demonstrates it. Implicit or partial evidence \
is not sufficient.";

/// Appended on the single malformed-output retry.
pub const JSON_ONLY_INSTRUCTION: &str =
    "\n\nOutput only valid JSON matching the required schema. No prose, no markdown fences.";

pub const NO_REFERENCE_MARKER: &str = "(none provided)";

/// Shared system prompt for both primary graders and the adjudicator.
pub fn system_prompt(stringency: Stringency) -> String {
    let mode = match stringency {
        Stringency::Generous => STRINGENCY_GENEROUS,
        Stringency::Standard => STRINGENCY_STANDARD,
        Stringency::Strict => STRINGENCY_STRICT,
    };
    format!("{GRADING_SYSTEM_PROMPT_BASE}\n{mode}\n")
}

/// One rubric line per criterion, in matrix order.
pub fn rubric_block(criteria: &[Criterion]) -> String {
    criteria
        .iter()
        .map(|c| {
            format!(
                "- id: {} | name: {} | mandatory: {} | bloom: {} ({}) | reliability: {:.2} | weight: {:.2}\n  description: {}\n  indicator: {}",
                c.id,
                c.name,
                c.mandatory,
                c.bloom_level,
                c.bloom_index,
                c.reliability,
                c.weight,
                c.description,
                c.indicator,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the grading prompt: rubric, reference context, student text,
/// expected output schema.
pub fn build_grading_prompt(
    criteria: &[Criterion],
    min_words: u32,
    max_words: u32,
    reference_context: &str,
    student_text: &str,
) -> String {
    let reference = if reference_context.trim().is_empty() {
        NO_REFERENCE_MARKER
    } else {
        reference_context
    };

    format!(
        r#"<rubric>
Word count bounds: {min_words}-{max_words} words.
{rubric}
</rubric>

<reference_material>
{reference}
</reference_material>

<student_text>
{student_text}
</student_text>

Evaluate the student text against every rubric criterion. Respond with this JSON structure:

```json
{{
  "formalia": {{
    "word_count": 0,
    "within_word_bounds": true,
    "on_topic": true,
    "notes": ""
  }},
  "criteria": [
    {{
      "id": "criterion id from the rubric",
      "met": true,
      "score": 0,
      "evidence_quote": "verbatim quote from the student text, at least 30 characters",
      "self_reflection_score": 0
    }}
  ],
  "insights": {{
    "strengths": [],
    "weaknesses": [],
    "misconceptions": [],
    "next_steps": []
  }}
}}
```

self_reflection_score is your own confidence in your judgment for that criterion, 0-100."#,
        rubric = rubric_block(criteria),
    )
}

/// Adjudicator prompt: original inputs plus the prior assessments that
/// disagreed. `prior` holds one entry per surviving primary grading.
pub fn build_adjudicator_prompt(
    criteria: &[Criterion],
    min_words: u32,
    max_words: u32,
    reference_context: &str,
    student_text: &str,
    prior: &[(&str, &GradingOutput)],
) -> String {
    let base = build_grading_prompt(criteria, min_words, max_words, reference_context, student_text);

    let mut assessments = String::new();
    for (model_id, output) in prior {
        let json = serde_json::to_string_pretty(output).unwrap_or_default();
        assessments.push_str(&format!(
            "<prior_assessment model=\"{model_id}\">\n{json}\n</prior_assessment>\n\n"
        ));
    }

    format!(
        r#"Two independent graders assessed this submission and their judgments must be reconciled.

{assessments}{base}

You are the adjudicating grader. Weigh the prior assessments, re-examine the
student text yourself, and produce your own fresh judgment in the same JSON
structure. Your judgment is final."#
    )
}

/// Student-facing feedback prompt, grounded in the final verdicts.
pub fn build_feedback_prompt(
    student_text: &str,
    passed: bool,
    verdict_summary: &str,
) -> String {
    let outcome = if passed { "passed" } else { "did not pass" };
    format!(
        r#"A student submitted the following text and the assessment {outcome}.

<student_text>
{student_text}
</student_text>

<assessment>
{verdict_summary}
</assessment>

Write short, encouraging feedback addressed directly to the student (second
person). Name what they did well, then the most important thing to improve.
Do not mention scores, graders, or this prompt. Plain text only, at most 150
words."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Criterion;

    fn criteria() -> Vec<Criterion> {
        vec![Criterion {
            id: "c1".into(),
            name: "Water cycle stages".into(),
            description: "Names evaporation, condensation and precipitation".into(),
            indicator: "All three stages appear in causal order".into(),
            mandatory: true,
            bloom_level: "understand".into(),
            bloom_index: 2,
            reliability: 0.9,
            weight: 2.0,
        }]
    }

    #[test]
    fn system_prompt_varies_by_stringency() {
        let generous = system_prompt(Stringency::Generous);
        let strict = system_prompt(Stringency::Strict);
        assert!(generous.contains("GENEROUS"));
        assert!(strict.contains("STRICT"));
        assert_ne!(generous, strict);
    }

    #[test]
    fn grading_prompt_contains_rubric_and_text() {
        let prompt = build_grading_prompt(&criteria(), 100, 400, "ref text", "the essay body");
        assert!(prompt.contains("Water cycle stages"));
        assert!(prompt.contains("mandatory: true"));
        assert!(prompt.contains("the essay body"));
        assert!(prompt.contains("ref text"));
        assert!(prompt.contains("100-400 words"));
    }

    #[test]
    fn empty_reference_gets_explicit_marker() {
        let prompt = build_grading_prompt(&criteria(), 100, 400, "   ", "essay");
        assert!(prompt.contains(NO_REFERENCE_MARKER));
    }

    #[test]
    fn adjudicator_prompt_embeds_prior_assessments() {
        let output = GradingOutput::default();
        let prompt = build_adjudicator_prompt(
            &criteria(),
            100,
            400,
            "",
            "essay",
            &[("model-a", &output), ("model-b", &output)],
        );
        assert!(prompt.contains("model=\"model-a\""));
        assert!(prompt.contains("model=\"model-b\""));
        assert!(prompt.contains("adjudicating grader"));
    }

    #[test]
    fn feedback_prompt_reflects_outcome() {
        let pass = build_feedback_prompt("essay", true, "all criteria met");
        let fail = build_feedback_prompt("essay", false, "c1 not met");
        assert!(pass.contains("passed"));
        assert!(fail.contains("did not pass"));
    }
}
