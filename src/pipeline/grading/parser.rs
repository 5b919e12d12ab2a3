use serde::de::DeserializeOwned;

use super::types::GradingOutput;
use super::GradingError;

/// Parse a model's raw text into the grading schema.
///
/// Models wrap JSON in markdown fences or preamble prose often enough
/// that the parser peels those before giving up; anything that still
/// fails to satisfy the schema is a malformed output, which the
/// orchestrator retries exactly once.
pub fn parse_grading_output(raw: &str) -> Result<GradingOutput, GradingError> {
    parse_json_block(raw)
}

/// Tolerant JSON extraction for any expected schema.
pub fn parse_json_block<T: DeserializeOwned>(raw: &str) -> Result<T, GradingError> {
    let candidate = extract_json(raw)
        .ok_or_else(|| GradingError::MalformedOutput("no JSON object found".into()))?;

    serde_json::from_str(candidate)
        .map_err(|e| GradingError::MalformedOutput(format!("schema violation: {e}")))
}

/// Locate the JSON payload: fenced block first, then outermost braces.
fn extract_json(raw: &str) -> Option<&str> {
    if let Some(fenced) = extract_fenced(raw) {
        return Some(fenced);
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

fn extract_fenced(raw: &str) -> Option<&str> {
    let fence_start = raw.find("```")?;
    let after = &raw[fence_start + 3..];
    // Skip an optional language tag on the fence line.
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let fence_end = body.find("```")?;
    let inner = body[..fence_end].trim();
    if inner.starts_with('{') {
        Some(inner)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "formalia": {"word_count": 250, "within_word_bounds": true, "on_topic": true, "notes": ""},
        "criteria": [
            {"id": "c1", "met": true, "score": 80,
             "evidence_quote": "condenses into clouds before falling as precipitation",
             "self_reflection_score": 85}
        ],
        "insights": {"strengths": ["accurate sequence"], "weaknesses": [],
                     "misconceptions": [], "next_steps": []}
    }"#;

    #[test]
    fn bare_json_parses() {
        let output = parse_grading_output(VALID).unwrap();
        assert_eq!(output.criteria.len(), 1);
        assert_eq!(output.formalia.word_count, 250);
    }

    #[test]
    fn fenced_json_parses() {
        let raw = format!("Here is my assessment:\n```json\n{VALID}\n```\nDone.");
        let output = parse_grading_output(&raw).unwrap();
        assert_eq!(output.criteria[0].id, "c1");
    }

    #[test]
    fn json_with_preamble_prose_parses() {
        let raw = format!("I evaluated the essay carefully. {VALID}");
        assert!(parse_grading_output(&raw).is_ok());
    }

    #[test]
    fn prose_without_json_is_malformed() {
        let result = parse_grading_output("The essay seems fine to me overall.");
        assert!(matches!(result, Err(GradingError::MalformedOutput(_))));
    }

    #[test]
    fn truncated_json_is_malformed() {
        let result = parse_grading_output(r#"{"criteria": [{"id": "c1", "met": tru"#);
        assert!(matches!(result, Err(GradingError::MalformedOutput(_))));
    }

    #[test]
    fn wrong_schema_is_malformed() {
        let result = parse_grading_output(r#"{"verdict": "pass"}"#);
        assert!(matches!(result, Err(GradingError::MalformedOutput(_))));
    }
}
