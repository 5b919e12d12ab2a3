//! Rubric authoring assistance for teachers.
//!
//! Single model calls grounded by the same retrieval context the
//! graders see: `improve_criterion` turns a rough sketch into a
//! markdown rubric table, `analyze_criterion` into a structured
//! machine-checkable indicator.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::pipeline::embedding::EmbeddingProvider;
use crate::pipeline::grading::parser::parse_json_block;
use crate::pipeline::grading::{ChatModel, ChatRequest, GradingError};
use crate::pipeline::index::{retrieve_context, RetrievalIndex};

const ASSIST_SYSTEM_PROMPT: &str = r#"
You are a rubric design assistant for teachers. You turn rough criterion
sketches into precise, machine-checkable assessment criteria.

RULES:
1. Ground suggestions in the reference material when it is provided.
2. Every criterion must be observable in a student text, never in the
   student's intent.
3. Use Bloom taxonomy levels: remember, understand, apply, analyze,
   evaluate, create.
"#;

const ASSIST_TEMPERATURE: f32 = 0.3;

/// Structured result of analyzing a criterion sketch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorAnalysis {
    pub name: String,
    pub description: String,
    /// Machine-checkable indicator the graders anchor on.
    pub indicator: String,
    pub bloom_level: String,
    pub bloom_index: u8,
    #[serde(default)]
    pub mandatory_recommended: bool,
}

/// Expand a criterion sketch into a markdown rubric table.
pub fn improve_criterion(
    conn: &Connection,
    agent_id: &Uuid,
    sketch: &str,
    task_description: &str,
    model: &dyn ChatModel,
    embedder: &dyn EmbeddingProvider,
    index: Option<&dyn RetrievalIndex>,
) -> Result<String, GradingError> {
    let context = retrieve_context(conn, agent_id, sketch, embedder, index);
    let request = ChatRequest {
        system: ASSIST_SYSTEM_PROMPT.to_string(),
        prompt: format!(
            r#"<task_description>
{task_description}
</task_description>

<reference_material>
{}
</reference_material>

<criterion_sketch>
{sketch}
</criterion_sketch>

Rewrite the sketch as a markdown table with the columns
| Criterion | Description | Indicator | Bloom level | Mandatory | Weight |
containing one refined criterion per row. Output only the table."#,
            context.text
        ),
        temperature: ASSIST_TEMPERATURE,
    };

    let table = model.complete(&request)?.trim().to_string();
    info!(agent_id = %agent_id, model = model.model_id(), "criterion improvement generated");
    Ok(table)
}

/// Analyze a criterion sketch into a structured indicator.
pub fn analyze_criterion(
    conn: &Connection,
    agent_id: &Uuid,
    sketch: &str,
    task_description: &str,
    model: &dyn ChatModel,
    embedder: &dyn EmbeddingProvider,
    index: Option<&dyn RetrievalIndex>,
) -> Result<IndicatorAnalysis, GradingError> {
    let context = retrieve_context(conn, agent_id, sketch, embedder, index);
    let request = ChatRequest {
        system: ASSIST_SYSTEM_PROMPT.to_string(),
        prompt: format!(
            r#"<task_description>
{task_description}
</task_description>

<reference_material>
{}
</reference_material>

<criterion_sketch>
{sketch}
</criterion_sketch>

Analyze the sketch and respond with exactly this JSON structure:

```json
{{
  "name": "short criterion name",
  "description": "what the student text must demonstrate",
  "indicator": "machine-checkable indicator a grader can verify",
  "bloom_level": "remember | understand | apply | analyze | evaluate | create",
  "bloom_index": 1,
  "mandatory_recommended": false
}}
```"#,
            context.text
        ),
        temperature: ASSIST_TEMPERATURE,
    };

    let raw = model.complete(&request)?;
    let analysis: IndicatorAnalysis = parse_json_block(&raw)?;
    info!(agent_id = %agent_id, model = model.model_id(), "criterion analysis generated");
    Ok(analysis)
}
