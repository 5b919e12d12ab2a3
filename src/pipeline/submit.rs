//! End-to-end assessment of one student submission.
//!
//! Validates the access session, retrieves reference context, runs the
//! dual grading plus arbitration, generates feedback, encodes the
//! verification code and persists the submission record.

use chrono::Utc;
use rusqlite::Connection;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::{session, Agent, DecisionSource, PassFail, Submission};
use crate::pipeline::arbitration::{self, ArbitrationOutcome};
use crate::pipeline::codec;
use crate::pipeline::embedding::EmbeddingProvider;
use crate::pipeline::grading::GradingOrchestrator;
use crate::pipeline::index::{retrieve_context, RetrievalIndex};

/// Synchronous rejection ceiling for the student text.
pub const MAX_STUDENT_TEXT_CHARS: usize = 50_000;

const HUMAN_REVIEW_FEEDBACK: &str =
    "Your submission could not be assessed automatically and has been sent to \
     your teacher for manual review. You do not need to resubmit.";

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Student text is empty")]
    EmptyText,

    #[error("Student text exceeds {MAX_STUDENT_TEXT_CHARS} characters")]
    TextTooLarge,

    #[error("Access session not found")]
    SessionNotFound,

    #[error("Access session has not been accepted")]
    SessionNotAccepted,

    #[error("Access session has expired")]
    SessionExpired,

    #[error("Access session belongs to a different agent")]
    SessionAgentMismatch,

    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),
}

/// What the student-facing caller gets back.
#[derive(Debug)]
pub struct AssessmentResult {
    pub submission: Submission,
    pub feedback_text: String,
}

/// Grade one student text against an agent.
///
/// Input and session errors reject synchronously; model failures never
/// surface here — the arbitration engine absorbs them into the
/// `HUMAN_REQUIRED` path instead.
pub fn submit_assessment(
    conn: &Connection,
    agent_id: &Uuid,
    student_text: &str,
    access_token: &str,
    orchestrator: &GradingOrchestrator,
    embedder: &dyn EmbeddingProvider,
    index: Option<&dyn RetrievalIndex>,
) -> Result<AssessmentResult, SubmitError> {
    let student_text = student_text.trim();
    if student_text.is_empty() {
        return Err(SubmitError::EmptyText);
    }
    if student_text.chars().count() > MAX_STUDENT_TEXT_CHARS {
        return Err(SubmitError::TextTooLarge);
    }

    let session = repository::get_session(conn, access_token)?
        .ok_or(SubmitError::SessionNotFound)?;
    if session.agent_id != *agent_id {
        return Err(SubmitError::SessionAgentMismatch);
    }
    if !session.accepted {
        return Err(SubmitError::SessionNotAccepted);
    }
    if session.is_expired(Utc::now()) {
        return Err(SubmitError::SessionExpired);
    }

    let agent = repository::get_agent(conn, agent_id)?
        .ok_or(SubmitError::AgentNotFound(*agent_id))?;

    // Assign-once: the derived prefix is a pure function of the agent id,
    // so concurrent first assignments agree.
    let prefix = match agent.verification_prefix {
        Some(prefix) => prefix,
        None => repository::assign_verification_prefix(
            conn,
            agent_id,
            codec::derive_prefix(agent_id),
        )?,
    };

    let context = retrieve_context(conn, agent_id, student_text, embedder, index);
    let dual = orchestrator.grade(&agent, &context.text, student_text);
    let outcome = arbitration::arbitrate(&agent, student_text, &dual, |prior| {
        orchestrator.adjudicate(&agent, &context.text, student_text, prior)
    });

    let verification_code = encode_outcome(prefix, &outcome);
    let feedback_text = generate_feedback(orchestrator, &agent, student_text, &outcome);

    let submission = Submission {
        id: Uuid::new_v4(),
        agent_id: *agent_id,
        session_digest: session::session_digest(access_token),
        score: outcome.score,
        pass_fail: outcome.pass_fail,
        stringency: agent.stringency,
        decision_source: outcome.decision_source,
        rubric_snapshot: agent.criteria_matrix.clone(),
        criterion_verdicts: outcome.criterion_verdicts,
        triage: outcome.triage,
        insights: outcome.insights,
        verification_code,
        created_at: Utc::now(),
    };
    repository::insert_submission(conn, &submission)?;

    info!(
        agent_id = %agent_id,
        submission_id = %submission.id,
        score = submission.score,
        pass_fail = submission.pass_fail.as_str(),
        source = submission.decision_source.as_str(),
        "submission assessed"
    );
    Ok(AssessmentResult {
        submission,
        feedback_text,
    })
}

fn encode_outcome(prefix: u32, outcome: &ArbitrationOutcome) -> i64 {
    if outcome.decision_source == DecisionSource::HumanRequired {
        return codec::HUMAN_REQUIRED_CODE;
    }
    codec::encode(
        prefix,
        outcome.pass_fail == PassFail::G,
        outcome.score,
        outcome.triage.is_escalated,
    )
}

fn generate_feedback(
    orchestrator: &GradingOrchestrator,
    agent: &Agent,
    student_text: &str,
    outcome: &ArbitrationOutcome,
) -> String {
    if outcome.decision_source == DecisionSource::HumanRequired {
        return HUMAN_REVIEW_FEEDBACK.to_string();
    }

    let summary = verdict_summary(agent, outcome);
    orchestrator
        .feedback(
            agent.stringency,
            student_text,
            outcome.pass_fail == PassFail::G,
            &summary,
        )
        .unwrap_or_else(|| fallback_feedback(outcome))
}

/// Compact assessment summary that grounds the feedback call.
fn verdict_summary(agent: &Agent, outcome: &ArbitrationOutcome) -> String {
    let mut lines = vec![format!(
        "Overall: {} (weighted score {} of 100000)",
        outcome.pass_fail.as_str(),
        outcome.score
    )];
    for verdict in &outcome.criterion_verdicts {
        let name = agent
            .criterion(&verdict.criterion_id)
            .map(|c| c.name.as_str())
            .unwrap_or(verdict.criterion_id.as_str());
        lines.push(format!(
            "- {}: {} (score {:.0})",
            name,
            if verdict.met { "met" } else { "not met" },
            verdict.score
        ));
    }
    lines.join("\n")
}

fn fallback_feedback(outcome: &ArbitrationOutcome) -> String {
    match outcome.pass_fail {
        PassFail::G => "Your submission met the assessment criteria. Well done.".to_string(),
        PassFail::U => {
            "Your submission did not meet all assessment criteria yet. Review the \
             rubric and ask your teacher which areas to strengthen."
                .to_string()
        }
    }
}
