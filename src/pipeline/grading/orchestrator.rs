use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::models::{Agent, Stringency};

use super::parser::parse_grading_output;
use super::prompt::{self, JSON_ONLY_INSTRUCTION};
use super::types::{ChatModel, ChatRequest, GradingOutput};
use super::GradingError;

pub const PRIMARY_TIMEOUT_SECS: u64 = 15;
pub const ADJUDICATOR_TIMEOUT_SECS: u64 = 20;

const GRADING_TEMPERATURE: f32 = 0.1;

/// Outcome of one model's grading call: either a parsed output or the
/// error that sank it, plus the observed latency.
#[derive(Debug)]
pub struct ModelRun {
    pub model_id: String,
    pub output: Option<GradingOutput>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl ModelRun {
    fn timed_out(model_id: &str, budget: Duration) -> Self {
        Self {
            model_id: model_id.to_string(),
            output: None,
            latency_ms: budget.as_millis() as u64,
            error: Some(format!("timed out after {}s", budget.as_secs())),
        }
    }
}

/// The two primary gradings, in fixed A/B order.
#[derive(Debug)]
pub struct DualGrading {
    pub a: ModelRun,
    pub b: ModelRun,
}

impl DualGrading {
    pub fn surviving_outputs(&self) -> Vec<(&str, &GradingOutput)> {
        [&self.a, &self.b]
            .into_iter()
            .filter_map(|run| {
                run.output
                    .as_ref()
                    .map(|output| (run.model_id.as_str(), output))
            })
            .collect()
    }
}

/// Runs the two primary grading calls concurrently and, on escalation,
/// the adjudicator call. Each call is bounded by its own timeout; a call
/// that outlives its window is abandoned and its late result dropped
/// with the channel.
pub struct GradingOrchestrator {
    model_a: Arc<dyn ChatModel>,
    model_b: Arc<dyn ChatModel>,
    adjudicator: Arc<dyn ChatModel>,
    primary_timeout: Duration,
    adjudicator_timeout: Duration,
}

impl GradingOrchestrator {
    pub fn new(
        model_a: Arc<dyn ChatModel>,
        model_b: Arc<dyn ChatModel>,
        adjudicator: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            model_a,
            model_b,
            adjudicator,
            primary_timeout: Duration::from_secs(PRIMARY_TIMEOUT_SECS),
            adjudicator_timeout: Duration::from_secs(ADJUDICATOR_TIMEOUT_SECS),
        }
    }

    #[cfg(test)]
    pub fn with_timeouts(mut self, primary: Duration, adjudicator: Duration) -> Self {
        self.primary_timeout = primary;
        self.adjudicator_timeout = adjudicator;
        self
    }

    /// Grade the submission with both primary models, identical inputs.
    pub fn grade(
        &self,
        agent: &Agent,
        reference_context: &str,
        student_text: &str,
    ) -> DualGrading {
        let request = ChatRequest {
            system: prompt::system_prompt(agent.stringency),
            prompt: prompt::build_grading_prompt(
                &agent.criteria_matrix,
                agent.min_words,
                agent.max_words,
                reference_context,
                student_text,
            ),
            temperature: GRADING_TEMPERATURE,
        };

        let start = Instant::now();
        let rx_a = spawn_call(Arc::clone(&self.model_a), request.clone());
        let rx_b = spawn_call(Arc::clone(&self.model_b), request);

        let a = collect(rx_a, self.model_a.model_id(), start, self.primary_timeout);
        let b = collect(rx_b, self.model_b.model_id(), start, self.primary_timeout);

        info!(
            model_a = %a.model_id,
            model_b = %b.model_id,
            latency_a_ms = a.latency_ms,
            latency_b_ms = b.latency_ms,
            a_ok = a.output.is_some(),
            b_ok = b.output.is_some(),
            "dual grading complete"
        );
        DualGrading { a, b }
    }

    /// Escalation call: the adjudicator sees the surviving prior
    /// assessments alongside the original inputs.
    pub fn adjudicate(
        &self,
        agent: &Agent,
        reference_context: &str,
        student_text: &str,
        prior: &[(&str, &GradingOutput)],
    ) -> ModelRun {
        let request = ChatRequest {
            system: prompt::system_prompt(agent.stringency),
            prompt: prompt::build_adjudicator_prompt(
                &agent.criteria_matrix,
                agent.min_words,
                agent.max_words,
                reference_context,
                student_text,
                prior,
            ),
            temperature: GRADING_TEMPERATURE,
        };

        let start = Instant::now();
        let rx = spawn_call(Arc::clone(&self.adjudicator), request);
        let run = collect(
            rx,
            self.adjudicator.model_id(),
            start,
            self.adjudicator_timeout,
        );
        info!(
            model = %run.model_id,
            latency_ms = run.latency_ms,
            ok = run.output.is_some(),
            "adjudication complete"
        );
        run
    }

    /// One-shot feedback call against the adjudicator model. A failure
    /// here never fails the submission; the caller substitutes fallback
    /// text.
    pub fn feedback(
        &self,
        stringency: Stringency,
        student_text: &str,
        passed: bool,
        verdict_summary: &str,
    ) -> Option<String> {
        let request = ChatRequest {
            system: prompt::system_prompt(stringency),
            prompt: prompt::build_feedback_prompt(student_text, passed, verdict_summary),
            temperature: 0.4,
        };
        match self.adjudicator.complete(&request) {
            Ok(text) => Some(text.trim().to_string()),
            Err(e) => {
                warn!(error = %e, "feedback generation failed, using fallback text");
                None
            }
        }
    }
}

fn spawn_call(
    model: Arc<dyn ChatModel>,
    request: ChatRequest,
) -> mpsc::Receiver<Result<GradingOutput, GradingError>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = call_with_retry(model.as_ref(), request);
        // The receiver is gone when the call outlived its window.
        let _ = tx.send(result);
    });
    rx
}

/// One attempt, then on malformed output exactly one retry at
/// temperature 0 with the JSON-only instruction appended. Transport
/// errors are not retried.
fn call_with_retry(
    model: &dyn ChatModel,
    request: ChatRequest,
) -> Result<GradingOutput, GradingError> {
    let raw = model.complete(&request)?;
    match parse_grading_output(&raw) {
        Ok(output) => Ok(output),
        Err(GradingError::MalformedOutput(reason)) => {
            warn!(
                model = model.model_id(),
                reason = %reason,
                "malformed grading output, retrying once at temperature 0"
            );
            let retry = ChatRequest {
                system: request.system,
                prompt: format!("{}{JSON_ONLY_INSTRUCTION}", request.prompt),
                temperature: 0.0,
            };
            let raw = model.complete(&retry)?;
            parse_grading_output(&raw)
        }
        Err(e) => Err(e),
    }
}

/// Wait for a call's result within the window measured from the shared
/// start instant, so two sequential `collect`s still bound each call to
/// the same wall-clock budget.
fn collect(
    rx: mpsc::Receiver<Result<GradingOutput, GradingError>>,
    model_id: &str,
    start: Instant,
    budget: Duration,
) -> ModelRun {
    let remaining = budget.saturating_sub(start.elapsed());
    match rx.recv_timeout(remaining) {
        Ok(Ok(output)) => ModelRun {
            model_id: model_id.to_string(),
            output: Some(output),
            latency_ms: start.elapsed().as_millis() as u64,
            error: None,
        },
        Ok(Err(e)) => {
            warn!(model = model_id, error = %e, "grading call failed");
            ModelRun {
                model_id: model_id.to_string(),
                output: None,
                latency_ms: start.elapsed().as_millis() as u64,
                error: Some(e.to_string()),
            }
        }
        Err(_) => {
            warn!(model = model_id, budget_secs = budget.as_secs(), "grading call timed out");
            ModelRun::timed_out(model_id, budget)
        }
    }
}
