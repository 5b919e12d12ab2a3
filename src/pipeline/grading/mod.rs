pub mod types;
pub mod provider;
pub mod prompt;
pub mod parser;
pub mod orchestrator;

pub use orchestrator::{DualGrading, GradingOrchestrator, ModelRun};
pub use provider::{HttpChatModel, MockChatModel};
pub use types::{ChatModel, ChatRequest, Formalia, GradingOutput, RawCriterionResult};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GradingError {
    #[error("Model connection failed: {0}")]
    Connection(String),

    #[error("Model returned error (status {status}): {body}")]
    Provider { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Model call timed out after {secs}s")]
    Timeout { secs: u64 },
}
