//! Rubrica — evidence-grounded automated assessment.
//!
//! Teacher-uploaded reference material is extracted, chunked, embedded
//! and indexed per agent; student submissions are graded by two
//! independent models whose judgments the arbitration engine reconciles,
//! escalating to an adjudicator on disagreement or high difficulty. The
//! final verdict is encoded into an LMS-compatible verification code.

pub mod models;
pub mod db;
pub mod pipeline;
pub mod routing;

use tracing_subscriber::EnvFilter;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_LOG_FILTER: &str = "rubrica=info";

/// Initialize structured logging. Honors `RUST_LOG` when set; safe to
/// call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .try_init();
}
