//! Relay error taxonomy.

use thiserror::Error;

/// Errors surfaced by the relay engine.
///
/// Only `RateLimited` and `Generation` reach the original caller as hard
/// failures. `Speech` stops at the orchestrator (logged, turn degrades to
/// text-only) and `Config` can only occur at construction time.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Admission timed out — no credit became available within the wait budget.
    #[error("rate limited")]
    RateLimited,

    /// The generation collaborator failed.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The speech collaborator failed.
    #[error("speech synthesis failed: {0}")]
    Speech(String),

    /// Invalid construction parameters.
    #[error("invalid configuration: {0}")]
    Config(String),
}
