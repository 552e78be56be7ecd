use std::path::PathBuf;
use thiserror::Error;

/// Consolidated error type for the consensus pipeline.
///
/// Worker-scoped failures are retried once and then folded into
/// `WorkerFailure`; adjudicator failures retry once and abort. Cache I/O
/// problems are deliberately absent here - the cache logs and continues.
#[derive(Error, Debug)]
pub enum ConsensusError {
    // === Repository enumeration ===
    #[error("Failed to enumerate source files in {path}: {reason}")]
    SourceEnumeration { path: PathBuf, reason: String },

    // === LM provider transport ===
    #[error("Transport error talking to LM provider: {0}")]
    Transport(String),

    #[error("LM provider returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("LM request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("LM provider returned no choices")]
    EmptyResponse,

    // === Output contract ===
    #[error("Failed to parse LM output: {0}")]
    Parse(String),

    // === Pipeline policy ===
    #[error("Worker {index} failed after {attempts} attempts: {last_error}")]
    WorkerFailure {
        index: usize,
        attempts: u32,
        last_error: String,
    },

    #[error("Adjudicator failed after {attempts} attempts: {last_error}")]
    AdjudicatorFailure { attempts: u32, last_error: String },

    #[error("Analysis cancelled")]
    Cancelled,

    // === Plumbing ===
    #[error("Invalid configuration at {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConsensusError {
    /// Classify a reqwest failure into the transport taxonomy.
    pub fn from_request(err: &reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            ConsensusError::Timeout {
                elapsed_ms: timeout_ms,
            }
        } else {
            ConsensusError::Transport(err.to_string())
        }
    }

    /// Errors that should never be retried.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ConsensusError::Cancelled)
    }
}
