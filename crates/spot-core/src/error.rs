//! Error taxonomy shared across the workspace.
//!
//! Each variant names an error *kind*, not a type — callers match on kind
//! to decide retry policy and HTTP status.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Request or configuration malformed; reported to caller, not retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Token invalid or agent-id/token mismatch; caller must re-register.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Unknown entity (agent, replica, command, instance).
    #[error("not found: {0}")]
    NotFound(String),

    /// Illegal state transition (e.g. promoting a terminated replica).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Cloud API, metadata, DB, or KV timeout; caller should retry with backoff.
    #[error("transient upstream error: {0}")]
    TransientUpstream(String),

    /// Required pricing/advisor/model data missing; caller should degrade
    /// gracefully rather than fail the whole operation.
    #[error("data gap: {0}")]
    DataGap(String),

    /// All candidates were filtered before ranking; pipeline returns STAY.
    #[error("safety abort: {0}")]
    SafetyAbort(String),

    /// Actuator step failed; verdict stands, command marked FAILED.
    #[error("execution failure: {0}")]
    ExecutionFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Auth(_) => "auth",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::TransientUpstream(_) => "transient_upstream",
            Error::DataGap(_) => "data_gap",
            Error::SafetyAbort(_) => "safety_abort",
            Error::ExecutionFailure(_) => "execution_failure",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether a caller should retry this error with backoff.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::TransientUpstream(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
