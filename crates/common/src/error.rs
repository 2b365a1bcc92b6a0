use std::time::Duration;
use thiserror::Error;

/// Malformed request shape or out-of-range value. Never retried,
/// surfaced to the caller immediately.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("{field} out of range: {detail}")]
    OutOfRange { field: &'static str, detail: String },

    #[error("{field} too long: {len} bytes exceeds limit of {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// Failure from an optimization provider. Transient kinds are retried
/// exactly once before falling back.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider timed out: {0}")]
    Timeout(String),

    #[error("provider rate limited: {0}")]
    RateLimited(String),

    #[error("provider transport failure: {0}")]
    Transport(String),

    #[error("provider response failed validation: {0}")]
    InvalidResponse(String),

    #[error("provider rejected request: {0}")]
    Rejected(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::RateLimited(_)
                | ProviderError::Transport(_)
        )
    }
}

/// Failure from a backend adapter operation.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("connect to {target} failed: {detail}")]
    Connect { target: String, detail: String },

    #[error("credentials rejected by {target}")]
    Auth { target: String },

    #[error("backend does not support {what}")]
    Unsupported { what: String },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Terminal failure of the optimization pipeline. Provider failures are
/// absorbed by the fallback chain; only input errors and total provider
/// exhaustion reach the caller.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("all optimization providers failed: primary: {primary}; fallback: {fallback}")]
    ProvidersExhausted { primary: String, fallback: String },
}

/// Failure starting or looking up an apply job.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("apply job already active for camera {camera_id}")]
    Busy { camera_id: String },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("no backend registered for adapter kind '{0}'")]
    UnknownBackend(String),
}
