use thiserror::Error;

/// The backend's error code for a row-level security rejection.
pub const RLS_REJECTED: &str = "42501";

/// Failure taxonomy for calls against the hosted backend.
///
/// Nothing here is fatal to the process; every variant degrades to a
/// user-visible message and a reusable screen state.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network or TLS level failure.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The realtime socket failed to connect or dropped mid-frame.
    #[error("realtime channel: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The backend rejected the caller's identity. Carries the backend's
    /// error code when one was provided.
    #[error("unauthorized")]
    Unauthorized { code: Option<String> },

    /// The request was malformed before it ever left the client.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A single-row lookup matched nothing.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The backend answered with something we could not make sense of.
    #[error("backend protocol: {0}")]
    Protocol(String),
}

impl BackendError {
    /// True for the one rejection the send path retries once on.
    pub fn is_rls_rejection(&self) -> bool {
        matches!(self, Self::Unauthorized { code: Some(c) } if c == RLS_REJECTED)
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;
