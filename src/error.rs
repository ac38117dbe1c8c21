use thiserror::Error;

/// Main error type for the session client.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No reading session is active.
    #[error("No active reading session")]
    NoActiveSession,

    /// Operation not allowed in the current session state.
    #[error("Invalid transition: {0}")]
    InvalidTransition(&'static str),

    /// Transport error talking to the session service.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The session service answered with a non-success status.
    #[error("Session service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        body: String,
    },

    /// The session service could not complete the call.
    #[error("Session service unavailable: {0}")]
    Unavailable(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the session client.
pub type Result<T> = std::result::Result<T, SessionError>;
