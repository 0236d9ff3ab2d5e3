use thiserror::Error;

/// Fallback message when a transport failure carries no text of its own.
pub const GENERIC_FAILURE: &str = "Failed to get response";

/// Every failure a query or artifact fetch can end in.
///
/// Errors are cloned into the controller's published state, so variants hold
/// plain messages rather than the underlying `reqwest`/`io` errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Please enter a legal question before submitting")]
    EmptyQuery,
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Artifact(String),
}

impl QueryError {
    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            QueryError::Transport(GENERIC_FAILURE.to_string())
        } else {
            QueryError::Transport(message)
        }
    }

    pub fn artifact(message: impl Into<String>) -> Self {
        QueryError::Artifact(message.into())
    }

    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::Transport(_))
    }
}
