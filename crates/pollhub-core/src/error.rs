use thiserror::Error;

/// Every failure a pollhub use case can produce.
#[derive(Error, Debug)]
pub enum PollError {
    /// Malformed input the caller can correct.
    #[error("{0}")]
    Validation(String),

    #[error("User already exists")]
    DuplicateUsername,

    /// Deliberately identical for unknown users and wrong passwords.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing, malformed or expired bearer token.
    #[error("Not authorized, token missing or invalid")]
    Unauthenticated,

    /// Authenticated, but not the owner of the poll.
    #[error("Not authorized to modify this poll.")]
    Forbidden,

    #[error("Poll not found.")]
    NotFound,

    #[error("Invalid option selected.")]
    InvalidOption,

    #[error("You have already voted on this poll.")]
    AlreadyVoted,

    /// Repository unavailable or returned corrupt data. Never shown verbatim
    /// to callers.
    #[error("Storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl PollError {
    pub fn validation(message: impl Into<String>) -> Self {
        PollError::Validation(message.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PollError>;
