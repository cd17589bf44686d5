use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Reasons a follow toggle did not go through. Messages are shown to the
/// user as a transient notice.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FollowError {
    #[error("Following is not available for this account")]
    NotOffered,

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Could not resolve handle: {0}")]
    Resolve(String),

    #[error("Follow failed: {0}")]
    Follow(String),

    #[error("Unfollow failed: {0}")]
    Unfollow(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Input(#[from] suggest_common::SuggestError),

    #[error(transparent)]
    Follow(#[from] FollowError),

    #[error("Unknown suggestion: {0}")]
    UnknownRow(String),
}
