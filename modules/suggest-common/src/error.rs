use thiserror::Error;

pub type Result<T> = std::result::Result<T, SuggestError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SuggestError {
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
