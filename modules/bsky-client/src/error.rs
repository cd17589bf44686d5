use thiserror::Error;

pub type Result<T> = std::result::Result<T, BskyError>;

#[derive(Debug, Error)]
pub enum BskyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid record URI: {0}")]
    InvalidRecordUri(String),
}

impl From<reqwest::Error> for BskyError {
    fn from(err: reqwest::Error) -> Self {
        BskyError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for BskyError {
    fn from(err: serde_json::Error) -> Self {
        BskyError::Decode(err.to_string())
    }
}
