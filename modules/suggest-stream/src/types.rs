use serde::{Deserialize, Serialize};
use suggest_common::{Progress, Suggestion};

/// One event delivered by a suggestion subscription.
///
/// Payloads stay raw so the consumer decides how to treat malformed data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An `update` event: a complete snapshot, not a delta.
    Update(String),
    /// An `error` event with whatever payload the server sent.
    Error(String),
    /// The channel ended: end of body, transport failure or refused connection.
    Closed,
}

/// Body of an `update` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub results: Vec<Suggestion>,
    pub processed_count: u64,
    pub total_count: u64,
}

impl UpdatePayload {
    pub fn parse(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }

    pub fn progress(&self) -> Progress {
        Progress {
            processed: self.processed_count,
            total: self.total_count,
        }
    }
}

/// Body of an `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

impl ErrorPayload {
    /// `None` for payloads that do not carry a structured error.
    pub fn parse(data: &str) -> Option<Self> {
        serde_json::from_str(data).ok()
    }
}
