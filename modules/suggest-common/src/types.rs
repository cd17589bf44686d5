use serde::{Deserialize, Serialize};

use crate::handle::Handle;

// --- Profiles ---

/// Account metadata from the profile lookup API. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub did: String,
    #[serde(default)]
    pub handle: Option<Handle>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub followers_count: Option<u64>,
}

impl Profile {
    /// Display name when set and non-blank, otherwise the given fallback.
    pub fn label_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => fallback,
        }
    }
}

// --- Suggestions ---

/// One entry of a suggestion snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub handle: Handle,
    /// How many of the user's follows also follow this account.
    pub count: u64,
    /// Total follower count of the account, when the server knows it.
    #[serde(default)]
    pub followers: Option<u64>,
}

/// Server-side scan progress for one analysis run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub processed: u64,
    pub total: u64,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.processed == self.total
    }

    /// Still scanning with at least one follow processed.
    pub fn is_spinning(&self) -> bool {
        self.processed != 0 && self.processed != self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_decodes_api_shape() {
        let json = r#"{
            "did": "did:plc:abc",
            "handle": "alice.bsky.social",
            "displayName": "Alice",
            "avatar": "https://cdn.example/a.jpg",
            "description": "hello",
            "followersCount": 42,
            "labels": [],
            "viewer": {"muted": false}
        }"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.did, "did:plc:abc");
        assert_eq!(profile.label_or("x"), "Alice");
        assert_eq!(profile.followers_count, Some(42));
    }

    #[test]
    fn blank_display_name_falls_back() {
        let profile: Profile =
            serde_json::from_str(r#"{"did": "did:plc:x", "displayName": "  "}"#).unwrap();
        assert_eq!(profile.label_or("bob.bsky.social"), "bob.bsky.social");
    }

    #[test]
    fn spinner_only_mid_scan() {
        assert!(!Progress { processed: 0, total: 10 }.is_spinning());
        assert!(Progress { processed: 5, total: 10 }.is_spinning());
        assert!(!Progress { processed: 10, total: 10 }.is_spinning());
    }
}
