use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SuggestError};

/// A normalized account handle, e.g. `alice.bsky.social`.
///
/// Only built through [`normalize_handle`] for user input, or
/// [`Handle::parse`] for handles that already arrive normalized from a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle(String);

impl Handle {
    /// Accept a handle that is already in normalized form.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SuggestError::InvalidHandle("empty handle".to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Public profile page for this handle.
    pub fn profile_url(&self) -> String {
        format!("https://bsky.app/profile/{}", self.0)
    }

    /// Compact label for narrow screens: `alice` for `alice.bsky.social`,
    /// the full handle for custom domains.
    pub fn short_name(&self) -> &str {
        if self.0.contains("bsky.social") {
            self.0.split('.').next().unwrap_or(&self.0)
        } else {
            &self.0
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Handle {
    type Error = SuggestError;

    fn try_from(value: String) -> Result<Self> {
        Handle::parse(&value)
    }
}

impl From<Handle> for String {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

/// Normalize a handle typed by the user.
///
/// Steps, in order: trim, drop non-ASCII characters, append `.{suffix}` when
/// no dot is present, strip one leading `@`, lower-case.
pub fn normalize_handle(input: &str, default_suffix: &str) -> Result<Handle> {
    let ascii: String = input.trim().chars().filter(char::is_ascii).collect();
    let ascii = ascii.trim();

    if ascii.trim_start_matches('@').is_empty() {
        return Err(SuggestError::InvalidHandle(format!(
            "'{}' has no usable characters",
            input.trim()
        )));
    }

    let mut handle = if ascii.contains('.') {
        ascii.to_string()
    } else {
        format!("{ascii}.{default_suffix}")
    };

    if let Some(rest) = handle.strip_prefix('@') {
        handle = rest.to_string();
    }

    Ok(Handle(handle.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUFFIX: &str = "bsky.social";

    #[test]
    fn bare_name_gets_default_suffix() {
        let handle = normalize_handle("Foo", SUFFIX).unwrap();
        assert_eq!(handle.as_str(), "foo.bsky.social");
    }

    #[test]
    fn leading_at_is_stripped_from_custom_domain() {
        let handle = normalize_handle("@bar.example.com", SUFFIX).unwrap();
        assert_eq!(handle.as_str(), "bar.example.com");
    }

    #[test]
    fn leading_at_is_stripped_after_suffixing() {
        let handle = normalize_handle("@Alice", SUFFIX).unwrap();
        assert_eq!(handle.as_str(), "alice.bsky.social");
    }

    #[test]
    fn non_ascii_is_dropped_before_suffixing() {
        let handle = normalize_handle("Ünïcode", SUFFIX).unwrap();
        assert_eq!(handle.as_str(), "ncode.bsky.social");
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let handle = normalize_handle("  theo.io \n", SUFFIX).unwrap();
        assert_eq!(handle.as_str(), "theo.io");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(normalize_handle("   ", SUFFIX).is_err());
        assert!(normalize_handle("@", SUFFIX).is_err());
        assert!(normalize_handle("ÜÖ", SUFFIX).is_err());
    }

    #[test]
    fn short_name_only_for_default_domain() {
        let default = Handle::parse("alice.bsky.social").unwrap();
        let custom = Handle::parse("theo.io").unwrap();
        assert_eq!(default.short_name(), "alice");
        assert_eq!(custom.short_name(), "theo.io");
    }

    #[test]
    fn deserializes_from_plain_string() {
        let handle: Handle = serde_json::from_str("\"Bob.Example.com\"").unwrap();
        assert_eq!(handle.as_str(), "bob.example.com");
        assert!(serde_json::from_str::<Handle>("\"  \"").is_err());
    }
}
