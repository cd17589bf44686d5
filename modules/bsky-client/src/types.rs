use serde::{Deserialize, Serialize};

use crate::error::{BskyError, Result};

pub const FOLLOW_COLLECTION: &str = "app.bsky.graph.follow";

// --- Sessions ---

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateSessionInput<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

/// An authenticated session. The access token is only ever sent back to the
/// service that issued it.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub did: String,
    pub handle: String,
    pub(crate) access_jwt: String,
}

impl Session {
    pub fn new(did: impl Into<String>, handle: impl Into<String>, access_jwt: impl Into<String>) -> Self {
        Self {
            did: did.into(),
            handle: handle.into(),
            access_jwt: access_jwt.into(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("did", &self.did)
            .field("handle", &self.handle)
            .field("access_jwt", &"<redacted>")
            .finish()
    }
}

// --- Identity ---

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResolveHandleOutput {
    pub did: String,
}

// --- Graph ---

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RelationshipsOutput {
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// One entry of `getRelationships`. Unknown actors come back without
/// `following`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Relationship {
    pub did: Option<String>,
    pub following: Option<String>,
}

// --- Records ---

#[derive(Debug, Clone, Serialize)]
pub(crate) struct FollowRecord<'a> {
    #[serde(rename = "$type")]
    pub record_type: &'static str,
    pub subject: &'a str,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateRecordInput<'a> {
    pub repo: &'a str,
    pub collection: &'static str,
    pub record: FollowRecord<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DeleteRecordInput<'a> {
    pub repo: &'a str,
    pub collection: &'a str,
    pub rkey: &'a str,
}

/// Reference to a record created in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecordRef {
    pub uri: String,
    pub cid: String,
}

/// The parts of an `at://{repo}/{collection}/{rkey}` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtUri<'a> {
    pub repo: &'a str,
    pub collection: &'a str,
    pub rkey: &'a str,
}

impl<'a> AtUri<'a> {
    pub fn parse(uri: &'a str) -> Result<Self> {
        let invalid = || BskyError::InvalidRecordUri(uri.to_string());
        let rest = uri.strip_prefix("at://").ok_or_else(invalid)?;
        let mut parts = rest.splitn(3, '/');
        let repo = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let collection = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let rkey = parts
            .next()
            .filter(|s| !s.is_empty() && !s.contains('/'))
            .ok_or_else(invalid)?;
        Ok(Self {
            repo,
            collection,
            rkey,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_follow_record_uri() {
        let uri = AtUri::parse("at://did:plc:me/app.bsky.graph.follow/3kabc").unwrap();
        assert_eq!(uri.repo, "did:plc:me");
        assert_eq!(uri.collection, FOLLOW_COLLECTION);
        assert_eq!(uri.rkey, "3kabc");
    }

    #[test]
    fn rejects_malformed_uris() {
        for bad in [
            "https://did:plc:me/app.bsky.graph.follow/3kabc",
            "at://did:plc:me/app.bsky.graph.follow",
            "at://did:plc:me/app.bsky.graph.follow/",
            "at:///app.bsky.graph.follow/3kabc",
        ] {
            assert!(AtUri::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn session_debug_hides_token() {
        let session: Session = serde_json::from_str(
            r#"{"did":"did:plc:me","handle":"me.bsky.social","accessJwt":"secret-token","refreshJwt":"r"}"#,
        )
        .unwrap();
        let printed = format!("{session:?}");
        assert!(!printed.contains("secret-token"));
        assert!(printed.contains("did:plc:me"));
    }

    #[test]
    fn relationships_tolerate_missing_fields() {
        let output: RelationshipsOutput = serde_json::from_str(
            r#"{"actor":"did:plc:me","relationships":[
                {"$type":"app.bsky.graph.defs#relationship","did":"did:plc:a","following":"at://did:plc:me/app.bsky.graph.follow/1"},
                {"$type":"app.bsky.graph.defs#notFoundActor","actor":"did:plc:gone","notFound":true}
            ]}"#,
        )
        .unwrap();
        assert_eq!(output.relationships.len(), 2);
        assert_eq!(
            output.relationships[0].following.as_deref(),
            Some("at://did:plc:me/app.bsky.graph.follow/1")
        );
        assert_eq!(output.relationships[1].did, None);
    }

    #[test]
    fn follow_record_serializes_with_type_tag() {
        let input = CreateRecordInput {
            repo: "did:plc:me",
            collection: FOLLOW_COLLECTION,
            record: FollowRecord {
                record_type: FOLLOW_COLLECTION,
                subject: "did:plc:them",
                created_at: "2024-01-01T00:00:00Z".to_string(),
            },
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["record"]["$type"], "app.bsky.graph.follow");
        assert_eq!(json["record"]["subject"], "did:plc:them");
        assert_eq!(json["collection"], "app.bsky.graph.follow");
    }
}
