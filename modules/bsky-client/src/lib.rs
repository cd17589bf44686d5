pub mod error;
pub mod types;

pub use error::{BskyError, Result};
pub use types::{AtUri, RecordRef, Session, FOLLOW_COLLECTION};

use std::time::Duration;

use reqwest::Response;
use serde::de::DeserializeOwned;
use suggest_common::{Handle, Profile};
use types::{
    CreateRecordInput, CreateSessionInput, DeleteRecordInput, FollowRecord, RelationshipsOutput,
    ResolveHandleOutput,
};

pub const PUBLIC_API_URL: &str = "https://public.api.bsky.app";
pub const SERVICE_URL: &str = "https://bsky.social";

/// Client for the Bluesky XRPC API.
///
/// Profile lookups go to the unauthenticated public AppView; sessions and
/// record writes go to the user's service.
pub struct BskyClient {
    client: reqwest::Client,
    public_api_url: String,
    service_url: String,
}

impl BskyClient {
    pub fn new(public_api_url: &str, service_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            public_api_url: public_api_url.trim_end_matches('/').to_string(),
            service_url: service_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch public profile metadata for a handle.
    pub async fn get_profile(&self, handle: &Handle) -> Result<Profile> {
        let url = format!("{}/xrpc/app.bsky.actor.getProfile", self.public_api_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("actor", handle.as_str())])
            .header("Accept", "application/json")
            .send()
            .await?;

        decode(resp).await
    }

    /// Log in with an identifier (handle or email) and an app password.
    pub async fn create_session(&self, identifier: &str, password: &str) -> Result<Session> {
        let url = format!("{}/xrpc/com.atproto.server.createSession", self.service_url);
        let resp = self
            .client
            .post(&url)
            .json(&CreateSessionInput {
                identifier,
                password,
            })
            .send()
            .await?;

        let session: Session = decode(resp).await?;
        tracing::debug!(did = %session.did, "Session created");
        Ok(session)
    }

    /// Resolve a handle to its DID.
    pub async fn resolve_handle(&self, session: &Session, handle: &Handle) -> Result<String> {
        let url = format!("{}/xrpc/com.atproto.identity.resolveHandle", self.service_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&session.access_jwt)
            .query(&[("handle", handle.as_str())])
            .send()
            .await?;

        let output: ResolveHandleOutput = decode(resp).await?;
        Ok(output.did)
    }

    /// URI of the follow record `actor_did` already holds for `subject_did`,
    /// if there is one. Read from the public AppView.
    pub async fn follow_record(&self, actor_did: &str, subject_did: &str) -> Result<Option<String>> {
        let url = format!("{}/xrpc/app.bsky.graph.getRelationships", self.public_api_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("actor", actor_did), ("others", subject_did)])
            .header("Accept", "application/json")
            .send()
            .await?;

        let output: RelationshipsOutput = decode(resp).await?;
        Ok(output
            .relationships
            .into_iter()
            .find(|r| r.did.as_deref() == Some(subject_did))
            .and_then(|r| r.following))
    }

    /// Create a follow record from the session's account to `subject_did`.
    pub async fn follow(&self, session: &Session, subject_did: &str) -> Result<RecordRef> {
        let url = format!("{}/xrpc/com.atproto.repo.createRecord", self.service_url);
        let input = CreateRecordInput {
            repo: &session.did,
            collection: FOLLOW_COLLECTION,
            record: FollowRecord {
                record_type: FOLLOW_COLLECTION,
                subject: subject_did,
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&session.access_jwt)
            .json(&input)
            .send()
            .await?;

        let record: RecordRef = decode(resp).await?;
        tracing::info!(subject = subject_did, uri = %record.uri, "Follow record created");
        Ok(record)
    }

    /// Delete a follow record previously returned by [`BskyClient::follow`].
    pub async fn unfollow(&self, session: &Session, record_uri: &str) -> Result<()> {
        let at = AtUri::parse(record_uri)?;
        let url = format!("{}/xrpc/com.atproto.repo.deleteRecord", self.service_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&session.access_jwt)
            .json(&DeleteRecordInput {
                repo: &session.did,
                collection: at.collection,
                rkey: at.rkey,
            })
            .send()
            .await?;

        ensure_success(resp).await?;
        tracing::info!(uri = record_uri, "Follow record deleted");
        Ok(())
    }
}

async fn ensure_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(BskyError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp)
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let resp = ensure_success(resp).await?;
    let body = resp.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}
