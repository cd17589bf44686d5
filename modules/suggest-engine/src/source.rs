//! Seams to the external collaborators.

use async_trait::async_trait;
use bsky_client::{BskyClient, Session};
use suggest_common::{Handle, Profile};
use suggest_stream::{EventStream, SuggestionStreamClient};

/// Fetches profile metadata for a handle.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self, handle: &Handle) -> anyhow::Result<Profile>;
}

/// Login plus follow-edge writes against the social network.
#[async_trait]
pub trait SocialGraph: Send + Sync {
    async fn login(&self, identifier: &str, secret: &str) -> anyhow::Result<Session>;

    /// Resolve a handle to its opaque account identifier (DID).
    async fn resolve_handle(&self, session: &Session, handle: &Handle) -> anyhow::Result<String>;

    /// URI of the follow record the session's account already holds for
    /// `subject_did`, if any.
    async fn following_record(&self, session: &Session, subject_did: &str) -> anyhow::Result<Option<String>>;

    /// Follow `subject_did`; returns the URI of the created follow record.
    async fn follow(&self, session: &Session, subject_did: &str) -> anyhow::Result<String>;

    async fn unfollow(&self, session: &Session, record_uri: &str) -> anyhow::Result<()>;
}

/// Opens suggestion subscriptions.
pub trait SuggestionSource: Send + Sync {
    /// Lazily subscribe; the returned stream ends with `StreamEvent::Closed`.
    fn subscribe(&self, handle: &Handle) -> EventStream;
}

#[async_trait]
impl ProfileSource for BskyClient {
    async fn fetch_profile(&self, handle: &Handle) -> anyhow::Result<Profile> {
        Ok(self.get_profile(handle).await?)
    }
}

#[async_trait]
impl SocialGraph for BskyClient {
    async fn login(&self, identifier: &str, secret: &str) -> anyhow::Result<Session> {
        Ok(self.create_session(identifier, secret).await?)
    }

    async fn resolve_handle(&self, session: &Session, handle: &Handle) -> anyhow::Result<String> {
        Ok(BskyClient::resolve_handle(self, session, handle).await?)
    }

    async fn following_record(&self, session: &Session, subject_did: &str) -> anyhow::Result<Option<String>> {
        Ok(self.follow_record(&session.did, subject_did).await?)
    }

    async fn follow(&self, session: &Session, subject_did: &str) -> anyhow::Result<String> {
        let record = BskyClient::follow(self, session, subject_did).await?;
        Ok(record.uri)
    }

    async fn unfollow(&self, session: &Session, record_uri: &str) -> anyhow::Result<()> {
        Ok(BskyClient::unfollow(self, session, record_uri).await?)
    }
}

impl SuggestionSource for SuggestionStreamClient {
    fn subscribe(&self, handle: &Handle) -> EventStream {
        SuggestionStreamClient::subscribe(self, handle)
    }
}
