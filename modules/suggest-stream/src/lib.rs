pub mod error;
pub mod sse;
pub mod types;

pub use error::{Result, StreamError};
pub use sse::{SseDecoder, SseFrame};
pub use types::{ErrorPayload, StreamEvent, UpdatePayload};

use std::time::Duration;

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use suggest_common::Handle;

/// A lazy sequence of typed events from one subscription.
///
/// Nothing is requested until the stream is first polled, and the stream
/// always finishes with exactly one [`StreamEvent::Closed`].
pub type EventStream = BoxStream<'static, StreamEvent>;

/// HTTP client for the suggestion server's `/analyze/{handle}` stream.
#[derive(Clone)]
pub struct SuggestionStreamClient {
    client: reqwest::Client,
    base_url: String,
}

impl SuggestionStreamClient {
    /// `connect_timeout` bounds connection setup only; the stream itself is
    /// long-lived.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn analyze_url(&self, handle: &Handle) -> String {
        format!("{}/analyze/{}", self.base_url, handle)
    }

    /// Open a subscription for `handle`.
    pub fn subscribe(&self, handle: &Handle) -> EventStream {
        let client = self.client.clone();
        let url = self.analyze_url(handle);
        let handle = handle.clone();

        async_stream::stream! {
            match open(&client, &url).await {
                Ok(body) => {
                    tracing::info!(handle = %handle, "Suggestion stream opened");
                    let events = decode_events(body);
                    futures::pin_mut!(events);
                    while let Some(event) = events.next().await {
                        yield event;
                    }
                }
                Err(e) => {
                    tracing::warn!(handle = %handle, error = %e, "Failed to open suggestion stream");
                }
            }
            tracing::info!(handle = %handle, "Suggestion stream closed");
            yield StreamEvent::Closed;
        }
        .boxed()
    }
}

async fn open(
    client: &reqwest::Client,
    url: &str,
) -> Result<impl Stream<Item = reqwest::Result<Bytes>>> {
    let resp = client
        .get(url)
        .header("Accept", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(StreamError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(resp.bytes_stream())
}

/// Decode a byte stream into `update` and `error` events.
///
/// Ends when the body ends or a chunk fails; the caller appends `Closed`.
/// Frames with other event names are skipped.
pub fn decode_events<S, E>(body: S) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        let mut decoder = SseDecoder::new();
        futures::pin_mut!(body);

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!(error = %e, "Suggestion stream interrupted");
                    break;
                }
            };

            for frame in decoder.feed(&chunk) {
                match frame.event.as_str() {
                    "update" => {
                        yield StreamEvent::Update(frame.data);
                    }
                    "error" => {
                        yield StreamEvent::Error(frame.data);
                    }
                    other => tracing::debug!(event = other, "Ignoring unknown stream event"),
                }
            }
        }
    }
}
