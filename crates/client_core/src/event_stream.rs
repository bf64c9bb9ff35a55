//! The device's server-sent event channel.
//!
//! One [`EventStreamClient`] owns one connection at a time. When the
//! connection drops it reports the error, waits, and reconnects with
//! exponential backoff; the handler only observes these transitions.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{
    header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE},
    Client,
};
use shared::protocol::DeviceEvent;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::ClientError,
    sse::{SseDecoder, SseItem},
    transport::EVENTS_ROUTE,
};

const LAST_EVENT_ID: &str = "Last-Event-ID";
const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Mirrors the states a browser `EventSource` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
}

/// Receives lifecycle transitions and messages from an [`EventStreamClient`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_open(&self);
    async fn on_message(&self, event: DeviceEvent);
    /// `ready_state` is the stream's state when the error was observed:
    /// `Open` for a bad frame on a live connection, `Connecting` after the
    /// connection was lost.
    async fn on_error(&self, ready_state: ReadyState, error: &ClientError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl ReconnectPolicy {
    fn next_delay(&self, current: Duration) -> Duration {
        current
            .saturating_mul(self.multiplier.max(1))
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct EventStreamClient {
    http: Client,
    url: Url,
    policy: ReconnectPolicy,
}

impl EventStreamClient {
    pub fn new(http: Client, url: Url, policy: ReconnectPolicy) -> Self {
        Self { http, url, policy }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn spawn(self, handler: Arc<dyn EventHandler>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(handler).await })
    }

    /// Runs until the task is aborted.
    pub async fn run(self, handler: Arc<dyn EventHandler>) {
        let mut decoder = SseDecoder::new();
        let mut delay = self.policy.initial_delay;
        loop {
            let mut opened = false;
            let error = self
                .stream_once(handler.as_ref(), &mut decoder, &mut opened)
                .await;
            decoder.reset();
            if opened {
                delay = decoder
                    .retry()
                    .unwrap_or(self.policy.initial_delay)
                    .min(self.policy.max_delay);
            }
            warn!(
                url = %self.url,
                %error,
                retry_in_ms = delay.as_millis() as u64,
                "events: connection lost"
            );
            handler.on_error(ReadyState::Connecting, &error).await;
            tokio::time::sleep(delay).await;
            delay = self.policy.next_delay(delay);
        }
    }

    /// Holds one connection open and returns the error that ended it.
    async fn stream_once(
        &self,
        handler: &dyn EventHandler,
        decoder: &mut SseDecoder,
        opened: &mut bool,
    ) -> ClientError {
        let mut request = self
            .http
            .get(self.url.clone())
            .header(ACCEPT, EVENT_STREAM_MIME)
            .header(CACHE_CONTROL, "no-cache");
        if let Some(last_event_id) = decoder.last_event_id() {
            request = request.header(LAST_EVENT_ID, last_event_id);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(source) => return ClientError::transport(EVENTS_ROUTE)(source),
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return ClientError::Status {
                route: EVENTS_ROUTE,
                status,
                body,
            };
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with(EVENT_STREAM_MIME) {
            return ClientError::protocol(
                EVENTS_ROUTE,
                format!("expected {EVENT_STREAM_MIME}, got '{content_type}'"),
            );
        }

        *opened = true;
        info!(url = %self.url, "events: stream opened");
        handler.on_open().await;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(source) => return ClientError::transport(EVENTS_ROUTE)(source),
            };
            for item in decoder.feed(&chunk) {
                match item {
                    SseItem::Event(event) => {
                        debug!(channel = %event.event, data = %event.data, "events: received");
                        handler.on_message(event.into()).await;
                    }
                    SseItem::Invalid(reason) => {
                        let error = ClientError::protocol(EVENTS_ROUTE, reason);
                        debug!(%error, "events: skipped malformed line");
                        handler.on_error(ReadyState::Open, &error).await;
                    }
                }
            }
        }
        ClientError::StreamClosed {
            route: EVENTS_ROUTE,
        }
    }
}

#[cfg(test)]
#[path = "tests/event_stream_tests.rs"]
mod tests;
