//! HTTP access to the rig: command submission and the remaining-work counter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    command::Command,
    protocol::{CounterResponse, CounterState},
};
use tracing::debug;
use url::Url;

use crate::{
    error::ClientError,
    event_stream::{EventStreamClient, ReconnectPolicy},
};

pub const COMMAND_ROUTE: &str = "post";
pub const COUNTER_ROUTE: &str = "cnt";
pub const EVENTS_ROUTE: &str = "events";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The request/response half of the device protocol.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Sends one command and returns the device's textual acknowledgment.
    async fn submit(&self, command: &Command) -> Result<String, ClientError>;
    async fn fetch_counter(&self) -> Result<CounterState, ClientError>;
}

#[derive(Debug, Clone)]
pub struct HttpDevice {
    http: Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpDevice {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            http: Client::new(),
            base_url: normalize_base_url(base_url)?,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self, route: &str) -> Url {
        // The base always ends in '/', so joining a bare segment cannot fail.
        self.base_url
            .join(route)
            .unwrap_or_else(|_| self.base_url.clone())
    }

    /// A push-channel client sharing this device's connection pool.
    pub fn event_stream(&self, policy: ReconnectPolicy) -> EventStreamClient {
        EventStreamClient::new(self.http.clone(), self.endpoint(EVENTS_ROUTE), policy)
    }

    async fn read_body(route: &'static str, response: Response) -> Result<Vec<u8>, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                route,
                status,
                body,
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(ClientError::transport(route))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl DeviceApi for HttpDevice {
    async fn submit(&self, command: &Command) -> Result<String, ClientError> {
        debug!(command = %command, "device: submitting command");
        let response = self
            .http
            .post(self.endpoint(COMMAND_ROUTE))
            .timeout(self.request_timeout)
            .form(&[("cmd", command.as_str())])
            .send()
            .await
            .map_err(ClientError::transport(COMMAND_ROUTE))?;
        let body = Self::read_body(COMMAND_ROUTE, response).await?;
        String::from_utf8(body).map_err(|err| {
            ClientError::protocol(COMMAND_ROUTE, format!("acknowledgment is not UTF-8: {err}"))
        })
    }

    async fn fetch_counter(&self) -> Result<CounterState, ClientError> {
        let response = self
            .http
            .get(self.endpoint(COUNTER_ROUTE))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(ClientError::transport(COUNTER_ROUTE))?;
        let body = Self::read_body(COUNTER_ROUTE, response).await?;
        let parsed: CounterResponse = serde_json::from_slice(&body).map_err(|err| {
            ClientError::protocol(COUNTER_ROUTE, format!("invalid counter payload: {err}"))
        })?;
        Ok(parsed.into())
    }
}

fn normalize_base_url(raw: &str) -> Result<Url, ClientError> {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let mut url = Url::parse(&with_scheme).map_err(|source| ClientError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
