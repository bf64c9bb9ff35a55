use reqwest::StatusCode;
use thiserror::Error;

/// Broad failure classes of a device exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connectivity failures and non-success statuses.
    Transport,
    /// The device answered, but not in the expected shape.
    Protocol,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid device url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request to /{route} failed: {source}")]
    Transport {
        route: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("/{route} returned status {status}: {body}")]
    Status {
        route: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("unexpected response from /{route}: {reason}")]
    Protocol { route: &'static str, reason: String },
    #[error("/{route} stream closed by device")]
    StreamClosed { route: &'static str },
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::InvalidUrl { .. }
            | Self::Transport { .. }
            | Self::Status { .. }
            | Self::StreamClosed { .. } => ErrorKind::Transport,
        }
    }

    pub(crate) fn transport(route: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Transport { route, source }
    }

    pub(crate) fn protocol(route: &'static str, reason: impl Into<String>) -> Self {
        Self::Protocol {
            route,
            reason: reason.into(),
        }
    }
}
