use serde::{Serialize, Serializer};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::HostKey;

/// Possible errors when fetching with `volley_lib`
///
/// The type is cheap to clone: one outcome is handed both to the caller's
/// [`ScheduledFuture`](crate::ScheduledFuture) and to the completion stream.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Every tracked attempt to this host timed out.
    /// The circuit breaker declared the host offline.
    #[error("Host {0} is offline: all pending requests timed out")]
    OfflineHost(HostKey),

    /// The attempt did not receive a response in time and no retries are left
    #[error("Request to {url} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// The URL that was requested
        url: Url,
        /// The deadline the last attempt was given
        timeout: Duration,
    },

    /// Network error while handling request
    #[error("Network error while trying to connect to an endpoint")]
    NetworkRequest(#[source] Arc<reqwest::Error>),

    /// Cannot read the body of the received response
    #[error("Error reading response body: {0}")]
    ReadResponseBody(#[source] Arc<reqwest::Error>),

    /// The HTTP client cannot be built
    #[error("Error creating HTTP client: {0}")]
    BuildClient(#[source] Arc<reqwest::Error>),

    /// The given string can not be parsed into a valid URL
    #[error("Cannot parse string `{0}` as URL: {1}")]
    ParseUrl(String, #[source] url::ParseError),

    /// An URL with an invalid host was found
    #[error("URL is missing a host")]
    InvalidUrlHost,

    /// The given header could not be parsed
    #[error("Header could not be parsed: {0}")]
    InvalidHeader(String),

    /// A scheduled task panicked before it produced an outcome
    #[error("Scheduled task panicked: {0}")]
    TaskPanicked(String),

    /// The request was cancelled before it completed
    #[error("Request was cancelled before it completed")]
    Cancelled,
}

impl ErrorKind {
    /// Returns `true` if this error is a circuit breaker trip
    #[must_use]
    pub const fn is_offline_host(&self) -> bool {
        matches!(self, Self::OfflineHost(_))
    }

    /// Returns `true` if the request ran out of time
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::NetworkRequest(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Return the underlying `reqwest` error, if any
    #[must_use]
    pub fn reqwest_error(&self) -> Option<&reqwest::Error> {
        match self {
            Self::NetworkRequest(e) | Self::ReadResponseBody(e) | Self::BuildClient(e) => Some(e),
            _ => None,
        }
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::OfflineHost(h1), Self::OfflineHost(h2)) => h1 == h2,
            (
                Self::Timeout {
                    url: u1,
                    timeout: t1,
                },
                Self::Timeout {
                    url: u2,
                    timeout: t2,
                },
            ) => u1 == u2 && t1 == t2,
            (Self::NetworkRequest(e1), Self::NetworkRequest(e2))
            | (Self::ReadResponseBody(e1), Self::ReadResponseBody(e2))
            | (Self::BuildClient(e1), Self::BuildClient(e2)) => e1.to_string() == e2.to_string(),
            (Self::ParseUrl(s1, e1), Self::ParseUrl(s2, e2)) => s1 == s2 && e1 == e2,
            (Self::InvalidHeader(s1), Self::InvalidHeader(s2))
            | (Self::TaskPanicked(s1), Self::TaskPanicked(s2)) => s1 == s2,
            (Self::InvalidUrlHost, Self::InvalidUrlHost) | (Self::Cancelled, Self::Cancelled) => {
                true
            }
            _ => false,
        }
    }
}

impl Eq for ErrorKind {}

impl Hash for ErrorKind {
    fn hash<H>(&self, state: &mut H)
    where
        H: std::hash::Hasher,
    {
        match self {
            Self::OfflineHost(host) => host.hash(state),
            Self::Timeout { url, timeout } => (url, timeout).hash(state),
            Self::NetworkRequest(e) | Self::ReadResponseBody(e) | Self::BuildClient(e) => {
                e.to_string().hash(state);
            }
            Self::ParseUrl(s, e) => (s, e.to_string()).hash(state),
            Self::InvalidHeader(s) | Self::TaskPanicked(s) => s.hash(state),
            Self::InvalidUrlHost | Self::Cancelled => std::mem::discriminant(self).hash(state),
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<std::convert::Infallible> for ErrorKind {
    fn from(e: std::convert::Infallible) -> Self {
        match e {}
    }
}

impl From<http::header::InvalidHeaderValue> for ErrorKind {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(e.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for ErrorKind {
    fn from(e: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(e.to_string())
    }
}
