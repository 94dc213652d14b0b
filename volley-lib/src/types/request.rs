use http::{HeaderMap, Method};
use std::fmt::Display;
use std::time::{Duration, Instant};
use url::Url;

use crate::{ErrorKind, Result};

/// Per-attempt argument bag.
///
/// Rules fill this in before the request reaches the transport. It is reset
/// for every new request but carried across retries of the same request, so
/// a retry can see what the previous attempt was given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    /// Deadline for the transport call of the current attempt
    pub timeout: Option<Duration>,
    /// When the current attempt was handed to the transport
    pub start_time: Option<Instant>,
}

/// A request that can be fetched by volley
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Target of the request
    pub url: Url,

    /// HTTP method, `GET` unless configured otherwise
    pub method: Method,

    /// Headers sent in addition to the client's default headers
    pub headers: HeaderMap,

    /// Mutable per-attempt arguments
    pub arguments: Arguments,
}

impl Request {
    /// Instantiate a new `GET` request for the given URL
    #[inline]
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            arguments: Arguments::default(),
        }
    }

    /// Use a different HTTP method
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

impl From<Url> for Request {
    fn from(url: Url) -> Self {
        Self::new(url)
    }
}

impl TryFrom<&str> for Request {
    type Error = ErrorKind;

    fn try_from(s: &str) -> Result<Self> {
        let url = Url::parse(s).map_err(|e| ErrorKind::ParseUrl(s.to_string(), e))?;
        Ok(Self::new(url))
    }
}

impl TryFrom<String> for Request {
    type Error = ErrorKind;

    fn try_from(s: String) -> Result<Self> {
        Self::try_from(s.as_str())
    }
}
