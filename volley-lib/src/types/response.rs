use std::fmt::Display;

use http::{HeaderMap, StatusCode, header::LOCATION};
use url::Url;

/// Status codes treated as redirects by [`FollowRedirects`](crate::rules::FollowRedirects)
pub const REDIRECT_STATUS_CODES: [StatusCode; 5] = [
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::SEE_OTHER,
    StatusCode::TEMPORARY_REDIRECT,
    StatusCode::PERMANENT_REDIRECT,
];

/// A response as received from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// URL the response was received from
    pub url: Url,
    /// Status code of the response
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw response body
    pub body: Vec<u8>,
}

impl Response {
    /// Create a response without a body
    #[must_use]
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            url,
            status,
            headers,
            body: Vec::new(),
        }
    }

    /// Whether the status code starts a redirect hop
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        REDIRECT_STATUS_CODES.contains(&self.status)
    }

    /// Raw value of the `Location` header, if present and valid UTF-8
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION)?.to_str().ok()
    }

    /// The body decoded as UTF-8, replacing invalid sequences
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.status.as_u16(), self.url)
    }
}
