use std::fmt::Display;

use url::Url;

use crate::{HostKey, Request, Response, Result};

/// One redirect step: the request issued and the response it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    /// The request that was sent for this step
    pub request: Request,
    /// The response received for this step
    pub response: Response,
}

/// Outcome of a fetch, filled in as the attempts progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Number of the current attempt, starting at 1
    pub attempt: u32,
    /// Redirect hops in the order they were followed
    pub redirects: Vec<Hop>,
    /// The working response.
    /// After redirects were followed, this is the terminal response.
    pub response: Option<Response>,
}

impl Default for FetchResult {
    fn default() -> Self {
        Self {
            attempt: 1,
            redirects: Vec::new(),
            response: None,
        }
    }
}

/// The mutable unit flowing through the rule hooks.
///
/// An entry pairs a [`Request`] with its [`FetchResult`]. Rules mutate it in
/// place; it is handed back to the caller once its task resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The request being fetched
    pub request: Request,
    /// What has been observed so far
    pub result: FetchResult,
}

impl Entry {
    /// Create a fresh entry for the given request
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self {
            request,
            result: FetchResult::default(),
        }
    }

    /// Create a fresh `GET` entry from a URL string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid URL
    pub fn create(url: &str) -> Result<Self> {
        Ok(Self::new(Request::try_from(url)?))
    }

    /// The target URL of the request
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.request.url
    }

    /// The network location the request goes to
    ///
    /// # Errors
    ///
    /// Returns an error if the URL has no host
    pub fn host_key(&self) -> Result<HostKey> {
        HostKey::try_from(&self.request.url)
    }

    /// The working response, if one was received
    #[must_use]
    pub const fn response(&self) -> Option<&Response> {
        self.result.response.as_ref()
    }

    /// Whether the current attempt is a retry
    #[must_use]
    pub const fn is_retry(&self) -> bool {
        self.result.attempt != 1
    }
}

impl From<Request> for Entry {
    fn from(request: Request) -> Self {
        Self::new(request)
    }
}

impl Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.response() {
            Some(response) => write!(f, "[{}] {}", response.status.as_u16(), self.request.url)?,
            None => write!(f, "[---] {}", self.request.url)?,
        }
        let hops = self.result.redirects.iter();
        for hop in hops.skip_while(|hop| hop.response.url == self.request.url) {
            write!(f, " --> {}", hop.response.url)?;
        }
        Ok(())
    }
}
