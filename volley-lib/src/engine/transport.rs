use async_trait::async_trait;
use core::fmt::Debug;
use http::header::{self, HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

use crate::{ErrorKind, Request, Response, Result};

/// Sends a single request over the wire
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    /// Send `request` and read the complete response.
    ///
    /// The engine enforces `timeout` on its own; implementations may use it
    /// to bound their connection setup.
    ///
    /// # Errors
    ///
    /// Returns an error if no response could be received
    async fn send(&self, request: &Request, timeout: Duration) -> Result<Response>;
}

/// [`Transport`] backed by a [`reqwest::Client`].
///
/// Redirects are never followed by the transport itself, see
/// [`FollowRedirects`](crate::rules::FollowRedirects).
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    reqwest_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build the underlying `reqwest` client.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The user-agent is invalid.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn new(user_agent: &str, mut headers: HeaderMap, allow_insecure: bool) -> Result<Self> {
        headers.insert(header::USER_AGENT, HeaderValue::from_str(user_agent)?);

        let reqwest_client = reqwest::ClientBuilder::new()
            .gzip(true)
            .default_headers(headers)
            .danger_accept_invalid_certs(allow_insecure)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ErrorKind::BuildClient(Arc::new(e)))?;

        Ok(Self { reqwest_client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &Request, timeout: Duration) -> Result<Response> {
        let response = self
            .reqwest_client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ErrorKind::NetworkRequest(Arc::new(e)))?;

        let url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| ErrorKind::ReadResponseBody(Arc::new(e)))?;

        let mut response = Response::new(url, status, headers);
        response.body = body.to_vec();
        Ok(response)
    }
}
