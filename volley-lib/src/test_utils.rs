use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, StatusCode, header::LOCATION};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use url::Url;

use crate::engine::{EngineStats, Transport};
use crate::rules::RuleSet;
use crate::{Engine, Entry, Request, Response, Result};

/// Transport answering every request with a fixed status,
/// optionally after hanging for a number of attempts
#[derive(Debug)]
pub(crate) struct MockTransport {
    status: StatusCode,
    hang_for: usize,
    calls: AtomicUsize,
    last_timeout: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub(crate) fn respond(status: StatusCode) -> Self {
        Self::hang_then(0, status)
    }

    pub(crate) fn hang() -> Self {
        Self::hang_then(usize::MAX, StatusCode::OK)
    }

    pub(crate) fn hang_then(attempts: usize, status: StatusCode) -> Self {
        Self {
            status,
            hang_for: attempts,
            calls: AtomicUsize::new(0),
            last_timeout: Mutex::new(None),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_timeout(&self) -> Option<Duration> {
        *self.last_timeout.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &Request, timeout: Duration) -> Result<Response> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_timeout.lock().unwrap_or_else(PoisonError::into_inner) = Some(timeout);
        if call < self.hang_for {
            std::future::pending::<()>().await;
        }
        Ok(Response::new(
            request.url.clone(),
            self.status,
            HeaderMap::new(),
        ))
    }
}

/// Engine serving canned responses by URL without any retries
#[derive(Debug, Default)]
pub(crate) struct MockEngine {
    responses: HashMap<Url, (StatusCode, Option<String>)>,
    stats: EngineStats,
}

impl MockEngine {
    pub(crate) fn with_status(mut self, url: &str, status: StatusCode) -> Self {
        self.responses.insert(url.parse().unwrap(), (status, None));
        self
    }

    pub(crate) fn with_redirect(mut self, url: &str, status: StatusCode, location: &str) -> Self {
        self.responses
            .insert(url.parse().unwrap(), (status, Some(location.to_string())));
        self
    }

    fn respond(&self, url: &Url) -> Response {
        let (status, location) = self
            .responses
            .get(url)
            .cloned()
            .unwrap_or((StatusCode::NOT_FOUND, None));

        let mut headers = HeaderMap::new();
        if let Some(location) = location {
            headers.insert(LOCATION, HeaderValue::from_str(&location).unwrap());
        }
        Response::new(url.clone(), status, headers)
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn perform(&self, mut entry: Entry, rules: &RuleSet) -> Result<Entry> {
        rules.before_request(&mut entry).await?;
        entry.result.response = Some(self.respond(entry.url()));
        rules.after_headers(&mut entry).await?;
        rules.on_request_successful(&mut entry).await?;
        Ok(entry)
    }

    fn stats(&self) -> &EngineStats {
        &self.stats
    }

    fn set_timeout(&self, _timeout: Duration) {}

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }
}
