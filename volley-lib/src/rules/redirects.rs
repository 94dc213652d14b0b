use async_trait::async_trait;
use http::{Method, StatusCode};
use std::sync::Arc;

use super::{Hook, Rule, RuleSet};
use crate::{Engine, Entry, Hop, Request, Response, Result};

/// Default upper bound of redirects followed for one request
pub const DEFAULT_MAX_REDIRECTS: usize = 15;

/// Rule chasing redirect chains.
///
/// When a fetch ends on a redirect status, the chain is followed through the
/// engine, one sub-request per hop, until a non-redirect response arrives,
/// a response has no `location` header, or `max_redirects` hops were
/// followed. Every response of the chain, including the first one, is
/// recorded in [`FetchResult::redirects`](crate::FetchResult::redirects) and
/// the entry's working response becomes the last one received.
///
/// Sub-requests run without any rules. They keep the method of the request
/// that was redirected, except that `303` switches to `GET` (a `HEAD` stays
/// `HEAD`) and a `POST` answered with `301` or `302` becomes a `GET`.
#[derive(Debug)]
pub struct FollowRedirects {
    max_redirects: usize,
    engine: Option<Arc<dyn Engine>>,
    child_rules: RuleSet,
}

impl Default for FollowRedirects {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REDIRECTS)
    }
}

impl FollowRedirects {
    /// Follow at most `max_redirects` hops per request
    #[must_use]
    pub fn new(max_redirects: usize) -> Self {
        Self {
            max_redirects,
            engine: None,
            child_rules: RuleSet::default(),
        }
    }

    /// Resolve the `location` of a redirect response against its URL.
    /// `None` ends the chain.
    fn next_request(response: &Response, method: &Method) -> Option<Request> {
        let location = response.location()?;
        match response.url.join(location) {
            Ok(url) => {
                Some(Request::new(url).with_method(redirect_method(response.status, method)))
            }
            Err(e) => {
                log::warn!(
                    "Stopping redirect chain at {}: invalid location {location:?}: {e}",
                    response.url
                );
                None
            }
        }
    }

    async fn perform(&self, engine: &Arc<dyn Engine>, request: Request) -> Result<Entry> {
        engine.stats().add_requested();
        let entry = engine.perform(Entry::new(request), &self.child_rules).await?;
        engine.stats().add_completed();
        Ok(entry)
    }
}

#[async_trait]
impl Rule for FollowRedirects {
    fn hooks(&self) -> &'static [Hook] {
        &[Hook::OnRequestSuccessful]
    }

    fn set_engine(&mut self, engine: &Arc<dyn Engine>) {
        self.engine = Some(engine.clone());
    }

    async fn on_request_successful(&self, entry: &mut Entry) -> Result<()> {
        let Some(response) = entry.result.response.clone() else {
            return Ok(());
        };
        if !response.is_redirect() {
            return Ok(());
        }
        let Some(engine) = &self.engine else {
            log::warn!("No engine to follow redirects of {} with", entry.url());
            return Ok(());
        };

        entry.result.redirects.push(Hop {
            request: entry.request.clone(),
            response: response.clone(),
        });

        let mut response = response;
        let mut method = entry.request.method.clone();
        let mut followed = 0;
        while response.is_redirect() && followed < self.max_redirects {
            let Some(request) = Self::next_request(&response, &method) else {
                break;
            };
            log::debug!("Following redirect {} --> {}", response.url, request.url);

            method = request.method.clone();
            let hop = self.perform(engine, request).await?;
            let Some(next) = hop.result.response else {
                break;
            };
            entry.result.redirects.push(Hop {
                request: hop.request,
                response: next.clone(),
            });
            entry.result.response = Some(next.clone());
            response = next;
            followed += 1;
        }

        if response.is_redirect() && followed == self.max_redirects {
            log::warn!(
                "Redirect chain of {} truncated after {followed} hops",
                entry.url()
            );
        }
        Ok(())
    }
}

/// Method of the request following a redirect with `status`
fn redirect_method(status: StatusCode, method: &Method) -> Method {
    match status {
        StatusCode::SEE_OTHER if *method != Method::HEAD => Method::GET,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND if *method == Method::POST => {
            Method::GET
        }
        _ => method.clone(),
    }
}
