//! Handler of fetch operations.
//!
//! This module defines two structs, [`Client`] and [`ClientBuilder`].
//! `Client` schedules requests and hands out their outcomes.
//! `ClientBuilder` exposes a finer level of granularity for building
//! a `Client`.
//!
//! For convenience, a free function [`fetch`] is provided for ad-hoc
//! fetches.
#![allow(
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::default_trait_access
)]
use futures::Stream;
use http::{HeaderMap, Method};
use std::sync::Arc;
use std::time::Duration;
use typed_builder::TypedBuilder;

use crate::engine::{DEFAULT_RETRIES, Engine, ReqwestTransport, RetryEngine, Stats};
use crate::rules::{
    DEFAULT_MAX_REDIRECTS, DeadHostDetection, DynamicTimeout, FollowRedirects, RuleSet,
};
use crate::scheduler::{Completed, DEFAULT_MAX_CONCURRENCY, RequestScheduler, ScheduledFuture};
use crate::{Entry, ErrorKind, KnowledgeBase, Request, Result, TimeoutConfig};

/// Default timeout when adaptive timeouts are disabled, 20 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
/// Default user agent, `volley-<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("volley/", env!("CARGO_PKG_VERSION"));

/// Builder for [`Client`].
///
/// See crate-level documentation for usage example.
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `ClientBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `ClientBuilder`.
"))]
pub struct ClientBuilder {
    /// Maximum number of requests in flight at the same time.
    #[builder(default = DEFAULT_MAX_CONCURRENCY)]
    max_concurrency: usize,
    /// Maximum number of retries per request before returning an error.
    #[builder(default = DEFAULT_RETRIES)]
    retries: u32,
    /// Bounds and sample size of the adaptive timeouts.
    timeouts: TimeoutConfig,
    /// Maximum number of redirect hops followed per request.
    #[builder(default = DEFAULT_MAX_REDIRECTS)]
    max_redirects: usize,
    /// When `true`, follow redirect chains.
    #[builder(default = true)]
    follow_redirects: bool,
    /// When `true`, fail fast against hosts whose requests all timed out.
    #[builder(default = true)]
    dead_host_detection: bool,
    /// When `true`, adapt the timeout of every attempt to the observed
    /// latencies. Otherwise `timeout` applies to every attempt.
    #[builder(default = true)]
    dynamic_timeout: bool,
    /// User-agent sent with every request.
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,
    /// Sets the default [headers] for every request.
    ///
    /// [headers]: https://docs.rs/http/latest/http/header/struct.HeaderName.html
    custom_headers: HeaderMap,
    /// HTTP method used for requests, e.g. `GET` or `HEAD`.
    #[builder(default = Method::GET)]
    method: Method,
    /// When `true`, accept invalid SSL certificates.
    ///
    /// ## Warning
    ///
    /// You should think very carefully before using this method. If
    /// invalid certificates are trusted, any certificate for any site
    /// will be trusted for use. This includes expired certificates. This
    /// introduces significant vulnerabilities, and should only be used
    /// as a last resort.
    allow_insecure: bool,
    /// Timeout of attempts without an adaptive timeout.
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,
}

impl Default for ClientBuilder {
    #[must_use]
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientBuilder {
    /// Instantiates a [`Client`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The user-agent or a custom header is invalid.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn client(self) -> Result<Client> {
        let transport = ReqwestTransport::new(
            &self.user_agent,
            self.custom_headers.clone(),
            self.allow_insecure,
        )?;
        let engine: Arc<dyn Engine> =
            Arc::new(RetryEngine::new(transport, self.retries, self.timeout));
        Ok(self.with_engine(engine))
    }

    /// Instantiates a [`Client`] on top of the given engine
    #[must_use]
    pub fn with_engine(self, engine: Arc<dyn Engine>) -> Client {
        let kb = Arc::new(KnowledgeBase::new());
        let mut rules = RuleSet::new(kb.clone(), engine.clone());

        if self.dynamic_timeout {
            rules.add(DynamicTimeout::new(self.timeouts, self.retries));
        }
        if self.dead_host_detection {
            rules.add(DeadHostDetection::new());
        }
        if self.follow_redirects {
            rules.add(FollowRedirects::new(self.max_redirects));
        }

        Client {
            engine,
            rules: Arc::new(rules),
            kb,
            scheduler: RequestScheduler::new(self.max_concurrency),
            method: self.method,
        }
    }
}

/// Schedules requests and hands out their outcomes.
///
/// See [`ClientBuilder`] which contains sane defaults for all configuration options.
#[derive(Debug, Clone)]
pub struct Client {
    engine: Arc<dyn Engine>,
    rules: Arc<RuleSet>,
    kb: Arc<KnowledgeBase>,
    scheduler: RequestScheduler<Entry>,
    /// HTTP method used for requests, e.g. `GET` or `HEAD`.
    method: Method,
}

impl Client {
    /// Schedule a request using the client's HTTP method
    ///
    /// # Errors
    ///
    /// Returns an `Err` if `request` is not a valid request
    pub fn request<T, E>(&self, request: T) -> Result<ScheduledFuture<Entry>>
    where
        Request: TryFrom<T, Error = E>,
        ErrorKind: From<E>,
    {
        let request = Request::try_from(request)?.with_method(self.method.clone());
        Ok(self.submit(request))
    }

    /// Schedule a request as is
    pub fn submit(&self, request: Request) -> ScheduledFuture<Entry> {
        let engine = self.engine.clone();
        let rules = self.rules.clone();
        self.scheduler.submit(async move {
            engine.stats().add_requested();
            let entry = engine.perform(Entry::new(request), &rules).await?;
            engine.stats().add_completed();
            Ok(entry)
        })
    }

    /// Fetch a single request and wait for its outcome
    ///
    /// # Errors
    ///
    /// Returns an `Err` if `request` is invalid or the fetch failed
    pub async fn fetch<T, E>(&self, request: T) -> Result<Entry>
    where
        Request: TryFrom<T, Error = E>,
        ErrorKind: From<E>,
    {
        self.request(request)?.await.into()
    }

    /// Stream of completed requests, in the order they finished.
    /// See [`RequestScheduler::completions`].
    pub fn completions(&self) -> impl Stream<Item = Completed<Entry>> + Send + 'static {
        self.scheduler.completions()
    }

    /// The scheduler running the requests
    #[must_use]
    pub const fn scheduler(&self) -> &RequestScheduler<Entry> {
        &self.scheduler
    }

    /// Counters of the underlying engine
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.engine.stats().snapshot()
    }

    /// Knowledge shared by the client's rules
    #[must_use]
    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    /// The most recent timeout handed to an attempt
    #[must_use]
    pub fn current_timeout(&self) -> Duration {
        self.engine.timeout()
    }
}

/// A convenience function to fetch a single URL.
///
/// This provides the simplest fetch utility without having to create a [`Client`].
/// For more complex scenarios, see documentation of [`ClientBuilder`] instead.
///
/// # Errors
///
/// Returns an `Err` if:
/// - The request client cannot be built (see [`ClientBuilder::client`] for failure cases).
/// - The request cannot be fetched (see [`Client::fetch`] for failure cases).
pub async fn fetch<T, E>(request: T) -> Result<Entry>
where
    Request: TryFrom<T, Error = E>,
    ErrorKind: From<E>,
{
    let client = ClientBuilder::builder().build().client()?;
    client.fetch(request).await
}
