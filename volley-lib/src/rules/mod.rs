//! Rules hooking into the attempt lifecycle.
//!
//! A [`Rule`] declares which lifecycle [`Hook`]s it implements and overrides
//! the matching methods. The [`RuleSet`] groups registered rules by hook and
//! runs them in registration order; the first failure ends the hook and
//! becomes the outcome of the attempt.
//!
//! The engine calls the hooks in this order:
//!
//! - [`Hook::BeforeRequest`] before every attempt, including retries
//! - [`Hook::AfterHeaders`] once a response was received
//! - [`Hook::OnRequestSuccessful`] right after, once per successful fetch
//! - [`Hook::OnTimeout`] when an attempt ran out of time

use async_trait::async_trait;
use core::fmt::Debug;
use std::sync::Arc;

use crate::{Engine, Entry, KnowledgeBase, Result};

mod dead_host;
mod redirects;
mod timeout;

pub use dead_host::DeadHostDetection;
pub use redirects::{DEFAULT_MAX_REDIRECTS, FollowRedirects};
pub use timeout::{DynamicTimeout, TimeoutManager};

/// Attempt lifecycle events a rule can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Before the request is handed to the transport
    BeforeRequest,
    /// After the response headers arrived
    AfterHeaders,
    /// After the attempt completed successfully
    OnRequestSuccessful,
    /// After the attempt ran out of time
    OnTimeout,
}

/// A rule plugging into the attempt lifecycle.
///
/// Only the hooks returned by [`Rule::hooks`] are ever called; the default
/// implementations of the others do nothing.
#[async_trait]
pub trait Rule: Debug + Send + Sync {
    /// The hooks this rule implements
    fn hooks(&self) -> &'static [Hook];

    /// Receive the knowledge base shared with the other rules
    fn set_kb(&mut self, _kb: &Arc<KnowledgeBase>) {}

    /// Receive the engine used to issue sub-requests
    fn set_engine(&mut self, _engine: &Arc<dyn Engine>) {}

    /// Called before each attempt
    async fn before_request(&self, _entry: &mut Entry) -> Result<()> {
        Ok(())
    }

    /// Called once the response headers arrived
    async fn after_headers(&self, _entry: &mut Entry) -> Result<()> {
        Ok(())
    }

    /// Called once the attempt completed successfully
    async fn on_request_successful(&self, _entry: &mut Entry) -> Result<()> {
        Ok(())
    }

    /// Called when an attempt ran out of time
    async fn on_timeout(&self, _entry: &mut Entry) -> Result<()> {
        Ok(())
    }
}

/// Registered rules, grouped by the hooks they implement
#[derive(Debug, Default)]
pub struct RuleSet {
    kb: Option<Arc<KnowledgeBase>>,
    engine: Option<Arc<dyn Engine>>,
    before_request: Vec<Arc<dyn Rule>>,
    after_headers: Vec<Arc<dyn Rule>>,
    on_request_successful: Vec<Arc<dyn Rule>>,
    on_timeout: Vec<Arc<dyn Rule>>,
}

impl RuleSet {
    /// Create an empty rule set which injects the given context into every
    /// rule added to it
    #[must_use]
    pub fn new(kb: Arc<KnowledgeBase>, engine: Arc<dyn Engine>) -> Self {
        Self {
            kb: Some(kb),
            engine: Some(engine),
            ..Self::default()
        }
    }

    /// Register a rule for the hooks it declares
    pub fn add<R: Rule + 'static>(&mut self, mut rule: R) {
        if let Some(kb) = &self.kb {
            rule.set_kb(kb);
        }
        if let Some(engine) = &self.engine {
            rule.set_engine(engine);
        }

        let rule: Arc<dyn Rule> = Arc::new(rule);
        for hook in rule.hooks() {
            log::debug!("Registering {rule:?} for {hook:?}");
            self.rules_mut(*hook).push(rule.clone());
        }
    }

    /// Builder-style variant of [`RuleSet::add`]
    #[must_use]
    pub fn with<R: Rule + 'static>(mut self, rule: R) -> Self {
        self.add(rule);
        self
    }

    /// The knowledge base injected into the registered rules
    #[must_use]
    pub const fn kb(&self) -> Option<&Arc<KnowledgeBase>> {
        self.kb.as_ref()
    }

    /// Number of rules registered for the given hook
    #[must_use]
    pub fn count(&self, hook: Hook) -> usize {
        self.rules(hook).len()
    }

    /// Returns `true` if no rule is registered for any hook
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before_request.is_empty()
            && self.after_headers.is_empty()
            && self.on_request_successful.is_empty()
            && self.on_timeout.is_empty()
    }

    /// Run the [`Hook::BeforeRequest`] rules
    ///
    /// # Errors
    ///
    /// Returns the first failure of a rule
    pub async fn before_request(&self, entry: &mut Entry) -> Result<()> {
        for rule in &self.before_request {
            rule.before_request(entry).await?;
        }
        Ok(())
    }

    /// Run the [`Hook::AfterHeaders`] rules
    ///
    /// # Errors
    ///
    /// Returns the first failure of a rule
    pub async fn after_headers(&self, entry: &mut Entry) -> Result<()> {
        for rule in &self.after_headers {
            rule.after_headers(entry).await?;
        }
        Ok(())
    }

    /// Run the [`Hook::OnRequestSuccessful`] rules
    ///
    /// # Errors
    ///
    /// Returns the first failure of a rule
    pub async fn on_request_successful(&self, entry: &mut Entry) -> Result<()> {
        for rule in &self.on_request_successful {
            rule.on_request_successful(entry).await?;
        }
        Ok(())
    }

    /// Run the [`Hook::OnTimeout`] rules
    ///
    /// # Errors
    ///
    /// Returns the first failure of a rule
    pub async fn on_timeout(&self, entry: &mut Entry) -> Result<()> {
        for rule in &self.on_timeout {
            rule.on_timeout(entry).await?;
        }
        Ok(())
    }

    fn rules(&self, hook: Hook) -> &Vec<Arc<dyn Rule>> {
        match hook {
            Hook::BeforeRequest => &self.before_request,
            Hook::AfterHeaders => &self.after_headers,
            Hook::OnRequestSuccessful => &self.on_request_successful,
            Hook::OnTimeout => &self.on_timeout,
        }
    }

    fn rules_mut(&mut self, hook: Hook) -> &mut Vec<Arc<dyn Rule>> {
        match hook {
            Hook::BeforeRequest => &mut self.before_request,
            Hook::AfterHeaders => &mut self.after_headers,
            Hook::OnRequestSuccessful => &mut self.on_request_successful,
            Hook::OnTimeout => &mut self.on_timeout,
        }
    }
}
