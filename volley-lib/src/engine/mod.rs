//! The fetch engine running the attempts of a request.
//!
//! [`RetryEngine`] drives one request through its attempts: it runs the rule
//! hooks around every transport call, enforces the attempt deadline and
//! retries within the configured budget.

use async_trait::async_trait;
use core::fmt::Debug;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::retry::RetryExt;
use crate::rules::RuleSet;
use crate::{Entry, ErrorKind, Result};

mod transport;

pub use transport::{ReqwestTransport, Transport};

/// Default number of retries per request, 3.
pub const DEFAULT_RETRIES: u32 = 3;

/// Executes requests through the rule hooks
#[async_trait]
pub trait Engine: Debug + Send + Sync {
    /// Fetch the entry's request, running `rules` around every attempt.
    ///
    /// # Errors
    ///
    /// Returns the first hook failure, the transport error of the last
    /// attempt, or [`ErrorKind::Timeout`] once the retry budget is exhausted
    async fn perform(&self, entry: Entry, rules: &RuleSet) -> Result<Entry>;

    /// Counters of this engine
    fn stats(&self) -> &EngineStats;

    /// Change the timeout used by attempts without their own deadline
    fn set_timeout(&self, timeout: Duration);

    /// The active timeout
    fn timeout(&self) -> Duration;
}

/// Counters shared by everything issuing requests through an engine
#[derive(Debug, Default)]
pub struct EngineStats {
    requested: AtomicUsize,
    completed: AtomicUsize,
    retried: AtomicUsize,
    timed_out: AtomicUsize,
}

impl EngineStats {
    /// Count a request handed to the engine
    pub fn add_requested(&self) {
        self.requested.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a request the engine completed
    pub fn add_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    #[must_use]
    pub fn snapshot(&self) -> Stats {
        Stats {
            requested: self.requested.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`EngineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Requests handed to the engine, redirect sub-requests included
    pub requested: usize,
    /// Requests the engine completed
    pub completed: usize,
    /// Attempts that were retries
    pub retried: usize,
    /// Attempts that ran out of time
    pub timed_out: usize,
}

/// Engine retrying failed attempts over a [`Transport`]
#[derive(Debug)]
pub struct RetryEngine<T> {
    transport: T,
    retries: u32,
    /// Active timeout in nanoseconds
    timeout: AtomicU64,
    stats: EngineStats,
}

fn as_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

impl<T: Transport> RetryEngine<T> {
    /// Create an engine allowing `retries` retries per request
    #[must_use]
    pub fn new(transport: T, retries: u32, timeout: Duration) -> Self {
        Self {
            transport,
            retries,
            timeout: AtomicU64::new(as_nanos(timeout)),
            stats: EngineStats::default(),
        }
    }

    /// The underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether the entry may be tried once more
    const fn can_retry(&self, entry: &Entry) -> bool {
        entry.result.attempt <= self.retries
    }
}

#[async_trait]
impl<T: Transport> Engine for RetryEngine<T> {
    async fn perform(&self, mut entry: Entry, rules: &RuleSet) -> Result<Entry> {
        loop {
            rules.before_request(&mut entry).await?;

            let timeout = entry
                .request
                .arguments
                .timeout
                .unwrap_or_else(|| self.timeout());
            let sent = tokio::time::timeout(timeout, self.transport.send(&entry.request, timeout));

            match sent.await {
                Ok(Ok(response)) => {
                    entry.result.response = Some(response);
                    rules.after_headers(&mut entry).await?;
                    rules.on_request_successful(&mut entry).await?;
                    return Ok(entry);
                }
                Ok(Err(e)) if !e.is_timeout() => {
                    if !(e.should_retry() && self.can_retry(&entry)) {
                        return Err(e);
                    }
                    log::debug!(
                        "Attempt {} of {} failed: {e}",
                        entry.result.attempt,
                        entry.request
                    );
                }
                _ => {
                    self.stats.add_timed_out();
                    log::debug!(
                        "Attempt {} of {} timed out after {}ms",
                        entry.result.attempt,
                        entry.request,
                        timeout.as_millis()
                    );
                    rules.on_timeout(&mut entry).await?;
                    if !self.can_retry(&entry) {
                        return Err(ErrorKind::Timeout {
                            url: entry.request.url,
                            timeout,
                        });
                    }
                }
            }

            entry.result.attempt += 1;
            self.stats.add_retried();
        }
    }

    fn stats(&self) -> &EngineStats {
        &self.stats
    }

    fn set_timeout(&self, timeout: Duration) {
        self.timeout.store(as_nanos(timeout), Ordering::Relaxed);
    }

    fn timeout(&self) -> Duration {
        Duration::from_nanos(self.timeout.load(Ordering::Relaxed))
    }
}
