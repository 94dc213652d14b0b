//! Shared knowledge about the current fetch run.
//!
//! One [`KnowledgeBase`] exists per [`Client`](crate::Client). It is injected
//! into every rule when the rule is registered, so rules that react to the
//! same attempt lifecycle events see the same per-host records and the same
//! adaptive timeout statistics.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;

use crate::HostKey;
use crate::rules::TimeoutManager;

/// Resolution state of a host's completion signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    /// No response from this host yet; attempts are probing it
    Pending,
    /// A response was received; traffic flows freely
    Online,
    /// Every tracked attempt timed out; retries fail fast
    Offline,
}

impl HostStatus {
    /// Whether the signal has been resolved, either way
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Circuit breaker state for one network location
#[derive(Debug)]
pub struct HostRecord {
    /// Attempts started since the last response from this host
    pub request_count: usize,
    /// Consecutive timeouts since the last response from this host
    pub timeout_requests: usize,
    /// One-shot completion signal shared by all waiters of this host
    is_done: watch::Sender<HostStatus>,
}

impl Default for HostRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRecord {
    /// Create a record in the probing state
    #[must_use]
    pub fn new() -> Self {
        let (is_done, _) = watch::channel(HostStatus::Pending);
        Self {
            request_count: 0,
            timeout_requests: 0,
            is_done,
        }
    }

    /// Current state of the completion signal
    #[must_use]
    pub fn status(&self) -> HostStatus {
        *self.is_done.borrow()
    }

    /// Subscribe to the completion signal
    pub(crate) fn subscribe(&self) -> watch::Receiver<HostStatus> {
        self.is_done.subscribe()
    }

    /// Resolve the signal of the current generation.
    /// Returns `false` if it was already resolved.
    pub(crate) fn resolve(&self, status: HostStatus) -> bool {
        self.is_done.send_if_modified(|current| {
            if current.is_resolved() {
                return false;
            }
            *current = status;
            true
        })
    }

    /// Start a new generation whose signal is already resolved with `status`
    pub(crate) fn restart(&self, status: HostStatus) {
        self.is_done.send_replace(status);
    }

    fn snapshot(&self) -> HostSnapshot {
        HostSnapshot {
            request_count: self.request_count,
            timeout_requests: self.timeout_requests,
            status: self.status(),
        }
    }
}

/// Point-in-time copy of a [`HostRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostSnapshot {
    /// Attempts started since the last response
    pub request_count: usize,
    /// Consecutive timeouts since the last response
    pub timeout_requests: usize,
    /// State of the completion signal
    pub status: HostStatus,
}

/// Context object shared by all rules of a client
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    /// Circuit breaker records, keyed by network location
    hosts: DashMap<HostKey, HostRecord>,

    /// Statistics of the active dynamic timeout rule, if one is registered
    timeout_manager: RwLock<Option<Arc<TimeoutManager>>>,
}

impl KnowledgeBase {
    /// Create an empty knowledge base
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) const fn hosts(&self) -> &DashMap<HostKey, HostRecord> {
        &self.hosts
    }

    /// Snapshot of the record for the given host, if one exists
    #[must_use]
    pub fn host(&self, key: &HostKey) -> Option<HostSnapshot> {
        self.hosts.get(key).map(|record| record.snapshot())
    }

    /// Snapshots of all known hosts, sorted by host key
    #[must_use]
    pub fn all_hosts(&self) -> Vec<(HostKey, HostSnapshot)> {
        let mut hosts: Vec<_> = self
            .hosts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        hosts.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
        hosts
    }

    /// Hosts the circuit breaker currently considers offline
    #[must_use]
    pub fn offline_hosts(&self) -> Vec<HostKey> {
        self.all_hosts()
            .into_iter()
            .filter(|(_, snapshot)| snapshot.status == HostStatus::Offline)
            .map(|(key, _)| key)
            .collect()
    }

    /// Register the timeout statistics of the active dynamic timeout rule
    pub fn set_timeout_manager(&self, manager: Arc<TimeoutManager>) {
        *self
            .timeout_manager
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(manager);
    }

    /// The timeout statistics of the active dynamic timeout rule
    #[must_use]
    pub fn timeout_manager(&self) -> Option<Arc<TimeoutManager>> {
        self.timeout_manager
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
