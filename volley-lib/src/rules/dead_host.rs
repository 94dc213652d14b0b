use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{Hook, Rule};
use crate::kb::HostStatus;
use crate::{Engine, Entry, ErrorKind, KnowledgeBase, Result};

/// Per-host circuit breaker.
///
/// Every attempt to a host that has not answered yet is tracked. Once every
/// tracked attempt to a host timed out, the host is declared offline: the
/// attempt reporting the last timeout fails with [`ErrorKind::OfflineHost`]
/// and so does every retry waiting on that host. The first response from a
/// host clears its record and lets traffic flow freely again.
///
/// Retries to a host that has not answered yet wait for the host's
/// completion signal instead of piling onto it. The wait is bounded by the
/// attempt's timeout, after which the retry goes on to probe the host itself.
#[derive(Debug, Default)]
pub struct DeadHostDetection {
    kb: Arc<KnowledgeBase>,
    engine: Option<Arc<dyn Engine>>,
}

impl DeadHostDetection {
    /// Create the rule with a private knowledge base, replaced on registration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn wait_limit(&self, entry: &Entry) -> Option<Duration> {
        entry
            .request
            .arguments
            .timeout
            .or_else(|| self.engine.as_ref().map(|engine| engine.timeout()))
    }
}

#[async_trait]
impl Rule for DeadHostDetection {
    fn hooks(&self) -> &'static [Hook] {
        &[Hook::BeforeRequest, Hook::AfterHeaders, Hook::OnTimeout]
    }

    fn set_kb(&mut self, kb: &Arc<KnowledgeBase>) {
        self.kb = kb.clone();
    }

    fn set_engine(&mut self, engine: &Arc<dyn Engine>) {
        self.engine = Some(engine.clone());
    }

    async fn before_request(&self, entry: &mut Entry) -> Result<()> {
        let key = entry.host_key()?;

        let mut signal = {
            let mut record = self.kb.hosts().entry(key.clone()).or_default();
            if record.status() == HostStatus::Online {
                return Ok(());
            }
            record.request_count += 1;
            if !entry.is_retry() {
                return Ok(());
            }
            record.subscribe()
        };

        log::debug!("Retry of {} waits for host {key}", entry.url());
        let resolved = signal.wait_for(|status| status.is_resolved());
        let status = match self.wait_limit(entry) {
            Some(limit) => match tokio::time::timeout(limit, resolved).await {
                Ok(status) => status.map(|status| *status),
                Err(_) => {
                    log::debug!("Host {key} still unresolved, probing it with {}", entry.url());
                    return Ok(());
                }
            },
            None => resolved.await.map(|status| *status),
        };

        match status {
            Ok(HostStatus::Offline) => Err(ErrorKind::OfflineHost(key)),
            _ => Ok(()),
        }
    }

    async fn after_headers(&self, entry: &mut Entry) -> Result<()> {
        let key = entry.host_key()?;
        let mut record = self.kb.hosts().entry(key.clone()).or_default();
        record.request_count = 0;
        record.timeout_requests = 0;

        match record.status() {
            HostStatus::Pending => {
                record.resolve(HostStatus::Online);
            }
            HostStatus::Offline => {
                log::info!("Host {key} is back online");
                record.restart(HostStatus::Online);
            }
            HostStatus::Online => {}
        }
        Ok(())
    }

    async fn on_timeout(&self, entry: &mut Entry) -> Result<()> {
        let key = entry.host_key()?;
        let mut record = self.kb.hosts().entry(key.clone()).or_default();
        record.timeout_requests += 1;

        if record.timeout_requests == record.request_count {
            log::warn!(
                "Host {key} is offline: all {} tracked attempts timed out",
                record.request_count
            );
            record.resolve(HostStatus::Offline);
            return Err(ErrorKind::OfflineHost(key));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostKey;
    use crate::kb::HostRecord;
    use pretty_assertions::assert_eq;

    fn detection() -> (DeadHostDetection, Arc<KnowledgeBase>) {
        let kb = Arc::new(KnowledgeBase::new());
        let mut detection = DeadHostDetection::new();
        detection.set_kb(&kb);
        (detection, kb)
    }

    fn entry(url: &str) -> Entry {
        Entry::create(url).unwrap()
    }

    fn retry(url: &str) -> Entry {
        let mut entry = entry(url);
        entry.result.attempt = 2;
        entry
    }

    fn host(kb: &KnowledgeBase, key: &str) -> crate::kb::HostSnapshot {
        kb.host(&HostKey::from(key)).unwrap()
    }

    #[tokio::test]
    async fn test_before_request_counts_requests_per_host() {
        let (detection, kb) = detection();

        for url in [
            "http://example.com/test",
            "http://example.com/12",
            "http://www.test.example/index.html",
            "http://10.0.0.10:8080/qw",
            "http://10.0.0.10:8080/we",
            "http://10.0.0.10:8080/rt",
        ] {
            detection.before_request(&mut entry(url)).await.unwrap();
        }

        assert_eq!(host(&kb, "example.com").request_count, 2);
        assert_eq!(host(&kb, "www.test.example").request_count, 1);
        assert_eq!(host(&kb, "10.0.0.10:8080").request_count, 3);
    }

    #[tokio::test]
    async fn test_before_request_leaves_signal_pending() {
        let (detection, kb) = detection();
        detection
            .before_request(&mut entry("http://example.com/"))
            .await
            .unwrap();

        assert_eq!(host(&kb, "example.com").status, HostStatus::Pending);
    }

    #[tokio::test]
    async fn test_before_request_does_nothing_if_host_answered() {
        let (detection, kb) = detection();
        let record = HostRecord::new();
        record.restart(HostStatus::Online);
        kb.hosts().insert(HostKey::from("example.com"), record);

        detection
            .before_request(&mut entry("http://example.com/"))
            .await
            .unwrap();
        detection
            .before_request(&mut retry("http://example.com/"))
            .await
            .unwrap();

        assert_eq!(host(&kb, "example.com").request_count, 0);
    }

    #[tokio::test]
    async fn test_retry_waits_for_pending_host() {
        let (detection, kb) = detection();
        let detection = Arc::new(detection);
        detection
            .before_request(&mut entry("http://example.com/a"))
            .await
            .unwrap();

        let waiting = {
            let detection = detection.clone();
            tokio::spawn(async move {
                detection
                    .before_request(&mut retry("http://example.com/b"))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());
        assert_eq!(host(&kb, "example.com").request_count, 2);

        detection
            .after_headers(&mut entry("http://example.com/a"))
            .await
            .unwrap();
        waiting.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_retry_fails_fast_for_offline_host() {
        let (detection, kb) = detection();
        let mut record = HostRecord::new();
        record.request_count = 1;
        record.resolve(HostStatus::Offline);
        kb.hosts().insert(HostKey::from("example.com"), record);

        let err = detection
            .before_request(&mut retry("http://example.com/"))
            .await
            .unwrap_err();
        assert_eq!(err, ErrorKind::OfflineHost(HostKey::from("example.com")));
    }

    #[tokio::test]
    async fn test_retry_wait_is_bounded_by_attempt_timeout() {
        let (detection, kb) = detection();
        detection
            .before_request(&mut entry("http://example.com/a"))
            .await
            .unwrap();

        let mut entry = retry("http://example.com/b");
        entry.request.arguments.timeout = Some(Duration::from_millis(20));
        detection.before_request(&mut entry).await.unwrap();

        assert_eq!(host(&kb, "example.com").status, HostStatus::Pending);
    }

    #[tokio::test]
    async fn test_after_headers_resets_and_resolves() {
        let (detection, kb) = detection();
        for (key, count) in [("example.com", 2), ("www.test.com", 1), ("10.11.12.13:8080", 3)] {
            let mut record = HostRecord::new();
            record.request_count = count;
            kb.hosts().insert(HostKey::from(key), record);
        }

        for url in [
            "http://example.com/",
            "http://www.test.com/",
            "http://10.11.12.13:8080/",
        ] {
            detection.after_headers(&mut entry(url)).await.unwrap();
        }

        for key in ["example.com", "www.test.com", "10.11.12.13:8080"] {
            let snapshot = host(&kb, key);
            assert_eq!(snapshot.request_count, 0);
            assert_eq!(snapshot.status, HostStatus::Online);
        }
    }

    #[tokio::test]
    async fn test_on_timeout_counts_timeouts_per_host() {
        let (detection, kb) = detection();
        for _ in 0..10 {
            for url in [
                "http://example.com/",
                "http://www.test.com/",
                "http://10.10.10.10:8080/",
            ] {
                detection.before_request(&mut entry(url)).await.unwrap();
            }
        }

        for (url, timeouts) in [
            ("http://example.com/", 2),
            ("http://www.test.com/", 1),
            ("http://10.10.10.10:8080/", 3),
        ] {
            for _ in 0..timeouts {
                detection.on_timeout(&mut entry(url)).await.unwrap();
            }
        }

        assert_eq!(host(&kb, "example.com").timeout_requests, 2);
        assert_eq!(host(&kb, "www.test.com").timeout_requests, 1);
        assert_eq!(host(&kb, "10.10.10.10:8080").timeout_requests, 3);
    }

    #[tokio::test]
    async fn test_last_tracked_timeout_declares_host_offline() {
        let (detection, kb) = detection();
        let mut entries: Vec<_> = (0..10)
            .map(|i| entry(&format!("http://example.com/{i}")))
            .collect();
        for entry in &mut entries {
            detection.before_request(entry).await.unwrap();
        }

        let (last, first) = entries.split_last_mut().unwrap();
        for entry in first {
            detection.on_timeout(entry).await.unwrap();
        }
        assert_eq!(host(&kb, "example.com").status, HostStatus::Pending);

        let err = detection.on_timeout(last).await.unwrap_err();
        assert!(err.is_offline_host());
        assert_eq!(host(&kb, "example.com").status, HostStatus::Offline);
        assert_eq!(kb.offline_hosts(), vec![HostKey::from("example.com")]);
    }

    #[tokio::test]
    async fn test_waiting_retry_observes_offline_host() {
        let (detection, _kb) = detection();
        let detection = Arc::new(detection);
        let mut first = entry("http://example.com/a");
        detection.before_request(&mut first).await.unwrap();

        let waiting = {
            let detection = detection.clone();
            tokio::spawn(async move {
                detection
                    .before_request(&mut retry("http://example.com/b"))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The waiting retry is tracked too
        detection.on_timeout(&mut first).await.unwrap();
        let err = detection.on_timeout(&mut first).await.unwrap_err();
        assert!(err.is_offline_host());

        let err = waiting.await.unwrap().unwrap_err();
        assert_eq!(err, ErrorKind::OfflineHost(HostKey::from("example.com")));
    }

    #[tokio::test]
    async fn test_on_timeout_does_nothing_after_success() {
        let (detection, kb) = detection();
        detection
            .before_request(&mut entry("http://example.com/"))
            .await
            .unwrap();
        detection
            .after_headers(&mut entry("http://example.com/"))
            .await
            .unwrap();
        detection
            .before_request(&mut entry("http://example.com/"))
            .await
            .unwrap();

        detection
            .on_timeout(&mut entry("http://example.com/"))
            .await
            .unwrap();
        assert_eq!(host(&kb, "example.com").status, HostStatus::Online);
    }

    #[tokio::test]
    async fn test_success_after_offline_starts_new_generation() {
        let (detection, kb) = detection();
        let mut first = entry("http://example.com/");
        detection.before_request(&mut first).await.unwrap();
        detection.on_timeout(&mut first).await.unwrap_err();
        assert_eq!(host(&kb, "example.com").status, HostStatus::Offline);

        detection.after_headers(&mut first).await.unwrap();
        let snapshot = host(&kb, "example.com");
        assert_eq!(snapshot.status, HostStatus::Online);
        assert_eq!(snapshot.timeout_requests, 0);
    }
}
