use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::{Hook, Rule};
use crate::{Engine, Entry, KnowledgeBase, Result, TimeoutConfig};

/// Adaptive timeouts are `mean * MEAN_FACTOR + stdev * STDEV_FACTOR`
const MEAN_FACTOR: f64 = 2.0;
const STDEV_FACTOR: f64 = 4.0;

/// Timeout handed out while there are not enough samples yet,
/// as a fraction of the maximum timeout
const WARMUP_FACTOR: f64 = 0.8;

/// A streak of `sample_size * STREAK_FACTOR` successes ends the backoff
const STREAK_FACTOR: usize = 5;

#[derive(Debug, Default)]
struct Samples {
    /// Most recent delays; a failure counts with the timeout it was given
    delays: VecDeque<Duration>,
    /// Most recent outcomes, `true` for success
    outcomes: VecDeque<bool>,
    /// Largest recent failure timeout, while backing off
    escalation: Option<Duration>,
}

/// Rolling statistics producing adaptive timeouts.
///
/// Successful attempts contribute their latency, failed attempts the timeout
/// they were given. Once a failure was seen, timeouts back off to twice the
/// largest failure timeout until `sample_size * 5` consecutive successes
/// restore the statistical estimate. Every timeout is clamped to
/// `[min_timeout, max_timeout]`.
#[derive(Debug)]
pub struct TimeoutManager {
    min_timeout: Duration,
    max_timeout: Duration,
    sample_size: usize,
    samples: Mutex<Samples>,
}

impl TimeoutManager {
    /// Create a manager without any samples
    #[must_use]
    pub fn new(config: TimeoutConfig) -> Self {
        let config = config.normalized();
        Self {
            min_timeout: config.min_timeout,
            max_timeout: config.max_timeout,
            sample_size: config.sample_size,
            samples: Mutex::new(Samples::default()),
        }
    }

    fn streak_window(&self) -> usize {
        self.sample_size * STREAK_FACTOR
    }

    fn record(&self, delay: Duration, success: bool) {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);

        samples.delays.push_back(delay);
        if samples.delays.len() > self.sample_size {
            samples.delays.pop_front();
        }

        samples.outcomes.push_back(success);
        if samples.outcomes.len() > self.streak_window() {
            samples.outcomes.pop_front();
        }

        if !success {
            samples.escalation = Some(samples.escalation.map_or(delay, |e| e.max(delay)));
        }
    }

    /// Record an attempt that failed after being given `timeout`
    pub fn add_failed_request(&self, timeout: Duration) {
        self.record(timeout, false);
    }

    /// Record an attempt that received a response after `delay`
    pub fn add_successful_request(&self, delay: Duration) {
        self.record(delay, true);
    }

    /// Compute the timeout for the next attempt
    pub fn get_timeout(&self) -> Duration {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);

        let streak = samples.outcomes.len() >= self.streak_window()
            && samples.outcomes.iter().all(|success| *success);

        let timeout = match samples.escalation {
            Some(escalation) if !streak => escalation.saturating_mul(2),
            escalation => {
                if escalation.is_some() {
                    log::debug!("Success streak reached, leaving timeout backoff");
                    samples.escalation = None;
                }
                if samples.delays.len() < self.sample_size {
                    self.max_timeout.mul_f64(WARMUP_FACTOR)
                } else {
                    self.estimate(&samples.delays)
                }
            }
        };

        let timeout = timeout.clamp(self.min_timeout, self.max_timeout);
        log::trace!("Computed adaptive timeout of {}ms", timeout.as_millis());
        timeout
    }

    /// `mean * 2 + stdev * 4` over the given delays
    #[allow(clippy::cast_precision_loss)]
    fn estimate(&self, delays: &VecDeque<Duration>) -> Duration {
        let n = delays.len() as f64;
        let mean = delays.iter().map(Duration::as_secs_f64).sum::<f64>() / n;
        let stdev = if delays.len() < 2 {
            0.0
        } else {
            let variance = delays
                .iter()
                .map(|d| (d.as_secs_f64() - mean).powi(2))
                .sum::<f64>()
                / (n - 1.0);
            variance.sqrt()
        };

        Duration::try_from_secs_f64(mean * MEAN_FACTOR + stdev * STDEV_FACTOR)
            .unwrap_or(self.max_timeout)
    }

    /// Number of delay samples currently consulted
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .delays
            .len()
    }

    /// The escalation marker, while backing off after failures
    #[must_use]
    pub fn escalation(&self) -> Option<Duration> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .escalation
    }

    /// Lower bound of the handed out timeouts
    #[must_use]
    pub const fn min_timeout(&self) -> Duration {
        self.min_timeout
    }

    /// Upper bound of the handed out timeouts
    #[must_use]
    pub const fn max_timeout(&self) -> Duration {
        self.max_timeout
    }
}

/// Rule giving every attempt an adaptive timeout.
///
/// Retries first record the previous attempt as a failure. Attempts past the
/// retry budget always get the maximum timeout.
#[derive(Debug)]
pub struct DynamicTimeout {
    max_timeout: Duration,
    retries: u32,
    timeout_manager: Arc<TimeoutManager>,
    engine: Option<Arc<dyn Engine>>,
}

impl DynamicTimeout {
    /// Create the rule with fresh statistics
    #[must_use]
    pub fn new(config: TimeoutConfig, retries: u32) -> Self {
        let timeout_manager = Arc::new(TimeoutManager::new(config));
        Self {
            max_timeout: timeout_manager.max_timeout(),
            retries,
            timeout_manager,
            engine: None,
        }
    }

    /// The statistics backing this rule
    #[must_use]
    pub fn timeout_manager(&self) -> Arc<TimeoutManager> {
        self.timeout_manager.clone()
    }
}

#[async_trait]
impl Rule for DynamicTimeout {
    fn hooks(&self) -> &'static [Hook] {
        &[Hook::BeforeRequest, Hook::AfterHeaders]
    }

    fn set_kb(&mut self, kb: &Arc<KnowledgeBase>) {
        kb.set_timeout_manager(self.timeout_manager.clone());
    }

    fn set_engine(&mut self, engine: &Arc<dyn Engine>) {
        self.engine = Some(engine.clone());
    }

    async fn before_request(&self, entry: &mut Entry) -> Result<()> {
        if entry.is_retry()
            && let Some(previous) = entry.request.arguments.timeout
        {
            self.timeout_manager.add_failed_request(previous);
        }

        let timeout = if entry.result.attempt > self.retries {
            self.max_timeout
        } else {
            self.timeout_manager.get_timeout()
        };
        entry.request.arguments.timeout = Some(timeout);
        entry.request.arguments.start_time = Some(Instant::now());

        if let Some(engine) = &self.engine {
            engine.set_timeout(timeout);
        }
        Ok(())
    }

    async fn after_headers(&self, entry: &mut Entry) -> Result<()> {
        if let Some(start_time) = entry.request.arguments.start_time {
            self.timeout_manager
                .add_successful_request(start_time.elapsed());
        }
        Ok(())
    }
}
