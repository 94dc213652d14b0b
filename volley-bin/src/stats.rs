use std::fmt::{self, Display};
use std::time::Duration;

use serde::Serialize;
use volley_lib::{Outcome, Stats};

use crate::formatters::response::Fetched;

// Maximum padding for each entry in the final statistics output
const MAX_PADDING: usize = 20;

/// Tally of all fetches of one run
#[derive(Debug, Default, Serialize)]
pub(crate) struct FetchStats {
    total: usize,
    successful: usize,
    failed: usize,
    offline: usize,
    timeouts: usize,
    cancelled: usize,
    redirects: usize,
    /// Counters of the fetch engine, redirect sub-requests included
    pub(crate) engine: Stats,
    /// The adaptive timeout when the run finished
    #[serde(with = "humantime_serde")]
    pub(crate) final_timeout: Duration,
}

impl FetchStats {
    pub(crate) fn add(&mut self, fetched: &Fetched) {
        self.total += 1;
        match &fetched.outcome {
            Outcome::Done(entry) => {
                self.successful += 1;
                if !entry.result.redirects.is_empty() {
                    self.redirects += 1;
                }
            }
            Outcome::Failed(e) => {
                self.failed += 1;
                if e.is_offline_host() {
                    self.offline += 1;
                } else if e.is_timeout() {
                    self.timeouts += 1;
                }
            }
            Outcome::Cancelled => self.cancelled += 1,
        }
    }

    /// Whether no fetch failed
    pub(crate) const fn is_success(&self) -> bool {
        self.failed == 0
    }
}

fn write_stat(f: &mut fmt::Formatter, title: &str, stat: usize) -> fmt::Result {
    let fill = MAX_PADDING.saturating_sub(title.chars().count());
    writeln!(f, "{title}{stat:.>fill$}")
}

impl Display for FetchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = "-".repeat(MAX_PADDING);

        writeln!(f, "Summary")?;
        writeln!(f, "{separator}")?;
        write_stat(f, "Total", self.total)?;
        write_stat(f, "Successful", self.successful)?;
        write_stat(f, "Failed", self.failed)?;
        write_stat(f, "Offline", self.offline)?;
        write_stat(f, "Timeouts", self.timeouts)?;
        if self.cancelled > 0 {
            write_stat(f, "Cancelled", self.cancelled)?;
        }
        write_stat(f, "Redirected", self.redirects)?;
        writeln!(f, "{separator}")?;
        write_stat(f, "Requests", self.engine.requested)?;
        write_stat(f, "Completed", self.engine.completed)?;
        write_stat(f, "Retries", self.engine.retried)?;
        write_stat(f, "Timed out", self.engine.timed_out)?;
        write!(
            f,
            "Final timeout: {}",
            humantime::format_duration(self.final_timeout)
        )
    }
}
