use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt::{self, Debug, Display};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::Outcome;

/// Identifier of a submitted task, unique per scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to the result of a submitted task.
///
/// Resolves to the task's [`Outcome`] once it completes. Calling
/// [`ScheduledFuture::cancel`] cancels the task if it has not completed yet:
/// a queued task is never started, a running task is dropped at its next
/// suspension point. Once admitted, the task's own outcome is what the handle
/// resolves to, even when `cancel` races with its completion. Dropping the
/// handle does not cancel the task.
pub struct ScheduledFuture<T> {
    id: TaskId,
    token: CancellationToken,
    outcome: BoxFuture<'static, Outcome<T>>,
}

impl<T: Send + 'static> ScheduledFuture<T> {
    pub(crate) fn new(
        id: TaskId,
        token: CancellationToken,
        started: Arc<AtomicBool>,
        mut result: oneshot::Receiver<Outcome<T>>,
    ) -> Self {
        let cancelled = token.clone();
        let outcome = async move {
            tokio::select! {
                biased;
                outcome = &mut result => return outcome.unwrap_or(Outcome::Cancelled),
                () = cancelled.cancelled() => {}
            }
            // An admitted task observes the cancellation itself and reports
            // either `Cancelled` or the outcome it already decided on
            if started.load(Ordering::Acquire) {
                result.await.unwrap_or(Outcome::Cancelled)
            } else {
                Outcome::Cancelled
            }
        }
        .boxed();

        Self { id, token, outcome }
    }
}

impl<T> ScheduledFuture<T> {
    /// Identifier of the task, as reported by the completion stream
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Cancel the task unless it already completed
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`ScheduledFuture::cancel`] was called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl<T> Future for ScheduledFuture<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.outcome.as_mut().poll(cx)
    }
}

impl<T> Debug for ScheduledFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledFuture")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
