//! Bounded-concurrency admission of fetch tasks.
//!
//! The [`RequestScheduler`] runs at most `limit` tasks at a time. Submitted
//! tasks wait in a FIFO queue until a slot frees up; every completion frees
//! its slot and immediately admits the next queued tasks. Callers observe a
//! single task through its [`ScheduledFuture`] and all tasks, in the order
//! they finish, through [`RequestScheduler::completions`].

use async_stream::stream;
use futures::future::BoxFuture;
use futures::{FutureExt, Stream};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{ErrorKind, Outcome, Result};

mod future;

pub use future::{ScheduledFuture, TaskId};

/// Default number of tasks running at the same time, 1000.
pub const DEFAULT_MAX_CONCURRENCY: usize = 1000;

/// A task that finished running, as yielded by the completion stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed<T> {
    /// Identifier of the task, see [`ScheduledFuture::id`]
    pub id: TaskId,
    /// What the task produced
    pub outcome: Outcome<T>,
}

/// A submitted task waiting for admission
struct Queued<T> {
    id: TaskId,
    task: BoxFuture<'static, Result<T>>,
    token: CancellationToken,
    /// Set once the task is admitted, shared with its handle
    started: Arc<AtomicBool>,
    result: oneshot::Sender<Outcome<T>>,
}

struct State<T> {
    wait_queue: VecDeque<Queued<T>>,
    /// Admitted tasks that have not completed yet
    pending: HashMap<TaskId, CancellationToken>,
    /// Completions sent but not yet taken from the completion stream
    backlog: usize,
    next_id: u64,
}

impl<T> State<T> {
    fn is_drained(&self) -> bool {
        self.backlog == 0 && self.pending.is_empty() && self.wait_queue.is_empty()
    }
}

struct Inner<T> {
    limit: usize,
    state: Mutex<State<T>>,
    done: mpsc::UnboundedSender<Completed<T>>,
    completions: tokio::sync::Mutex<mpsc::UnboundedReceiver<Completed<T>>>,
}

impl<T: Clone + Send + 'static> Inner<T> {
    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start queued tasks while there are free slots.
    /// Tasks cancelled while queued are dropped without running.
    fn admit(self: &Arc<Self>, state: &mut State<T>) {
        while state.pending.len() < self.limit {
            let Some(queued) = state.wait_queue.pop_front() else {
                return;
            };
            if queued.token.is_cancelled() {
                log::debug!("Skipping task {} cancelled while queued", queued.id);
                continue;
            }
            self.start(state, queued);
        }
    }

    fn start(self: &Arc<Self>, state: &mut State<T>, queued: Queued<T>) {
        let Queued {
            id,
            task,
            token,
            started,
            result,
        } = queued;
        started.store(true, Ordering::Release);
        state.pending.insert(id, token.clone());
        log::debug!("Admitting task {id} ({} pending)", state.pending.len());

        let inner = self.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => Outcome::Cancelled,
                ran = AssertUnwindSafe(task).catch_unwind() => match ran {
                    Ok(ran) => Outcome::from(ran),
                    Err(panic) => Outcome::Failed(ErrorKind::TaskPanicked(panic_message(&*panic))),
                },
            };
            // The handle must hold the outcome before the stream reports it.
            // The caller may have dropped its handle.
            let _ = result.send(outcome.clone());
            inner.complete(id, outcome);
        });
    }

    fn complete(self: &Arc<Self>, id: TaskId, outcome: Outcome<T>) {
        let mut state = self.state();
        state.pending.remove(&id);
        log::debug!("Task {id} completed ({} pending)", state.pending.len());
        self.admit(&mut state);

        state.backlog += 1;
        if self.done.send(Completed { id, outcome }).is_err() {
            state.backlog -= 1;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("unknown panic"))
}

/// Runs submitted tasks with bounded concurrency.
///
/// Cloning the scheduler yields another handle to the same queue.
/// Tasks are spawned on the current tokio runtime, so submitting requires
/// one to be running.
pub struct RequestScheduler<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RequestScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for RequestScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScheduler")
            .field("limit", &self.inner.limit)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> RequestScheduler<T> {
    /// Create a scheduler running at most `limit` tasks at a time.
    /// A limit of zero is treated as one.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let (done, completions) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                limit: limit.max(1),
                state: Mutex::new(State {
                    wait_queue: VecDeque::new(),
                    pending: HashMap::new(),
                    backlog: 0,
                    next_id: 0,
                }),
                done,
                completions: tokio::sync::Mutex::new(completions),
            }),
        }
    }

    /// Create a scheduler and submit all `tasks` at once.
    /// The handles are returned in submission order.
    pub fn with_tasks<I, F>(tasks: I, limit: usize) -> (Self, Vec<ScheduledFuture<T>>)
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let scheduler = Self::new(limit);
        let futures = {
            let mut state = scheduler.inner.state();
            let futures: Vec<_> = tasks
                .into_iter()
                .map(|task| Self::enqueue(&mut state, task.boxed()))
                .collect();
            scheduler.inner.admit(&mut state);
            futures
        };
        (scheduler, futures)
    }

    fn enqueue(state: &mut State<T>, task: BoxFuture<'static, Result<T>>) -> ScheduledFuture<T> {
        let id = TaskId(state.next_id);
        state.next_id += 1;

        let token = CancellationToken::new();
        let started = Arc::new(AtomicBool::new(false));
        let (result, receiver) = oneshot::channel();
        state.wait_queue.push_back(Queued {
            id,
            task,
            token: token.clone(),
            started: started.clone(),
            result,
        });
        ScheduledFuture::new(id, token, started, receiver)
    }

    /// Queue a task and admit as many queued tasks as the limit allows.
    ///
    /// Returns immediately with a handle to the task's outcome.
    pub fn submit<F>(&self, task: F) -> ScheduledFuture<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let mut state = self.inner.state();
        let future = Self::enqueue(&mut state, task.boxed());
        self.inner.admit(&mut state);
        future
    }

    /// Maximum number of tasks running at the same time
    #[must_use]
    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    /// Number of admitted tasks that have not completed yet
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.state().pending.len()
    }

    /// Number of submitted tasks waiting for admission
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.inner.state().wait_queue.len()
    }

    /// Returns `true` once all submitted tasks completed and all completions
    /// were taken from the completion stream
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.inner.state().is_drained()
    }

    /// Stream of completed tasks, in the order they finished.
    ///
    /// The stream ends once no task is queued or running and every
    /// completion has been yielded. Tasks submitted while the stream is being
    /// consumed are picked up. Only one stream yields items at a time;
    /// others wait for it to end.
    pub fn completions(&self) -> impl Stream<Item = Completed<T>> + Send + 'static {
        let inner = self.inner.clone();
        stream! {
            let mut completions = inner.completions.lock().await;
            loop {
                if inner.state().is_drained() {
                    break;
                }
                let Some(completed) = completions.recv().await else {
                    break;
                };
                inner.state().backlog -= 1;
                yield completed;
            }
        }
    }
}
