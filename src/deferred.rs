use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::{Executor, Fault};

/// The terminal disposition of a [`Deferred`].
#[derive(Debug)]
pub enum Outcome<T> {
    Succeeded(Arc<T>),
    Faulted(Fault),
    Cancelled,
}

impl<T> Clone for Outcome<T> {
    fn clone(&self) -> Self {
        match self {
            Outcome::Succeeded(value) => Outcome::Succeeded(Arc::clone(value)),
            Outcome::Faulted(fault) => Outcome::Faulted(fault.clone()),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}

impl<T> Outcome<T> {
    /// Maps a continuation's return value onto an outcome. An `Err` carrying
    /// the [`Cancelled`](crate::Cancelled) sentinel becomes `Cancelled`.
    pub fn from_result(result: Result<T, Fault>) -> Self {
        match result {
            Ok(value) => Outcome::Succeeded(Arc::new(value)),
            Err(fault) if fault.is_cancellation() => Outcome::Cancelled,
            Err(fault) => Outcome::Faulted(fault),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, Outcome::Faulted(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            Outcome::Succeeded(value) => Some(value.as_ref()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Fault> {
        match self {
            Outcome::Faulted(fault) => Some(fault),
            _ => None,
        }
    }

    /// Collapses the outcome into a `Result`; cancellation becomes the
    /// [`Cancelled`](crate::Cancelled) fault.
    pub fn into_result(self) -> Result<Arc<T>, Fault> {
        match self {
            Outcome::Succeeded(value) => Ok(value),
            Outcome::Faulted(fault) => Err(fault),
            Outcome::Cancelled => Err(Fault::cancelled()),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Outcome::Succeeded(_) => "succeeded",
            Outcome::Faulted(_) => "faulted",
            Outcome::Cancelled => "cancelled",
        }
    }
}

pub(crate) type Callback<T> = Box<dyn FnOnce(Deferred<T>) + Send + 'static>;

struct Continuation<T> {
    executor: Executor,
    callback: Callback<T>,
}

/// Bookkeeping that only exists while the value is pending. Completion
/// swaps it out for `None`, closing the list to new registrations.
struct Pending<T> {
    continuations: Vec<Continuation<T>>,
    wakers: Vec<Waker>,
}

struct Inner<T> {
    outcome: OnceLock<Outcome<T>>,
    pending: Mutex<Option<Pending<T>>>,
    completed: Condvar,
}

/// Read half of a single-assignment value that ends up succeeded, faulted or
/// cancelled.
///
/// Handles are cheap to clone and all observe the same value. It is
/// completed through its [`DeferredSource`](crate::DeferredSource), or built
/// already terminal with [`Deferred::from_value`], [`Deferred::from_error`]
/// and [`Deferred::cancelled`].
pub struct Deferred<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Deferred {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deferred<T> {
    pub(crate) fn pending() -> Self {
        Deferred {
            inner: Arc::new(Inner {
                outcome: OnceLock::new(),
                pending: Mutex::new(Some(Pending {
                    continuations: Vec::new(),
                    wakers: Vec::new(),
                })),
                completed: Condvar::new(),
            }),
        }
    }

    /// A value that is terminal from the start.
    pub fn from_outcome(outcome: Outcome<T>) -> Self {
        Deferred {
            inner: Arc::new(Inner {
                outcome: OnceLock::from(outcome),
                pending: Mutex::new(None),
                completed: Condvar::new(),
            }),
        }
    }

    pub fn from_value(value: T) -> Self {
        Self::from_outcome(Outcome::Succeeded(Arc::new(value)))
    }

    pub fn from_error(error: impl Into<Fault>) -> Self {
        Self::from_outcome(Outcome::Faulted(error.into()))
    }

    pub fn cancelled() -> Self {
        Self::from_outcome(Outcome::Cancelled)
    }

    pub fn outcome(&self) -> Option<&Outcome<T>> {
        self.inner.outcome.get()
    }

    pub fn is_completed(&self) -> bool {
        self.outcome().is_some()
    }

    pub fn is_succeeded(&self) -> bool {
        self.outcome().is_some_and(Outcome::is_succeeded)
    }

    pub fn is_faulted(&self) -> bool {
        self.outcome().is_some_and(Outcome::is_faulted)
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome().is_some_and(Outcome::is_cancelled)
    }

    /// The value, present only once succeeded.
    pub fn result(&self) -> Option<&T> {
        self.outcome().and_then(Outcome::result)
    }

    /// The error, present only once faulted.
    pub fn error(&self) -> Option<&Fault> {
        self.outcome().and_then(Outcome::error)
    }

    /// Whether both handles refer to the same value.
    pub fn ptr_eq(a: &Deferred<T>, b: &Deferred<T>) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Blocks the calling thread until the value is terminal.
    ///
    /// Do not call this from the thread a continuation of this value is
    /// scheduled on; that continuation would never get to run.
    pub fn wait_until_completed(&self) {
        let mut pending = self.inner.pending.lock();
        while pending.is_some() {
            self.inner.completed.wait(&mut pending);
        }
    }

    /// Like [`wait_until_completed`](Self::wait_until_completed) but gives up
    /// after `timeout`. Returns whether the value is terminal. A timeout too
    /// large to add to the current instant waits without a deadline.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait_until_completed();
            return true;
        };
        let mut pending = self.inner.pending.lock();
        while pending.is_some() {
            if self
                .inner
                .completed
                .wait_until(&mut pending, deadline)
                .timed_out()
            {
                return pending.is_none();
            }
        }
        true
    }
}

impl<T: Send + Sync + 'static> Deferred<T> {
    /// Moves the value to its terminal state. Only the first call wins.
    pub(crate) fn try_complete(&self, outcome: Outcome<T>) -> bool {
        let state = outcome.name();
        let pending = {
            let mut guard = self.inner.pending.lock();
            let Some(pending) = guard.take() else {
                return false;
            };
            // The list was still open, so nothing has been stored yet.
            let stored = self.inner.outcome.set(outcome).is_ok();
            debug_assert!(stored, "outcome stored while continuations were open");
            pending
        };
        self.inner.completed.notify_all();
        trace!(
            state,
            continuations = pending.continuations.len(),
            "deferred completed"
        );

        for waker in pending.wakers {
            waker.wake();
        }
        for continuation in pending.continuations {
            self.dispatch(continuation);
        }
        true
    }

    /// Runs `callback` on `executor` once the value is terminal: right away if
    /// it already is, otherwise from whichever thread completes it.
    pub(crate) fn register(&self, executor: Executor, callback: Callback<T>) {
        let continuation = Continuation { executor, callback };
        {
            let mut guard = self.inner.pending.lock();
            if let Some(pending) = guard.as_mut() {
                pending.continuations.push(continuation);
                return;
            }
        }
        self.dispatch(continuation);
    }

    fn dispatch(&self, continuation: Continuation<T>) {
        let Continuation { executor, callback } = continuation;
        let deferred = self.clone();
        trace!(%executor, "dispatching continuation");
        executor.execute(move || callback(deferred));
    }
}

impl<T> Future for Deferred<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.outcome() {
            return Poll::Ready(outcome.clone());
        }
        let mut guard = self.inner.pending.lock();
        match guard.as_mut() {
            Some(pending) => {
                if !pending.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    pending.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
            None => {
                drop(guard);
                self.outcome()
                    .map_or(Poll::Pending, |outcome| Poll::Ready(outcome.clone()))
            }
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.outcome().map_or("pending", Outcome::name);
        f.debug_struct("Deferred").field("state", &state).finish()
    }
}
