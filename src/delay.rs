use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::{Deferred, DeferredSource, Error};

struct Timer {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

/// Cancels the timer behind [`Deferred::with_delay_cancellable`].
///
/// Dropping the handle does not cancel the timer.
#[derive(Clone)]
pub struct DelayHandle {
    timer: Arc<Timer>,
    source: DeferredSource<()>,
}

impl DelayHandle {
    /// Stops the timer and cancels its value. Returns `false` if the timer
    /// had already fired.
    pub fn cancel(&self) -> bool {
        *self.timer.cancelled.lock() = true;
        self.timer.wakeup.notify_all();
        self.source.try_set_cancelled()
    }
}

impl Deferred<()> {
    /// A value that succeeds once `delay` has elapsed.
    ///
    /// Every call starts a dedicated timer thread that lives until the
    /// deadline, so prefer a few long delays over many short-lived ones.
    /// Use [`with_delay_cancellable`](Self::with_delay_cancellable) to end
    /// the thread early.
    pub fn with_delay(delay: Duration) -> Deferred<()> {
        Self::with_delay_cancellable(delay).0
    }

    /// Like [`with_delay`](Self::with_delay), plus a handle that can cancel
    /// the timer before it fires.
    ///
    /// The timer runs on its own short-lived thread, which exits as soon as
    /// it fires or is cancelled. If that thread cannot be spawned the value
    /// faults with [`Error::Spawn`].
    pub fn with_delay_cancellable(delay: Duration) -> (Deferred<()>, DelayHandle) {
        let source = DeferredSource::new();
        let deferred = source.deferred();
        let timer = Arc::new(Timer {
            cancelled: Mutex::new(false),
            wakeup: Condvar::new(),
        });
        let handle = DelayHandle {
            timer: Arc::clone(&timer),
            source: source.clone(),
        };

        let spawned = thread::Builder::new()
            .name("deferred-delay".to_owned())
            .spawn(move || {
                // Too far out to represent: only a cancel can end the wait.
                let deadline = Instant::now().checked_add(delay);
                let mut cancelled = timer.cancelled.lock();
                while !*cancelled {
                    match deadline {
                        Some(deadline) => {
                            if timer.wakeup.wait_until(&mut cancelled, deadline).timed_out() {
                                break;
                            }
                        }
                        None => timer.wakeup.wait(&mut cancelled),
                    }
                }
                let fire = !*cancelled;
                drop(cancelled);
                if fire && source.try_set_result(()) {
                    debug!(?delay, "delay fired");
                } else {
                    debug!(?delay, "delay cancelled");
                }
            });
        if let Err(error) = spawned {
            handle.source.try_set_error(Error::Spawn(error));
        }
        (deferred, handle)
    }
}
