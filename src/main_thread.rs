//! The designated UI/main thread behind [`Executor::MainThread`].
//!
//! A thread becomes the main thread by installing a [`MainLoop`] and then
//! pumping it. Work dispatched from any other thread is posted to the loop;
//! work dispatched from the main thread itself runs in place. With no loop
//! installed, work runs on the calling thread.

use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::{Deferred, Error, Executor, Job};

struct Registration {
    thread: ThreadId,
    sender: Sender<Job>,
}

static REGISTRATION: Mutex<Option<Registration>> = parking_lot::const_mutex(None);

/// Whether the calling thread has installed the current [`MainLoop`].
pub fn is_main_thread() -> bool {
    REGISTRATION
        .lock()
        .as_ref()
        .is_some_and(|registration| registration.thread == thread::current().id())
}

pub(crate) fn dispatch(job: Job) {
    let registration = REGISTRATION.lock();
    match registration.as_ref() {
        // Sent under the lock so that a dropping loop cannot miss the job.
        Some(main) if main.thread != thread::current().id() => {
            if let Err(rejected) = main.sender.send(job) {
                drop(registration);
                rejected.into_inner().run();
            }
        }
        _ => {
            drop(registration);
            job.run();
        }
    }
}

/// The job queue of the main thread. Not `Send`: it stays on the thread that
/// installed it, and dropping it uninstalls it.
///
/// # Examples
///
/// ```
/// use deferred::{Deferred, Executor, MainLoop, WorkerPool};
///
/// let main_loop = MainLoop::install().expect("no other main loop");
/// let pool = Executor::Pool(WorkerPool::builder().threads(1).spawn().unwrap());
///
/// let on_main = Deferred::execute(&pool, || Ok(6 * 7))
///     .continue_on_success_with_on(&Executor::MainThread, |answer| {
///         assert!(deferred::is_main_thread());
///         Ok(*answer)
///     });
///
/// main_loop.run_until_completed(&on_main);
/// assert_eq!(on_main.result(), Some(&42));
/// ```
pub struct MainLoop {
    receiver: Receiver<Job>,
    wake: (Sender<()>, Receiver<()>),
    _not_send: PhantomData<*const ()>,
}

impl MainLoop {
    /// Makes the calling thread the main thread.
    ///
    /// Fails with [`Error::MainThreadInstalled`] while another loop is alive.
    pub fn install() -> Result<Self, Error> {
        let mut registration = REGISTRATION.lock();
        if registration.is_some() {
            return Err(Error::MainThreadInstalled);
        }
        let (sender, receiver) = crossbeam_channel::unbounded();
        *registration = Some(Registration {
            thread: thread::current().id(),
            sender,
        });
        debug!(thread = ?thread::current().id(), "main loop installed");
        Ok(MainLoop {
            receiver,
            wake: crossbeam_channel::unbounded(),
            _not_send: PhantomData,
        })
    }

    /// Runs every job that is already queued. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job.run();
            ran += 1;
        }
        ran
    }

    /// Runs queued jobs, sleeping while there are none, until `deferred` is
    /// terminal.
    pub fn run_until_completed<T: Send + Sync + 'static>(&self, deferred: &Deferred<T>) {
        if deferred.is_completed() {
            return;
        }
        let (wake, woken) = &self.wake;
        let wake = wake.clone();
        deferred.register(
            Executor::Immediate,
            Box::new(move |_| {
                wake.send(()).ok();
            }),
        );
        while !deferred.is_completed() {
            crossbeam_channel::select! {
                recv(self.receiver) -> job => match job {
                    Ok(job) => job.run(),
                    Err(_) => break,
                },
                recv(woken) -> _ => {}
            }
        }
        // Wake-ups of earlier calls are stale by now.
        while woken.try_recv().is_ok() {}
    }
}

impl Drop for MainLoop {
    fn drop(&mut self) {
        *REGISTRATION.lock() = None;
        // Nothing can be posted any more; finish what already was.
        let leftover = self.run_pending();
        debug!(leftover, "main loop uninstalled");
    }
}
