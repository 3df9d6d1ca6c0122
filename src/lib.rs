//! Deferred values: a single-assignment container for an eventual outcome
//! that any number of continuations can observe.
//!
//! A [`DeferredSource`] is the write half. It completes its paired
//! [`Deferred`] exactly once, with a result, an error ([`Fault`]) or a
//! cancellation. Consumers chain work onto the [`Deferred`] with the
//! `continue_*` family, choosing an [`Executor`] for each continuation, and
//! join several of them with [`when_all`], [`when_all_result`] or
//! [`when_any`].
//!
//! # Examples
//!
//! ```
//! use deferred::DeferredSource;
//! use std::thread;
//!
//! let source = DeferredSource::<u32>::new();
//! let doubled = source
//!     .deferred()
//!     .continue_on_success_with(|value| Ok(value * 2));
//!
//! let producer = thread::spawn(move || source.set_result(21));
//! doubled.wait_until_completed();
//! producer.join().expect("The producer thread has panicked");
//!
//! assert_eq!(doubled.result(), Some(&42));
//! ```
//!
//! Continuations signal their own cancellation by returning the
//! [`Cancelled`] sentinel:
//!
//! ```
//! use deferred::{Deferred, Fault};
//!
//! let stopped = Deferred::from_value(1).continue_with(|_| -> Result<(), Fault> {
//!     Err(Fault::cancelled())
//! });
//! assert!(stopped.is_cancelled());
//! ```

mod continuation;
mod deferred;
mod delay;
mod executor;
mod fault;
mod main_thread;
mod pool;
mod queue;
mod source;
mod when;
mod worker;

pub use crate::deferred::{Deferred, Outcome};
pub use crate::delay::DelayHandle;
pub use crate::executor::{Dispatcher, Executor, Job};
pub use crate::fault::{Cancelled, Fault};
pub use crate::main_thread::{is_main_thread, MainLoop};
pub use crate::pool::{PoolBuilder, WorkerPool};
pub use crate::queue::{DispatchQueue, QueueKind};
pub use crate::source::{pair, DeferredSource};
pub use crate::when::{when_all, when_all_result, when_any, AggregateError};

/// Errors raised by the library itself, as opposed to the opaque [`Fault`]s
/// carried by faulted values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("deferred value was already completed")]
    AlreadyCompleted,
    #[error("a main thread loop is already installed")]
    MainThreadInstalled,
    #[error("when_any needs at least one input")]
    NoInputs,
    #[error("continuation panicked: {message}")]
    Panicked { message: String },
    #[error("failed to spawn thread")]
    Spawn(#[from] std::io::Error),
}
