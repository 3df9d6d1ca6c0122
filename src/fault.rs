use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

use crate::{Error, Outcome};

/// The sentinel a continuation returns to cancel its own output instead of
/// faulting it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("operation was cancelled")]
pub struct Cancelled;

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

/// An opaque error value carried by a faulted [`Deferred`](crate::Deferred).
///
/// Any `std::error::Error + Send + Sync` converts into a `Fault`, so `?`
/// works inside continuation bodies. The original error can be recovered
/// with [`Fault::downcast_ref`].
#[derive(Clone)]
pub struct Fault(Arc<dyn StdError + Send + Sync + 'static>);

impl Fault {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Fault(Arc::new(error))
    }

    /// A fault holding only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Fault::new(Message(message.into()))
    }

    /// The cancellation sentinel, wrapped.
    pub fn cancelled() -> Self {
        Fault::new(Cancelled)
    }

    pub fn is_cancellation(&self) -> bool {
        self.is::<Cancelled>()
    }

    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.0.is::<E>()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.0
    }

    /// Whether both faults share the same underlying error allocation.
    pub fn ptr_eq(a: &Fault, b: &Fault) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl<E> From<E> for Fault
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Fault::new(error)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Runs a continuation body, turning panics into a faulted outcome.
pub(crate) fn run_guarded<U>(body: impl FnOnce() -> Result<U, Fault>) -> Outcome<U> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => Outcome::from_result(result),
        Err(payload) => Outcome::Faulted(Fault::new(Error::Panicked {
            message: panic_message(payload.as_ref()),
        })),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
