use std::sync::Arc;

use crate::{Deferred, Error, Executor, Fault, Outcome};

/// Creates a pending [`DeferredSource`] together with its [`Deferred`].
///
/// # Examples
///
/// ```
/// use std::thread;
///
/// let (source, deferred) = deferred::pair::<String>();
/// let task1 = thread::spawn(move || {
///     deferred.wait_until_completed();
///     deferred.result().cloned()
/// });
/// source.set_result("Hi".into());
/// let received = task1.join().expect("The task1 thread has panicked.");
/// assert_eq!(received.as_deref(), Some("Hi"));
/// ```
pub fn pair<T: Send + Sync + 'static>() -> (DeferredSource<T>, Deferred<T>) {
    let source = DeferredSource::new();
    let deferred = source.deferred();
    (source, deferred)
}

/// The write half of a [`Deferred`]. Exactly one completion ever takes
/// effect.
///
/// The `set_*` methods treat a second completion as a programming error and
/// panic. The `try_set_*` methods report it as `false` instead, which lets
/// several producers race for a single winner; the source can be cloned and
/// handed to each of them.
#[derive(Debug)]
pub struct DeferredSource<T> {
    deferred: Deferred<T>,
}

impl<T> Clone for DeferredSource<T> {
    fn clone(&self) -> Self {
        DeferredSource {
            deferred: self.deferred.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Default for DeferredSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> DeferredSource<T> {
    pub fn new() -> Self {
        DeferredSource {
            deferred: Deferred::pending(),
        }
    }

    /// A read handle to the value this source completes.
    pub fn deferred(&self) -> Deferred<T> {
        self.deferred.clone()
    }

    /// # Panics
    ///
    /// Panics if the value was already completed.
    pub fn set_result(&self, value: T) {
        self.expect_first(self.try_set_result(value));
    }

    /// # Panics
    ///
    /// Panics if the value was already completed.
    pub fn set_error(&self, error: impl Into<Fault>) {
        self.expect_first(self.try_set_error(error));
    }

    /// # Panics
    ///
    /// Panics if the value was already completed.
    pub fn set_cancelled(&self) {
        self.expect_first(self.try_set_cancelled());
    }

    /// # Panics
    ///
    /// Panics if the value was already completed.
    pub fn set_outcome(&self, outcome: Outcome<T>) {
        self.expect_first(self.try_set_outcome(outcome));
    }

    pub fn try_set_result(&self, value: T) -> bool {
        self.try_set_outcome(Outcome::Succeeded(Arc::new(value)))
    }

    /// Faults the value. A [`Cancelled`](crate::Cancelled) payload is stored
    /// as an ordinary error here; only continuation bodies turn it into a
    /// cancellation.
    pub fn try_set_error(&self, error: impl Into<Fault>) -> bool {
        self.try_set_outcome(Outcome::Faulted(error.into()))
    }

    pub fn try_set_cancelled(&self) -> bool {
        self.try_set_outcome(Outcome::Cancelled)
    }

    pub fn try_set_outcome(&self, outcome: Outcome<T>) -> bool {
        self.deferred.try_complete(outcome)
    }

    /// Completes this source with whatever `inner` ends up as.
    pub(crate) fn adopt(&self, inner: &Deferred<T>) {
        let source = self.clone();
        inner.register(
            Executor::Immediate,
            Box::new(move |done| {
                if let Some(outcome) = done.outcome() {
                    source.try_set_outcome(outcome.clone());
                }
            }),
        );
    }

    fn expect_first(&self, completed: bool) {
        if !completed {
            panic!("{}", Error::AlreadyCompleted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_init() {
        let source = DeferredSource::<String>::new();
        let deferred = source.deferred();
        assert!(!deferred.is_completed());
        assert!(!deferred.is_faulted());
        assert!(!deferred.is_cancelled());
        assert!(deferred.result().is_none());
        assert!(deferred.error().is_none());
    }

    #[test]
    fn test_set_result() {
        let source = DeferredSource::<String>::new();
        source.set_result(String::from("🍓"));
        let deferred = source.deferred();
        assert!(deferred.is_completed());
        assert_eq!(deferred.result().map(String::as_str), Some("🍓"));
    }

    #[test]
    fn test_set_error() {
        let source = DeferredSource::<String>::new();
        source.set_error(io::Error::other("reject!!"));
        let deferred = source.deferred();
        assert!(deferred.is_completed());
        assert!(deferred.is_faulted());
        assert!(deferred.error().is_some_and(|f| f.is::<io::Error>()));
    }

    #[test]
    fn test_set_cancelled_sentinel_as_error_faults() {
        let source = DeferredSource::<()>::new();
        source.set_error(Fault::cancelled());
        assert!(source.deferred().is_faulted());
    }

    #[test]
    fn test_cancel() {
        let source = DeferredSource::<String>::new();
        source.set_cancelled();
        assert!(source.deferred().is_completed());
        assert!(source.deferred().is_cancelled());
    }

    #[test]
    fn test_try_set_returning_true() {
        let source = DeferredSource::<u8>::new();
        assert!(source.try_set_result(1));
        assert_eq!(source.deferred().result(), Some(&1));

        let source = DeferredSource::<u8>::new();
        assert!(source.try_set_error(Fault::msg("nope")));
        assert!(source.deferred().is_faulted());

        let source = DeferredSource::<u8>::new();
        assert!(source.try_set_cancelled());
        assert!(source.deferred().is_cancelled());
    }

    #[test]
    fn test_try_set_returning_false() {
        let source = DeferredSource::<u8>::new();
        source.set_result(1);
        assert!(!source.try_set_result(2));
        assert!(!source.try_set_error(Fault::msg("late")));
        assert!(!source.try_set_cancelled());
        assert_eq!(source.deferred().result(), Some(&1));
    }

    #[test]
    #[should_panic(expected = "already completed")]
    fn test_set_twice_panics() {
        let source = DeferredSource::<u8>::new();
        source.set_result(1);
        source.set_cancelled();
    }

    #[test]
    fn test_racing_try_set_has_one_winner() {
        const RACERS: usize = 16;
        let source = DeferredSource::<usize>::new();
        let barrier = Arc::new(Barrier::new(RACERS));
        let winners = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..RACERS)
            .map(|i| {
                let source = source.clone();
                let barrier = Arc::clone(&barrier);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    barrier.wait();
                    let won = match i % 3 {
                        0 => source.try_set_result(i),
                        1 => source.try_set_error(Fault::msg(format!("racer {i}"))),
                        _ => source.try_set_cancelled(),
                    };
                    if won {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("A racer thread has panicked");
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(source.deferred().is_completed());
    }

    #[test]
    fn test_pair_shares_value() {
        let (source, deferred) = pair::<u8>();
        source.set_result(9);
        assert_eq!(deferred.result(), Some(&9));
    }
}
