use std::error::Error as StdError;

use crate::fault::run_guarded;
use crate::{Deferred, DeferredSource, Executor, Fault, Outcome};

impl<T: Send + Sync + 'static> DeferredSource<T> {
    /// Completes from a flattening body: a returned `Deferred` is adopted,
    /// anything else settles the source directly.
    fn settle_flattened(&self, outcome: Outcome<Deferred<T>>) {
        match outcome {
            Outcome::Succeeded(inner) => self.adopt(&inner),
            Outcome::Faulted(fault) => {
                self.try_set_error(fault);
            }
            Outcome::Cancelled => {
                self.try_set_cancelled();
            }
        }
    }

    /// Mirrors a failed or cancelled antecedent onto this source.
    fn pass_through<A>(&self, antecedent: &Deferred<A>) {
        match antecedent.outcome() {
            Some(Outcome::Faulted(fault)) => {
                self.try_set_error(fault.clone());
            }
            _ => {
                self.try_set_cancelled();
            }
        }
    }
}

impl<T: Send + Sync + 'static> Deferred<T> {
    /// Runs `body` on `executor` and completes with what it returns.
    pub fn execute<F>(executor: &Executor, body: F) -> Deferred<T>
    where
        F: FnOnce() -> Result<T, Fault> + Send + 'static,
    {
        let source = DeferredSource::new();
        let output = source.deferred();
        executor.execute(move || {
            source.try_set_outcome(run_guarded(body));
        });
        output
    }

    /// Like [`execute`](Self::execute) for a body that itself returns a
    /// `Deferred`, which the output then follows.
    pub fn execute_with_task<F>(executor: &Executor, body: F) -> Deferred<T>
    where
        F: FnOnce() -> Result<Deferred<T>, Fault> + Send + 'static,
    {
        let source = DeferredSource::new();
        let output = source.deferred();
        executor.execute(move || source.settle_flattened(run_guarded(body)));
        output
    }

    /// Registers `then` and returns the value it completes.
    fn chain<U, F>(&self, executor: &Executor, then: F) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&Deferred<T>, &DeferredSource<U>) + Send + 'static,
    {
        let source = DeferredSource::new();
        let output = source.deferred();
        self.register(
            executor.clone(),
            Box::new(move |antecedent| then(&antecedent, &source)),
        );
        output
    }

    pub fn continue_with<U, F>(&self, continuation: F) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&Deferred<T>) -> Result<U, Fault> + Send + 'static,
    {
        self.continue_with_on(&Executor::Default, continuation)
    }

    /// Runs `continuation` on `executor` once this value is terminal,
    /// whatever its disposition.
    ///
    /// The output succeeds with the returned value, faults with a returned
    /// error and is cancelled when the error is the
    /// [`Cancelled`](crate::Cancelled) sentinel. A panic in the continuation
    /// faults the output with [`Error::Panicked`](crate::Error::Panicked).
    pub fn continue_with_on<U, F>(&self, executor: &Executor, continuation: F) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&Deferred<T>) -> Result<U, Fault> + Send + 'static,
    {
        self.chain(executor, move |antecedent, source| {
            source.try_set_outcome(run_guarded(|| continuation(antecedent)));
        })
    }

    pub fn continue_with_task<U, F>(&self, continuation: F) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&Deferred<T>) -> Result<Deferred<U>, Fault> + Send + 'static,
    {
        self.continue_with_task_on(&Executor::Default, continuation)
    }

    /// Flattening form of [`continue_with_on`](Self::continue_with_on): the
    /// output follows the `Deferred` the continuation returns.
    pub fn continue_with_task_on<U, F>(&self, executor: &Executor, continuation: F) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&Deferred<T>) -> Result<Deferred<U>, Fault> + Send + 'static,
    {
        self.chain(executor, move |antecedent, source| {
            source.settle_flattened(run_guarded(|| continuation(antecedent)));
        })
    }

    pub fn continue_on_success_with<U, F>(&self, continuation: F) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> Result<U, Fault> + Send + 'static,
    {
        self.continue_on_success_with_on(&Executor::Default, continuation)
    }

    /// Runs `continuation` with the result only if this value succeeds. A
    /// fault or cancellation is passed through to the output untouched.
    pub fn continue_on_success_with_on<U, F>(
        &self,
        executor: &Executor,
        continuation: F,
    ) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> Result<U, Fault> + Send + 'static,
    {
        self.chain(executor, move |antecedent, source| {
            match antecedent.result() {
                Some(value) => {
                    source.try_set_outcome(run_guarded(|| continuation(value)));
                }
                None => source.pass_through(antecedent),
            }
        })
    }

    pub fn continue_on_success_with_task<U, F>(&self, continuation: F) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> Result<Deferred<U>, Fault> + Send + 'static,
    {
        self.continue_on_success_with_task_on(&Executor::Default, continuation)
    }

    pub fn continue_on_success_with_task_on<U, F>(
        &self,
        executor: &Executor,
        continuation: F,
    ) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> Result<Deferred<U>, Fault> + Send + 'static,
    {
        self.chain(executor, move |antecedent, source| {
            match antecedent.result() {
                Some(value) => source.settle_flattened(run_guarded(|| continuation(value))),
                None => source.pass_through(antecedent),
            }
        })
    }

    pub fn continue_on_error_with<F>(&self, continuation: F) -> Deferred<T>
    where
        F: FnOnce(&Fault) -> Result<T, Fault> + Send + 'static,
    {
        self.continue_on_error_with_on(&Executor::Default, continuation)
    }

    /// Runs `continuation` with the error only if this value faults, letting
    /// it recover with a replacement result. Success and cancellation pass
    /// through untouched.
    pub fn continue_on_error_with_on<F>(&self, executor: &Executor, continuation: F) -> Deferred<T>
    where
        F: FnOnce(&Fault) -> Result<T, Fault> + Send + 'static,
    {
        self.chain(executor, move |antecedent, source| {
            match antecedent.outcome() {
                Some(Outcome::Faulted(fault)) => {
                    source.try_set_outcome(run_guarded(|| continuation(fault)));
                }
                Some(other) => {
                    source.try_set_outcome(other.clone());
                }
                None => {
                    source.try_set_cancelled();
                }
            }
        })
    }

    pub fn continue_on_error_with_task<F>(&self, continuation: F) -> Deferred<T>
    where
        F: FnOnce(&Fault) -> Result<Deferred<T>, Fault> + Send + 'static,
    {
        self.continue_on_error_with_task_on(&Executor::Default, continuation)
    }

    pub fn continue_on_error_with_task_on<F>(
        &self,
        executor: &Executor,
        continuation: F,
    ) -> Deferred<T>
    where
        F: FnOnce(&Fault) -> Result<Deferred<T>, Fault> + Send + 'static,
    {
        self.chain(executor, move |antecedent, source| {
            match antecedent.outcome() {
                Some(Outcome::Faulted(fault)) => {
                    source.settle_flattened(run_guarded(|| continuation(fault)));
                }
                Some(other) => {
                    source.try_set_outcome(other.clone());
                }
                None => {
                    source.try_set_cancelled();
                }
            }
        })
    }

    pub fn continue_on_error_as<E, F>(&self, continuation: F) -> Deferred<T>
    where
        E: StdError + 'static,
        F: FnOnce(&E) -> Result<T, Fault> + Send + 'static,
    {
        self.continue_on_error_as_on(&Executor::Default, continuation)
    }

    /// Recovers only from errors of type `E`. Any other error, a success or
    /// a cancellation passes through untouched.
    pub fn continue_on_error_as_on<E, F>(&self, executor: &Executor, continuation: F) -> Deferred<T>
    where
        E: StdError + 'static,
        F: FnOnce(&E) -> Result<T, Fault> + Send + 'static,
    {
        self.chain(executor, move |antecedent, source| {
            let typed = antecedent.error().and_then(Fault::downcast_ref::<E>);
            match (typed, antecedent.outcome()) {
                (Some(error), _) => {
                    source.try_set_outcome(run_guarded(|| continuation(error)));
                }
                (None, Some(other)) => {
                    source.try_set_outcome(other.clone());
                }
                (None, None) => {
                    source.try_set_cancelled();
                }
            }
        })
    }
}
