//! Conjunction and disjunction over several deferred values.
//!
//! `when_all` waits for every input, even after one has failed; nothing is
//! cancelled early. Once the last input lands, the aggregate is:
//!
//! - cancelled if any input was cancelled,
//! - otherwise faulted with an [`AggregateError`] of every input error, in
//!   input order, if any input faulted,
//! - otherwise succeeded.
//!
//! `when_any` completes with whichever input reaches a terminal state
//! first, whatever that state is.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::trace;

use crate::{Deferred, DeferredSource, Error, Executor, Fault, Outcome};

/// The errors of every faulted input of a `when_all`, in input order.
#[derive(Debug, Clone, Error)]
#[error("{} of the joined operations failed", .errors.len())]
pub struct AggregateError {
    errors: Vec<Fault>,
}

impl AggregateError {
    pub fn errors(&self) -> &[Fault] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Fault> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Per-invocation join state; one slot per input.
struct Join<T, F> {
    remaining: AtomicUsize,
    slots: Mutex<Vec<Option<Outcome<T>>>>,
    finish: Mutex<Option<F>>,
}

impl<T: Send + Sync + 'static, F> Join<T, F> {
    fn settle<R>(&self, source: &DeferredSource<R>)
    where
        R: Send + Sync + 'static,
        F: FnOnce(Vec<Arc<T>>) -> R,
    {
        let slots = std::mem::take(&mut *self.slots.lock());
        let mut values = Vec::with_capacity(slots.len());
        let mut errors = Vec::new();
        let mut cancelled = false;
        for outcome in slots.into_iter().flatten() {
            match outcome {
                Outcome::Succeeded(value) => values.push(value),
                Outcome::Faulted(fault) => errors.push(fault),
                Outcome::Cancelled => cancelled = true,
            }
        }
        trace!(
            succeeded = values.len(),
            faulted = errors.len(),
            cancelled,
            "join settled"
        );

        if cancelled {
            source.try_set_cancelled();
        } else if !errors.is_empty() {
            source.try_set_error(AggregateError { errors });
        } else if let Some(finish) = self.finish.lock().take() {
            source.try_set_result(finish(values));
        }
    }
}

fn join<T, R, F>(inputs: Vec<Deferred<T>>, finish: F) -> Deferred<R>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
    F: FnOnce(Vec<Arc<T>>) -> R + Send + 'static,
{
    if inputs.is_empty() {
        return Deferred::from_value(finish(Vec::new()));
    }

    let source = DeferredSource::new();
    let output = source.deferred();
    let state = Arc::new(Join {
        remaining: AtomicUsize::new(inputs.len()),
        slots: Mutex::new((0..inputs.len()).map(|_| None).collect()),
        finish: Mutex::new(Some(finish)),
    });
    for (index, input) in inputs.iter().enumerate() {
        let state = Arc::clone(&state);
        let source = source.clone();
        input.register(
            Executor::Immediate,
            Box::new(move |done| {
                state.slots.lock()[index] = done.outcome().cloned();
                if state.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    state.settle(&source);
                }
            }),
        );
    }
    output
}

/// Completes once every input is terminal. See the [module docs](self) for
/// how the dispositions combine. An empty input succeeds immediately.
pub fn when_all<T, I>(inputs: I) -> Deferred<()>
where
    T: Send + Sync + 'static,
    I: IntoIterator<Item = Deferred<T>>,
{
    join(inputs.into_iter().collect(), |_| ())
}

/// Like [`when_all`], succeeding with every result in input order.
pub fn when_all_result<T, I>(inputs: I) -> Deferred<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Deferred<T>>,
{
    join(inputs.into_iter().collect(), |values| {
        values.iter().map(|value| T::clone(value)).collect()
    })
}

/// Completes with the first input to reach a terminal state; later
/// completions are ignored.
///
/// The aggregate itself never faults or cancels because of its inputs: the
/// winner's own disposition is read from the returned `Deferred`. An empty
/// input faults right away with [`Error::NoInputs`] rather than never
/// completing.
pub fn when_any<T, I>(inputs: I) -> Deferred<Deferred<T>>
where
    T: Send + Sync + 'static,
    I: IntoIterator<Item = Deferred<T>>,
{
    let inputs: Vec<Deferred<T>> = inputs.into_iter().collect();
    if inputs.is_empty() {
        return Deferred::from_error(Error::NoInputs);
    }

    let source = DeferredSource::new();
    let output = source.deferred();
    for input in &inputs {
        let source = source.clone();
        input.register(
            Executor::Immediate,
            Box::new(move |done| {
                source.try_set_result(done);
            }),
        );
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DispatchQueue, WorkerPool};
    use std::io;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn sources<T: Send + Sync + 'static>(n: usize) -> Vec<DeferredSource<T>> {
        (0..n).map(|_| DeferredSource::new()).collect()
    }

    fn handles<T: Send + Sync + 'static>(sources: &[DeferredSource<T>]) -> Vec<Deferred<T>> {
        sources.iter().map(DeferredSource::deferred).collect()
    }

    #[test]
    fn test_when_all_empty() {
        let all = when_all(Vec::<Deferred<i32>>::new());
        assert!(all.is_completed());
        assert!(all.is_succeeded());
        let results = when_all_result(Vec::<Deferred<i32>>::new());
        assert_eq!(results.result(), Some(&Vec::new()));
    }

    #[test]
    fn test_when_all_waits_for_every_input() {
        let sources = sources::<u8>(3);
        let all = when_all(handles(&sources));
        sources[0].set_result(1);
        sources[2].set_error(Fault::msg("two"));
        assert!(!all.is_completed());
        sources[1].set_result(3);
        assert!(all.is_faulted());
    }

    #[test]
    fn test_when_all_result_keeps_input_order() {
        let sources = sources::<char>(3);
        let all = when_all_result(handles(&sources));
        sources[2].set_result('c');
        sources[1].set_result('b');
        sources[0].set_result('a');
        assert_eq!(all.result(), Some(&vec!['a', 'b', 'c']));
    }

    #[test]
    fn test_when_all_aggregates_errors_in_input_order() {
        let sources = sources::<usize>(10);
        let all = when_all(handles(&sources));
        for (i, source) in sources.iter().enumerate().rev() {
            if [2, 5, 9].contains(&i) {
                source.set_error(io::Error::other(format!("E{i}")));
            } else {
                source.set_result(i);
            }
        }
        let aggregate = all.error().and_then(|f| f.downcast_ref::<AggregateError>());
        let messages: Vec<String> = aggregate
            .map(|a| a.errors().iter().map(ToString::to_string).collect())
            .unwrap_or_default();
        assert_eq!(messages, ["E2", "E5", "E9"]);
        assert_eq!(
            aggregate.map(ToString::to_string).as_deref(),
            Some("3 of the joined operations failed")
        );
    }

    #[test]
    fn test_when_all_cancellation_beats_fault() {
        let sources = sources::<u8>(4);
        let all = when_all_result(handles(&sources));
        sources[0].set_error(Fault::msg("fault"));
        sources[1].set_result(1);
        sources[2].set_cancelled();
        sources[3].set_result(3);
        assert!(all.is_cancelled());
        assert!(all.error().is_none());
    }

    #[test]
    fn test_when_all_from_delayed_workers() {
        let executor = Executor::Queue(DispatchQueue::concurrent("test.when_all", 4).expect("queue"));
        let tasks: Vec<Deferred<usize>> = (1..=20)
            .map(|i| {
                Deferred::with_delay(Duration::from_millis(20))
                    .continue_with_on(&executor, move |_| Ok(i))
            })
            .collect();
        let all = when_all_result(tasks);
        assert!(all.wait_timeout(TIMEOUT));
        assert_eq!(all.result(), Some(&(1..=20).collect::<Vec<_>>()));
    }

    #[test]
    fn test_when_any_first_wins() {
        let sources = sources::<u8>(3);
        let any = when_any(handles(&sources));
        assert!(!any.is_completed());
        sources[1].set_error(Fault::msg("first"));
        sources[0].set_result(0);
        sources[2].set_cancelled();

        assert!(any.is_succeeded());
        let winner = any.result().cloned();
        assert!(winner.is_some_and(|w| Deferred::ptr_eq(&w, &sources[1].deferred())));
    }

    #[test]
    fn test_when_any_with_staggered_delays() {
        let pool = Executor::Pool(WorkerPool::builder().threads(2).spawn().expect("pool"));
        let fast = Deferred::with_delay(Duration::from_millis(10))
            .continue_with_on(&pool, |_| Ok("fast"));
        let slow: Vec<Deferred<&str>> = (0..5)
            .map(|_| {
                Deferred::with_delay(Duration::from_millis(500))
                    .continue_with_on(&pool, |_| Ok("slow"))
            })
            .collect();
        let mut inputs = slow.clone();
        inputs.insert(2, fast.clone());

        let any = when_any(inputs);
        assert!(any.wait_timeout(TIMEOUT));
        let winner = any.result().cloned();
        assert!(winner.is_some_and(|w| Deferred::ptr_eq(&w, &fast)));
        assert!(slow.iter().all(|d| !d.is_completed()));
    }

    #[test]
    fn test_when_any_empty_faults() {
        let any = when_any(Vec::<Deferred<u8>>::new());
        assert!(matches!(
            any.error().and_then(|f| f.downcast_ref::<Error>()),
            Some(Error::NoInputs)
        ));
    }
}
