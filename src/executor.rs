use std::fmt;
use std::sync::Arc;

use crate::main_thread;
use crate::{DispatchQueue, WorkerPool};

/// A unit of work handed to an [`Executor`].
pub struct Job(Box<dyn FnOnce() + Send + 'static>);

impl Job {
    pub fn new(work: impl FnOnce() + Send + 'static) -> Self {
        Job(Box::new(work))
    }

    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Job")
    }
}

/// A caller-supplied dispatch function, see [`Executor::closure`].
#[derive(Clone)]
pub struct Dispatcher(Arc<dyn Fn(Job) + Send + Sync + 'static>);

impl Dispatcher {
    pub fn new(dispatch: impl Fn(Job) + Send + Sync + 'static) -> Self {
        Dispatcher(Arc::new(dispatch))
    }

    pub fn dispatch(&self, job: Job) {
        (self.0)(job)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dispatcher")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Where and how a continuation runs.
///
/// `execute` never fails and never blocks on the work it submits, except
/// for the synchronous variants which run it in place.
#[derive(Clone, Default)]
pub enum Executor {
    /// Runs work immediately on the calling thread.
    #[default]
    Default,
    /// Same as `Default`, for call sites that want to spell out same-thread
    /// execution.
    Immediate,
    /// Runs work on the thread that installed the [`MainLoop`](crate::MainLoop):
    /// in place when already on it, posted otherwise.
    MainThread,
    Queue(DispatchQueue),
    Pool(WorkerPool),
    /// Hands every job to a caller-supplied function, which must run it
    /// exactly once, now or later.
    Closure(Dispatcher),
}

impl Executor {
    pub fn closure(dispatch: impl Fn(Job) + Send + Sync + 'static) -> Self {
        Executor::Closure(Dispatcher::new(dispatch))
    }

    pub fn execute(&self, work: impl FnOnce() + Send + 'static) {
        self.execute_job(Job::new(work));
    }

    pub fn execute_job(&self, job: Job) {
        match self {
            Executor::Default | Executor::Immediate => job.run(),
            Executor::MainThread => main_thread::dispatch(job),
            Executor::Queue(queue) => queue.submit(job),
            Executor::Pool(pool) => pool.submit(job),
            Executor::Closure(dispatcher) => dispatcher.dispatch(job),
        }
    }
}

impl From<DispatchQueue> for Executor {
    fn from(queue: DispatchQueue) -> Self {
        Executor::Queue(queue)
    }
}

impl From<WorkerPool> for Executor {
    fn from(pool: WorkerPool) -> Self {
        Executor::Pool(pool)
    }
}

impl fmt::Display for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Executor::Default => f.write_str("default executor"),
            Executor::Immediate => f.write_str("immediate executor"),
            Executor::MainThread => f.write_str("main thread executor"),
            Executor::Queue(queue) => write!(f, "queue executor ({})", queue.label()),
            Executor::Pool(pool) => write!(f, "pool executor ({})", pool.name()),
            Executor::Closure(_) => f.write_str("closure executor"),
        }
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Executor::Default => f.write_str("Executor::Default"),
            Executor::Immediate => f.write_str("Executor::Immediate"),
            Executor::MainThread => f.write_str("Executor::MainThread"),
            Executor::Queue(queue) => f.debug_tuple("Executor::Queue").field(queue).finish(),
            Executor::Pool(pool) => f.debug_tuple("Executor::Pool").field(pool).finish(),
            Executor::Closure(dispatcher) => {
                f.debug_tuple("Executor::Closure").field(dispatcher).finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeferredSource;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn test_default_execute() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        Executor::Default.execute(move || flag.store(true, Ordering::SeqCst));
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_immediate_execute() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        Executor::Immediate.execute(move || flag.store(true, Ordering::SeqCst));
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_queue_execute() {
        let queue = DispatchQueue::concurrent("test.queue", 2).expect("queue spawn");
        let (gate_tx, gate_rx) = channel::<()>();
        let source = DeferredSource::<()>::new();
        let done = source.clone();
        Executor::from(queue).execute(move || {
            gate_rx.recv().expect("gate");
            done.set_result(());
        });
        assert!(!source.deferred().is_completed());
        gate_tx.send(()).expect("gate");
        assert!(source.deferred().wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn test_pool_execute() {
        let pool = WorkerPool::builder().threads(2).spawn().expect("pool spawn");
        let (gate_tx, gate_rx) = channel::<()>();
        let source = DeferredSource::<()>::new();
        let done = source.clone();
        Executor::Pool(pool).execute(move || {
            gate_rx.recv().expect("gate");
            done.set_result(());
        });
        assert!(!source.deferred().is_completed());
        gate_tx.send(()).expect("gate");
        assert!(source.deferred().wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn test_closure_execute() {
        let dispatched = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&dispatched);
        let executor = Executor::closure(move |job| {
            count.fetch_add(1, Ordering::SeqCst);
            job.run();
        });
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        executor.execute(move || flag.store(true, Ordering::SeqCst));
        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_closure_may_defer() {
        let parked = Arc::new(parking_lot::Mutex::new(Vec::<Job>::new()));
        let sink = Arc::clone(&parked);
        let executor = Executor::closure(move |job| sink.lock().push(job));
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        executor.execute(move || flag.store(true, Ordering::SeqCst));
        assert!(!ran.load(Ordering::SeqCst));
        let jobs: Vec<Job> = parked.lock().drain(..).collect();
        jobs.into_iter().for_each(Job::run);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_descriptions() {
        let queue = DispatchQueue::serial("test.describe").expect("queue spawn");
        let pool = WorkerPool::builder()
            .name("describe")
            .threads(1)
            .spawn()
            .expect("pool spawn");
        let executors = [
            Executor::Default,
            Executor::Immediate,
            Executor::MainThread,
            Executor::Queue(queue),
            Executor::Pool(pool),
            Executor::closure(|_| {}),
        ];
        for executor in &executors {
            assert!(!executor.to_string().is_empty());
            assert!(!format!("{executor:?}").is_empty());
        }
        assert_eq!(executors[3].to_string(), "queue executor (test.describe)");
        assert_eq!(executors[4].to_string(), "pool executor (describe)");
    }
}
