use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;

use crate::worker::{self, WorkerSpec};
use crate::{Error, Job};

struct Inner {
    name: String,
    threads: usize,
    sender: Sender<Job>,
}

/// A fixed set of worker threads sharing one job channel. No ordering is
/// guaranteed between jobs.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    /// Returns a builder that can be used to configure and spawn a [`WorkerPool`].
    pub fn builder() -> PoolBuilder {
        PoolBuilder {
            name: "deferred-pool".to_owned(),
            threads: None,
            stack_size: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn threads(&self) -> usize {
        self.inner.threads
    }

    /// Jobs submitted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.inner.sender.len()
    }

    pub(crate) fn submit(&self, job: Job) {
        worker::submit(&self.inner.sender, &self.inner.name, job);
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.inner.name)
            .field("threads", &self.inner.threads)
            .finish()
    }
}

/// A builder object that can be used to configure and spawn a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct PoolBuilder {
    name: String,
    threads: Option<usize>,
    stack_size: Option<usize>,
}

impl PoolBuilder {
    /// Sets the thread name prefix. Worker `i` is named `"{name}-{i}"`.
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    /// Sets the number of worker threads.
    ///
    /// Defaults to the available parallelism of the machine. Zero is
    /// treated as one.
    pub fn threads(self, threads: usize) -> Self {
        Self {
            threads: Some(threads.max(1)),
            ..self
        }
    }

    pub fn stack_size(self, bytes: usize) -> Self {
        Self {
            stack_size: Some(bytes),
            ..self
        }
    }

    pub fn spawn(self) -> Result<WorkerPool, Error> {
        let threads = self.threads.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        });
        let sender = worker::spawn_workers(&WorkerSpec {
            name: &self.name,
            threads,
            stack_size: self.stack_size,
        })?;
        Ok(WorkerPool {
            inner: Arc::new(Inner {
                name: self.name,
                threads,
                sender,
            }),
        })
    }
}
