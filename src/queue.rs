use std::fmt;
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::worker::{self, WorkerSpec};
use crate::{Error, Job};

/// How a [`DispatchQueue`] orders the jobs submitted to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// One worker; jobs run one at a time in submission order.
    Serial,
    /// `width` workers; jobs may run concurrently and in any order.
    Concurrent { width: usize },
}

struct Inner {
    label: String,
    kind: QueueKind,
    sender: Sender<Job>,
}

/// A labelled queue backed by its own worker threads.
///
/// Clones are handles to the same queue. The workers shut down once the
/// last handle is gone and the remaining jobs have run.
#[derive(Clone)]
pub struct DispatchQueue {
    inner: Arc<Inner>,
}

impl DispatchQueue {
    pub fn serial(label: impl Into<String>) -> Result<Self, Error> {
        Self::spawn(label.into(), QueueKind::Serial)
    }

    /// A queue running up to `width` jobs at once. A width of zero is
    /// treated as one.
    pub fn concurrent(label: impl Into<String>, width: usize) -> Result<Self, Error> {
        Self::spawn(
            label.into(),
            QueueKind::Concurrent {
                width: width.max(1),
            },
        )
    }

    fn spawn(label: String, kind: QueueKind) -> Result<Self, Error> {
        let threads = match kind {
            QueueKind::Serial => 1,
            QueueKind::Concurrent { width } => width,
        };
        let sender = worker::spawn_workers(&WorkerSpec {
            name: &label,
            threads,
            stack_size: None,
        })?;
        Ok(DispatchQueue {
            inner: Arc::new(Inner {
                label,
                kind,
                sender,
            }),
        })
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn kind(&self) -> QueueKind {
        self.inner.kind
    }

    /// Jobs submitted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.inner.sender.len()
    }

    pub(crate) fn submit(&self, job: Job) {
        worker::submit(&self.inner.sender, &self.inner.label, job);
    }
}

impl fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("label", &self.inner.label)
            .field("kind", &self.inner.kind)
            .finish()
    }
}
