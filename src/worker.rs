//! Owned worker threads draining a shared job channel.
//!
//! Queues and pools are thin handles around the sending half. Workers exit
//! once every handle is dropped and the channel has been drained.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::fault::panic_message;
use crate::{Error, Job};

#[derive(Debug, Clone)]
pub(crate) struct WorkerSpec<'a> {
    pub(crate) name: &'a str,
    pub(crate) threads: usize,
    pub(crate) stack_size: Option<usize>,
}

pub(crate) fn spawn_workers(spec: &WorkerSpec<'_>) -> Result<Sender<Job>, Error> {
    let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
    for index in 0..spec.threads.max(1) {
        let thread_name = if spec.threads > 1 {
            format!("{}-{index}", spec.name)
        } else {
            spec.name.to_owned()
        };
        let mut builder = thread::Builder::new().name(thread_name.clone());
        if let Some(stack_size) = spec.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let receiver = receiver.clone();
        builder.spawn(move || work(&thread_name, receiver))?;
    }
    Ok(sender)
}

fn work(name: &str, receiver: Receiver<Job>) {
    debug!(worker = name, "worker starting");
    for job in receiver {
        // A panicking job must not take the worker down with it.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
            warn!(
                worker = name,
                panic = %panic_message(payload.as_ref()),
                "job panicked"
            );
        }
    }
    debug!(worker = name, "worker exiting");
}

/// Sends `job`, running it on the caller if no worker can take it anymore.
pub(crate) fn submit(sender: &Sender<Job>, name: &str, job: Job) {
    if let Err(rejected) = sender.send(job) {
        warn!(worker = name, "workers are gone, running job inline");
        rejected.into_inner().run();
    }
}
