//! OS-thread worker pool standing in for a native library's internal threads.
//!
//! Each worker owns its own unbounded [`crossbeam_channel`] queue. Requests are
//! distributed round-robin and every callback is made from the worker thread
//! that ran the job, never from the thread that started it.

use core::time::Duration;
use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use callbridge::{CorrelationId, NativeError};
use crossbeam_channel::{Sender, unbounded};
use dashmap::DashMap;
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::{
    request::{CancelFlag, Job, WorkRequest},
    worker::{Pacing, worker_loop},
};

const SHUTDOWN_ACK_TIMEOUT: Duration = Duration::from_secs(3);

pub(crate) struct WorkerPool {
    workers: Vec<Sender<WorkRequest>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    next_worker: AtomicUsize,
    shut_down: AtomicBool,
}

impl WorkerPool {
    /// Spawns `num_workers` named worker threads.
    pub(crate) fn spawn(
        num_workers: usize,
        inflight: &Arc<DashMap<CorrelationId, CancelFlag>>,
        pacing: Pacing,
    ) -> io::Result<Self> {
        let mut workers = Vec::with_capacity(num_workers);
        let mut handles = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (tx, rx) = unbounded();
            let inflight = Arc::clone(inflight);
            let handle = thread::Builder::new()
                .name(format!("loopback-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, rx, inflight, pacing))?;
            workers.push(tx);
            handles.push(handle);
        }

        Ok(Self {
            workers,
            handles: Mutex::new(handles),
            next_worker: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Returns the index of the next worker to receive work (round-robin).
    fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Queues `job` on the next worker.
    ///
    /// # Errors
    ///
    /// Fails if the pool is shut down or the worker's queue is closed.
    pub(crate) fn send_to_next_worker(&self, job: Job) -> Result<(), NativeError> {
        if self.is_shut_down() {
            return Err(NativeError::new("library is shut down"));
        }

        let worker_idx = self.next_worker_index();
        self.workers[worker_idx]
            .send(WorkRequest::Run(job))
            .map_err(|_| NativeError::new(format!("worker {worker_idx} queue closed")))
    }

    /// Stops accepting work, lets every worker finish what is queued, then
    /// joins the threads. Later calls return immediately.
    pub(crate) fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("Notifying all workers to shut down");

        let mut acks = Vec::with_capacity(self.workers.len());
        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = crossbeam_channel::bounded(1);
            if let Err(e) = worker.send(WorkRequest::Shutdown { response: tx }) {
                tracing::error!("Failed to send shutdown to worker {i}: {e}");
            } else {
                acks.push((i, rx));
            }
        }

        for (i, rx) in acks {
            match rx.recv_timeout(SHUTDOWN_ACK_TIMEOUT) {
                Ok(()) => tracing::trace!("Worker {i} shutdown acknowledged"),
                Err(e) => tracing::warn!("Worker {i} shutdown not acknowledged: {e}"),
            }
        }

        for handle in self.handles.lock().drain(..) {
            let current = thread::current().id();
            if handle.thread().id() == current {
                // A callback shut the library down from its own worker.
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }

        tracing::info!("Worker pool shutdown complete");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
