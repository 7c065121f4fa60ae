use core::time::Duration;
use std::{sync::Arc, thread};

use bytes::Bytes;
use callbridge::CorrelationId;
use crossbeam_channel::Receiver;
use dashmap::DashMap;

use crate::{
    callbacks::Emitter,
    functions::{Function, words},
    request::{CancelFlag, Job, WorkRequest},
};

/// Per-step behavior shared by every worker.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Pacing {
    /// Tick callbacks reported by [`Function::Tick`].
    pub(crate) ticks: usize,
    /// Pause before every step; cancellation is checked after it.
    pub(crate) step_delay: Duration,
}

/// What ends an invocation after its intermediate callbacks.
#[derive(Debug, PartialEq, Eq)]
enum Terminal {
    Result(Bytes),
    Error(String),
}

/// Worker thread body.
///
/// Runs [`WorkRequest::Run`] jobs in arrival order until a
/// [`WorkRequest::Shutdown`] arrives or every sender is gone. Each job is
/// dropped from `inflight` before its terminal callback, so a `cancel` that
/// races the end of a job is a no-op.
pub(crate) fn worker_loop(
    worker_id: usize,
    rx: Receiver<WorkRequest>,
    inflight: Arc<DashMap<CorrelationId, CancelFlag>>,
    pacing: Pacing,
) {
    tracing::trace!("Worker {worker_id} started");

    while let Ok(work) = rx.recv() {
        match work {
            WorkRequest::Run(job) => {
                let id = job.id;
                let Some(emitter) = Emitter::for_call(id) else {
                    tracing::warn!("Worker {worker_id} dropping {id}: no callbacks registered");
                    inflight.remove(&id);
                    continue;
                };

                let terminal = run_job(&job, emitter, pacing);
                inflight.remove(&id);
                match terminal {
                    Some(Terminal::Result(data)) => emitter.result(true, &data),
                    Some(Terminal::Error(message)) => emitter.error(&message),
                    None => {
                        tracing::debug!("Worker {worker_id} finished {id} without a callback");
                    }
                }
            }
            WorkRequest::Shutdown { response } => {
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    tracing::trace!("Worker {worker_id} stopped");
}

/// Runs `job`'s intermediate steps. `None` means no terminal callback:
/// the job was cancelled, or the function never answers.
fn run_job(job: &Job, emitter: Emitter, pacing: Pacing) -> Option<Terminal> {
    let step = || {
        if !pacing.step_delay.is_zero() {
            thread::sleep(pacing.step_delay);
        }
        !job.cancel.is_cancelled()
    };

    match job.function {
        Function::Echo => step().then(|| Terminal::Result(job.args.clone())),
        Function::Reverse => step().then(|| {
            let mut reversed = job.args.to_vec();
            reversed.reverse();
            Terminal::Result(Bytes::from(reversed))
        }),
        Function::Split => {
            let mut count = 0_usize;
            for word in words(&job.args) {
                if !step() {
                    return None;
                }
                emitter.result(false, word);
                count += 1;
            }
            (!job.cancel.is_cancelled()).then(|| Terminal::Result(Bytes::from(count.to_string())))
        }
        Function::Tick => {
            for _ in 0..pacing.ticks {
                if !step() {
                    return None;
                }
                emitter.tick();
            }
            (!job.cancel.is_cancelled()).then(|| Terminal::Result(job.args.clone()))
        }
        Function::Fail => step().then(|| Terminal::Error(String::from_utf8_lossy(&job.args).into_owned())),
        Function::Silent => None,
    }
}
