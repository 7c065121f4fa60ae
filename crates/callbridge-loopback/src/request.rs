use std::sync::Arc;

use bytes::Bytes;
use callbridge::CorrelationId;
use crossbeam_channel::Sender;
use portable_atomic::{AtomicBool, Ordering};

use crate::functions::Function;

/// A message sent from the pool to an individual worker thread.
#[derive(Debug)]
pub(crate) enum WorkRequest {
    /// Run one invocation to completion, cancellation, or silence.
    Run(Job),

    /// Request the worker to shut down once the jobs queued ahead of this
    /// request are done.
    ///
    /// - `response`: acknowledges that the worker left its loop.
    Shutdown { response: Sender<()> },
}

/// One accepted invocation.
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) id: CorrelationId,
    pub(crate) function: Function,
    pub(crate) args: Bytes,
    pub(crate) cancel: CancelFlag,
}

/// Set by `cancel(id)`; polled by the worker between steps.
#[derive(Clone, Debug, Default)]
pub(crate) struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
