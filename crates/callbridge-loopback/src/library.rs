use core::time::Duration;
use std::{io, sync::Arc};

use bytes::Bytes;
use callbridge::{CallbackTable, CorrelationId, FunctionRef, NativeError, NativeLibrary};
use dashmap::DashMap;

use crate::{
    callbacks,
    functions::Function,
    pool::WorkerPool,
    request::{CancelFlag, Job},
    worker::Pacing,
};

/// Tunables for a [`LoopbackLibrary`].
#[derive(Clone, Copy, Debug)]
pub struct LoopbackOptions {
    /// Worker threads; at least one is spawned.
    pub workers: usize,
    /// Tick callbacks reported by the `tick` function.
    pub ticks: usize,
    /// Pause before every step of every job.
    pub step_delay: Duration,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            workers: 2,
            ticks: 3,
            step_delay: Duration::ZERO,
        }
    }
}

/// A callback-driven "native" library implemented with OS threads.
///
/// Calls are accepted synchronously and answered later, from a worker thread,
/// exclusively through the [`CallbackTable`] registered with
/// [`NativeLibrary::register_callbacks`]. Like a C library, it keeps that
/// table in a process-wide global, so the first registration in a process
/// serves every instance.
///
/// Dropping the library shuts its workers down after the queued jobs finish.
pub struct LoopbackLibrary {
    pool: WorkerPool,
    inflight: Arc<DashMap<CorrelationId, CancelFlag>>,
}

impl LoopbackLibrary {
    /// Spawns the worker threads.
    ///
    /// # Errors
    ///
    /// Fails if a worker thread could not be spawned.
    pub fn new(options: LoopbackOptions) -> io::Result<Self> {
        let inflight = Arc::new(DashMap::new());
        let pacing = Pacing {
            ticks: options.ticks,
            step_delay: options.step_delay,
        };
        let pool = WorkerPool::spawn(options.workers.max(1), &inflight, pacing)?;
        Ok(Self { pool, inflight })
    }

    /// Number of accepted jobs that have not reached their terminal step.
    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    /// Rejects new calls, finishes queued ones, and joins the workers.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    fn submit(
        &self,
        function: FunctionRef,
        id: CorrelationId,
        args: &[u8],
        streaming: bool,
    ) -> Result<(), NativeError> {
        let Some(resolved) = Function::from_ref(function) else {
            return Err(NativeError::new(format!("unknown function {function}")));
        };
        if resolved.is_streaming() != streaming {
            let expected = if resolved.is_streaming() { "start_stream" } else { "start" };
            return Err(NativeError::new(format!(
                "function {resolved} must be started with {expected}"
            )));
        }
        if self.pool.is_shut_down() {
            return Err(NativeError::new("library is shut down"));
        }

        let cancel = CancelFlag::default();
        self.inflight.insert(id, cancel.clone());
        let job = Job {
            id,
            function: resolved,
            args: Bytes::copy_from_slice(args),
            cancel,
        };
        self.pool.send_to_next_worker(job).inspect_err(|_| {
            self.inflight.remove(&id);
        })?;

        tracing::trace!("accepted {resolved} for {id}");
        Ok(())
    }
}

impl NativeLibrary for LoopbackLibrary {
    fn register_callbacks(&self, callbacks: CallbackTable) -> Result<(), NativeError> {
        callbacks::register(callbacks)
    }

    fn start(&self, function: FunctionRef, id: CorrelationId, args: &[u8]) -> Result<(), NativeError> {
        self.submit(function, id, args, false)
    }

    fn start_stream(
        &self,
        function: FunctionRef,
        id: CorrelationId,
        args: &[u8],
    ) -> Result<(), NativeError> {
        self.submit(function, id, args, true)
    }

    /// Idempotent; unknown or finished ids are ignored.
    fn cancel(&self, id: CorrelationId) -> Result<(), NativeError> {
        if let Some(flag) = self.inflight.get(&id) {
            flag.cancel();
            tracing::trace!("cancel requested for {id}");
        }
        Ok(())
    }
}

impl core::fmt::Debug for LoopbackLibrary {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoopbackLibrary")
            .field("inflight", &self.inflight.len())
            .field("shut_down", &self.pool.is_shut_down())
            .finish()
    }
}
