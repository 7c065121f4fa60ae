use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::{id::CorrelationId, operation::Outcome};

/// Receiving half of a completion slot.
pub type CompletionReceiver = oneshot::Receiver<Outcome>;

/// Receiving half of a streaming sink. Unbounded: the native thread never
/// waits on the consumer.
pub type ChunkReceiver = mpsc::UnboundedReceiver<Bytes>;

/// Hook invoked on every progress tick for an operation.
///
/// Returning an error (or panicking) fails that one operation with the
/// message. The dispatch mechanism itself is unaffected.
pub type ProgressHook = Arc<dyn Fn(CorrelationId) -> Result<(), String> + Send + Sync>;

/// One in-flight native invocation.
///
/// The handle is cheap to clone so the registry can hand out non-owning
/// reads without holding a shard lock while the caller runs a hook or pushes a
/// chunk. The registry entry is still the only long-lived owner.
///
/// The completion slot is settled by whichever of
/// [`try_complete_result`](Self::try_complete_result),
/// [`try_complete_error`](Self::try_complete_error) or
/// [`try_complete_cancelled`](Self::try_complete_cancelled) runs first. Every
/// later attempt returns `false` and has no effect.
#[derive(Clone)]
pub struct PendingOperation {
    inner: Arc<Inner>,
}

struct Inner {
    id: CorrelationId,
    streaming: bool,
    slot: Mutex<Slot>,
    progress: Option<ProgressHook>,
}

struct Slot {
    completion: Option<oneshot::Sender<Outcome>>,
    sink: Option<mpsc::UnboundedSender<Bytes>>,
}

impl PendingOperation {
    /// Creates a single-shot operation and the receiver its outcome is
    /// delivered to.
    pub fn new(id: CorrelationId, progress: Option<ProgressHook>) -> (Self, CompletionReceiver) {
        let (completion, rx) = oneshot::channel();
        let op = Self::from_parts(id, completion, None, progress);
        (op, rx)
    }

    /// Creates a streaming operation, its outcome receiver, and the receiver
    /// partial chunks are queued on.
    pub fn streaming(
        id: CorrelationId,
        progress: Option<ProgressHook>,
    ) -> (Self, CompletionReceiver, ChunkReceiver) {
        let (completion, rx) = oneshot::channel();
        let (sink, chunks) = mpsc::unbounded_channel();
        let op = Self::from_parts(id, completion, Some(sink), progress);
        (op, rx, chunks)
    }

    fn from_parts(
        id: CorrelationId,
        completion: oneshot::Sender<Outcome>,
        sink: Option<mpsc::UnboundedSender<Bytes>>,
        progress: Option<ProgressHook>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                streaming: sink.is_some(),
                slot: Mutex::new(Slot {
                    completion: Some(completion),
                    sink,
                }),
                progress,
            }),
        }
    }

    pub fn id(&self) -> CorrelationId {
        self.inner.id
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.streaming
    }

    /// Returns `true` once the completion slot has been settled.
    pub fn is_completed(&self) -> bool {
        self.inner.slot.lock().completion.is_none()
    }

    /// Settles the slot with a final result. Returns whether this call won.
    pub fn try_complete_result(&self, data: Bytes) -> bool {
        self.try_complete(Outcome::Result(data))
    }

    /// Settles the slot with an error. Returns whether this call won.
    pub fn try_complete_error(&self, message: impl Into<String>) -> bool {
        self.try_complete(Outcome::Error(message.into()))
    }

    /// Settles the slot as cancelled. Returns whether this call won.
    pub fn try_complete_cancelled(&self) -> bool {
        self.try_complete(Outcome::Cancelled)
    }

    fn try_complete(&self, outcome: Outcome) -> bool {
        let mut slot = self.inner.slot.lock();
        let Some(completion) = slot.completion.take() else {
            return false;
        };
        // Closing the sink here means no chunk can be queued after the
        // terminal outcome; chunks already queued stay readable.
        slot.sink = None;
        drop(slot);

        // The consumer may have stopped listening. The slot is settled either
        // way.
        let _ = completion.send(outcome);
        true
    }

    /// Queues a partial chunk for the consumer without blocking.
    ///
    /// Returns `false` if the operation is not streaming, is already settled,
    /// or its consumer has gone away.
    pub fn push_chunk(&self, chunk: Bytes) -> bool {
        let slot = self.inner.slot.lock();
        if slot.completion.is_none() {
            return false;
        }
        match &slot.sink {
            Some(sink) => sink.send(chunk).is_ok(),
            None => false,
        }
    }

    /// Runs the progress hook, if any, converting a panic into an error.
    pub(crate) fn run_progress(&self) -> Result<(), String> {
        let Some(hook) = &self.inner.progress else {
            return Ok(());
        };
        let id = self.inner.id;
        match panic::catch_unwind(AssertUnwindSafe(|| hook(id))) {
            Ok(result) => result,
            Err(_) => Err(format!("progress hook panicked for id {id}")),
        }
    }
}

impl core::fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PendingOperation")
            .field("id", &self.inner.id)
            .field("streaming", &self.inner.streaming)
            .field("completed", &self.is_completed())
            .finish_non_exhaustive()
    }
}
