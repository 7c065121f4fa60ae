use core::{
    pin::Pin,
    task::{Context, Poll, ready},
};

use bytes::Bytes;
use pin_project_lite::pin_project;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::{
    bridge::CancellationBridge,
    error::{Error, Result},
    id::CorrelationId,
    operation::{ChunkReceiver, CompletionReceiver},
};

/// Callback invoked for each chunk a streaming call delivers.
pub type ChunkHandler = Box<dyn FnMut(Bytes) + Send>;

pub(crate) struct ChunkForward {
    pub(crate) chunks: ChunkReceiver,
    pub(crate) on_chunk: Option<ChunkHandler>,
}

pin_project! {
    /// A bridged native invocation awaiting its outcome.
    ///
    /// Resolves to the final bytes, [`Error::Operation`] with the native
    /// message, or [`Error::Cancelled`]. A streaming call hands every chunk to
    /// its handler, in arrival order, before it resolves.
    ///
    /// The call listens on a child of the consumer's [`CancellationToken`].
    /// Cancelling that token and calling [`PendingCall::cancel`] feed the same
    /// signal, as does a timeout, so the native cancel entry point is reached
    /// at most once. Dropping an unsettled call cancels it as well.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct PendingCall {
        outcome: CompletionReceiver,
        forward: Option<ChunkForward>,
        settled: Option<Result<Bytes>>,
        signal: CancellationToken,
        #[pin]
        cancelled: WaitForCancellationFutureOwned,
        bridge: CancellationBridge,
    }
}

impl PendingCall {
    pub(crate) fn new(
        outcome: CompletionReceiver,
        forward: Option<ChunkForward>,
        cancellation: &CancellationToken,
        bridge: CancellationBridge,
    ) -> Self {
        let signal = cancellation.child_token();
        Self {
            outcome,
            forward,
            settled: None,
            cancelled: signal.clone().cancelled_owned(),
            signal,
            bridge,
        }
    }

    /// The correlation id this call was started with.
    pub fn id(&self) -> CorrelationId {
        self.bridge.id()
    }

    /// Requests cancellation of this call only.
    ///
    /// Has no effect once the call settled. The call still has to be polled
    /// (or dropped) for the cancellation to reach the native library.
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    /// A handle to this call's cancellation signal, for cancelling it from
    /// elsewhere while the call is being awaited.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.signal.clone()
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Polls for the terminal outcome without forwarding chunks.
    ///
    /// A requested cancel fires the bridge here, so callers check
    /// [`is_cancel_requested`](Self::is_cancel_requested) before handing out
    /// queued chunks.
    pub(crate) fn poll_settled(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<Bytes>> {
        let mut this = self.project();
        loop {
            match Pin::new(&mut *this.outcome).poll(cx) {
                Poll::Ready(Ok(outcome)) => {
                    this.bridge.settle();
                    return Poll::Ready(outcome.into_result());
                }
                Poll::Ready(Err(_)) => {
                    this.bridge.settle();
                    return Poll::Ready(Err(Error::Abandoned));
                }
                Poll::Pending => {}
            }

            // Once fired, the winner of the removal race settles the slot and
            // wakes the receiver.
            if this.bridge.has_fired() {
                return Poll::Pending;
            }
            ready!(this.cancelled.as_mut().poll(cx));
            this.bridge.fire();
        }
    }

    /// Polls the next chunk of a streaming call. `None` once the stream closed.
    pub(crate) fn poll_chunk(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        match self.project().forward {
            Some(forward) => forward.chunks.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }

    /// Forwards what is queued right now, stopping as soon as a cancel is
    /// requested.
    fn forward_chunks(self: Pin<&mut Self>, cx: &mut Context<'_>) {
        let this = self.project();
        let Some(ChunkForward {
            chunks,
            on_chunk: Some(on_chunk),
        }) = this.forward.as_mut()
        else {
            return;
        };
        while !this.signal.is_cancelled() {
            match chunks.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => on_chunk(chunk),
                _ => break,
            }
        }
    }

    /// Forwards everything left once the call settled. The sink is closed by
    /// then, so this only returns `Pending` when the task has to yield.
    fn drain_chunks(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.project();
        let Some(ChunkForward {
            chunks,
            on_chunk: Some(on_chunk),
        }) = this.forward.as_mut()
        else {
            return Poll::Ready(());
        };
        while let Some(chunk) = ready!(chunks.poll_recv(cx)) {
            on_chunk(chunk);
        }
        Poll::Ready(())
    }
}

impl Future for PendingCall {
    type Output = Result<Bytes>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = match self.as_mut().project().settled.take() {
            Some(result) => result,
            None => {
                self.as_mut().forward_chunks(cx);
                ready!(self.as_mut().poll_settled(cx))
            }
        };
        // Chunks queued ahead of the terminal outcome still reach the handler.
        if self.as_mut().drain_chunks(cx).is_pending() {
            *self.project().settled = Some(result);
            return Poll::Pending;
        }
        Poll::Ready(result)
    }
}

impl core::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PendingCall")
            .field("id", &self.bridge.id())
            .field("streaming", &self.forward.is_some())
            .field("cancel_requested", &self.signal.is_cancelled())
            .finish()
    }
}
