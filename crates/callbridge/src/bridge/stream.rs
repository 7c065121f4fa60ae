use core::{
    pin::Pin,
    task::{Context, Poll, ready},
};

use bytes::Bytes;
use futures::{Stream, stream::FusedStream};
use pin_project_lite::pin_project;
use tokio_util::sync::CancellationToken;

use crate::{bridge::PendingCall, error::Result, id::CorrelationId};

/// One item of a streaming call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// A partial result, in native delivery order.
    Chunk(Bytes),
    /// The final result. Nothing follows it.
    Final(Bytes),
}

pin_project! {
    /// A streaming call consumed as an async sequence.
    ///
    /// Yields every [`Delivery::Chunk`] in arrival order, then either
    /// [`Delivery::Final`] or a single error, then ends. Dropping the stream
    /// before it ends cancels the call.
    #[must_use = "streams do nothing unless polled"]
    pub struct CallStream {
        #[pin]
        call: PendingCall,
        settled: Option<Result<Bytes>>,
        finished: bool,
    }
}

impl CallStream {
    pub(crate) fn new(call: PendingCall) -> Self {
        Self {
            call,
            settled: None,
            finished: false,
        }
    }

    pub fn id(&self) -> CorrelationId {
        self.call.id()
    }

    /// See [`PendingCall::cancel`].
    pub fn cancel(&self) {
        self.call.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.call.cancellation_token()
    }
}

impl Stream for CallStream {
    type Item = Result<Delivery>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.finished {
            return Poll::Ready(None);
        }

        if this.settled.is_none() {
            if !this.call.is_cancel_requested() {
                if let Poll::Ready(Some(chunk)) = this.call.as_mut().poll_chunk(cx) {
                    return Poll::Ready(Some(Ok(Delivery::Chunk(chunk))));
                }
            }
            *this.settled = Some(ready!(this.call.as_mut().poll_settled(cx)));
        }

        // Settling closed the sink; hand out what is left before the end.
        if let Some(chunk) = ready!(this.call.as_mut().poll_chunk(cx)) {
            return Poll::Ready(Some(Ok(Delivery::Chunk(chunk))));
        }
        *this.finished = true;
        Poll::Ready(this.settled.take().map(|result| result.map(Delivery::Final)))
    }
}

impl FusedStream for CallStream {
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

impl core::fmt::Debug for CallStream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallStream")
            .field("call", &self.call)
            .field("finished", &self.finished)
            .finish()
    }
}
