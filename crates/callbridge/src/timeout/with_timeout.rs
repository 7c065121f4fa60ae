use core::{
    pin::{Pin, pin},
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use futures::{
    Stream,
    future::{Either, select},
    stream::FusedStream,
};
use pin_project_lite::pin_project;
use tokio_util::sync::CancellationToken;

use crate::{
    bridge::{CallStream, Delivery, PendingCall},
    error::Result,
    id::CorrelationId,
    timeout::SleepProvider,
};

impl PendingCall {
    /// Bounds the call by `timeout`, measured with `S`.
    ///
    /// On expiry the call's own signal is cancelled, never the consumer's
    /// token, and the call then resolves the way an explicit cancel does:
    /// usually [`Error::Cancelled`], or the real outcome if a callback won the
    /// race.
    ///
    /// [`Error::Cancelled`]: crate::Error::Cancelled
    pub fn with_timeout<S>(self, timeout: Duration) -> impl Future<Output = Result<Bytes>> + Send
    where
        S: SleepProvider,
    {
        async move {
            let signal = self.cancellation_token();
            let mut call = pin!(self);
            let sleep = pin!(S::sleep_for(timeout));
            if let Either::Left((result, _)) = select(call.as_mut(), sleep).await {
                return result;
            }
            #[cfg(feature = "tracing")]
            tracing::debug!("call {} timed out after {timeout:?}", call.id());
            signal.cancel();
            call.await
        }
    }
}

impl CallStream {
    /// Bounds the stream by `timeout`, measured with `S`.
    ///
    /// On expiry the call's own signal is cancelled, the same as
    /// [`PendingCall::with_timeout`]. The stream then hands out the chunks
    /// already queued and ends with the settled outcome, usually
    /// [`Error::Cancelled`].
    ///
    /// [`Error::Cancelled`]: crate::Error::Cancelled
    pub fn with_timeout<S>(self, timeout: Duration) -> TimedCallStream<impl Future<Output = ()> + Send>
    where
        S: SleepProvider,
    {
        TimedCallStream {
            stream: self,
            deadline: S::sleep_for(timeout),
            expired: false,
        }
    }
}

pin_project! {
    /// A [`CallStream`] with a deadline, created by
    /// [`CallStream::with_timeout`].
    #[must_use = "streams do nothing unless polled"]
    pub struct TimedCallStream<F> {
        #[pin]
        stream: CallStream,
        #[pin]
        deadline: F,
        expired: bool,
    }
}

impl<F> TimedCallStream<F> {
    pub fn id(&self) -> CorrelationId {
        self.stream.id()
    }

    /// See [`PendingCall::cancel`].
    pub fn cancel(&self) {
        self.stream.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.stream.cancellation_token()
    }
}

impl<F> Stream for TimedCallStream<F>
where
    F: Future<Output = ()>,
{
    type Item = Result<Delivery>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if !*this.expired && !this.stream.is_terminated() && this.deadline.poll(cx).is_ready() {
            *this.expired = true;
            #[cfg(feature = "tracing")]
            tracing::debug!("stream {} hit its deadline", this.stream.id());
            this.stream.cancel();
        }
        this.stream.poll_next(cx)
    }
}

impl<F> FusedStream for TimedCallStream<F>
where
    F: Future<Output = ()>,
{
    fn is_terminated(&self) -> bool {
        self.stream.is_terminated()
    }
}

impl<F> core::fmt::Debug for TimedCallStream<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimedCallStream")
            .field("stream", &self.stream)
            .field("expired", &self.expired)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use bytes::Bytes;
    use futures::{StreamExt, future::join_all};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        Bridge, CallbackRegistry, CallbackTable, CorrelationId, Error, FunctionRef, IdAllocator,
        NativeError, NativeLibrary,
    };

    struct TestSleep;

    impl SleepProvider for TestSleep {
        fn sleep_for(dur: Duration) -> impl Future<Output = ()> + Send {
            tokio::time::sleep(dur)
        }
    }

    #[derive(Default)]
    struct Silent {
        cancels: Mutex<Vec<u32>>,
    }

    impl NativeLibrary for Silent {
        fn register_callbacks(&self, _: CallbackTable) -> Result<(), NativeError> {
            Ok(())
        }

        fn start(&self, _: FunctionRef, _: CorrelationId, _: &[u8]) -> Result<(), NativeError> {
            Ok(())
        }

        fn start_stream(&self, _: FunctionRef, _: CorrelationId, _: &[u8]) -> Result<(), NativeError> {
            Ok(())
        }

        fn cancel(&self, id: CorrelationId) -> Result<(), NativeError> {
            self.cancels.lock().unwrap().push(id.get());
            Ok(())
        }
    }

    fn bridge(native: &Arc<Silent>) -> Bridge {
        Bridge::with_parts(
            Arc::clone(native) as Arc<dyn NativeLibrary>,
            Arc::new(CallbackRegistry::new()),
            Arc::new(IdAllocator::new()),
        )
    }

    #[tokio::test]
    async fn expiry_cancels_call_but_not_consumer_token() {
        let native = Arc::new(Silent::default());
        let bridge = bridge(&native);
        let token = CancellationToken::new();
        let call = bridge.invoke(FunctionRef::new(1), b"", &token).unwrap();

        let result = call.with_timeout::<TestSleep>(Duration::from_millis(10)).await;

        assert_eq!(result, Err(Error::Cancelled));
        assert_eq!(*native.cancels.lock().unwrap(), vec![1]);
        assert!(!token.is_cancelled());
        assert!(bridge.registry().is_empty());
    }

    #[tokio::test]
    async fn completion_within_deadline_wins() {
        let native = Arc::new(Silent::default());
        let bridge = bridge(&native);
        let call = bridge
            .invoke(FunctionRef::new(1), b"", &CancellationToken::new())
            .unwrap();
        bridge
            .registry()
            .deliver_result(1, true, Bytes::from_static(b"in time"));

        let result = call.with_timeout::<TestSleep>(Duration::from_secs(5)).await;

        assert_eq!(result.unwrap(), &b"in time"[..]);
        assert!(native.cancels.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn expiry_racing_explicit_cancel_reaches_native_once() {
        const CALLS: u32 = 128;

        let native = Arc::new(Silent::default());
        let bridge = bridge(&native);

        let tasks: Vec<_> = (0..CALLS)
            .map(|_| {
                let token = CancellationToken::new();
                let call = bridge.invoke(FunctionRef::new(1), b"", &token).unwrap();
                let canceller = tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    token.cancel();
                });
                tokio::spawn(async move {
                    let result = call.with_timeout::<TestSleep>(Duration::from_millis(2)).await;
                    canceller.await.unwrap();
                    result
                })
            })
            .collect();

        for joined in join_all(tasks).await {
            assert_eq!(joined.unwrap(), Err(Error::Cancelled));
        }
        let mut cancels = native.cancels.lock().unwrap().clone();
        cancels.sort_unstable();
        assert_eq!(cancels, (1..=CALLS).collect::<Vec<_>>());
        assert!(bridge.registry().is_empty());
    }

    #[tokio::test]
    async fn stream_expiry_cancels_call_but_not_consumer_token() {
        let native = Arc::new(Silent::default());
        let bridge = bridge(&native);
        let token = CancellationToken::new();
        let stream = bridge.stream(FunctionRef::new(1), b"", &token).unwrap();
        bridge
            .registry()
            .deliver_result(1, false, Bytes::from_static(b"partial"));

        let items: Vec<_> = stream
            .with_timeout::<TestSleep>(Duration::from_millis(10))
            .collect()
            .await;

        assert_eq!(
            items,
            vec![Ok(Delivery::Chunk(Bytes::from_static(b"partial"))), Err(Error::Cancelled)]
        );
        assert_eq!(*native.cancels.lock().unwrap(), vec![1]);
        assert!(!token.is_cancelled());
        assert!(bridge.registry().is_empty());
    }

    #[tokio::test]
    async fn stream_finishing_in_time_is_untouched() {
        let native = Arc::new(Silent::default());
        let bridge = bridge(&native);
        let stream = bridge
            .stream(FunctionRef::new(1), b"", &CancellationToken::new())
            .unwrap();
        let registry = bridge.registry();
        registry.deliver_result(1, false, Bytes::from_static(b"a"));
        registry.deliver_result(1, true, Bytes::from_static(b"b"));

        let items: Vec<_> = stream
            .with_timeout::<TestSleep>(Duration::from_secs(5))
            .collect()
            .await;

        assert_eq!(
            items,
            vec![
                Ok(Delivery::Chunk(Bytes::from_static(b"a"))),
                Ok(Delivery::Final(Bytes::from_static(b"b"))),
            ]
        );
        assert!(native.cancels.lock().unwrap().is_empty());
    }
}
