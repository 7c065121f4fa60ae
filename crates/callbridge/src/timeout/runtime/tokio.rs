use core::time::Duration;

use bytes::Bytes;

use crate::{
    bridge::{CallStream, PendingCall},
    error::Result,
    timeout::{SleepProvider, TimedCallStream},
};

/// An implementation of [`SleepProvider`] using Tokio's timer.
///
/// This is the default provider for use in async applications built on Tokio.
pub struct TokioSleep;
impl SleepProvider for TokioSleep {
    fn sleep_for(dur: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(dur)
    }
}

/// Extension trait for bounding a [`PendingCall`] with the
/// [`tokio`](https://docs.rs/tokio) timer.
pub trait PendingCallTokioExt {
    /// Delegates to [`PendingCall::with_timeout`] with [`TokioSleep`].
    fn timeout(self, timeout: Duration) -> impl Future<Output = Result<Bytes>> + Send;
}

impl PendingCallTokioExt for PendingCall {
    fn timeout(self, timeout: Duration) -> impl Future<Output = Result<Bytes>> + Send {
        self.with_timeout::<TokioSleep>(timeout)
    }
}

/// Extension trait for bounding a [`CallStream`] with the
/// [`tokio`](https://docs.rs/tokio) timer.
pub trait CallStreamTokioExt {
    /// Delegates to [`CallStream::with_timeout`] with [`TokioSleep`].
    fn timeout(self, timeout: Duration) -> TimedCallStream<impl Future<Output = ()> + Send>;
}

impl CallStreamTokioExt for CallStream {
    fn timeout(self, timeout: Duration) -> TimedCallStream<impl Future<Output = ()> + Send> {
        self.with_timeout::<TokioSleep>(timeout)
    }
}
