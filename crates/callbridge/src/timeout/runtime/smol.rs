use core::time::Duration;

use bytes::Bytes;
use smol::Timer;

use crate::{
    bridge::{CallStream, PendingCall},
    error::Result,
    timeout::{SleepProvider, TimedCallStream},
};

/// An implementation of [`SleepProvider`] using Smol's timer.
///
/// This is the default provider for use in async applications built on Smol.
pub struct SmolSleep;
impl SleepProvider for SmolSleep {
    fn sleep_for(dur: Duration) -> impl Future<Output = ()> + Send {
        async move {
            Timer::after(dur).await;
        }
    }
}

/// Extension trait for bounding a [`PendingCall`] with the
/// [`smol`](https://docs.rs/smol) timer.
pub trait PendingCallSmolExt {
    /// Delegates to [`PendingCall::with_timeout`] with [`SmolSleep`].
    fn timeout(self, timeout: Duration) -> impl Future<Output = Result<Bytes>> + Send;
}

impl PendingCallSmolExt for PendingCall {
    fn timeout(self, timeout: Duration) -> impl Future<Output = Result<Bytes>> + Send {
        self.with_timeout::<SmolSleep>(timeout)
    }
}

/// Extension trait for bounding a [`CallStream`] with the
/// [`smol`](https://docs.rs/smol) timer.
pub trait CallStreamSmolExt {
    /// Delegates to [`CallStream::with_timeout`] with [`SmolSleep`].
    fn timeout(self, timeout: Duration) -> TimedCallStream<impl Future<Output = ()> + Send>;
}

impl CallStreamSmolExt for CallStream {
    fn timeout(self, timeout: Duration) -> TimedCallStream<impl Future<Output = ()> + Send> {
        self.with_timeout::<SmolSleep>(timeout)
    }
}
