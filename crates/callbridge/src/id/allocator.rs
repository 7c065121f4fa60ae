use portable_atomic::{AtomicU32, Ordering};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::id::CorrelationId;

/// A lock-free allocator of [`CorrelationId`]s.
///
/// The allocator stores the next raw identifier in an [`AtomicU32`] and hands
/// out values with a single `fetch_add`, so it can be shared by any number of
/// threads without a lock.
///
/// ## Features
/// - ✅ Thread-safe and wait-free on the common path
/// - ✅ Never returns `0`
/// - ❌ Unique only modulo 32-bit wraparound
///
/// ## Caveats
/// After `u32::MAX` allocations the counter wraps and skips zero. Values can
/// then repeat. An operation that is still registered under a repeated value
/// makes the new insert fail with [`Error::DuplicateId`], which is fatal to
/// that one invocation only.
///
/// [`Error::DuplicateId`]: crate::Error::DuplicateId
pub struct IdAllocator {
    #[cfg(feature = "cache-padded")]
    next: crossbeam_utils::CachePadded<AtomicU32>,
    #[cfg(not(feature = "cache-padded"))]
    next: AtomicU32,
}

impl IdAllocator {
    /// Creates an allocator whose first identifier is `1`.
    ///
    /// # Example
    /// ```
    /// use callbridge::IdAllocator;
    ///
    /// let ids = IdAllocator::new();
    /// assert_eq!(ids.next().get(), 1);
    /// assert_eq!(ids.next().get(), 2);
    /// ```
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates an allocator whose first identifier is `first`.
    ///
    /// This is primarily useful to resume a sequence or to exercise the
    /// wraparound path. A `first` of `0` behaves like `1`.
    pub const fn starting_at(first: u32) -> Self {
        Self {
            #[cfg(feature = "cache-padded")]
            next: crossbeam_utils::CachePadded::new(AtomicU32::new(first)),
            #[cfg(not(feature = "cache-padded"))]
            next: AtomicU32::new(first),
        }
    }

    /// Returns the next identifier.
    ///
    /// Never blocks and never fails. Zero is skipped when the counter wraps.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next(&self) -> CorrelationId {
        loop {
            let raw = self.next.fetch_add(1, Ordering::Relaxed);
            if let Some(id) = CorrelationId::new(raw) {
                return id;
            }
            Self::cold_wrapped();
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_wrapped() {
        #[cfg(feature = "tracing")]
        tracing::debug!("correlation id counter wrapped around");
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdAllocator")
            .field("next", &self.next.load(Ordering::Relaxed))
            .finish()
    }
}
