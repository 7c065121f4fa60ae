use core::{fmt, num::NonZeroU32};

/// An opaque identifier tying a native-side invocation to the pending
/// operation waiting for it.
///
/// Zero is reserved by the native contract to mean "no callback", so the
/// identifier wraps a [`NonZeroU32`]. Identifiers are minted by an
/// [`IdAllocator`] and are never recycled while an operation could still be
/// pending under them.
///
/// [`IdAllocator`]: crate::IdAllocator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(NonZeroU32);

impl CorrelationId {
    /// Wraps a raw identifier received from native code.
    ///
    /// Returns `None` for `0`.
    ///
    /// # Example
    /// ```
    /// use callbridge::CorrelationId;
    ///
    /// assert!(CorrelationId::new(0).is_none());
    /// assert_eq!(CorrelationId::new(7).map(CorrelationId::get), Some(7));
    /// ```
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Returns the raw value passed across the native boundary.
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<CorrelationId> for u32 {
    fn from(id: CorrelationId) -> Self {
        id.get()
    }
}
