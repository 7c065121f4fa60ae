use bytes::Bytes;

use crate::error::{Error, Result};

/// The terminal state of a pending operation.
///
/// A completion slot is settled at most once, to exactly one of these.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use callbridge::{Error, Outcome};
///
/// let ok = Outcome::Result(Bytes::from_static(b"done"));
/// assert_eq!(ok.into_result(), Ok(Bytes::from_static(b"done")));
///
/// assert_eq!(Outcome::Cancelled.into_result(), Err(Error::Cancelled));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The native library delivered a final result.
    Result(Bytes),
    /// The native library reported an error, or the progress hook failed.
    Error(String),
    /// The operation was cancelled before a result or error arrived.
    Cancelled,
}

impl Outcome {
    /// Converts the outcome into the value a consumer awaits.
    pub fn into_result(self) -> Result<Bytes> {
        match self {
            Self::Result(data) => Ok(data),
            Self::Error(message) => Err(Error::Operation(message)),
            Self::Cancelled => Err(Error::Cancelled),
        }
    }
}
