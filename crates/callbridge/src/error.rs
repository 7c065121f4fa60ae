//! Error types surfaced by `callbridge`.
//!
//! Every error resolves at the granularity of a single operation, except
//! [`Error::Registration`], which is sticky for the whole process because the
//! native library can no longer reach the registry.
//!
//! ## Error Cases
//! - `Rejected`: The native entry point refused to start the operation.
//! - `Operation`: The native library reported a failure through the error
//!   callback, or the operation's progress hook failed.
//! - `Cancelled`: The consumer's signal, a timeout, or dropping the call
//!   cancelled the operation before it completed.
//! - `DuplicateId`: An identifier was already registered.
//! - `Registration`: The one-time callback registration failed.
//! - `Abandoned`: The operation was discarded without ever being settled.

use crate::id::CorrelationId;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for bridged native invocations.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The native entry point failed synchronously; no callback will follow.
    #[error("Native library rejected the call: {0}")]
    Rejected(String),

    /// The operation failed asynchronously with a native-supplied message.
    #[error("Operation failed: {0}")]
    Operation(String),

    /// The operation was cancelled before a result or error arrived.
    #[error("Operation cancelled")]
    Cancelled,

    /// The identifier is already registered to another pending operation.
    #[error("Correlation id {0} is already registered")]
    DuplicateId(CorrelationId),

    /// The process-wide callback registration failed.
    #[error("Callback registration failed: {0}")]
    Registration(String),

    /// The registry discarded the operation without settling it.
    #[error("Operation abandoned before completion")]
    Abandoned,
}

impl Error {
    /// Returns `true` for [`Error::Cancelled`].
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A failure reported synchronously by a [`NativeLibrary`] entry point.
///
/// [`NativeLibrary`]: crate::NativeLibrary
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[error("{message}")]
pub struct NativeError {
    message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<NativeError> for Error {
    fn from(err: NativeError) -> Self {
        Self::Rejected(err.message)
    }
}
