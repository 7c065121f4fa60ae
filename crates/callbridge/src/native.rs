//! The native library boundary.
//!
//! [`NativeLibrary`] is what this crate consumes: start, start-streaming,
//! cancel, and a single registration of the three callbacks. [`CallbackTable`]
//! is what it exposes back: plain C-ABI function pointers that native worker
//! threads may call at any time after registration, from any thread.

use core::{ffi::c_char, fmt};

use crate::{error::NativeError, id::CorrelationId};

/// Result delivery: `(id, is_final, data, len)`.
///
/// Non-final deliveries are streamed chunks; the final delivery completes the
/// operation. `data` may be null when `len` is `0`.
pub type ResultCallback = unsafe extern "C" fn(id: u32, is_final: bool, data: *const u8, len: usize);

/// Error delivery: `(id, message, len)`. The message is not NUL-terminated.
pub type ErrorCallback = unsafe extern "C" fn(id: u32, message: *const c_char, len: usize);

/// Progress delivery: `(id)`.
pub type TickCallback = extern "C" fn(id: u32);

/// The three callback entry points handed to the native library.
///
/// The layout is `#[repr(C)]` so the table can be passed through a C
/// registration function as-is.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CallbackTable {
    pub on_result: ResultCallback,
    pub on_error: ErrorCallback,
    pub on_tick: TickCallback,
}

impl fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTable")
            .field("on_result", &(self.on_result as *const ()))
            .field("on_error", &(self.on_error as *const ()))
            .field("on_tick", &(self.on_tick as *const ()))
            .finish()
    }
}

/// Opaque reference to a function in the native library's function table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionRef(u64);

impl FunctionRef {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

/// The entry points of a callback-driven native library.
///
/// ## Contract
///
/// - [`start`](Self::start) and [`start_stream`](Self::start_stream) either
///   fail synchronously or eventually deliver exactly one terminal callback
///   (a final result or an error) for `id`, never both.
/// - Streaming calls may deliver any number of non-final results first, in
///   order.
/// - [`cancel`](Self::cancel) is a request. The library may ignore it, and it
///   may be called for ids that already completed or were never started.
///   Errors it returns are ignored.
/// - [`register_callbacks`](Self::register_callbacks) is called at most once
///   per process by [`Bridge::install`](crate::Bridge::install).
///
/// Callbacks may arrive before `start` returns.
pub trait NativeLibrary: Send + Sync + 'static {
    /// Installs the process-wide callback entry points.
    ///
    /// # Errors
    ///
    /// A failure here is unrecoverable for the process.
    fn register_callbacks(&self, callbacks: CallbackTable) -> Result<(), NativeError>;

    /// Starts a single-shot invocation of `function` correlated by `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the library refuses to start the call. No callback
    /// may follow a synchronous failure.
    fn start(&self, function: FunctionRef, id: CorrelationId, args: &[u8])
    -> Result<(), NativeError>;

    /// Starts a streaming invocation of `function` correlated by `id`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::start`].
    fn start_stream(
        &self,
        function: FunctionRef,
        id: CorrelationId,
        args: &[u8],
    ) -> Result<(), NativeError>;

    /// Requests that the invocation correlated by `id` stop.
    ///
    /// # Errors
    ///
    /// Any error is logged and otherwise ignored by the caller.
    fn cancel(&self, id: CorrelationId) -> Result<(), NativeError>;
}
