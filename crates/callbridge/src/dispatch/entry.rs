//! C-ABI entry points invoked by native worker threads.
//!
//! Each entry point decodes its raw arguments, forwards to the process-wide
//! [`CallbackRegistry`], and swallows every failure. Nothing unwinds into the
//! native caller: unwinding through foreign frames is undefined behavior.

use core::{ffi::c_char, slice};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, OnceLock},
};

use bytes::Bytes;

use crate::{native::CallbackTable, registry::CallbackRegistry};

static PROCESS_REGISTRY: OnceLock<Arc<CallbackRegistry>> = OnceLock::new();

/// The registry the [`CallbackTable::process`] entry points dispatch into.
pub(crate) fn process_registry() -> &'static Arc<CallbackRegistry> {
    PROCESS_REGISTRY.get_or_init(|| Arc::new(CallbackRegistry::new()))
}

impl CallbackTable {
    /// The entry points that dispatch into the process-wide registry.
    ///
    /// [`Bridge::install`](crate::Bridge::install) hands this table to the
    /// native library exactly once.
    pub const fn process() -> Self {
        Self {
            on_result: on_result_entry,
            on_error: on_error_entry,
            on_tick: on_tick_entry,
        }
    }
}

unsafe extern "C" fn on_result_entry(id: u32, is_final: bool, data: *const u8, len: usize) {
    guard("result", || {
        let Some(registry) = PROCESS_REGISTRY.get() else {
            return;
        };
        // SAFETY: the native contract guarantees `data` points to `len`
        // readable bytes for the duration of this call.
        let data = unsafe { copy_buffer(data, len) };
        registry.deliver_result(id, is_final, data);
    });
}

unsafe extern "C" fn on_error_entry(id: u32, message: *const c_char, len: usize) {
    guard("error", || {
        let Some(registry) = PROCESS_REGISTRY.get() else {
            return;
        };
        // SAFETY: as above, `message` points to `len` readable bytes.
        let message = unsafe { copy_buffer(message.cast::<u8>(), len) };
        registry.deliver_error(id, String::from_utf8_lossy(&message).into_owned());
    });
}

extern "C" fn on_tick_entry(id: u32) {
    guard("tick", || {
        if let Some(registry) = PROCESS_REGISTRY.get() {
            registry.deliver_tick(id);
        }
    });
}

/// Copies a native buffer into an owned [`Bytes`]. Null or empty buffers
/// become empty.
///
/// # Safety
///
/// If non-null, `ptr` must be valid for reads of `len` bytes.
unsafe fn copy_buffer(ptr: *const u8, len: usize) -> Bytes {
    if ptr.is_null() || len == 0 {
        return Bytes::new();
    }
    // SAFETY: upheld by the caller.
    Bytes::copy_from_slice(unsafe { slice::from_raw_parts(ptr, len) })
}

#[inline]
fn guard(_kind: &'static str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        #[cfg(feature = "tracing")]
        tracing::error!("panic while dispatching {_kind} callback; dropped");
    }
}
