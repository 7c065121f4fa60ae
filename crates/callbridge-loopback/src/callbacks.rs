//! The process-wide callback table, as a C library would keep it in a global
//! set by its one registration function.

use core::ffi::c_char;
use std::sync::OnceLock;

use callbridge::{CallbackTable, CorrelationId, NativeError};

static CALLBACKS: OnceLock<CallbackTable> = OnceLock::new();

/// Stores `table`. Only the first registration in a process succeeds.
pub(crate) fn register(table: CallbackTable) -> Result<(), NativeError> {
    CALLBACKS
        .set(table)
        .map_err(|_| NativeError::new("callbacks are already registered"))
}

/// Reports back for one invocation through the registered table.
#[derive(Clone, Copy)]
pub(crate) struct Emitter {
    table: &'static CallbackTable,
    id: u32,
}

impl Emitter {
    /// `None` until callbacks are registered.
    pub(crate) fn for_call(id: CorrelationId) -> Option<Self> {
        CALLBACKS.get().map(|table| Self { table, id: id.get() })
    }

    #[cfg(test)]
    pub(crate) fn with_table(table: &'static CallbackTable, id: u32) -> Self {
        Self { table, id }
    }

    pub(crate) fn result(self, is_final: bool, data: &[u8]) {
        // SAFETY: `data` is valid for `len` bytes for the duration of the call;
        // the receiver copies it before returning.
        unsafe { (self.table.on_result)(self.id, is_final, data.as_ptr(), data.len()) }
    }

    pub(crate) fn error(self, message: &str) {
        // SAFETY: as above; the message is passed with an explicit length.
        unsafe {
            (self.table.on_error)(self.id, message.as_ptr().cast::<c_char>(), message.len());
        }
    }

    pub(crate) fn tick(self) {
        (self.table.on_tick)(self.id);
    }
}
