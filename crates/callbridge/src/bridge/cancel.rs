use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use crate::{id::CorrelationId, native::NativeLibrary, registry::CallbackRegistry};

/// Carries a consumer-side cancellation across the native boundary.
///
/// Firing (1) asks the native library to cancel `id`, ignoring any failure,
/// (2) atomically removes `id` from the registry, and (3) settles the
/// operation as cancelled only if that removal won. If a callback already
/// removed the operation, its real outcome stands.
///
/// The bridge fires at most once. It also fires on drop unless the call it
/// belongs to has settled, so abandoning a call cancels it.
pub(crate) struct CancellationBridge {
    id: CorrelationId,
    registry: Arc<CallbackRegistry>,
    native: Arc<dyn NativeLibrary>,
    fired: bool,
    settled: bool,
}

impl CancellationBridge {
    pub(crate) fn new(
        id: CorrelationId,
        registry: Arc<CallbackRegistry>,
        native: Arc<dyn NativeLibrary>,
    ) -> Self {
        Self {
            id,
            registry,
            native,
            fired: false,
            settled: false,
        }
    }

    pub(crate) fn id(&self) -> CorrelationId {
        self.id
    }

    pub(crate) fn has_fired(&self) -> bool {
        self.fired
    }

    /// Marks the call as settled; the bridge becomes inert.
    pub(crate) fn settle(&mut self) {
        self.settled = true;
    }

    /// Fires the bridge. Returns `true` if this call settled the operation as
    /// cancelled.
    pub(crate) fn fire(&mut self) -> bool {
        if self.fired || self.settled {
            return false;
        }
        self.fired = true;

        let id = self.id;
        let native = &self.native;
        match panic::catch_unwind(AssertUnwindSafe(|| native.cancel(id))) {
            Ok(Ok(())) => {}
            Ok(Err(_e)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("native cancel for {id} failed: {_e}");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("native cancel for {id} panicked");
            }
        }

        match self.registry.remove(id) {
            Some(op) => op.try_complete_cancelled(),
            None => false,
        }
    }
}

impl Drop for CancellationBridge {
    fn drop(&mut self) {
        if !self.settled && self.fire() {
            #[cfg(feature = "tracing")]
            tracing::debug!("call {} dropped before completion; cancelled", self.id);
        }
    }
}
