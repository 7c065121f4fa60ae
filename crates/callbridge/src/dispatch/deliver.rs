use bytes::Bytes;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{dispatch::Dispatch, id::CorrelationId, registry::CallbackRegistry};

/// Safe dispatch targets for the three native callbacks.
///
/// The `extern "C"` entry points decode raw arguments and forward here. These
/// methods can also be driven directly by an embedder that receives callbacks
/// through its own mechanism.
impl CallbackRegistry {
    /// Handles a result callback.
    ///
    /// Non-final data is queued on the streaming sink; the final delivery
    /// removes the operation and settles it with `data`.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, data), fields(len = data.len())))]
    pub fn deliver_result(&self, id: u32, is_final: bool, data: Bytes) -> Dispatch {
        let Some(id) = CorrelationId::new(id) else {
            return Dispatch::Orphaned;
        };

        if !is_final {
            let Some(op) = self.lookup(id) else {
                return orphaned(id);
            };
            if op.push_chunk(data) {
                return Dispatch::Chunk;
            }
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "dropping chunk for {id} (streaming: {}, completed: {})",
                op.is_streaming(),
                op.is_completed()
            );
            return Dispatch::Discarded;
        }

        match self.remove(id) {
            Some(op) if op.try_complete_result(data) => Dispatch::Completed,
            Some(_) => Dispatch::Discarded,
            None => orphaned(id),
        }
    }

    /// Handles an error callback: removes the operation and fails it with
    /// `message`.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, message)))]
    pub fn deliver_error(&self, id: u32, message: impl Into<String>) -> Dispatch {
        let Some(id) = CorrelationId::new(id) else {
            return Dispatch::Orphaned;
        };

        match self.remove(id) {
            Some(op) if op.try_complete_error(message) => Dispatch::Completed,
            Some(_) => Dispatch::Discarded,
            None => orphaned(id),
        }
    }

    /// Handles a progress tick: runs the operation's hook without removing
    /// it.
    ///
    /// A failing hook fails that operation and removes it.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn deliver_tick(&self, id: u32) -> Dispatch {
        let Some(id) = CorrelationId::new(id) else {
            return Dispatch::Orphaned;
        };
        let Some(op) = self.lookup(id) else {
            return orphaned(id);
        };

        match op.run_progress() {
            Ok(()) => Dispatch::Progress,
            Err(message) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("progress hook failed for {id}: {message}");
                op.try_complete_error(message);
                self.remove(id);
                Dispatch::HookFailed
            }
        }
    }
}

#[inline]
fn orphaned(_id: CorrelationId) -> Dispatch {
    #[cfg(feature = "tracing")]
    tracing::trace!("no pending operation for {_id}");
    Dispatch::Orphaned
}
