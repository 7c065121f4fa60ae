use dashmap::{DashMap, mapref::entry::Entry};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{id::CorrelationId, operation::PendingOperation};

/// Concurrent table of in-flight operations keyed by [`CorrelationId`].
///
/// This is the only mutable state shared between native callback threads and
/// consumer code. Every operation is in-memory and bounded: the map is
/// sharded, and no lock is held across a call into user code because
/// [`lookup`](Self::lookup) hands back a cloned handle.
///
/// [`remove`](Self::remove) is the only way an entry disappears, and exactly
/// one of any number of racing removers observes the entry.
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    entries: DashMap<CorrelationId, PendingOperation>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
        }
    }

    /// Registers `op` under its id.
    ///
    /// Returns `false`, leaving the existing entry untouched, if the id is
    /// already registered. That indicates an allocator or caller defect and
    /// should fail the one invocation that tried it.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all, fields(id = %op.id())))]
    pub fn insert(&self, op: PendingOperation) -> bool {
        match self.entries.entry(op.id()) {
            Entry::Occupied(_) => {
                #[cfg(feature = "tracing")]
                tracing::error!("correlation id {} is already registered", op.id());
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(op);
                true
            }
        }
    }

    /// Returns a handle to the operation registered under `id` without
    /// removing it.
    pub fn lookup(&self, id: CorrelationId) -> Option<PendingOperation> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    /// Atomically takes the operation registered under `id`.
    ///
    /// Only the first of several concurrent callers gets `Some`.
    pub fn remove(&self, id: CorrelationId) -> Option<PendingOperation> {
        self.entries.remove(&id).map(|(_, op)| op)
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of operations currently pending.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, vec::Vec};

    use bytes::Bytes;

    use super::*;
    use crate::{IdAllocator, Outcome};

    #[test]
    fn insert_rejects_duplicate_id() {
        let registry = CallbackRegistry::new();
        let id = CorrelationId::new(9).unwrap();

        let (first, mut first_rx) = PendingOperation::new(id, None);
        let (second, _second_rx) = PendingOperation::new(id, None);

        assert!(registry.insert(first));
        assert!(!registry.insert(second));
        assert_eq!(registry.len(), 1);

        // The original entry is the one still registered.
        let op = registry.remove(id).unwrap();
        assert!(op.try_complete_result(Bytes::from_static(b"first")));
        assert_eq!(
            first_rx.try_recv().unwrap(),
            Outcome::Result(Bytes::from_static(b"first"))
        );
    }

    #[test]
    fn lookup_does_not_remove() {
        let registry = CallbackRegistry::new();
        let id = CorrelationId::new(1).unwrap();
        let (op, _rx) = PendingOperation::new(id, None);
        registry.insert(op);

        assert!(registry.lookup(id).is_some());
        assert!(registry.lookup(id).is_some());
        assert!(registry.contains(id));
        assert!(registry.remove(id).is_some());
        assert!(registry.lookup(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_removers_see_entry_once() {
        const THREADS: usize = 8;
        const OPS: usize = 512;

        let registry = Arc::new(CallbackRegistry::with_capacity(OPS));
        let ids = IdAllocator::new();
        let mut receivers = Vec::with_capacity(OPS);
        let mut keys = Vec::with_capacity(OPS);
        for _ in 0..OPS {
            let (op, rx) = PendingOperation::new(ids.next(), None);
            keys.push(op.id());
            receivers.push(rx);
            assert!(registry.insert(op));
        }
        let keys = Arc::new(keys);

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let keys = Arc::clone(&keys);
                thread::spawn(move || {
                    keys.iter()
                        .filter(|id| registry.remove(**id).is_some())
                        .count()
                })
            })
            .collect();

        let removed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(removed, OPS);
        assert!(registry.is_empty());
    }

    #[test]
    fn dropping_registry_abandons_operations() {
        let registry = CallbackRegistry::new();
        let (op, mut rx) = PendingOperation::new(CorrelationId::new(5).unwrap(), None);
        registry.insert(op);
        drop(registry);

        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Closed)
        ));
    }
}
