use core::cell::RefCell;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::LazyLock,
};

use parking_lot::ReentrantMutex;
use portable_atomic::{AtomicBool, Ordering};

use crate::{
    error::{Error, Result},
    native::{CallbackTable, NativeLibrary},
};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Registration {
    Unregistered,
    InProgress,
    Installed,
    Failed(String),
}

/// One-time installation of a [`CallbackTable`] into a native library.
///
/// Uses a double-checked pattern: an atomic fast path once installed, and a
/// reentrant lock around the slow path. A call that re-enters from inside
/// [`NativeLibrary::register_callbacks`] on the same thread fails instead of
/// deadlocking; other threads wait for the first attempt to finish. A failed
/// registration is sticky.
pub(crate) struct Registrar {
    installed: AtomicBool,
    state: ReentrantMutex<RefCell<Registration>>,
}

static PROCESS_REGISTRAR: LazyLock<Registrar> = LazyLock::new(Registrar::new);

/// The registrar guarding the process-wide callback table.
pub(crate) fn process_registrar() -> &'static Registrar {
    &PROCESS_REGISTRAR
}

impl Registrar {
    pub(crate) fn new() -> Self {
        Self {
            installed: AtomicBool::new(false),
            state: ReentrantMutex::new(RefCell::new(Registration::Unregistered)),
        }
    }

    /// Registers `table` with `native` unless a previous call already did.
    pub(crate) fn ensure(&self, native: &dyn NativeLibrary, table: CallbackTable) -> Result<()> {
        if self.installed.load(Ordering::Acquire) {
            return Ok(());
        }

        let guard = self.state.lock();
        let current = guard.borrow().clone();
        match current {
            Registration::Installed => return Ok(()),
            Registration::Failed(reason) => return Err(Error::Registration(reason)),
            Registration::InProgress => {
                return Err(Error::Registration(
                    "re-entrant call during callback registration".into(),
                ));
            }
            Registration::Unregistered => {}
        }
        *guard.borrow_mut() = Registration::InProgress;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| native.register_callbacks(table)));
        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.message().to_owned()),
            Err(_) => Err("native registration panicked".to_owned()),
        };

        match result {
            Ok(()) => {
                *guard.borrow_mut() = Registration::Installed;
                self.installed.store(true, Ordering::Release);
                #[cfg(feature = "tracing")]
                tracing::debug!("native callbacks registered");
                Ok(())
            }
            Err(reason) => {
                #[cfg(feature = "tracing")]
                tracing::error!("native callback registration failed: {reason}");
                *guard.borrow_mut() = Registration::Failed(reason.clone());
                Err(Error::Registration(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering as StdOrdering},
    };

    use super::*;
    use crate::{CorrelationId, FunctionRef, NativeError};

    struct CountingLibrary {
        registrations: AtomicUsize,
        fail: bool,
        reenter: Option<Arc<Registrar>>,
    }

    impl CountingLibrary {
        fn new(fail: bool) -> Self {
            Self {
                registrations: AtomicUsize::new(0),
                fail,
                reenter: None,
            }
        }
    }

    impl NativeLibrary for CountingLibrary {
        fn register_callbacks(&self, callbacks: CallbackTable) -> core::result::Result<(), NativeError> {
            self.registrations.fetch_add(1, StdOrdering::SeqCst);
            if let Some(registrar) = &self.reenter {
                let err = registrar.ensure(self, callbacks).unwrap_err();
                assert!(matches!(err, Error::Registration(_)));
            }
            if self.fail {
                Err(NativeError::new("no callback slots"))
            } else {
                Ok(())
            }
        }

        fn start(&self, _: FunctionRef, _: CorrelationId, _: &[u8]) -> core::result::Result<(), NativeError> {
            Ok(())
        }

        fn start_stream(&self, _: FunctionRef, _: CorrelationId, _: &[u8]) -> core::result::Result<(), NativeError> {
            Ok(())
        }

        fn cancel(&self, _: CorrelationId) -> core::result::Result<(), NativeError> {
            Ok(())
        }
    }

    #[test]
    fn registers_exactly_once() {
        let registrar = Registrar::new();
        let native = CountingLibrary::new(false);

        for _ in 0..4 {
            registrar.ensure(&native, CallbackTable::process()).unwrap();
        }
        assert_eq!(native.registrations.load(StdOrdering::SeqCst), 1);
    }

    #[test]
    fn registers_once_across_threads() {
        let registrar = Arc::new(Registrar::new());
        let native = Arc::new(CountingLibrary::new(false));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registrar = Arc::clone(&registrar);
                let native = Arc::clone(&native);
                std::thread::spawn(move || {
                    registrar
                        .ensure(native.as_ref(), CallbackTable::process())
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(native.registrations.load(StdOrdering::SeqCst), 1);
    }

    #[test]
    fn failure_is_sticky() {
        let registrar = Registrar::new();
        let failing = CountingLibrary::new(true);
        let healthy = CountingLibrary::new(false);

        let err = registrar.ensure(&failing, CallbackTable::process()).unwrap_err();
        assert_eq!(err, Error::Registration("no callback slots".into()));

        let err = registrar.ensure(&healthy, CallbackTable::process()).unwrap_err();
        assert_eq!(err, Error::Registration("no callback slots".into()));
        assert_eq!(healthy.registrations.load(StdOrdering::SeqCst), 0);
    }

    #[test]
    fn reentrant_registration_fails_instead_of_deadlocking() {
        let registrar = Arc::new(Registrar::new());
        let native = CountingLibrary {
            registrations: AtomicUsize::new(0),
            fail: false,
            reenter: Some(Arc::clone(&registrar)),
        };

        registrar.ensure(&native, CallbackTable::process()).unwrap();
        assert_eq!(native.registrations.load(StdOrdering::SeqCst), 1);
    }
}
