use std::sync::{Arc, LazyLock};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    bridge::{CallStream, CancellationBridge, ChunkForward, PendingCall},
    dispatch::{process_registrar, process_registry},
    error::{Error, NativeError, Result},
    id::{CorrelationId, IdAllocator},
    native::{CallbackTable, FunctionRef, NativeLibrary},
    operation::{PendingOperation, ProgressHook},
    registry::CallbackRegistry,
};

static PROCESS_IDS: LazyLock<Arc<IdAllocator>> = LazyLock::new(|| Arc::new(IdAllocator::new()));

/// Async entry point to a callback-driven native library.
///
/// Each invocation allocates a [`CorrelationId`], registers a pending
/// operation under it, and starts the native call. The native library later
/// reports back through the registered callbacks, which settle the returned
/// [`PendingCall`].
///
/// `Bridge` is cheap to clone; clones share the library, registry and id
/// allocator.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use callbridge::{
///     Bridge, CallbackRegistry, CallbackTable, CorrelationId, FunctionRef, IdAllocator,
///     NativeError, NativeLibrary,
/// };
/// use tokio_util::sync::CancellationToken;
///
/// struct Detached;
///
/// impl NativeLibrary for Detached {
///     fn register_callbacks(&self, _: CallbackTable) -> Result<(), NativeError> {
///         Ok(())
///     }
///     fn start(&self, _: FunctionRef, _: CorrelationId, _: &[u8]) -> Result<(), NativeError> {
///         Ok(())
///     }
///     fn start_stream(&self, _: FunctionRef, _: CorrelationId, _: &[u8]) -> Result<(), NativeError> {
///         Err(NativeError::new("streaming unsupported"))
///     }
///     fn cancel(&self, _: CorrelationId) -> Result<(), NativeError> {
///         Ok(())
///     }
/// }
///
/// let registry = Arc::new(CallbackRegistry::new());
/// let bridge = Bridge::with_parts(Arc::new(Detached), registry.clone(), Arc::new(IdAllocator::new()));
///
/// let call = bridge
///     .invoke(FunctionRef::new(7), b"ping", &CancellationToken::new())
///     .unwrap();
/// assert_eq!(call.id().get(), 1);
/// assert!(registry.contains(call.id()));
///
/// // Whatever routes the native callbacks settles the call.
/// registry.deliver_result(1, true, bytes::Bytes::from_static(b"pong"));
/// assert_eq!(futures::executor::block_on(call).unwrap(), &b"pong"[..]);
/// ```
#[derive(Clone)]
pub struct Bridge {
    native: Arc<dyn NativeLibrary>,
    registry: Arc<CallbackRegistry>,
    ids: Arc<IdAllocator>,
    progress: Option<ProgressHook>,
}

impl Bridge {
    /// Connects to `native` through the process-wide registry.
    ///
    /// The first successful call registers [`CallbackTable::process`] with
    /// `native`; later calls skip registration. The callback table is
    /// process-wide, so every installed bridge must front the same native
    /// library.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registration`] if the registration failed, now or on
    /// any earlier call.
    pub fn install(native: Arc<dyn NativeLibrary>) -> Result<Self> {
        let registry = Arc::clone(process_registry());
        process_registrar().ensure(native.as_ref(), CallbackTable::process())?;
        Ok(Self {
            native,
            registry,
            ids: Arc::clone(&PROCESS_IDS),
            progress: None,
        })
    }

    /// Builds a bridge over a caller-owned registry and allocator.
    ///
    /// No callbacks are registered. The caller routes native callbacks into
    /// `registry` itself through [`CallbackRegistry::deliver_result`] and its
    /// siblings.
    pub fn with_parts(
        native: Arc<dyn NativeLibrary>,
        registry: Arc<CallbackRegistry>,
        ids: Arc<IdAllocator>,
    ) -> Self {
        Self {
            native,
            registry,
            ids,
            progress: None,
        }
    }

    /// Runs `hook` for every tick callback of calls started from this bridge.
    ///
    /// A hook that returns `Err` or panics fails only the call it ran for.
    pub fn with_progress_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(CorrelationId) -> core::result::Result<(), String> + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(hook));
        self
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// Starts a single-shot invocation of `function`.
    ///
    /// `cancellation` is observed, never triggered: the call derives its own
    /// signal from it.
    ///
    /// # Errors
    ///
    /// - [`Error::Rejected`] if the native entry point failed synchronously.
    ///   No operation stays registered.
    /// - [`Error::DuplicateId`] if the allocated id was already registered.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(function = %function)))]
    pub fn invoke(
        &self,
        function: FunctionRef,
        args: &[u8],
        cancellation: &CancellationToken,
    ) -> Result<PendingCall> {
        let id = self.ids.next();
        let (op, outcome) = PendingOperation::new(id, self.progress.clone());
        self.register(op)?;
        self.start(id, self.native.start(function, id, args))?;
        Ok(PendingCall::new(outcome, None, cancellation, self.bridge_for(id)))
    }

    /// Starts a streaming invocation of `function`.
    ///
    /// `on_chunk` receives every partial result in native delivery order,
    /// from the task polling the returned call, before it resolves to the
    /// final result.
    ///
    /// # Errors
    ///
    /// Same as [`Self::invoke`].
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(function = %function)))]
    pub fn invoke_stream<F>(
        &self,
        function: FunctionRef,
        args: &[u8],
        on_chunk: F,
        cancellation: &CancellationToken,
    ) -> Result<PendingCall>
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        self.start_streaming(function, args, Some(Box::new(on_chunk)), cancellation)
    }

    /// Starts a streaming invocation consumed as a [`CallStream`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::invoke`].
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(function = %function)))]
    pub fn stream(
        &self,
        function: FunctionRef,
        args: &[u8],
        cancellation: &CancellationToken,
    ) -> Result<CallStream> {
        self.start_streaming(function, args, None, cancellation)
            .map(CallStream::new)
    }

    fn start_streaming(
        &self,
        function: FunctionRef,
        args: &[u8],
        on_chunk: Option<crate::bridge::ChunkHandler>,
        cancellation: &CancellationToken,
    ) -> Result<PendingCall> {
        let id = self.ids.next();
        let (op, outcome, chunks) = PendingOperation::streaming(id, self.progress.clone());
        self.register(op)?;
        self.start(id, self.native.start_stream(function, id, args))?;
        let forward = ChunkForward { chunks, on_chunk };
        Ok(PendingCall::new(
            outcome,
            Some(forward),
            cancellation,
            self.bridge_for(id),
        ))
    }

    fn register(&self, op: PendingOperation) -> Result<()> {
        let id = op.id();
        if self.registry.insert(op) {
            Ok(())
        } else {
            Err(Error::DuplicateId(id))
        }
    }

    /// Unregisters `id` if the native entry point refused to start it; no
    /// callback follows a synchronous failure.
    fn start(&self, id: CorrelationId, started: core::result::Result<(), NativeError>) -> Result<()> {
        started.map_err(|e| {
            #[cfg(feature = "tracing")]
            tracing::debug!("native start for {id} rejected: {e}");
            self.registry.remove(id);
            Error::from(e)
        })
    }

    fn bridge_for(&self, id: CorrelationId) -> CancellationBridge {
        CancellationBridge::new(id, Arc::clone(&self.registry), Arc::clone(&self.native))
    }
}

impl core::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bridge")
            .field("registry", &self.registry)
            .field("ids", &self.ids)
            .field("progress_hook", &self.progress.is_some())
            .finish()
    }
}
