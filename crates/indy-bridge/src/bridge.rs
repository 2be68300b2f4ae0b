//! Native entry-point invoker and completion future
//!
//! `Bridge::invoke` registers a call, hands the native function its token and
//! the shape's trampoline, and checks the synchronous status. The returned
//! `Completion` resolves when the trampoline delivers the callback's outcome.

use crate::error::{BridgeError, BridgeResult};
use crate::ffi::{
    DynamicLibrary, MarshalContext, MarshalError, NativeArgs, NativeLibrary, ResultShape,
    TrampolineCache,
};
use crate::registry::{CallHandle, CorrelationToken, RawOutcome, Registry, RegistryError};
use crate::runtime;
use crate::status;
use indy_config::BridgeConfig;
use std::fmt;
use std::future::Future;
use std::io;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Sleep;
use tracing::{debug, error, warn};

/// A session with one native library
pub struct Bridge {
    library: Arc<dyn NativeLibrary>,
    registry: Arc<Registry>,
    trampolines: TrampolineCache,
    call_timeout: Option<Duration>,
    sweep_after: Option<Duration>,
}

impl Bridge {
    /// Bridge with a fresh registry and no timeout
    pub fn new(library: Arc<dyn NativeLibrary>) -> Self {
        Self::with_registry(library, Registry::new())
    }

    /// Bridge sharing an existing registry
    pub fn with_registry(library: Arc<dyn NativeLibrary>, registry: Arc<Registry>) -> Self {
        Self {
            library,
            registry,
            trampolines: TrampolineCache::new(),
            call_timeout: None,
            sweep_after: None,
        }
    }

    /// Bridge over `library` tuned by the `[calls]` settings
    pub fn from_config(library: Arc<dyn NativeLibrary>, config: &BridgeConfig) -> Self {
        let registry = Registry::with_tombstone_capacity(config.tombstone_capacity());
        Self {
            call_timeout: config.call_timeout(),
            sweep_after: config.sweep_after(),
            ..Self::with_registry(library, registry)
        }
    }

    /// Load the configured shared library and build a bridge over it
    ///
    /// # Safety
    ///
    /// Loading a dynamic library executes its initialization code; the library
    /// named by the configuration must be trusted.
    pub unsafe fn open(config: &BridgeConfig) -> BridgeResult<Self> {
        let library = DynamicLibrary::open(config.library_name(), config.search_paths())?;
        Ok(Self::from_config(Arc::new(library), config))
    }

    /// Give up waiting on calls after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Invoke a native function and return a future for its callback
    ///
    /// Symbol lookup happens before registration, so a missing symbol leaves
    /// nothing registered. A non-success synchronous status discards the call
    /// and returns `SynchronousRejection` without waiting.
    ///
    /// # Safety
    ///
    /// `function` must take `(i32, A..., S::Callback)` and return `i32`, and
    /// every pointer in `args` must stay valid until this returns.
    pub unsafe fn invoke<S, A>(&self, function: &str, args: A) -> BridgeResult<Completion<S>>
    where
        S: ResultShape,
        A: NativeArgs,
    {
        self.start::<S>(function, |fn_ptr, command_handle, callback| {
            args.call(fn_ptr, command_handle, callback)
        })
    }

    /// Invoke a native function whose completion callback is not its last
    /// parameter
    ///
    /// `args` carries every callback itself, including `trampoline::<S>()`
    /// in the position where the function expects its completion callback.
    ///
    /// # Safety
    ///
    /// `function` must take `(i32, A...)` and return `i32`, its completion
    /// callback parameter must have type `S::Callback`, and every pointer in
    /// `args` must stay valid until this returns.
    pub unsafe fn invoke_with<S, A>(&self, function: &str, args: A) -> BridgeResult<Completion<S>>
    where
        S: ResultShape,
        A: NativeArgs,
    {
        self.start::<S>(function, |fn_ptr, command_handle, _| {
            args.call_plain(fn_ptr, command_handle)
        })
    }

    /// Completion trampoline of a shape, for `invoke_with` argument lists
    pub fn trampoline<S: ResultShape>(&self) -> S::Callback {
        self.trampolines.get::<S>()
    }

    unsafe fn start<S: ResultShape>(
        &self,
        function: &str,
        call: impl FnOnce(*const (), i32, S::Callback) -> i32,
    ) -> BridgeResult<Completion<S>> {
        let callback = self.trampolines.get::<S>();
        let fn_ptr = self.library.symbol(function)?;
        let (token, handle) = self.registry.register();

        debug!(function, token = token.as_raw(), ">>> native call");
        let code = call(fn_ptr, token.as_raw(), callback);

        if let Err(rejection) = status::translate(code) {
            warn!(function, token = token.as_raw(), code, "Native call rejected synchronously");
            if let Err(fault) = self.registry.discard(token) {
                error!(function, %fault, "Registry fault discarding rejected call");
                self.registry.record_fault(fault);
                return Err(BridgeError::RegistryInternalFault(fault));
            }
            return Err(BridgeError::SynchronousRejection(rejection));
        }

        Ok(Completion::new(function, handle, self.call_timeout))
    }

    /// Marshal arguments, invoke, and await the callback
    ///
    /// The marshaled pointers live only until `invoke` returns; nothing the
    /// native side was handed is held across the await.
    ///
    /// # Safety
    ///
    /// Same contract as [`Bridge::invoke`].
    pub async unsafe fn call<S, A, F>(&self, function: &str, marshal: F) -> BridgeResult<S::Output>
    where
        S: ResultShape,
        A: NativeArgs,
        F: FnOnce(&mut MarshalContext) -> Result<A, MarshalError>,
    {
        let completion = {
            let mut ctx = MarshalContext::new();
            let args = marshal(&mut ctx)?;
            self.invoke::<S, A>(function, args)?
        };
        completion.await
    }

    /// Like [`Bridge::call`], for functions that take several callbacks
    ///
    /// `marshal` also receives the completion trampoline and places it in the
    /// argument list.
    ///
    /// # Safety
    ///
    /// Same contract as [`Bridge::invoke_with`].
    pub async unsafe fn call_with<S, A, F>(&self, function: &str, marshal: F) -> BridgeResult<S::Output>
    where
        S: ResultShape,
        A: NativeArgs,
        F: FnOnce(&mut MarshalContext, S::Callback) -> Result<A, MarshalError>,
    {
        let completion = {
            let mut ctx = MarshalContext::new();
            let args = marshal(&mut ctx, self.trampoline::<S>())?;
            self.invoke_with::<S, A>(function, args)?
        };
        completion.await
    }

    /// Sweep abandoned calls older than the configured age (zero when unset)
    pub fn sweep_abandoned(&self) -> usize {
        self.registry.sweep(self.sweep_after.unwrap_or(Duration::ZERO))
    }

    /// Drain registry faults detected on the callback path
    pub fn take_faults(&self) -> Vec<RegistryError> {
        self.registry.take_faults()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn library(&self) -> &dyn NativeLibrary {
        self.library.as_ref()
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    /// Number of distinct callback signatures in use
    pub fn trampoline_count(&self) -> usize {
        self.trampolines.len()
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("library", &self.library.name())
            .field("registry", &self.registry)
            .field("call_timeout", &self.call_timeout)
            .field("sweep_after", &self.sweep_after)
            .finish()
    }
}

/// The pending result of one native call
///
/// The timeout timer is created on first poll, so a `Completion` may be built
/// outside a runtime. Polling it with a timeout requires a tokio runtime with
/// the time driver enabled; under any other executor the first poll that
/// would start the timer fails with `BridgeError::Runtime`.
#[must_use = "a native call's outcome is lost unless its completion is awaited"]
pub struct Completion<S: ResultShape> {
    function: String,
    handle: CallHandle,
    timeout: Option<Duration>,
    sleep: Option<Pin<Box<Sleep>>>,
    _shape: PhantomData<fn() -> S>,
}

impl<S: ResultShape> Completion<S> {
    fn new(function: &str, handle: CallHandle, timeout: Option<Duration>) -> Self {
        Self {
            function: function.to_string(),
            handle,
            timeout,
            sleep: None,
            _shape: PhantomData,
        }
    }

    pub fn token(&self) -> CorrelationToken {
        self.handle.token()
    }

    /// Block the current thread until the call completes
    pub fn wait_blocking(self) -> BridgeResult<S::Output> {
        runtime::block_on(self)?
    }

    fn finish(&self, received: Option<RawOutcome>) -> BridgeResult<S::Output> {
        let token = self.handle.token();
        match received {
            Some(Ok(fields)) => {
                debug!(function = %self.function, token = token.as_raw(), "<<< native call");
                S::decode(fields).map_err(BridgeError::Marshal)
            }
            Some(Err(failure)) => {
                debug!(
                    function = %self.function,
                    token = token.as_raw(),
                    code = failure.code,
                    "<<< native call failed"
                );
                Err(BridgeError::AsynchronousFailure(failure))
            }
            None => Err(BridgeError::Abandoned(token)),
        }
    }
}

impl<S: ResultShape> Future for Completion<S> {
    type Output = BridgeResult<S::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if let Poll::Ready(received) = Pin::new(&mut this.handle).poll(cx) {
            return Poll::Ready(this.finish(received));
        }

        if let Some(timeout) = this.timeout {
            if this.sleep.is_none() && Handle::try_current().is_err() {
                warn!(
                    function = %this.function,
                    token = this.handle.token().as_raw(),
                    "Timed native call awaited outside a tokio runtime"
                );
                this.handle.close();
                return Poll::Ready(Err(BridgeError::Runtime(io::Error::new(
                    io::ErrorKind::Other,
                    "a call timeout needs a tokio runtime with the time driver; \
                     await the call inside one or use wait_blocking",
                ))));
            }

            let sleep = this
                .sleep
                .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
            if sleep.as_mut().poll(cx).is_ready() {
                warn!(
                    function = %this.function,
                    token = this.handle.token().as_raw(),
                    ?timeout,
                    "Native call timed out"
                );
                this.handle.close();
                return Poll::Ready(Err(BridgeError::Timeout(timeout)));
            }
        }

        Poll::Pending
    }
}

impl<S: ResultShape> fmt::Debug for Completion<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("function", &self.function)
            .field("token", &self.handle.token())
            .field("timeout", &self.timeout)
            .finish()
    }
}
