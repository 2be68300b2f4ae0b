//! Blocking adapter
//!
//! Lets synchronous code wait on a bridged call. A single current-thread tokio
//! runtime is created on first use and shared by the whole process; it drives
//! the timers that call timeouts rely on.

use crate::error::BridgeError;
use std::future::Future;
use std::io;
use std::sync::OnceLock;
use tokio::runtime::{Builder, Handle, Runtime};

/// Global tokio runtime for blocking waits
static TOKIO_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get a reference to the global tokio runtime, building it on first use
pub fn runtime() -> Result<&'static Runtime, BridgeError> {
    if let Some(runtime) = TOKIO_RUNTIME.get() {
        return Ok(runtime);
    }

    let runtime = Builder::new_current_thread()
        .enable_all()
        .thread_name("indy-bridge")
        .build()?;

    // Another thread may have won the race; its runtime is kept and ours dropped.
    let _ = TOKIO_RUNTIME.set(runtime);
    TOKIO_RUNTIME
        .get()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "runtime not initialized").into())
}

/// Block on a future until it completes
///
/// Fails instead of panicking when called from inside an async runtime.
pub fn block_on<F>(future: F) -> Result<F::Output, BridgeError>
where
    F: Future,
{
    if Handle::try_current().is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            "cannot block the current thread from within an async runtime; await the call instead",
        )
        .into());
    }

    Ok(runtime()?.block_on(future))
}
