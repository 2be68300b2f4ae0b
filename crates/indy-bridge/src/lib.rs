//! Indy Bridge - async request/response calls over a C callback API
//!
//! The native library exposes functions of the form
//! `fn(command_handle, args..., callback) -> status`. Each call returns a
//! synchronous status at once and later reports its result by invoking
//! `callback(command_handle, status, payload...)`, possibly from a thread the
//! caller has never seen. This crate turns that into a future:
//!
//! - `status` translates native status codes into structured outcomes
//! - `registry` correlates pending calls with their callbacks by token
//! - `bridge` invokes entry points and awaits the matching callback
//! - `ffi` holds the trampolines, marshaling and library loading
//! - `ledger` and `agent` are typed operations built on the bridge
//! - `observers` carries agent messages and connections after the first reply
//!
//! # Example
//!
//! ```no_run
//! use indy_bridge::{ledger, Bridge};
//! use indy_config::ConfigLoader;
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().load_from_directory(Path::new("."))?;
//! let bridge = unsafe { Bridge::open(&config.settings)? };
//! let request = ledger::build_get_nym_request(
//!     &bridge,
//!     "Th7MpTaRZVRYnPiabds81Y",
//!     "V4SGRU86Z58d6TV7PBUe6f",
//! )
//! .await?;
//! println!("{}", request);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod bridge;
pub mod dispatch;
pub mod error;
pub mod ffi;
pub mod ledger;
pub mod observers;
pub mod registry;
pub mod runtime;
pub mod status;
pub mod telemetry;

pub use bridge::{Bridge, Completion};
pub use error::{BridgeError, BridgeResult};
pub use registry::{CallHandle, CorrelationToken, RawOutcome, Registry, RegistryError, Settled};
pub use status::{translate, ErrorCode, ErrorKind, NativeError, Outcome};
