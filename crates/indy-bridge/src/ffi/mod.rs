//! Foreign Function Interface (FFI) infrastructure
//!
//! Everything that touches the C ABI lives here:
//! - Library loading and symbol lookup (`loader`)
//! - Outbound argument marshaling and inbound payload copies (`marshal`)
//! - Typed calls through raw function pointers (`caller`)
//! - Callback trampolines and their cache (`callbacks`)
//!
//! # Safety
//!
//! FFI operations involve `unsafe` code and careful memory management.
//! All unsafe code is isolated in this module with safe wrappers.

pub mod callbacks;
pub mod caller;
pub mod loader;
pub mod marshal;
pub mod types;

pub use callbacks::{
    BoolResult, BytesResult, HandleResult, HandleStringResult, ResultShape, StringPairResult,
    StringResult, TrampolineCache, UnitResult,
};
pub use caller::{NativeArg, NativeArgs};
pub use loader::{DynamicLibrary, LoadError, NativeLibrary, SymbolTable};
pub use marshal::{MarshalContext, MarshalError};
pub use types::{Field, FieldType};
