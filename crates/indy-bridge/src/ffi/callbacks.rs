//! FFI Callbacks - trampolines the native library calls back into
//!
//! Each result shape has one `extern "C"` trampoline. A trampoline translates
//! the status, copies the payload into owned `Field`s (only on success), and
//! hands the outcome to `dispatch::complete`, which finds the owning registry
//! by token. The trampoline never learns which call it serves; the token does.
//!
//! `TrampolineCache` hands out one stable function pointer per callback
//! signature, created on first use.

use crate::dispatch;
use crate::ffi::marshal::{copy_bytes, copy_c_str, MarshalError};
use crate::ffi::types::{signature_string, Field, FieldType};
use crate::status;
use std::collections::HashMap;
use std::os::raw::c_char;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// The typed result of a native call, and the callback that delivers it
pub trait ResultShape: 'static {
    /// Value handed to the caller on success
    type Output: Send + 'static;

    /// `extern "C"` function pointer type of the callback
    type Callback: Copy + Send + Sync + 'static;

    /// C types of the callback fields after the command handle and status
    const FIELDS: &'static [FieldType];

    /// The trampoline for this shape
    fn trampoline() -> Self::Callback;

    /// Forget the callback's type
    fn erase(callback: Self::Callback) -> *const ();

    /// Recover a callback erased by `erase`
    ///
    /// # Safety
    ///
    /// `ptr` must come from `erase` on a shape with identical `FIELDS`.
    unsafe fn restore(ptr: *const ()) -> Self::Callback;

    /// Build the typed result from the copied fields
    fn decode(fields: Vec<Field>) -> Result<Self::Output, MarshalError>;

    fn signature() -> String {
        signature_string(Self::FIELDS)
    }
}

fn deliver(command_handle: i32, err: i32, payload: impl FnOnce() -> Vec<Field>) {
    let outcome = status::translate(err).map(|()| payload());
    dispatch::complete(command_handle, outcome);
}

extern "C" fn unit_callback(command_handle: i32, err: i32) {
    deliver(command_handle, err, Vec::new);
}

extern "C" fn handle_callback(command_handle: i32, err: i32, handle: i32) {
    deliver(command_handle, err, || vec![Field::Int(handle)]);
}

extern "C" fn string_callback(command_handle: i32, err: i32, value: *const c_char) {
    // Safety: the native side keeps `value` alive for the duration of the callback
    deliver(command_handle, err, || vec![Field::Str(unsafe { copy_c_str(value) })]);
}

extern "C" fn handle_string_callback(
    command_handle: i32,
    err: i32,
    handle: i32,
    value: *const c_char,
) {
    deliver(command_handle, err, || {
        vec![Field::Int(handle), Field::Str(unsafe { copy_c_str(value) })]
    });
}

extern "C" fn string_pair_callback(
    command_handle: i32,
    err: i32,
    first: *const c_char,
    second: *const c_char,
) {
    deliver(command_handle, err, || unsafe {
        vec![Field::Str(copy_c_str(first)), Field::Str(copy_c_str(second))]
    });
}

extern "C" fn bool_callback(command_handle: i32, err: i32, value: u8) {
    deliver(command_handle, err, || vec![Field::Bool(value != 0)]);
}

extern "C" fn bytes_callback(command_handle: i32, err: i32, data: *const u8, len: u32) {
    deliver(command_handle, err, || {
        vec![Field::Bytes(unsafe { copy_bytes(data, len) })]
    });
}

fn expect_fields(fields: Vec<Field>, count: usize) -> Result<Vec<Field>, MarshalError> {
    if fields.len() == count {
        Ok(fields)
    } else {
        Err(MarshalError::TypeMismatch {
            expected: format!("{} fields", count),
            got: format!("{} fields", fields.len()),
        })
    }
}

fn single(fields: Vec<Field>) -> Result<Field, MarshalError> {
    expect_fields(fields, 1)?
        .pop()
        .ok_or(MarshalError::NullPointer)
}

fn pair(fields: Vec<Field>) -> Result<(Field, Field), MarshalError> {
    let mut fields = expect_fields(fields, 2)?.into_iter();
    match (fields.next(), fields.next()) {
        (Some(first), Some(second)) => Ok((first, second)),
        _ => Err(MarshalError::NullPointer),
    }
}

macro_rules! result_shape {
    (
        $(#[$meta:meta])*
        $shape:ident => $output:ty,
        fn($($param:ty),*),
        [$($field:expr),*],
        $trampoline:ident,
        |$fields:ident| $decode:expr
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $shape;

        impl ResultShape for $shape {
            type Output = $output;
            type Callback = extern "C" fn(i32, i32 $(, $param)*);

            const FIELDS: &'static [FieldType] = &[$($field),*];

            fn trampoline() -> Self::Callback {
                $trampoline
            }

            fn erase(callback: Self::Callback) -> *const () {
                callback as *const ()
            }

            unsafe fn restore(ptr: *const ()) -> Self::Callback {
                std::mem::transmute::<*const (), Self::Callback>(ptr)
            }

            fn decode($fields: Vec<Field>) -> Result<Self::Output, MarshalError> {
                $decode
            }
        }
    };
}

result_shape! {
    /// `(h, err)`: completion without a payload
    UnitResult => (),
    fn(),
    [],
    unit_callback,
    |fields| expect_fields(fields, 0).map(|_| ())
}

result_shape! {
    /// `(h, err, i32)`: a native handle
    HandleResult => i32,
    fn(i32),
    [FieldType::Int32],
    handle_callback,
    |fields| single(fields)?.into_int()
}

result_shape! {
    /// `(h, err, char*)`: a string, usually JSON
    StringResult => String,
    fn(*const c_char),
    [FieldType::CharPtr],
    string_callback,
    |fields| single(fields)?.into_string()
}

result_shape! {
    /// `(h, err, i32, char*)`: a handle plus a string
    HandleStringResult => (i32, String),
    fn(i32, *const c_char),
    [FieldType::Int32, FieldType::CharPtr],
    handle_string_callback,
    |fields| {
        let (handle, value) = pair(fields)?;
        Ok((handle.into_int()?, value.into_string()?))
    }
}

result_shape! {
    /// `(h, err, char*, char*)`: two strings
    StringPairResult => (String, String),
    fn(*const c_char, *const c_char),
    [FieldType::CharPtr, FieldType::CharPtr],
    string_pair_callback,
    |fields| {
        let (first, second) = pair(fields)?;
        Ok((first.into_string()?, second.into_string()?))
    }
}

result_shape! {
    /// `(h, err, u8)`: a boolean
    BoolResult => bool,
    fn(u8),
    [FieldType::Bool],
    bool_callback,
    |fields| single(fields)?.into_bool()
}

result_shape! {
    /// `(h, err, u8*, u32)`: a byte buffer
    BytesResult => Vec<u8>,
    fn(*const u8, u32),
    [FieldType::Bytes],
    bytes_callback,
    |fields| single(fields)?.into_bytes()
}

/// A cached trampoline
#[derive(Debug, Clone, Copy)]
struct Trampoline {
    /// Function pointer that C code can call
    fn_ptr: usize,
}

/// One stable trampoline per callback signature
///
/// Entries are created lazily under the write lock and never replaced, so the
/// pointer returned for a signature is the same for the life of the cache.
#[derive(Debug, Default)]
pub struct TrampolineCache {
    entries: RwLock<HashMap<String, Trampoline>>,
}

impl TrampolineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the trampoline for a shape, creating it on first use
    pub fn get<S: ResultShape>(&self) -> S::Callback {
        let signature = S::signature();

        let cached = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&signature)
            .copied();

        let trampoline = match cached {
            Some(trampoline) => trampoline,
            None => *self
                .entries
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(signature)
                .or_insert_with_key(|signature| {
                    debug!(signature = %signature, "Creating callback");
                    Trampoline {
                        fn_ptr: S::erase(S::trampoline()) as usize,
                    }
                }),
        };

        // Safety: the entry was created from a shape with the same FIELDS, and
        // trampolines depend only on FIELDS.
        unsafe { S::restore(trampoline.fn_ptr as *const ()) }
    }

    /// Number of distinct signatures built so far
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::ffi::CString;

    #[test]
    fn test_signatures() {
        assert_eq!(UnitResult::signature(), "(c_int32,c_int32)");
        assert_eq!(StringResult::signature(), "(c_int32,c_int32,c_char_p)");
        assert_eq!(
            HandleStringResult::signature(),
            "(c_int32,c_int32,c_int32,c_char_p)"
        );
        assert_eq!(
            BytesResult::signature(),
            "(c_int32,c_int32,POINTER(c_uint8),c_uint32)"
        );
    }

    #[test]
    fn test_cache_builds_once_per_signature() {
        let cache = TrampolineCache::new();
        assert!(cache.is_empty());

        let first = cache.get::<StringResult>();
        let second = cache.get::<StringResult>();
        assert_eq!(first as usize, second as usize);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("(c_int32,c_int32,c_char_p)"));

        cache.get::<UnitResult>();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cached_pointer_is_the_trampoline() {
        let cache = TrampolineCache::new();
        let callback = cache.get::<HandleResult>();
        assert_eq!(callback as usize, handle_callback as usize);
    }

    #[test]
    fn test_decode_string() {
        let fields = vec![Field::Str(Some(CString::new("{}").unwrap()))];
        assert_eq!(StringResult::decode(fields).unwrap(), "{}");
    }

    #[test]
    fn test_decode_handle_string() {
        let fields = vec![
            Field::Int(9),
            Field::Str(Some(CString::new("verkey").unwrap())),
        ];
        assert_eq!(
            HandleStringResult::decode(fields).unwrap(),
            (9, "verkey".to_string())
        );
    }

    #[test]
    fn test_decode_wrong_arity() {
        let err = StringResult::decode(Vec::new()).unwrap_err();
        assert_eq!(
            err,
            MarshalError::TypeMismatch {
                expected: "1 fields".to_string(),
                got: "0 fields".to_string(),
            }
        );
        assert!(UnitResult::decode(vec![Field::Int(1)]).is_err());
    }

    #[test]
    fn test_decode_null_string_is_error() {
        let err = StringResult::decode(vec![Field::Str(None)]).unwrap_err();
        assert_eq!(err, MarshalError::NullPointer);
    }

    #[test]
    fn test_decode_scalars() {
        assert!(BoolResult::decode(vec![Field::Bool(true)]).unwrap());
        assert_eq!(
            BytesResult::decode(vec![Field::Bytes(vec![7, 8])]).unwrap(),
            vec![7, 8]
        );
        UnitResult::decode(Vec::new()).unwrap();
    }
}
