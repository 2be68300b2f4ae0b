//! Type marshaling - Rust ↔ C conversions
//!
//! Outbound, `MarshalContext` turns borrowed Rust data into pointers that stay
//! valid until the context is dropped. Inbound, `copy_c_str` and `copy_bytes`
//! copy callback payloads into owned memory before the callback returns; the
//! native library may free those buffers right after.
//!
//! # Memory Safety
//!
//! - All allocated C strings and buffers are tracked in `MarshalContext`
//! - Automatic cleanup on `Drop`
//! - Null pointer checks for C pointers
//! - Length validation for buffers crossing as u32

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

/// Marshal error types
#[derive(Debug, Clone, PartialEq)]
pub enum MarshalError {
    /// Field type does not match the declared result shape
    TypeMismatch { expected: String, got: String },
    /// Null pointer encountered where a value was required
    NullPointer,
    /// Invalid string (contains null byte or invalid UTF-8)
    InvalidString(String),
    /// Buffer too long for a u32 length argument
    BufferTooLarge(usize),
}

impl std::fmt::Display for MarshalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarshalError::TypeMismatch { expected, got } => {
                write!(f, "Type mismatch: expected {}, got {}", expected, got)
            }
            MarshalError::NullPointer => write!(f, "Null pointer"),
            MarshalError::InvalidString(msg) => write!(f, "Invalid string: {}", msg),
            MarshalError::BufferTooLarge(len) => {
                write!(f, "Buffer of {} bytes exceeds the u32 length limit", len)
            }
        }
    }
}

impl std::error::Error for MarshalError {}

/// Marshal context for outbound arguments
///
/// Owns every C string and byte buffer handed out, so the pointers stay valid
/// until the native function has returned.
///
/// # Example
///
/// ```
/// # use indy_bridge::ffi::MarshalContext;
/// let mut ctx = MarshalContext::new();
/// let did = ctx.c_str("V4SGRU86Z58d6TV7PBUe6f").unwrap();
/// let role = ctx.opt_c_str(None).unwrap();
/// assert!(!did.is_null());
/// assert!(role.is_null());
/// // ctx automatically cleans up on drop
/// ```
pub struct MarshalContext {
    /// Track allocated C strings for cleanup
    allocated_strings: Vec<CString>,
    /// Track copied byte buffers for cleanup
    allocated_buffers: Vec<Box<[u8]>>,
}

impl MarshalContext {
    /// Create a new marshal context
    pub fn new() -> Self {
        Self {
            allocated_strings: Vec::new(),
            allocated_buffers: Vec::new(),
        }
    }

    /// Marshal a string to a NUL-terminated C string
    ///
    /// Fails with `InvalidString` if the string contains an interior NUL.
    pub fn c_str(&mut self, value: &str) -> Result<*const c_char, MarshalError> {
        let c_string = CString::new(value).map_err(|e| {
            MarshalError::InvalidString(format!("interior NUL at byte {}", e.nul_position()))
        })?;
        let ptr = c_string.as_ptr();
        self.allocated_strings.push(c_string);
        Ok(ptr)
    }

    /// Marshal an optional string; `None` becomes a null pointer
    pub fn opt_c_str(&mut self, value: Option<&str>) -> Result<*const c_char, MarshalError> {
        match value {
            Some(value) => self.c_str(value),
            None => Ok(ptr::null()),
        }
    }

    /// Marshal a byte slice to a (pointer, length) pair
    pub fn bytes(&mut self, value: &[u8]) -> Result<(*const u8, u32), MarshalError> {
        let len =
            u32::try_from(value.len()).map_err(|_| MarshalError::BufferTooLarge(value.len()))?;
        let buffer: Box<[u8]> = value.into();
        let ptr = buffer.as_ptr();
        self.allocated_buffers.push(buffer);
        Ok((ptr, len))
    }

    /// Number of allocations owned by this context
    pub fn allocation_count(&self) -> usize {
        self.allocated_strings.len() + self.allocated_buffers.len()
    }
}

impl Default for MarshalContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy a C string owned by the native side
///
/// Returns `None` for a null pointer.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid for
/// the duration of this call.
pub unsafe fn copy_c_str(ptr: *const c_char) -> Option<CString> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_owned())
    }
}

/// Copy a byte buffer owned by the native side
///
/// A null pointer or zero length yields an empty vector.
///
/// # Safety
///
/// `ptr` must be null or valid for reads of `len` bytes for the duration of
/// this call.
pub unsafe fn copy_bytes(ptr: *const u8, len: u32) -> Vec<u8> {
    if ptr.is_null() || len == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(ptr, len as usize).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_str_roundtrip() {
        let mut ctx = MarshalContext::new();
        let ptr = ctx.c_str("hello").unwrap();
        let copied = unsafe { copy_c_str(ptr) }.unwrap();
        assert_eq!(copied.to_str().unwrap(), "hello");
        assert_eq!(ctx.allocation_count(), 1);
    }

    #[test]
    fn test_interior_nul_rejected() {
        let mut ctx = MarshalContext::new();
        let result = ctx.c_str("bad\0string");
        assert_eq!(
            result,
            Err(MarshalError::InvalidString("interior NUL at byte 3".to_string()))
        );
        assert_eq!(ctx.allocation_count(), 0);
    }

    #[test]
    fn test_optional_string_none_is_null() {
        let mut ctx = MarshalContext::new();
        assert!(ctx.opt_c_str(None).unwrap().is_null());
        assert!(!ctx.opt_c_str(Some("")).unwrap().is_null());
    }

    #[test]
    fn test_pointers_survive_later_allocations() {
        let mut ctx = MarshalContext::new();
        let first = ctx.c_str("first").unwrap();
        for i in 0..64 {
            ctx.c_str(&format!("filler-{}", i)).unwrap();
        }
        let copied = unsafe { copy_c_str(first) }.unwrap();
        assert_eq!(copied.to_str().unwrap(), "first");
    }

    #[test]
    fn test_bytes_marshal() {
        let mut ctx = MarshalContext::new();
        let (ptr, len) = ctx.bytes(&[1, 2, 3]).unwrap();
        assert_eq!(len, 3);
        assert_eq!(unsafe { copy_bytes(ptr, len) }, vec![1, 2, 3]);
    }

    #[test]
    fn test_copy_null_inputs() {
        assert_eq!(unsafe { copy_c_str(ptr::null()) }, None);
        assert!(unsafe { copy_bytes(ptr::null(), 10) }.is_empty());
    }
}
