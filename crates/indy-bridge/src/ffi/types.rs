//! FFI type system - C-compatible callback result fields
//!
//! Defines:
//! - `FieldType`: the C type of one callback result field
//! - `Field`: a callback result field copied into owned memory
//!
//! Type mapping:
//! - FieldType::Int32 → Field::Int(i32)
//! - FieldType::Bool → Field::Bool(bool), passed as u8
//! - FieldType::CharPtr → Field::Str(Option<CString>), null becomes `None`
//! - FieldType::Bytes → Field::Bytes(Vec<u8>), passed as (u8 pointer, u32 length)

use crate::ffi::marshal::MarshalError;
use serde::{Deserialize, Serialize};
use std::ffi::CString;

/// C type of a callback result field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// int32_t
    Int32,
    /// uint8_t used as a boolean
    Bool,
    /// const char*
    CharPtr,
    /// const uint8_t* followed by a uint32_t length
    Bytes,
}

impl FieldType {
    /// Get a display name for this field type
    pub fn display_name(&self) -> &'static str {
        match self {
            FieldType::Int32 => "c_int32",
            FieldType::Bool => "c_bool",
            FieldType::CharPtr => "c_char_p",
            FieldType::Bytes => "POINTER(c_uint8),c_uint32",
        }
    }
}

/// A callback result field owned by the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Int(i32),
    Bool(bool),
    Str(Option<CString>),
    Bytes(Vec<u8>),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int32,
            Field::Bool(_) => FieldType::Bool,
            Field::Str(_) => FieldType::CharPtr,
            Field::Bytes(_) => FieldType::Bytes,
        }
    }

    pub fn into_int(self) -> Result<i32, MarshalError> {
        match self {
            Field::Int(value) => Ok(value),
            other => Err(mismatch(FieldType::Int32, &other)),
        }
    }

    pub fn into_bool(self) -> Result<bool, MarshalError> {
        match self {
            Field::Bool(value) => Ok(value),
            other => Err(mismatch(FieldType::Bool, &other)),
        }
    }

    /// Convert a string field to UTF-8; a null pointer is an error
    pub fn into_string(self) -> Result<String, MarshalError> {
        match self {
            Field::Str(Some(value)) => value
                .into_string()
                .map_err(|e| MarshalError::InvalidString(e.utf8_error().to_string())),
            Field::Str(None) => Err(MarshalError::NullPointer),
            other => Err(mismatch(FieldType::CharPtr, &other)),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, MarshalError> {
        match self {
            Field::Bytes(value) => Ok(value),
            other => Err(mismatch(FieldType::Bytes, &other)),
        }
    }
}

fn mismatch(expected: FieldType, got: &Field) -> MarshalError {
    MarshalError::TypeMismatch {
        expected: expected.display_name().to_string(),
        got: got.field_type().display_name().to_string(),
    }
}

/// Signature string for callback identification
///
/// Every callback starts with the command handle and the status, so two shapes
/// with the same field list share one signature.
pub fn signature_string(fields: &[FieldType]) -> String {
    let mut params = vec!["c_int32", "c_int32"];
    params.extend(fields.iter().map(FieldType::display_name));
    format!("({})", params.join(","))
}
