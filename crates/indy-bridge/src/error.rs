//! Caller-visible errors

use crate::ffi::{LoadError, MarshalError};
use crate::registry::{CorrelationToken, RegistryError};
use crate::status::{ErrorKind, NativeError};
use std::time::Duration;
use thiserror::Error;

/// Everything a bridged call can fail with
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The native function refused the call before starting any work
    #[error("native call rejected: {0}")]
    SynchronousRejection(NativeError),

    /// The native operation ran and reported a failure
    #[error("native operation failed: {0}")]
    AsynchronousFailure(NativeError),

    /// Token collision, double resolve, or resolve of an unknown token
    #[error("callback registry fault: {0}")]
    RegistryInternalFault(RegistryError),

    /// The caller stopped waiting; the call stays registered
    #[error("no callback within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Load(LoadError),

    #[error("{0}")]
    Marshal(MarshalError),

    /// The pending call was dropped without an outcome
    #[error("call {0} abandoned before completion")]
    Abandoned(CorrelationToken),

    #[error("blocking runtime unavailable: {0}")]
    Runtime(#[from] std::io::Error),
}

impl BridgeError {
    /// The originating native status, when there is one
    pub fn native_code(&self) -> Option<i32> {
        match self {
            BridgeError::SynchronousRejection(e) | BridgeError::AsynchronousFailure(e) => {
                Some(e.code)
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            BridgeError::SynchronousRejection(e) | BridgeError::AsynchronousFailure(e) => {
                Some(e.kind)
            }
            _ => None,
        }
    }

    /// True only for registry invariant violations
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::RegistryInternalFault(_))
    }
}

impl From<LoadError> for BridgeError {
    fn from(e: LoadError) -> Self {
        BridgeError::Load(e)
    }
}

impl From<MarshalError> for BridgeError {
    fn from(e: MarshalError) -> Self {
        BridgeError::Marshal(e)
    }
}

impl From<RegistryError> for BridgeError {
    fn from(e: RegistryError) -> Self {
        BridgeError::RegistryInternalFault(e)
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
