//! Native status codes
//!
//! Every native entry point returns an `i32` status synchronously, and every
//! callback carries another one. `translate` turns a status into an `Outcome`;
//! the category of a failure comes from the range the code falls in.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The status the native library uses for success
pub const SUCCESS: i32 = 0;

/// Result of a native operation: the payload, or the translated failure
pub type Outcome<T> = Result<T, NativeError>;

macro_rules! error_codes {
    ($($name:ident = $value:literal,)+) => {
        /// Status codes known to the native library
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(i32)]
        pub enum ErrorCode {
            $($name = $value,)+
        }

        impl ErrorCode {
            /// Look up a raw status, `None` for codes this build does not know
            pub fn from_raw(code: i32) -> Option<Self> {
                match code {
                    $($value => Some(ErrorCode::$name),)+
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(ErrorCode::$name => stringify!($name),)+
                }
            }
        }
    };
}

error_codes! {
    Success = 0,

    CommonInvalidParam1 = 100,
    CommonInvalidParam2 = 101,
    CommonInvalidParam3 = 102,
    CommonInvalidParam4 = 103,
    CommonInvalidParam5 = 104,
    CommonInvalidParam6 = 105,
    CommonInvalidParam7 = 106,
    CommonInvalidParam8 = 107,
    CommonInvalidParam9 = 108,
    CommonInvalidParam10 = 109,
    CommonInvalidParam11 = 110,
    CommonInvalidParam12 = 111,
    CommonInvalidState = 112,
    CommonInvalidStructure = 113,
    CommonIOError = 114,

    WalletInvalidHandle = 200,
    WalletUnknownTypeError = 201,
    WalletTypeAlreadyRegisteredError = 202,
    WalletAlreadyExistsError = 203,
    WalletNotFoundError = 204,
    WalletIncompatiblePoolError = 205,
    WalletAlreadyOpenedError = 206,

    PoolLedgerNotCreatedError = 300,
    PoolLedgerInvalidPoolHandle = 301,
    PoolLedgerTerminated = 302,
    LedgerNoConsensusError = 303,
    LedgerInvalidTransaction = 304,
    LedgerSecurityError = 305,
    PoolLedgerConfigAlreadyExistsError = 306,

    AnoncredsRevocationRegistryFullError = 400,
    AnoncredsInvalidUserRevocIndex = 401,
    AnoncredsAccumulatorIsFull = 402,
    AnoncredsNotIssuedError = 403,
    AnoncredsMasterSecretDuplicateNameError = 404,
    AnoncredsProofRejected = 405,

    SignusUnknownCryptoError = 500,
}

/// Category of a native status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Success,
    /// Bad argument or state supplied by the caller
    Input,
    /// Wallet or storage failure
    Wallet,
    /// Pool connectivity or ledger consensus failure
    Pool,
    /// Anoncreds or signus (crypto) failure
    Crypto,
    /// Code outside every known range
    Unknown,
}

impl ErrorKind {
    /// Categorize a raw status by range. Never fails.
    pub fn of(code: i32) -> Self {
        match code {
            SUCCESS => ErrorKind::Success,
            100..=199 => ErrorKind::Input,
            200..=299 => ErrorKind::Wallet,
            300..=399 => ErrorKind::Pool,
            400..=599 => ErrorKind::Crypto,
            _ => ErrorKind::Unknown,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ErrorKind::Success => "success",
            ErrorKind::Input => "input",
            ErrorKind::Wallet => "wallet",
            ErrorKind::Pool => "pool",
            ErrorKind::Crypto => "crypto",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A non-success native status with its category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeError {
    pub kind: ErrorKind,
    pub code: i32,
}

impl NativeError {
    pub fn new(code: i32) -> Self {
        Self {
            kind: ErrorKind::of(code),
            code,
        }
    }

    /// Named code, if this build knows it
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_raw(self.code)
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error_code() {
            Some(code) => write!(f, "{} error {} ({})", self.kind, self.code, code.name()),
            None => write!(f, "{} error {}", self.kind, self.code),
        }
    }
}

impl std::error::Error for NativeError {}

/// Translate a native status into an outcome
pub fn translate(code: i32) -> Outcome<()> {
    if code == SUCCESS {
        Ok(())
    } else {
        Err(NativeError::new(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_success_translates_to_ok() {
        assert_eq!(translate(SUCCESS), Ok(()));
    }

    #[rstest]
    #[case(100, ErrorKind::Input)]
    #[case(114, ErrorKind::Input)]
    #[case(199, ErrorKind::Input)]
    #[case(204, ErrorKind::Wallet)]
    #[case(303, ErrorKind::Pool)]
    #[case(405, ErrorKind::Crypto)]
    #[case(500, ErrorKind::Crypto)]
    #[case(-1, ErrorKind::Unknown)]
    #[case(1, ErrorKind::Unknown)]
    #[case(600, ErrorKind::Unknown)]
    #[case(i32::MAX, ErrorKind::Unknown)]
    fn test_failure_categories(#[case] code: i32, #[case] kind: ErrorKind) {
        assert_eq!(translate(code), Err(NativeError { kind, code }));
    }

    #[test]
    fn test_known_code_names() {
        assert_eq!(
            ErrorCode::from_raw(100),
            Some(ErrorCode::CommonInvalidParam1)
        );
        assert_eq!(ErrorCode::CommonInvalidParam1.name(), "CommonInvalidParam1");
        assert_eq!(ErrorCode::from_raw(199), None);
        assert_eq!(ErrorCode::LedgerNoConsensusError as i32, 303);
    }

    #[test]
    fn test_display_includes_code_and_name() {
        let err = NativeError::new(100);
        assert_eq!(err.to_string(), "input error 100 (CommonInvalidParam1)");

        let unknown = NativeError::new(9999);
        assert_eq!(unknown.to_string(), "unknown error 9999");
    }

    #[test]
    fn test_every_named_code_lands_in_its_range() {
        for code in [0, 100, 111, 114, 200, 206, 300, 306, 400, 405, 500] {
            let named = ErrorCode::from_raw(code).expect("known code");
            assert_eq!(named as i32, code);
            assert_ne!(ErrorKind::of(code), ErrorKind::Unknown);
        }
    }
}
