//! Error types for the hardware keyring core.
//!
//! This module provides the single error type [`enum@Error`] returned by every
//! fallible operation in the crate.
//!
//! # Error Categories
//!
//! - **Encoding errors**: malformed hex, unsupported typed-data versions and
//!   invalid EIP-712 payloads
//! - **Verification errors**: signature recovery failures and signatures that
//!   recover to an address other than the requested one
//! - **Keyring errors**: unknown accounts, the single-account limit, a missing
//!   signer binding and device identity mismatches
//! - **Signer errors**: failures reported by the external device or its
//!   transport, passed through unchanged
//!
//! Every error is terminal for the operation that raised it. Nothing in this
//! crate retries an operation on the caller's behalf.
//!
//! # Example
//!
//! ```
//! use hw_evm_keyring_core::Error;
//!
//! fn example() -> Result<(), Error> {
//!     let err = Error::SignerNotBound;
//!     assert!(matches!(err, Error::SignerNotBound));
//!     Ok(())
//! }
//! ```

use core::result::Result as CoreResult;
use std::error::Error as StdError;

use hex::FromHexError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::address::Address;

/// A boxed error produced by an external signer or its transport.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The main error type for the hardware keyring core.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Encoding Errors
    // =========================================================================
    /// Input was not valid hex, or did not have the expected byte length.
    #[error("malformed hex: {0}")]
    MalformedHex(String),

    /// A typed-data version other than `V4` was requested.
    #[error("unsupported typed data version: {0}, only V4 is supported")]
    UnsupportedVersion(String),

    /// The EIP-712 typed data is invalid.
    #[error("invalid EIP-712 typed data: {0}")]
    InvalidTypedData(String),

    /// A type referenced in the typed data is not defined.
    #[error("undefined type in EIP-712 data: {0}")]
    UndefinedType(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(String),

    // =========================================================================
    // Verification Errors
    // =========================================================================
    /// The signature bytes could not be used to recover a public key.
    #[error("signature recovery failed: {0}")]
    Recovery(String),

    /// The signature recovered to a different address than the requested one.
    #[error("signature recovered to {recovered}, expected {expected}")]
    SignatureMismatch {
        /// The address the caller asked to sign with.
        expected: Address,
        /// The address the signature actually recovers to.
        recovered: Address,
    },

    // =========================================================================
    // Keyring Errors
    // =========================================================================
    /// No managed account matches the given address.
    #[error("account not found for address: {0}")]
    AccountNotFound(Address),

    /// The keyring manages at most one account.
    #[error("keyring only supports one account")]
    TooManyAccounts,

    /// A derivation path was empty.
    #[error("invalid derivation path: {0:?}")]
    InvalidDerivationPath(String),

    /// No external signer is bound to the keyring.
    #[error("no external signer is bound, bind a signer first")]
    SignerNotBound,

    /// The bound device is not the device the keyring was paired with.
    #[error("device id mismatch: expected {expected}, got {actual}")]
    DeviceMismatch {
        /// The device id stored in the keyring.
        expected: String,
        /// The device id offered at bind time.
        actual: String,
    },

    // =========================================================================
    // Signer Errors
    // =========================================================================
    /// The external signer or its transport reported an error.
    #[error("external signer error: {0}")]
    Signer(#[source] BoxError),
}

impl From<FromHexError> for Error {
    fn from(err: FromHexError) -> Self {
        Self::MalformedHex(err.to_string())
    }
}

impl From<SerdeJsonError> for Error {
    fn from(err: SerdeJsonError) -> Self {
        Self::Json(err.to_string())
    }
}

/// A specialized [`Result`] type for keyring operations.
pub type Result<T> = CoreResult<T, Error>;
