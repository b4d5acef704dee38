//! The exact inputs sent to an external signer.
//!
//! Every signing path needs the same bytes on both sides: what the device is
//! asked to sign and what the keyring later hashes to check the answer. This
//! module builds those inputs.

use crate::codec::{decode_hex, is_hex_prefixed};
use crate::eip712::{TypedData, TypedDataDigest, TypedDataVersion};
use crate::error::Result;
use crate::transaction::Transaction;

/// Returns the unsigned payload of a transaction.
///
/// See [`Transaction::unsigned_payload`].
#[must_use]
pub fn for_transaction(tx: &Transaction) -> Vec<u8> {
    tx.unsigned_payload()
}

/// Returns the bytes of a personal message.
///
/// A `0x`-prefixed message is decoded as hex; any other input is taken as its
/// UTF-8 bytes. The result is what gets hex-encoded for the device and hashed
/// for verification.
///
/// # Errors
///
/// Returns [`crate::Error::MalformedHex`] if a `0x`-prefixed message is not
/// valid hex.
///
/// # Example
///
/// ```
/// use hw_evm_keyring_core::digest::for_personal_message;
///
/// assert_eq!(for_personal_message("0x6869").unwrap(), b"hi");
/// assert_eq!(for_personal_message("6869").unwrap(), b"6869");
/// ```
pub fn for_personal_message(message: &str) -> Result<Vec<u8>> {
    if is_hex_prefixed(message) {
        decode_hex(message)
    } else {
        Ok(message.as_bytes().to_vec())
    }
}

/// Hashes typed data into the pair of hashes the device signs.
///
/// # Errors
///
/// Returns [`crate::Error::UnsupportedVersion`] for any version other than
/// `V4`, checked before the data is looked at, and the errors of
/// [`TypedData::digest`] otherwise.
pub fn for_typed_data(data: &TypedData, version: TypedDataVersion) -> Result<TypedDataDigest> {
    version.ensure_supported()?;
    data.digest()
}
