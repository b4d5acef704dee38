//! Address recovery for secp256k1 ECDSA signatures.
//!
//! This module verifies what an external signer returned by recovering the
//! address that produced a signature. It covers:
//!
//! - Signature normalization (low-S)
//! - Recovery over a raw 32-byte prehash
//! - Personal messages (EIP-191 version `0x45`)
//! - EIP-712 typed data digests
//!
//! Recovery never mutates the signature it is given. High-S signatures are
//! normalized internally, flipping the recovery id, before the public key is
//! recovered.
//!
//! # Example
//!
//! ```
//! use hw_evm_keyring_core::Signature;
//! use hw_evm_keyring_core::crypto::recover_personal_signature;
//!
//! let message = b"5369676e20506572736f6e616c204d6573736167652054657374";
//! let sig = Signature::from_hex(concat!(
//!     "0xafb6e247b1c490e284053c87ab5f6b59e219d51f743f7a4d83e400782bc7e4b9",
//!     "479a268e0e0acd4de3f1e28e4fac2a6b32a4195e8dfa9d19147abe8807aa6f64",
//!     "00",
//! ))
//! .unwrap();
//!
//! let signer = recover_personal_signature(message, &sig).unwrap();
//! assert_eq!(signer.to_hex(), "0x9e10effa844d7399cdc555613b23a8499e04e386");
//! ```

use alloy_primitives::{B256, U256, eip191_hash_message};
use k256::FieldBytes;
use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};

use crate::address::Address;
use crate::eip712::TypedDataDigest;
use crate::error::{Error, Result};
use crate::signature::Signature;

/// The order of the secp256k1 curve.
const N: U256 = U256::from_be_bytes([
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
]);

/// The order of the secp256k1 curve divided by 2.
///
/// Used for signature normalization (low-S form).
const HALF_N: U256 = U256::from_be_bytes([
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
]);

/// Normalizes a signature to low-S form.
///
/// Per EIP-2, the S value should be in the lower half of the curve order to
/// prevent signature malleability.
///
/// # Arguments
///
/// * `r` - The R component (32 bytes)
/// * `s` - The S component (32 bytes)
///
/// # Returns
///
/// A tuple `(r, s, flipped)` where:
///
/// - `r` is unchanged
/// - `s` is normalized to low-S form
/// - `flipped` indicates if S was negated, in which case the recovery id
///   must be flipped as well
///
/// # Example
///
/// ```
/// use hw_evm_keyring_core::crypto::normalize_s;
///
/// let r = [0u8; 32];
/// let s = [0x80u8; 32]; // above N/2
/// let (_, _, flipped) = normalize_s(r, s);
/// assert!(flipped);
/// ```
#[must_use]
pub fn normalize_s(r: [u8; 32], s: [u8; 32]) -> ([u8; 32], [u8; 32], bool) {
    let s_value = U256::from_be_bytes(s);
    if s_value > HALF_N && s_value < N {
        (r, (N - s_value).to_be_bytes::<32>(), true)
    } else {
        (r, s, false)
    }
}

/// Recovers the address that signed a 32-byte prehash.
///
/// # Arguments
///
/// * `prehash` - The hash that was signed
/// * `signature` - The canonical signature
///
/// # Errors
///
/// Returns [`Error::Recovery`] if `r` or `s` is not a valid scalar, or if no
/// public key can be recovered.
pub fn recover_address(prehash: &B256, signature: &Signature) -> Result<Address> {
    let (r, s, flipped) = normalize_s(*signature.r(), *signature.s());
    let is_y_odd = (signature.recovery_id() == 1) ^ flipped;

    let sig = K256Signature::from_scalars(FieldBytes::from(r), FieldBytes::from(s))
        .map_err(|e| Error::Recovery(format!("invalid signature scalars: {e}")))?;
    let recovery_id = RecoveryId::new(is_y_odd, false);

    let key = VerifyingKey::recover_from_prehash(prehash.as_slice(), &sig, recovery_id)
        .map_err(|e| Error::Recovery(format!("no public key recovered: {e}")))?;

    Ok(Address::from_public_key(&key))
}

/// Returns `keccak256("\x19Ethereum Signed Message:\n" || len || message)`.
#[must_use]
pub fn personal_message_hash(message: &[u8]) -> B256 {
    eip191_hash_message(message)
}

/// Recovers the signer of a personal message.
///
/// # Arguments
///
/// * `message` - The exact message bytes that were sent to the signer
/// * `signature` - The canonical signature
///
/// # Errors
///
/// Returns [`Error::Recovery`] if no address can be recovered.
pub fn recover_personal_signature(message: &[u8], signature: &Signature) -> Result<Address> {
    recover_address(&personal_message_hash(message), signature)
}

/// Recovers the signer of EIP-712 typed data.
///
/// The signed hash is `keccak256(0x1901 || domainSeparator || structHash)`.
///
/// # Errors
///
/// Returns [`Error::Recovery`] if no address can be recovered.
pub fn recover_typed_data_signature(
    digest: &TypedDataDigest,
    signature: &Signature,
) -> Result<Address> {
    recover_address(&digest.signing_hash(), signature)
}
