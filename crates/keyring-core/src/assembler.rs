//! Turning raw device output into canonical signatures.
//!
//! The assembler never alters `r` or `s`. It only left-pads them to 32 bytes
//! and re-encodes `v` for the context the signature was produced in.

use alloy_primitives::B256;

use crate::codec::{decode_word, normalize_v, normalize_v_message};
use crate::error::Result;
use crate::signature::{RawSignature, Signature};
use crate::transaction::{SignedTransaction, Transaction};

/// Builds the canonical `r || s || recovery_id` signature for a personal
/// message or typed data.
///
/// # Errors
///
/// Returns [`crate::Error::MalformedHex`] if `r` or `s` is not hex of at most
/// 32 bytes, and [`crate::Error::Recovery`] if `v` is not `0`, `1`, `27` or
/// `28`.
///
/// # Example
///
/// ```
/// use hw_evm_keyring_core::RawSignature;
/// use hw_evm_keyring_core::assembler::assemble_personal_or_typed_signature;
///
/// let raw = RawSignature::new("01", "02", 28u64);
/// let sig = assemble_personal_or_typed_signature(&raw).unwrap();
/// assert_eq!(sig.recovery_id(), 1);
/// assert_eq!(sig.r()[31], 1);
/// ```
pub fn assemble_personal_or_typed_signature(raw: &RawSignature) -> Result<Signature> {
    let recovery_id = normalize_v_message(&raw.v)?;
    let r = decode_word(&raw.r)?;
    let s = decode_word(&raw.s)?;
    Signature::new(r, s, recovery_id)
}

/// Combines a transaction with the device's signature.
///
/// The transaction is borrowed and left untouched; the result owns a copy of
/// every original field, including the chain id.
///
/// # Errors
///
/// Returns [`crate::Error::MalformedHex`] if `r` or `s` is not hex of at most
/// 32 bytes, and [`crate::Error::Recovery`] if `v` is not valid for the
/// transaction's type and chain id.
pub fn assemble_transaction(tx: &Transaction, raw: &RawSignature) -> Result<SignedTransaction> {
    let v = normalize_v(&raw.v, tx.v_context())?;
    let r = B256::from(decode_word(&raw.r)?);
    let s = B256::from(decode_word(&raw.s)?);
    SignedTransaction::new(tx.clone(), r, s, v)
}
