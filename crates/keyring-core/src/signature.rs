//! Signature types.
//!
//! Two shapes of signature flow through the keyring:
//!
//! - [`RawSignature`]: the `(r, s, v)` triple exactly as an external signer
//!   returned it. Components are loosely formatted hex and `v` may follow any
//!   of several conventions. Nothing about it is trusted.
//! - [`Signature`]: the canonical 65-byte form `r || s || recovery_id`, with
//!   `r` and `s` left-padded to 32 bytes and the recovery id always `0` or
//!   `1`. This is the form handed back to callers for messages and typed
//!   data.
//!
//! # Example
//!
//! ```
//! use hw_evm_keyring_core::Signature;
//!
//! let sig = Signature::new([1u8; 32], [2u8; 32], 1).unwrap();
//! let hex = sig.to_hex();
//! assert_eq!(hex.len(), 132);
//! assert!(hex.ends_with("01"));
//! ```

use core::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::codec::{RawV, decode_hex, encode_prefixed};
use crate::error::{Error, Result};

/// A signature as reported by an external signer.
///
/// `r` and `s` are hex strings that may lack the `0x` prefix and leading
/// zeros. `v` is a number or hex string whose meaning depends on what was
/// signed; see [`crate::codec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSignature {
    /// The R component as hex.
    pub r: String,
    /// The S component as hex.
    pub s: String,
    /// The recovery value in the device's convention.
    pub v: RawV,
}

impl RawSignature {
    /// Creates a raw signature from its components.
    #[must_use]
    pub fn new(r: impl Into<String>, s: impl Into<String>, v: impl Into<RawV>) -> Self {
        Self {
            r: r.into(),
            s: s.into(),
            v: v.into(),
        }
    }
}

/// A canonical secp256k1 signature: `r || s || recovery_id`.
///
/// # Wire Format
///
/// 65 bytes, rendered as `0x` followed by 130 lowercase hex digits. The last
/// byte is the bare recovery id (`0` or `1`), never `27/28`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    r: [u8; 32],
    s: [u8; 32],
    recovery_id: u8,
}

impl Signature {
    /// The length of a serialized signature in bytes.
    pub const BYTE_LEN: usize = 65;

    /// Creates a signature from its components.
    ///
    /// # Arguments
    ///
    /// * `r` - The R component as a 32-byte array
    /// * `s` - The S component as a 32-byte array
    /// * `recovery_id` - The recovery id, `0` or `1`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recovery`] if the recovery id is not `0` or `1`.
    pub fn new(r: [u8; 32], s: [u8; 32], recovery_id: u8) -> Result<Self> {
        if recovery_id > 1 {
            return Err(Error::Recovery(format!(
                "invalid recovery id: {recovery_id}"
            )));
        }
        Ok(Self { r, s, recovery_id })
    }

    /// Parses a signature from its 65-byte wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recovery`] if the slice is not exactly 65 bytes or the
    /// recovery id is not `0` or `1`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::BYTE_LEN {
            return Err(Error::Recovery(format!(
                "expected {} signature bytes, got {}",
                Self::BYTE_LEN,
                bytes.len()
            )));
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);
        Self::new(r, s, bytes[64])
    }

    /// Parses a signature from hex, with or without `0x`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHex`] if the input is not hex, and
    /// [`Error::Recovery`] if the decoded bytes are not a valid signature.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        Self::from_bytes(&decode_hex(hex_str)?)
    }

    /// Serializes the signature to its 65-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut bytes = [0u8; Self::BYTE_LEN];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.recovery_id;
        bytes
    }

    /// Encodes the signature as `0x` followed by 130 hex digits.
    #[must_use]
    pub fn to_hex(&self) -> String {
        encode_prefixed(self.to_bytes())
    }

    /// Returns the R component.
    #[must_use]
    pub const fn r(&self) -> &[u8; 32] {
        &self.r
    }

    /// Returns the S component.
    #[must_use]
    pub const fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// Returns the recovery id (`0` or `1`).
    #[must_use]
    pub const fn recovery_id(&self) -> u8 {
        self.recovery_id
    }

    /// Returns the R component as a [`U256`].
    #[must_use]
    pub fn r_u256(&self) -> U256 {
        U256::from_be_bytes(self.r)
    }

    /// Returns the S component as a [`U256`].
    #[must_use]
    pub fn s_u256(&self) -> U256 {
        U256::from_be_bytes(self.s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
