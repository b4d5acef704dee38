//! Hex conversions and recovery-id (`v`) normalization.
//!
//! External signers hand back signature components as loosely formatted hex
//! strings, and the `v` value comes in several conventions depending on what
//! was signed:
//!
//! | Context                   | Accepted from device              | Emitted          |
//! |---------------------------|-----------------------------------|------------------|
//! | legacy, no chain id       | `0/1`, `27/28`                    | `27/28`          |
//! | legacy, EIP-155 chain id  | `0/1`, `27/28`, `35 + 2·id + p`   | `35 + 2·id + p`  |
//! | typed transaction         | `0/1`, `27/28`                    | `0/1`            |
//! | personal / typed message  | `0/1`, `27/28`                    | `0/1`            |
//!
//! Each context has its own pure function so that the table above can be
//! tested row by row. [`normalize_v`] dispatches on a [`VContext`].
//!
//! # Example
//!
//! ```
//! use hw_evm_keyring_core::codec::{RawV, normalize_v_legacy, normalize_v_message};
//!
//! assert_eq!(normalize_v_message(&RawV::Number(27)).unwrap(), 0);
//! assert_eq!(normalize_v_legacy(&RawV::Number(27), Some(1)).unwrap(), 37);
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Offset of the pre-EIP-155 `v` convention.
const LEGACY_V_OFFSET: u64 = 27;

/// Offset of the EIP-155 `v` convention (`recid + 35 + 2 * chain_id`).
const EIP155_V_OFFSET: u64 = 35;

/// A `v` value as returned by an external signer.
///
/// Devices report `v` either as a JSON number or as a hex string (with or
/// without `0x`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawV {
    /// An integer value.
    Number(u64),
    /// A hex string such as `"0x1b"`, `"01"` or `"25"`.
    Hex(String),
}

impl RawV {
    /// Parses the raw value into an integer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHex`] if the hex string is empty, contains
    /// non-hex characters or does not fit in 64 bits.
    pub fn value(&self) -> Result<u64> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Hex(s) => {
                let digits = strip_hex_prefix(s);
                if digits.is_empty() {
                    return Err(Error::MalformedHex(format!("empty v value: {s:?}")));
                }
                u64::from_str_radix(digits, 16)
                    .map_err(|e| Error::MalformedHex(format!("invalid v value {s:?}: {e}")))
            }
        }
    }
}

impl From<u64> for RawV {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RawV {
    fn from(value: &str) -> Self {
        Self::Hex(value.to_string())
    }
}

impl fmt::Display for RawV {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Hex(s) => f.write_str(s),
        }
    }
}

/// The signing context a `v` value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VContext {
    /// A legacy (type 0) transaction, optionally EIP-155 protected.
    Legacy {
        /// The chain id, if the transaction is EIP-155 protected.
        chain_id: Option<u64>,
    },
    /// A typed (EIP-2718) transaction.
    Typed,
    /// A personal message or EIP-712 typed data signature.
    Message,
}

/// Normalizes `v` for the given context.
///
/// # Errors
///
/// See [`normalize_v_legacy`], [`normalize_v_typed`] and
/// [`normalize_v_message`].
pub fn normalize_v(raw: &RawV, context: VContext) -> Result<u64> {
    match context {
        VContext::Legacy { chain_id } => normalize_v_legacy(raw, chain_id),
        VContext::Typed => normalize_v_typed(raw).map(u64::from),
        VContext::Message => normalize_v_message(raw).map(u64::from),
    }
}

/// Normalizes `v` for a legacy transaction.
///
/// Without a chain id the result is `27 + recid`; with one it is the EIP-155
/// value `recid + 35 + 2 * chain_id`.
///
/// Some device firmware reports EIP-155 values in a single byte; when
/// `35 + 2 * chain_id` exceeds `0xff` the parity is taken from the low byte.
///
/// # Errors
///
/// Returns [`Error::MalformedHex`] for unparseable input and
/// [`Error::Recovery`] if no recovery id can be derived from the value.
pub fn normalize_v_legacy(raw: &RawV, chain_id: Option<u64>) -> Result<u64> {
    let v = raw.value()?;
    match chain_id {
        None => Ok(LEGACY_V_OFFSET + u64::from(bare_recovery_id(v)?)),
        Some(chain_id) => {
            let base = eip155_base(chain_id)?;
            let recid = eip155_recovery_id(v, base)?;
            base.checked_add(u64::from(recid)).ok_or_else(|| {
                Error::Recovery(format!("chain id {chain_id} overflows EIP-155 v"))
            })
        }
    }
}

/// Normalizes `v` for a typed transaction to a bare `0` or `1`.
///
/// # Errors
///
/// Returns [`Error::MalformedHex`] for unparseable input and
/// [`Error::Recovery`] for values other than `0`, `1`, `27` or `28`.
pub fn normalize_v_typed(raw: &RawV) -> Result<u8> {
    bare_recovery_id(raw.value()?)
}

/// Normalizes `v` for a personal-message or typed-data signature to a bare
/// `0` or `1`.
///
/// The `27/28` form is never handed back to callers.
///
/// # Errors
///
/// Returns [`Error::MalformedHex`] for unparseable input and
/// [`Error::Recovery`] for values other than `0`, `1`, `27` or `28`.
pub fn normalize_v_message(raw: &RawV) -> Result<u8> {
    bare_recovery_id(raw.value()?)
}

/// Derives the recovery id from a legacy transaction `v` value.
///
/// This is the inverse of [`normalize_v_legacy`].
///
/// # Errors
///
/// Returns [`Error::Recovery`] if `v` does not encode a recovery id for the
/// given chain id.
pub fn legacy_recovery_id(v: u64, chain_id: Option<u64>) -> Result<u8> {
    match chain_id {
        None => bare_recovery_id(v),
        Some(chain_id) => eip155_recovery_id(v, eip155_base(chain_id)?),
    }
}

/// Maps `0/1` and `27/28` to a recovery id.
fn bare_recovery_id(v: u64) -> Result<u8> {
    match v {
        0 | 1 => Ok(v as u8),
        27 | 28 => Ok((v - LEGACY_V_OFFSET) as u8),
        other => Err(Error::Recovery(format!("invalid recovery id: v = {other}"))),
    }
}

/// Computes `35 + 2 * chain_id`.
fn eip155_base(chain_id: u64) -> Result<u64> {
    chain_id
        .checked_mul(2)
        .and_then(|doubled| doubled.checked_add(EIP155_V_OFFSET))
        .ok_or_else(|| Error::Recovery(format!("chain id {chain_id} overflows EIP-155 v")))
}

fn eip155_recovery_id(v: u64, base: u64) -> Result<u8> {
    if let Some(parity @ (0 | 1)) = v.checked_sub(base) {
        return Ok(parity as u8);
    }

    // Firmware that only has one byte for v reports the low byte of the
    // EIP-155 value.
    if base > 0xff && v <= 0xff {
        let parity = (v as u8).wrapping_sub(base as u8);
        if parity <= 1 {
            return Ok(parity);
        }
    }

    bare_recovery_id(v)
}

/// Strips a leading `0x` or `0X` prefix, if present.
#[must_use]
pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Returns `s` with exactly one `0x` prefix.
#[must_use]
pub fn add_hex_prefix(s: &str) -> String {
    format!("0x{}", strip_hex_prefix(s))
}

/// Returns `true` if `s` carries a `0x` prefix.
#[must_use]
pub fn is_hex_prefixed(s: &str) -> bool {
    s.starts_with("0x") || s.starts_with("0X")
}

/// Decodes a hex string, with or without `0x`.
///
/// # Errors
///
/// Returns [`Error::MalformedHex`] if the input is not valid hex.
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    Ok(hex::decode(strip_hex_prefix(s))?)
}

/// Decodes a hex string into exactly `N` bytes.
///
/// # Errors
///
/// Returns [`Error::MalformedHex`] if the input is not valid hex or does not
/// decode to `N` bytes.
pub fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N]> {
    let bytes = decode_hex(s)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| Error::MalformedHex(format!("expected {N} bytes, got {len}")))
}

/// Decodes a 256-bit word, left-padding it with zeros.
///
/// Signers may omit leading zero bytes or even a leading zero nibble, so any
/// non-empty hex string of at most 64 digits is accepted.
///
/// # Errors
///
/// Returns [`Error::MalformedHex`] if the input is empty, not valid hex, or
/// longer than 32 bytes.
pub fn decode_word(s: &str) -> Result<[u8; 32]> {
    let digits = strip_hex_prefix(s);
    if digits.is_empty() {
        return Err(Error::MalformedHex("empty 32-byte word".to_string()));
    }
    if digits.len() > 64 {
        return Err(Error::MalformedHex(format!(
            "word too long: {} hex digits",
            digits.len()
        )));
    }

    let padded = format!("{digits:0>64}");
    let mut word = [0u8; 32];
    hex::decode_to_slice(padded, &mut word)?;
    Ok(word)
}

/// Encodes bytes as lowercase hex with a `0x` prefix.
#[must_use]
pub fn encode_prefixed(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> RawV {
        RawV::Hex(s.to_string())
    }

    #[test]
    fn raw_v_parsing() {
        assert_eq!(RawV::Number(27).value().unwrap(), 27);
        assert_eq!(hex("0x1b").value().unwrap(), 27);
        assert_eq!(hex("1c").value().unwrap(), 28);
        assert_eq!(hex("0x01").value().unwrap(), 1);
        assert!(matches!(hex("0x").value(), Err(Error::MalformedHex(_))));
        assert!(matches!(hex("zz").value(), Err(Error::MalformedHex(_))));
        assert!(matches!(
            hex("0x1ffffffffffffffff").value(),
            Err(Error::MalformedHex(_))
        ));
    }

    #[test]
    fn raw_v_deserializes_number_or_string() {
        let n: RawV = serde_json::from_str("27").unwrap();
        assert_eq!(n, RawV::Number(27));
        let s: RawV = serde_json::from_str("\"0x01\"").unwrap();
        assert_eq!(s, hex("0x01"));
    }

    #[test]
    fn message_context_table() {
        let cases = [
            (RawV::Number(0), 0),
            (RawV::Number(1), 1),
            (RawV::Number(27), 0),
            (RawV::Number(28), 1),
            (hex("0x1b"), 0),
            (hex("1c"), 1),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize_v_message(&raw).unwrap(), expected, "v = {raw}");
        }

        for bad in [2, 26, 29, 35, 37] {
            assert!(matches!(
                normalize_v_message(&RawV::Number(bad)),
                Err(Error::Recovery(_))
            ));
        }
    }

    #[test]
    fn typed_transaction_context_table() {
        let cases = [
            (hex("0x00"), 0),
            (hex("0x01"), 1),
            (hex("00"), 0),
            (RawV::Number(27), 0),
            (RawV::Number(28), 1),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize_v_typed(&raw).unwrap(), expected, "v = {raw}");
        }

        // EIP-155 values are never valid for typed transactions.
        assert!(matches!(
            normalize_v_typed(&RawV::Number(37)),
            Err(Error::Recovery(_))
        ));
    }

    #[test]
    fn legacy_without_chain_id_table() {
        let cases = [
            (RawV::Number(0), 27),
            (RawV::Number(1), 28),
            (RawV::Number(27), 27),
            (hex("1c"), 28),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize_v_legacy(&raw, None).unwrap(), expected, "v = {raw}");
        }

        assert!(matches!(
            normalize_v_legacy(&RawV::Number(37), None),
            Err(Error::Recovery(_))
        ));
    }

    #[test]
    fn legacy_with_chain_id_table() {
        let cases = [
            (RawV::Number(0), Some(1), 37),
            (RawV::Number(1), Some(1), 38),
            (RawV::Number(27), Some(1), 37),
            (RawV::Number(28), Some(1), 38),
            (RawV::Number(37), Some(1), 37),
            (hex("0x26"), Some(1), 38),
            (RawV::Number(309), Some(137), 309),
            (RawV::Number(310), Some(137), 310),
        ];
        for (raw, chain_id, expected) in cases {
            assert_eq!(
                normalize_v_legacy(&raw, chain_id).unwrap(),
                expected,
                "v = {raw}, chain = {chain_id:?}"
            );
        }

        // Valid EIP-155 value for a different chain.
        assert!(matches!(
            normalize_v_legacy(&RawV::Number(38), Some(5)),
            Err(Error::Recovery(_))
        ));
    }

    #[test]
    fn legacy_truncated_single_byte_v() {
        // Polygon: 35 + 2 * 137 = 309 = 0x135, device reports 0x35 / 0x36.
        assert_eq!(normalize_v_legacy(&hex("35"), Some(137)).unwrap(), 309);
        assert_eq!(normalize_v_legacy(&hex("36"), Some(137)).unwrap(), 310);

        // Wrap-around: 35 + 2 * 1_000_000 = 0x1e84a3, low byte 0xa3.
        let base = 35 + 2 * 1_000_000;
        assert_eq!(normalize_v_legacy(&hex("a3"), Some(1_000_000)).unwrap(), base);
        assert_eq!(
            normalize_v_legacy(&hex("a4"), Some(1_000_000)).unwrap(),
            base + 1
        );
    }

    #[test]
    fn legacy_chain_id_overflow() {
        assert!(matches!(
            normalize_v_legacy(&RawV::Number(0), Some(u64::MAX)),
            Err(Error::Recovery(_))
        ));
    }

    #[test]
    fn legacy_chain_id_at_v_limit() {
        let chain_id = (u64::MAX - 35) / 2;
        assert_eq!(
            normalize_v_legacy(&RawV::Number(u64::MAX), Some(chain_id)).unwrap(),
            u64::MAX
        );
        assert_eq!(legacy_recovery_id(u64::MAX, Some(chain_id)).unwrap(), 0);
        assert!(matches!(
            normalize_v_legacy(&RawV::Number(1), Some(chain_id)),
            Err(Error::Recovery(_))
        ));
    }

    #[test]
    fn legacy_recovery_id_inverts_normalization() {
        for chain_id in [None, Some(1), Some(137), Some(1_000_000)] {
            for recid in 0..2u64 {
                let v = normalize_v_legacy(&RawV::Number(recid), chain_id).unwrap();
                assert_eq!(u64::from(legacy_recovery_id(v, chain_id).unwrap()), recid);
            }
        }
    }

    #[test]
    fn normalize_v_dispatch() {
        let raw = RawV::Number(28);
        assert_eq!(normalize_v(&raw, VContext::Message).unwrap(), 1);
        assert_eq!(normalize_v(&raw, VContext::Typed).unwrap(), 1);
        assert_eq!(
            normalize_v(&raw, VContext::Legacy { chain_id: None }).unwrap(),
            28
        );
        assert_eq!(
            normalize_v(&raw, VContext::Legacy { chain_id: Some(1) }).unwrap(),
            38
        );
    }

    #[test]
    fn prefix_helpers() {
        assert_eq!(strip_hex_prefix("0xabc"), "abc");
        assert_eq!(strip_hex_prefix("0Xabc"), "abc");
        assert_eq!(strip_hex_prefix("abc"), "abc");
        assert_eq!(add_hex_prefix("abc"), "0xabc");
        assert_eq!(add_hex_prefix("0xabc"), "0xabc");
        assert!(is_hex_prefixed("0x"));
        assert!(!is_hex_prefixed("abc"));
    }

    #[test]
    fn decode_word_pads_left() {
        let word = decode_word("0x01").unwrap();
        assert_eq!(word[31], 1);
        assert_eq!(word[..31], [0u8; 31]);

        // Odd number of digits.
        let word = decode_word("abc").unwrap();
        assert_eq!(word[30..], [0x0a, 0xbc]);

        let full = "ff".repeat(32);
        assert_eq!(decode_word(&full).unwrap(), [0xff; 32]);
    }

    #[test]
    fn decode_word_rejects_bad_input() {
        assert!(matches!(decode_word(""), Err(Error::MalformedHex(_))));
        assert!(matches!(decode_word("0x"), Err(Error::MalformedHex(_))));
        assert!(matches!(decode_word("0xgg"), Err(Error::MalformedHex(_))));
        let too_long = "1".repeat(65);
        assert!(matches!(decode_word(&too_long), Err(Error::MalformedHex(_))));
    }

    #[test]
    fn decode_fixed_checks_length() {
        let bytes: [u8; 2] = decode_fixed("0xabcd").unwrap();
        assert_eq!(bytes, [0xab, 0xcd]);
        assert!(matches!(
            decode_fixed::<20>("0xabcd"),
            Err(Error::MalformedHex(_))
        ));
    }
}
