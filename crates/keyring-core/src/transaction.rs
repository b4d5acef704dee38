//! Ethereum transaction types and signing payload generation.
//!
//! This module provides types for representing Ethereum transactions, the
//! exact byte sequence a hardware signer is asked to sign, and the signed
//! envelope produced once the device answers. It supports:
//!
//! - **Legacy Transactions**: type 0, with or without EIP-155 chain id
//!   replay protection
//! - **EIP-2930 Transactions**: type 1, with an access list
//! - **EIP-1559 Transactions**: type 2, with priority fees and max fees
//!
//! # Signing Flow
//!
//! 1. Create a transaction with the appropriate type
//! 2. Call [`Transaction::unsigned_payload`] to get the bytes the device signs
//! 3. Send the payload to the external signer
//! 4. Combine the device's `(r, s, v)` with the transaction using
//!    [`crate::assembler::assemble_transaction`]
//!
//! # Example
//!
//! ```
//! use hw_evm_keyring_core::{Address, Eip1559Transaction, Transaction};
//! use alloy_primitives::{Bytes, U256};
//!
//! let tx = Transaction::Eip1559(Eip1559Transaction {
//!     chain_id: 1,
//!     nonce: 0,
//!     max_priority_fee_per_gas: U256::from(1_000_000_000u64),
//!     max_fee_per_gas: U256::from(100_000_000_000u64),
//!     gas_limit: 21000,
//!     to: Some(Address::zero()),
//!     value: U256::from(1_000_000_000_000_000_000u128),
//!     data: Bytes::new(),
//!     access_list: vec![],
//! });
//!
//! let payload = tx.unsigned_payload();
//! assert_eq!(payload[0], 0x02);
//! ```

use alloy_primitives::{B256, Bytes, U256, keccak256};
use alloy_rlp::{Encodable, RlpEncodable};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::codec::{VContext, legacy_recovery_id};
use crate::crypto::recover_address;
use crate::error::{Error, Result};
use crate::signature::Signature;

/// An access list entry for EIP-2930/EIP-1559 transactions.
///
/// Access lists specify which addresses and storage keys will be accessed
/// during transaction execution, potentially reducing gas costs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable)]
#[serde(rename_all = "camelCase")]
pub struct AccessListEntry {
    /// The address being accessed.
    pub address: alloy_primitives::Address,

    /// The storage keys being accessed at this address.
    pub storage_keys: Vec<B256>,
}

/// The EIP-2718 transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TxType {
    /// Type 0, untyped legacy transaction.
    Legacy = 0x00,
    /// Type 1, EIP-2930 access list transaction.
    Eip2930 = 0x01,
    /// Type 2, EIP-1559 fee market transaction.
    Eip1559 = 0x02,
}

impl TxType {
    /// Returns `true` for EIP-2718 typed transactions.
    #[must_use]
    pub const fn is_typed(self) -> bool {
        !matches!(self, Self::Legacy)
    }
}

/// A legacy (type 0) transaction.
///
/// With a chain id the transaction is replay protected as specified in
/// [EIP-155]. Without one it is signed the way pre-EIP-155 wallets did.
///
/// [EIP-155]: https://eips.ethereum.org/EIPS/eip-155
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTransaction {
    /// The chain ID for replay protection, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,

    /// The transaction nonce.
    pub nonce: u64,

    /// The gas price in wei.
    pub gas_price: U256,

    /// The gas limit.
    pub gas_limit: u64,

    /// The recipient address, or `None` for contract creation.
    #[serde(default)]
    pub to: Option<Address>,

    /// The value to transfer in wei.
    pub value: U256,

    /// The transaction input data.
    #[serde(default)]
    pub data: Bytes,
}

impl LegacyTransaction {
    fn encode_fields(&self, out: &mut Vec<u8>) {
        self.nonce.encode(out);
        encode_u256(&self.gas_price, out);
        self.gas_limit.encode(out);
        encode_optional_address(self.to.as_ref(), out);
        encode_u256(&self.value, out);
        self.data.encode(out);
    }

    /// Returns the unsigned payload the device signs.
    ///
    /// `rlp([nonce, gasPrice, gasLimit, to, value, data])`, extended with
    /// `[chainId, 0, 0]` when a chain id is present.
    #[must_use]
    pub fn unsigned_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_rlp_list(&mut buf, |buf| {
            self.encode_fields(buf);
            if let Some(chain_id) = self.chain_id {
                chain_id.encode(buf);
                0u8.encode(buf);
                0u8.encode(buf);
            }
        });
        buf
    }

    /// Returns `rlp([nonce, gasPrice, gasLimit, to, value, data, v, r, s])`.
    fn signed_rlp(&self, v: u64, r: &B256, s: &B256) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_rlp_list(&mut buf, |buf| {
            self.encode_fields(buf);
            v.encode(buf);
            encode_bytes32(&r.0, buf);
            encode_bytes32(&s.0, buf);
        });
        buf
    }
}

/// An EIP-2930 (type 1) access list transaction.
///
/// See [EIP-2930] for details.
///
/// [EIP-2930]: https://eips.ethereum.org/EIPS/eip-2930
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip2930Transaction {
    /// The chain ID.
    pub chain_id: u64,

    /// The transaction nonce.
    pub nonce: u64,

    /// The gas price in wei.
    pub gas_price: U256,

    /// The gas limit.
    pub gas_limit: u64,

    /// The recipient address, or `None` for contract creation.
    #[serde(default)]
    pub to: Option<Address>,

    /// The value to transfer in wei.
    pub value: U256,

    /// The transaction input data.
    #[serde(default)]
    pub data: Bytes,

    /// The access list.
    #[serde(default)]
    pub access_list: Vec<AccessListEntry>,
}

impl Eip2930Transaction {
    /// The transaction type identifier for EIP-2930.
    pub const TX_TYPE: u8 = 0x01;

    fn encode_fields(&self, out: &mut Vec<u8>) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        encode_u256(&self.gas_price, out);
        self.gas_limit.encode(out);
        encode_optional_address(self.to.as_ref(), out);
        encode_u256(&self.value, out);
        self.data.encode(out);
        encode_access_list(&self.access_list, out);
    }

    /// Returns `0x01 || rlp([chainId, nonce, gasPrice, gasLimit, to, value,
    /// data, accessList])`.
    #[must_use]
    pub fn unsigned_payload(&self) -> Vec<u8> {
        let mut buf = vec![Self::TX_TYPE];
        encode_rlp_list(&mut buf, |buf| self.encode_fields(buf));
        buf
    }

    fn signed_rlp(&self, y_parity: u64, r: &B256, s: &B256) -> Vec<u8> {
        let mut buf = vec![Self::TX_TYPE];
        encode_rlp_list(&mut buf, |buf| {
            self.encode_fields(buf);
            y_parity.encode(buf);
            encode_bytes32(&r.0, buf);
            encode_bytes32(&s.0, buf);
        });
        buf
    }
}

/// An EIP-1559 (Type 2) transaction.
///
/// This transaction type introduces:
///
/// - Base fee burning
/// - Priority fee (tip) for miners/validators
/// - More predictable gas pricing
///
/// See [EIP-1559] for details.
///
/// [EIP-1559]: https://eips.ethereum.org/EIPS/eip-1559
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip1559Transaction {
    /// The chain ID.
    pub chain_id: u64,

    /// The transaction nonce.
    pub nonce: u64,

    /// The maximum priority fee per gas (tip).
    pub max_priority_fee_per_gas: U256,

    /// The maximum total fee per gas.
    pub max_fee_per_gas: U256,

    /// The gas limit.
    pub gas_limit: u64,

    /// The recipient address, or `None` for contract creation.
    #[serde(default)]
    pub to: Option<Address>,

    /// The value to transfer in wei.
    pub value: U256,

    /// The transaction input data.
    #[serde(default)]
    pub data: Bytes,

    /// The access list.
    #[serde(default)]
    pub access_list: Vec<AccessListEntry>,
}

impl Eip1559Transaction {
    /// The transaction type identifier for EIP-1559.
    pub const TX_TYPE: u8 = 0x02;

    fn encode_fields(&self, out: &mut Vec<u8>) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        encode_u256(&self.max_priority_fee_per_gas, out);
        encode_u256(&self.max_fee_per_gas, out);
        self.gas_limit.encode(out);
        encode_optional_address(self.to.as_ref(), out);
        encode_u256(&self.value, out);
        self.data.encode(out);
        encode_access_list(&self.access_list, out);
    }

    /// Returns `0x02 || rlp([chainId, nonce, maxPriorityFeePerGas,
    /// maxFeePerGas, gasLimit, to, value, data, accessList])`.
    #[must_use]
    pub fn unsigned_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.push(Self::TX_TYPE);
        encode_rlp_list(&mut buf, |buf| self.encode_fields(buf));
        buf
    }

    fn signed_rlp(&self, y_parity: u64, r: &B256, s: &B256) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.push(Self::TX_TYPE);
        encode_rlp_list(&mut buf, |buf| {
            self.encode_fields(buf);
            y_parity.encode(buf);
            encode_bytes32(&r.0, buf);
            encode_bytes32(&s.0, buf);
        });
        buf
    }
}

/// Encodes an RLP list using a closure to write elements.
fn encode_rlp_list<F>(out: &mut Vec<u8>, f: F)
where
    F: FnOnce(&mut Vec<u8>),
{
    let mut content = Vec::new();
    f(&mut content);

    let header = alloy_rlp::Header {
        list: true,
        payload_length: content.len(),
    };
    header.encode(out);
    out.extend_from_slice(&content);
}

/// Encodes a U256 as RLP (strips leading zeros).
fn encode_u256(value: &U256, out: &mut Vec<u8>) {
    encode_bytes32(&value.to_be_bytes::<32>(), out);
}

/// Encodes an optional address.
fn encode_optional_address(addr: Option<&Address>, out: &mut Vec<u8>) {
    match addr {
        Some(a) => a.inner().encode(out),
        // Empty string for contract creation
        None => out.push(alloy_rlp::EMPTY_STRING_CODE),
    }
}

/// Encodes a 32-byte big-endian integer, stripping leading zeros.
fn encode_bytes32(bytes: &[u8; 32], out: &mut Vec<u8>) {
    match bytes.iter().position(|&b| b != 0) {
        Some(start) => bytes[start..].encode(out),
        None => out.push(alloy_rlp::EMPTY_STRING_CODE),
    }
}

/// Encodes an access list to RLP.
fn encode_access_list(access_list: &[AccessListEntry], out: &mut Vec<u8>) {
    encode_rlp_list(out, |out| {
        for entry in access_list {
            entry.encode(out);
        }
    });
}

/// A unified transaction type supporting multiple formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Transaction {
    /// Legacy transaction, optionally EIP-155 protected.
    #[serde(rename = "legacy")]
    Legacy(LegacyTransaction),
    /// EIP-2930 (Type 1) transaction.
    #[serde(rename = "eip2930")]
    Eip2930(Eip2930Transaction),
    /// EIP-1559 (Type 2) transaction.
    #[serde(rename = "eip1559")]
    Eip1559(Eip1559Transaction),
}

impl Transaction {
    /// Returns the EIP-2718 type of this transaction.
    #[must_use]
    pub const fn tx_type(&self) -> TxType {
        match self {
            Self::Legacy(_) => TxType::Legacy,
            Self::Eip2930(_) => TxType::Eip2930,
            Self::Eip1559(_) => TxType::Eip1559,
        }
    }

    /// Returns the chain ID, or `None` for a pre-EIP-155 legacy transaction.
    #[must_use]
    pub const fn chain_id(&self) -> Option<u64> {
        match self {
            Self::Legacy(tx) => tx.chain_id,
            Self::Eip2930(tx) => Some(tx.chain_id),
            Self::Eip1559(tx) => Some(tx.chain_id),
        }
    }

    /// Returns the `v` convention this transaction's signature follows.
    #[must_use]
    pub const fn v_context(&self) -> VContext {
        match self {
            Self::Legacy(tx) => VContext::Legacy {
                chain_id: tx.chain_id,
            },
            Self::Eip2930(_) | Self::Eip1559(_) => VContext::Typed,
        }
    }

    /// Returns the unsigned payload the external signer signs.
    ///
    /// For typed transactions the payload starts with the type byte.
    #[must_use]
    pub fn unsigned_payload(&self) -> Vec<u8> {
        match self {
            Self::Legacy(tx) => tx.unsigned_payload(),
            Self::Eip2930(tx) => tx.unsigned_payload(),
            Self::Eip1559(tx) => tx.unsigned_payload(),
        }
    }

    /// Returns the Keccak-256 hash of the unsigned payload.
    #[must_use]
    pub fn signing_hash(&self) -> B256 {
        keccak256(self.unsigned_payload())
    }

    /// Parses a transaction from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if parsing fails.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the transaction to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A transaction together with the signature produced for it.
///
/// `v` follows the convention of the transaction type: `27/28` for legacy
/// transactions without a chain id, `recid + 35 + 2 * chainId` for EIP-155
/// legacy transactions and a bare `0/1` for typed transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedTransaction {
    transaction: Transaction,
    r: B256,
    s: B256,
    v: u64,
}

impl SignedTransaction {
    /// Combines a transaction with its signature components.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recovery`] if `v` is not valid for the transaction's
    /// type and chain id.
    pub fn new(transaction: Transaction, r: B256, s: B256, v: u64) -> Result<Self> {
        let signed = Self {
            transaction,
            r,
            s,
            v,
        };
        signed.y_parity()?;
        Ok(signed)
    }

    /// Returns the transaction that was signed.
    #[must_use]
    pub const fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Returns the R component.
    #[must_use]
    pub const fn r(&self) -> &B256 {
        &self.r
    }

    /// Returns the S component.
    #[must_use]
    pub const fn s(&self) -> &B256 {
        &self.s
    }

    /// Returns `v` in the convention of the transaction type.
    #[must_use]
    pub const fn v(&self) -> u64 {
        self.v
    }

    /// Returns the bare recovery id encoded in `v`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recovery`] if `v` does not encode a recovery id.
    pub fn y_parity(&self) -> Result<u8> {
        match &self.transaction {
            Transaction::Legacy(tx) => legacy_recovery_id(self.v, tx.chain_id),
            Transaction::Eip2930(_) | Transaction::Eip1559(_) => match self.v {
                0 | 1 => Ok(self.v as u8),
                other => Err(Error::Recovery(format!(
                    "typed transaction v must be 0 or 1, got {other}"
                ))),
            },
        }
    }

    /// Returns the canonical `r || s || recovery_id` signature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recovery`] if `v` does not encode a recovery id.
    pub fn signature(&self) -> Result<Signature> {
        Signature::new(self.r.0, self.s.0, self.y_parity()?)
    }

    /// Returns the signed transaction envelope, ready for broadcast.
    #[must_use]
    pub fn rlp(&self) -> Vec<u8> {
        match &self.transaction {
            Transaction::Legacy(tx) => tx.signed_rlp(self.v, &self.r, &self.s),
            Transaction::Eip2930(tx) => tx.signed_rlp(self.v, &self.r, &self.s),
            Transaction::Eip1559(tx) => tx.signed_rlp(self.v, &self.r, &self.s),
        }
    }

    /// Returns the transaction hash, the Keccak-256 of [`Self::rlp`].
    #[must_use]
    pub fn hash(&self) -> B256 {
        keccak256(self.rlp())
    }

    /// Recovers the address that produced this signature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recovery`] if the signature is malformed or no public
    /// key can be recovered from it.
    pub fn recover_signer(&self) -> Result<Address> {
        recover_address(&self.transaction.signing_hash(), &self.signature()?)
    }
}
