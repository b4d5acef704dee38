//! Hardware EVM Keyring Core Library
//!
//! This crate is the signing core of a wallet keyring whose private keys live
//! on an external hardware signer. It never touches key material. It decides
//! what the device must sign, turns the device's raw answer into canonical
//! Ethereum signatures and checks that message signatures really come from the
//! requested account.
//!
//! # Overview
//!
//! This library provides:
//!
//! - **Transactions**: legacy (with and without EIP-155), EIP-2930 and
//!   EIP-1559 payloads, and assembly of the signed transaction
//! - **Personal messages**: EIP-191 hashing and signer recovery
//! - **EIP-712**: V4 typed structured data hashing
//! - **Keyring**: a single-account registry, persisted state, and an
//!   orchestrator bound to an [`signer::ExternalSigner`]
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SigningKeyring                         │
//! │     (path lookup, device requests, signer verification)     │
//! ├──────────────┬──────────────┬──────────────┬────────────────┤
//! │   Registry   │    Digest    │  Assembler   │    Crypto      │
//! │  (accounts,  │  (payloads,  │  (r, s, v    │  (recovery,    │
//! │   paths)     │   hashes)    │   encoding)  │   low-S)       │
//! ├──────────────┴──────────────┴──────────────┴────────────────┤
//! │   Transaction   │   EIP-712   │   Codec   │   Signature     │
//! ├─────────────────────────────────────────────────────────────┤
//! │             ExternalSigner (device, transport)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ## Signing a Personal Message
//!
//! ```rust
//! use hw_evm_keyring_core::signer::{DeviceAccount, ScriptedSigner, SignerHandle};
//! use hw_evm_keyring_core::{Address, RawSignature, SigningKeyring};
//!
//! let account: Address = "0x9e10effa844d7399cdc555613b23a8499e04e386".parse().unwrap();
//!
//! // A stand-in for a real device that answers with prepared responses.
//! let device = ScriptedSigner::new()
//!     .with_account(DeviceAccount {
//!         address: account,
//!         public_key: String::new(),
//!         chain_code: None,
//!     })
//!     .with_signature(RawSignature::new(
//!         "afb6e247b1c490e284053c87ab5f6b59e219d51f743f7a4d83e400782bc7e4b9",
//!         "479a268e0e0acd4de3f1e28e4fac2a6b32a4195e8dfa9d19147abe8807aa6f64",
//!         27u64,
//!     ));
//!
//! let mut keyring = SigningKeyring::new();
//! keyring.bind(SignerHandle::new(device));
//! assert_eq!(keyring.add_accounts(1).unwrap(), vec![account]);
//!
//! let message = "5369676e20506572736f6e616c204d6573736167652054657374";
//! let signature = keyring.sign_personal_message(&account, message).unwrap();
//! assert!(signature.to_hex().ends_with("00"));
//! ```
//!
//! ## Hashing a Transaction
//!
//! ```rust
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
//! // The device signs this payload; its keccak256 is the signing hash.
//! let payload = tx.unsigned_payload();
//! assert_eq!(payload[0], 0x02);
//! let hash = tx.signing_hash();
//! ```
//!
//! # Security Considerations
//!
//! - Private keys never leave the external signer
//! - Message and typed-data signatures are recovered and compared with the
//!   requested address before they are returned
//! - Recovery accepts high-S signatures by normalizing them first
//! - Errors are never retried or downgraded

pub mod address;
pub mod assembler;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod digest;
pub mod eip712;
pub mod error;
pub mod keyring;
pub mod registry;
pub mod signature;
pub mod signer;
pub mod transaction;

// Re-exports for convenience
pub use address::Address;
pub use codec::RawV;
pub use config::KeyringConfig;
pub use eip712::{Eip712Domain, TypedData, TypedDataDigest, TypedDataVersion};
pub use error::{Error, Result};
pub use keyring::{KEYRING_TYPE, KeyringState, SigningKeyring};
pub use registry::{Account, AccountRegistry, DEFAULT_HD_PATH, DerivationPath};
pub use signature::{RawSignature, Signature};
pub use signer::{DeviceAccount, ExternalSigner, SignerHandle};
pub use transaction::{
    AccessListEntry, Eip1559Transaction, Eip2930Transaction, LegacyTransaction,
    SignedTransaction, Transaction, TxType,
};

// Re-export commonly used alloy types
pub use alloy_primitives::{B256, Bytes, U256};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use tracing_subscriber as _;
