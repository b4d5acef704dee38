//! The capability boundary to an external hardware signer.
//!
//! The keyring never holds key material. Everything that needs the private
//! key goes through an [`ExternalSigner`]: a device, its transport, or a stub
//! standing in for one.
//!
//! # Sharing
//!
//! A bound signer lives in a [`SignerHandle`], a cheaply cloneable
//! `Arc<Mutex<Box<dyn ExternalSigner>>>`. Every request holds the lock for its
//! whole duration, so requests against one device are serialized even when
//! several keyrings share the handle.
//!
//! # Example
//!
//! ```
//! use hw_evm_keyring_core::signer::{ScriptedSigner, SignerHandle};
//! use hw_evm_keyring_core::{DerivationPath, SigningKeyring};
//!
//! let signer = ScriptedSigner::new().with_error("device locked");
//! let calls = signer.calls();
//!
//! let mut keyring = SigningKeyring::new();
//! keyring.bind(SignerHandle::new(signer));
//!
//! assert!(keyring.unlock(&DerivationPath::default()).is_err());
//! assert_eq!(calls.len(), 1);
//! ```

pub mod scripted;

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

pub use scripted::{CallLog, ScriptedError, ScriptedSigner, SignerCall};

use crate::address::Address;
use crate::error::{BoxError, Error, Result};
use crate::registry::DerivationPath;
use crate::signature::RawSignature;

/// The result type of [`ExternalSigner`] methods.
///
/// Devices report their own error types; the keyring passes them through
/// unchanged inside [`Error::Signer`].
pub type SignerResult<T> = core::result::Result<T, BoxError>;

/// What a device reports for a derivation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAccount {
    /// The address at the path.
    pub address: Address,

    /// The uncompressed public key as hex.
    pub public_key: String,

    /// The BIP-32 chain code as hex, when the device was asked for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_code: Option<String>,
}

/// A device that holds private keys and signs on request.
///
/// All hex arguments are passed without a `0x` prefix.
pub trait ExternalSigner: Send {
    /// Returns the account at a derivation path.
    ///
    /// # Errors
    ///
    /// Returns the device's error unchanged.
    fn get_address(&mut self, path: &DerivationPath) -> SignerResult<DeviceAccount>;

    /// Signs an unsigned transaction payload.
    ///
    /// # Errors
    ///
    /// Returns the device's error unchanged.
    fn sign_transaction(
        &mut self,
        path: &DerivationPath,
        raw_tx_hex: &str,
    ) -> SignerResult<RawSignature>;

    /// Signs a personal message given as hex of its bytes.
    ///
    /// # Errors
    ///
    /// Returns the device's error unchanged.
    fn sign_personal_message(
        &mut self,
        path: &DerivationPath,
        message_hex: &str,
    ) -> SignerResult<RawSignature>;

    /// Signs EIP-712 typed data given as its two pre-computed hashes.
    ///
    /// # Errors
    ///
    /// Returns the device's error unchanged.
    fn sign_typed_data_hash(
        &mut self,
        path: &DerivationPath,
        domain_separator_hex: &str,
        struct_hash_hex: &str,
    ) -> SignerResult<RawSignature>;
}

/// A shared, lockable handle to a bound [`ExternalSigner`].
#[derive(Clone)]
pub struct SignerHandle(Arc<Mutex<Box<dyn ExternalSigner>>>);

impl SignerHandle {
    /// Wraps a signer in a new handle.
    #[must_use]
    pub fn new(signer: impl ExternalSigner + 'static) -> Self {
        Self::from_boxed(Box::new(signer))
    }

    /// Wraps an already boxed signer in a new handle.
    #[must_use]
    pub fn from_boxed(signer: Box<dyn ExternalSigner>) -> Self {
        Self(Arc::new(Mutex::new(signer)))
    }

    /// Runs one request against the signer while holding its lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signer`] if the request fails or if an earlier request
    /// panicked while holding the lock.
    pub fn with<T>(
        &self,
        request: impl FnOnce(&mut dyn ExternalSigner) -> SignerResult<T>,
    ) -> Result<T> {
        let mut guard = self
            .0
            .lock()
            .map_err(|_| Error::Signer("signer lock poisoned".into()))?;
        request(&mut **guard).map_err(Error::Signer)
    }

    /// Returns `true` if both handles refer to the same signer.
    #[must_use]
    pub fn same_signer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SignerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerHandle")
            .field("handles", &Arc::strong_count(&self.0))
            .finish_non_exhaustive()
    }
}
