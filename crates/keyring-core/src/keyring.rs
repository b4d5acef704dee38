//! The hardware keyring.
//!
//! [`SigningKeyring`] ties the other modules together. It resolves the
//! derivation path of a managed address, builds the bytes the device must
//! sign, sends them through the bound [`SignerHandle`], canonicalizes the
//! answer and, for messages and typed data, checks that the signature really
//! recovers to the requested address.
//!
//! # States
//!
//! ```text
//!   Uninitialized ──bind──▶ Ready ──add_accounts(1)──▶ LockedWithAccount
//!                             ▲                              │
//!                             └──────────forget──────────────┘
//! ```
//!
//! Binding a signer keeps the registered accounts, and [`SigningKeyring::forget`]
//! keeps the signer.

use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::address::Address;
use crate::assembler::{assemble_personal_or_typed_signature, assemble_transaction};
use crate::config::KeyringConfig;
use crate::crypto::{recover_personal_signature, recover_typed_data_signature};
use crate::digest;
use crate::eip712::{TypedData, TypedDataVersion};
use crate::error::{Error, Result};
use crate::registry::{AccountRegistry, DerivationPath};
use crate::signature::Signature;
use crate::signer::SignerHandle;
use crate::transaction::{SignedTransaction, Transaction};

/// The keyring type name reported to wallet software.
pub const KEYRING_TYPE: &str = "Ledger";

/// Where a keyring is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyringState {
    /// No signer is bound.
    Uninitialized,
    /// A signer is bound and no account is managed.
    Ready,
    /// A signer is bound and an account is managed.
    LockedWithAccount,
}

/// A keyring whose keys live on an external signer.
#[derive(Debug, Clone, Default)]
pub struct SigningKeyring {
    hd_path: DerivationPath,
    registry: AccountRegistry,
    device_id: Option<String>,
    signer: Option<SignerHandle>,
}

impl SigningKeyring {
    /// Creates an unbound keyring with the default derivation path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an unbound keyring from persisted state.
    #[must_use]
    pub fn from_config(config: KeyringConfig) -> Self {
        let mut keyring = Self::new();
        keyring.deserialize(config);
        keyring
    }

    /// Returns [`KEYRING_TYPE`].
    #[must_use]
    pub const fn keyring_type(&self) -> &'static str {
        KEYRING_TYPE
    }

    /// Returns the persisted state of this keyring.
    #[must_use]
    pub fn serialize(&self) -> KeyringConfig {
        KeyringConfig {
            hd_path: self.hd_path.clone(),
            accounts: self.registry.accounts().to_vec(),
            device_id: self.device_id.clone(),
        }
    }

    /// Replaces the persisted state of this keyring.
    ///
    /// The bound signer, if any, is kept.
    pub fn deserialize(&mut self, config: KeyringConfig) {
        debug!(
            path = %config.hd_path,
            accounts = config.accounts.len(),
            "restoring keyring state"
        );
        self.hd_path = config.hd_path;
        self.registry = AccountRegistry::from_accounts(config.accounts);
        self.device_id = config.device_id.filter(|id| !id.is_empty());
    }

    /// Binds an external signer, replacing any previous one.
    pub fn bind(&mut self, signer: SignerHandle) {
        info!(accounts = self.registry.len(), "signer bound");
        self.signer = Some(signer);
    }

    /// Binds an external signer that identifies itself with a device id.
    ///
    /// A keyring that has never seen a device adopts `device_id`. An empty
    /// stored id counts as unpaired.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceMismatch`] if the keyring is paired with a
    /// different device. The current binding is left unchanged.
    pub fn bind_with_device_id(
        &mut self,
        signer: SignerHandle,
        device_id: impl Into<String>,
    ) -> Result<()> {
        let device_id = device_id.into();
        if let Some(expected) = &self.device_id
            && !expected.is_empty()
            && *expected != device_id
        {
            warn!(%expected, actual = %device_id, "refusing to bind a different device");
            return Err(Error::DeviceMismatch {
                expected: expected.clone(),
                actual: device_id,
            });
        }
        self.device_id = (!device_id.is_empty()).then_some(device_id);
        self.bind(signer);
        Ok(())
    }

    /// Returns `true` if a signer is bound.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.signer.is_some()
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> KeyringState {
        match (&self.signer, self.registry.is_empty()) {
            (None, _) => KeyringState::Uninitialized,
            (Some(_), true) => KeyringState::Ready,
            (Some(_), false) => KeyringState::LockedWithAccount,
        }
    }

    /// Returns the derivation path used for the next account.
    #[must_use]
    pub const fn hd_path(&self) -> &DerivationPath {
        &self.hd_path
    }

    /// Sets the derivation path used for the next account.
    pub fn set_hd_path(&mut self, hd_path: DerivationPath) {
        self.hd_path = hd_path;
    }

    /// Returns the id of the paired device, if any.
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Returns the managed addresses.
    #[must_use]
    pub fn accounts(&self) -> Vec<Address> {
        self.registry.addresses()
    }

    /// Returns `true` if the address is managed. The comparison ignores case.
    #[must_use]
    pub fn manages_account(&self, address: &Address) -> bool {
        self.registry.contains(address)
    }

    /// Asks the device for the address at a derivation path.
    ///
    /// The keyring state is not changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SignerNotBound`] without a signer and
    /// [`Error::Signer`] if the device fails.
    pub fn unlock(&self, hd_path: &DerivationPath) -> Result<Address> {
        let signer = self.signer()?;
        let account = signer.with(|device| device.get_address(hd_path))?;
        debug!(path = %hd_path, address = %account.address, "device returned address");
        Ok(account.address)
    }

    /// Adds `n` accounts from the device, at most one in total.
    ///
    /// `n == 0` returns the current addresses without touching the device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyAccounts`] if `n > 1` or an account is already
    /// managed, before any device request. Otherwise returns the errors of
    /// [`SigningKeyring::unlock`].
    pub fn add_accounts(&mut self, n: usize) -> Result<Vec<Address>> {
        self.registry.reserve(n)?;
        if n == 0 {
            return Ok(self.accounts());
        }
        let hd_path = self.hd_path.clone();
        let address = self.unlock(&hd_path)?;
        self.registry.add(address, hd_path)?;
        Ok(self.accounts())
    }

    /// Returns the first managed address, adding one from the device if none
    /// is managed yet.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`SigningKeyring::unlock`].
    pub fn default_account(&mut self) -> Result<Address> {
        if let Some(account) = self.registry.first() {
            return Ok(account.address);
        }
        let hd_path = self.hd_path.clone();
        let address = self.unlock(&hd_path)?;
        Ok(self.registry.add(address, hd_path)?.address)
    }

    /// Signs a transaction with a managed account.
    ///
    /// The device signs [`Transaction::unsigned_payload`]. The result carries
    /// the device's `r` and `s` unchanged and `v` encoded for the transaction
    /// type. The signature is not recovered.
    ///
    /// # Errors
    ///
    /// - [`Error::AccountNotFound`] if `address` is not managed
    /// - [`Error::SignerNotBound`] without a signer
    /// - [`Error::Signer`] if the device fails
    /// - [`Error::MalformedHex`] or [`Error::Recovery`] if the device output
    ///   cannot be assembled
    pub fn sign_transaction(
        &self,
        address: &Address,
        tx: &Transaction,
    ) -> Result<SignedTransaction> {
        let hd_path = self.registry.resolve_path(address)?;
        let signer = self.signer()?;
        let payload = hex::encode(digest::for_transaction(tx));

        debug!(%address, path = %hd_path, tx_type = ?tx.tx_type(), "signing transaction");
        let raw = signer.with(|device| device.sign_transaction(hd_path, &payload))?;
        assemble_transaction(tx, &raw)
    }

    /// Signs a personal message with a managed account.
    ///
    /// A `0x`-prefixed message is signed as the bytes it encodes, anything else
    /// as its UTF-8 bytes.
    ///
    /// # Errors
    ///
    /// - [`Error::AccountNotFound`] if `address` is not managed
    /// - [`Error::SignerNotBound`] without a signer
    /// - [`Error::MalformedHex`] if a prefixed message is not hex
    /// - [`Error::Signer`] if the device fails
    /// - [`Error::Recovery`] if the device output is not a usable signature
    /// - [`Error::SignatureMismatch`] if it was made by another key
    pub fn sign_personal_message(&self, address: &Address, message: &str) -> Result<Signature> {
        let hd_path = self.registry.resolve_path(address)?;
        let signer = self.signer()?;
        let bytes = digest::for_personal_message(message)?;
        let message_hex = hex::encode(&bytes);

        debug!(%address, path = %hd_path, len = bytes.len(), "signing personal message");
        let raw = signer.with(|device| device.sign_personal_message(hd_path, &message_hex))?;
        let signature = assemble_personal_or_typed_signature(&raw)?;

        let recovered = recover_personal_signature(&bytes, &signature)?;
        ensure_signed_by(*address, recovered)?;
        Ok(signature)
    }

    /// Same as [`SigningKeyring::sign_personal_message`].
    ///
    /// # Errors
    ///
    /// See [`SigningKeyring::sign_personal_message`].
    pub fn sign_message(&self, address: &Address, message: &str) -> Result<Signature> {
        self.sign_personal_message(address, message)
    }

    /// Signs EIP-712 typed data given as JSON.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedVersion`] unless `version` is `"V4"`, checked first
    /// - [`Error::Json`] if the JSON is not typed data
    /// - the errors of [`SigningKeyring::sign_typed`]
    ///
    /// # Example
    ///
    /// ```
    /// use hw_evm_keyring_core::{Address, Error, SigningKeyring};
    ///
    /// let keyring = SigningKeyring::new();
    /// let err = keyring
    ///     .sign_typed_data(&Address::zero(), "{}", "V3")
    ///     .unwrap_err();
    /// assert!(matches!(err, Error::UnsupportedVersion(_)));
    /// ```
    pub fn sign_typed_data(&self, address: &Address, json: &str, version: &str) -> Result<Signature> {
        let version = TypedDataVersion::from_str(version)?;
        version.ensure_supported()?;
        let data = TypedData::from_json(json)?;
        self.sign_typed(address, &data, version)
    }

    /// Signs parsed EIP-712 typed data.
    ///
    /// The device receives the domain separator and struct hash, not the data.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedVersion`] unless `version` is
    ///   [`TypedDataVersion::V4`]
    /// - [`Error::AccountNotFound`] if `address` is not managed
    /// - [`Error::SignerNotBound`] without a signer
    /// - [`Error::InvalidTypedData`] or [`Error::UndefinedType`] if the data
    ///   cannot be hashed
    /// - [`Error::Signer`] if the device fails
    /// - [`Error::Recovery`] if the device output is not a usable signature
    /// - [`Error::SignatureMismatch`] if it was made by another key
    pub fn sign_typed(
        &self,
        address: &Address,
        data: &TypedData,
        version: TypedDataVersion,
    ) -> Result<Signature> {
        version.ensure_supported()?;
        let hd_path = self.registry.resolve_path(address)?;
        let signer = self.signer()?;
        let digest = digest::for_typed_data(data, version)?;
        let domain_separator_hex = digest.domain_separator_hex();
        let struct_hash_hex = digest.struct_hash_hex();

        debug!(
            %address,
            path = %hd_path,
            primary_type = %data.primary_type,
            "signing typed data"
        );
        let raw = signer.with(|device| {
            device.sign_typed_data_hash(hd_path, &domain_separator_hex, &struct_hash_hex)
        })?;
        let signature = assemble_personal_or_typed_signature(&raw)?;

        let recovered = recover_typed_data_signature(&digest, &signature)?;
        ensure_signed_by(*address, recovered)?;
        Ok(signature)
    }

    /// Removes every account and the paired device id.
    ///
    /// The derivation path and the signer binding are kept.
    pub fn forget(&mut self) {
        info!(accounts = self.registry.len(), "forgetting device");
        self.registry.reset();
        self.device_id = None;
    }

    fn signer(&self) -> Result<&SignerHandle> {
        self.signer.as_ref().ok_or(Error::SignerNotBound)
    }
}

fn ensure_signed_by(expected: Address, recovered: Address) -> Result<()> {
    if recovered != expected {
        warn!(%expected, %recovered, "signature recovered to a different address");
        return Err(Error::SignatureMismatch {
            expected,
            recovered,
        });
    }
    Ok(())
}
