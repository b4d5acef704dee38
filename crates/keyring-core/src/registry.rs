//! Managed accounts and their derivation paths.
//!
//! A hardware keyring manages at most one account at a time. The registry
//! records which address came from which derivation path so that signing
//! requests can be routed back to the right key on the device.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::address::Address;
use crate::error::{Error, Result};

/// The derivation path used when none is configured.
pub const DEFAULT_HD_PATH: &str = "m/44'/60'/0'/0/0";

/// A BIP-32 derivation path, kept as the opaque string the device expects.
///
/// The only requirement is that the path is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DerivationPath(String);

impl DerivationPath {
    /// Creates a derivation path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDerivationPath`] if the path is empty or only
    /// whitespace.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(Error::InvalidDerivationPath(path));
        }
        Ok(Self(path))
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DerivationPath {
    fn default() -> Self {
        Self(DEFAULT_HD_PATH.to_string())
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DerivationPath {
    type Error = Error;

    fn try_from(path: String) -> Result<Self> {
        Self::new(path)
    }
}

impl TryFrom<&str> for DerivationPath {
    type Error = Error;

    fn try_from(path: &str) -> Result<Self> {
        Self::new(path)
    }
}

impl From<DerivationPath> for String {
    fn from(path: DerivationPath) -> Self {
        path.0
    }
}

/// A managed account: an address and the path it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The account address.
    pub address: Address,

    /// The derivation path that produced the address.
    #[serde(rename = "hdPath", alias = "derivationPath")]
    pub hd_path: DerivationPath,
}

impl Account {
    /// Creates an account.
    #[must_use]
    pub const fn new(address: Address, hd_path: DerivationPath) -> Self {
        Self { address, hd_path }
    }
}

/// The set of accounts a keyring manages.
///
/// Additions are limited to a single account. A registry restored from
/// persisted state may hold more than one, and [`AccountRegistry::reset`]
/// clears whatever is there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountRegistry {
    accounts: Vec<Account>,
}

impl AccountRegistry {
    /// The maximum number of accounts that can be added.
    pub const MAX_ACCOUNTS: usize = 1;

    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            accounts: Vec::new(),
        }
    }

    /// Restores a registry from persisted accounts.
    ///
    /// The single-account limit is not applied; duplicate addresses keep only
    /// their first entry.
    #[must_use]
    pub fn from_accounts(accounts: Vec<Account>) -> Self {
        let mut registry = Self::new();
        for account in accounts {
            if registry.contains(&account.address) {
                debug!(address = %account.address, "skipping duplicate persisted account");
                continue;
            }
            registry.accounts.push(account);
        }
        registry
    }

    /// Returns the derivation path of a managed address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] if the address is not managed.
    pub fn resolve_path(&self, address: &Address) -> Result<&DerivationPath> {
        self.accounts
            .iter()
            .find(|account| account.address == *address)
            .map(|account| &account.hd_path)
            .ok_or(Error::AccountNotFound(*address))
    }

    /// Checks that `n` more accounts could be added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyAccounts`] if `n` exceeds the limit, or if the
    /// registry is already full and `n` is not zero.
    pub fn reserve(&self, n: usize) -> Result<()> {
        if n > Self::MAX_ACCOUNTS || (n > 0 && self.accounts.len() >= Self::MAX_ACCOUNTS) {
            return Err(Error::TooManyAccounts);
        }
        Ok(())
    }

    /// Adds an account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyAccounts`] if the registry already holds an
    /// account, including when it holds this same address.
    pub fn add(&mut self, address: Address, hd_path: DerivationPath) -> Result<&Account> {
        self.reserve(1)?;
        info!(%address, path = %hd_path, "account added");
        self.accounts.push(Account::new(address, hd_path));
        Ok(&self.accounts[self.accounts.len() - 1])
    }

    /// Removes every account.
    pub fn reset(&mut self) {
        if !self.accounts.is_empty() {
            info!(count = self.accounts.len(), "accounts cleared");
        }
        self.accounts.clear();
    }

    /// Returns `true` if the address is managed.
    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.accounts.iter().any(|account| account.address == *address)
    }

    /// Returns the managed addresses in insertion order.
    #[must_use]
    pub fn addresses(&self) -> Vec<Address> {
        self.accounts.iter().map(|account| account.address).collect()
    }

    /// Returns the managed accounts in insertion order.
    #[must_use]
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// Returns the first managed account, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Account> {
        self.accounts.first()
    }

    /// Returns the number of managed accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns `true` if no account is managed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn path(s: &str) -> DerivationPath {
        DerivationPath::new(s).unwrap()
    }

    #[test]
    fn derivation_path_validation() {
        assert_eq!(DerivationPath::default().as_str(), DEFAULT_HD_PATH);
        assert!(matches!(
            DerivationPath::new(""),
            Err(Error::InvalidDerivationPath(_))
        ));
        assert!(matches!(
            DerivationPath::new("  "),
            Err(Error::InvalidDerivationPath(_))
        ));
        assert_eq!(path("m/44'/60'/1'/0/0").to_string(), "m/44'/60'/1'/0/0");
    }

    #[test]
    fn derivation_path_serde() {
        let p: DerivationPath = serde_json::from_str("\"m/44'/60'/0'\"").unwrap();
        assert_eq!(p.as_str(), "m/44'/60'/0'");
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"m/44'/60'/0'\"");
        assert!(serde_json::from_str::<DerivationPath>("\"\"").is_err());
    }

    #[test]
    fn add_and_resolve() {
        let mut registry = AccountRegistry::new();
        registry.add(address(1), path(DEFAULT_HD_PATH)).unwrap();

        assert_eq!(registry.resolve_path(&address(1)).unwrap().as_str(), DEFAULT_HD_PATH);
        assert!(registry.contains(&address(1)));
        assert_eq!(registry.addresses(), vec![address(1)]);
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let mut registry = AccountRegistry::new();
        let lower = Address::from_hex("0xe908e4378431418759b4f87b4bf7966e8aaa5cf2").unwrap();
        registry.add(lower, path(DEFAULT_HD_PATH)).unwrap();

        let upper = Address::from_hex("0xE908E4378431418759B4F87B4BF7966E8AAA5CF2").unwrap();
        assert!(registry.resolve_path(&upper).is_ok());
    }

    #[test]
    fn resolve_unknown_address() {
        let registry = AccountRegistry::new();
        assert!(matches!(
            registry.resolve_path(&address(9)),
            Err(Error::AccountNotFound(a)) if a == address(9)
        ));
    }

    #[test]
    fn second_account_is_rejected() {
        let mut registry = AccountRegistry::new();
        registry.add(address(1), path(DEFAULT_HD_PATH)).unwrap();

        assert!(matches!(
            registry.add(address(2), path("m/44'/60'/1'/0/0")),
            Err(Error::TooManyAccounts)
        ));
        // Same address again is rejected the same way.
        assert!(matches!(
            registry.add(address(1), path(DEFAULT_HD_PATH)),
            Err(Error::TooManyAccounts)
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reserve_limits() {
        let mut registry = AccountRegistry::new();
        assert!(registry.reserve(0).is_ok());
        assert!(registry.reserve(1).is_ok());
        assert!(matches!(registry.reserve(2), Err(Error::TooManyAccounts)));

        registry.add(address(1), path(DEFAULT_HD_PATH)).unwrap();
        assert!(registry.reserve(0).is_ok());
        assert!(matches!(registry.reserve(1), Err(Error::TooManyAccounts)));
    }

    #[test]
    fn restored_registry_may_hold_several_accounts() {
        let mut registry = AccountRegistry::from_accounts(vec![
            Account::new(address(1), path(DEFAULT_HD_PATH)),
            Account::new(address(2), path("m/44'/60'/1'/0/0")),
            Account::new(address(1), path("m/44'/60'/2'/0/0")),
        ]);
        assert_eq!(registry.addresses(), vec![address(1), address(2)]);
        assert_eq!(registry.resolve_path(&address(1)).unwrap().as_str(), DEFAULT_HD_PATH);

        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.first().is_none());
    }

    #[test]
    fn account_serde_accepts_alias() {
        let account: Account = serde_json::from_str(
            r#"{"address":"0xe908e4378431418759b4f87b4bf7966e8aaa5cf2","derivationPath":"m/0"}"#,
        )
        .unwrap();
        assert_eq!(account.hd_path.as_str(), "m/0");

        let json = serde_json::to_string(&account).unwrap();
        assert!(json.contains("\"hdPath\":\"m/0\""));
    }
}
