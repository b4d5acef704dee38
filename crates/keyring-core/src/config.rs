//! Persisted keyring state.
//!
//! The keyring has no configuration files of its own. Its state round-trips
//! through this JSON shape:
//!
//! ```json
//! {
//!   "hdPath": "m/44'/60'/0'/0/0",
//!   "accounts": [
//!     { "address": "0x...", "hdPath": "m/44'/60'/0'/0/0" }
//!   ],
//!   "deviceId": "device_1"
//! }
//! ```
//!
//! `derivationPath` is accepted in place of `hdPath`. An absent or empty
//! `hdPath` falls back to [`DEFAULT_HD_PATH`], absent accounts to an empty
//! list and an absent or empty `deviceId` to none.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::registry::{Account, DEFAULT_HD_PATH, DerivationPath};

/// The serializable state of a hardware keyring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyringConfig {
    /// The derivation path used for the next account.
    #[serde(
        default,
        alias = "derivationPath",
        deserialize_with = "deserialize_hd_path"
    )]
    pub hd_path: DerivationPath,

    /// The managed accounts.
    #[serde(default)]
    pub accounts: Vec<Account>,

    /// The identifier of the paired device, if any.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_device_id"
    )]
    pub device_id: Option<String>,
}

impl KeyringConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the JSON is malformed or an account
    /// address is not valid hex.
    ///
    /// # Example
    ///
    /// ```
    /// use hw_evm_keyring_core::KeyringConfig;
    ///
    /// let config = KeyringConfig::from_json(r#"{"hdPath": ""}"#).unwrap();
    /// assert_eq!(config.hd_path.as_str(), "m/44'/60'/0'/0/0");
    /// assert!(config.accounts.is_empty());
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the configuration to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Reads `hdPath`, mapping `null` and `""` to the default path.
fn deserialize_hd_path<'de, D>(deserializer: D) -> core::result::Result<DerivationPath, D::Error>
where
    D: Deserializer<'de>,
{
    let path = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    if path.trim().is_empty() {
        return Ok(DerivationPath::default());
    }
    DerivationPath::new(path).map_err(serde::de::Error::custom)
}

/// Reads `deviceId`, mapping `null` and `""` to an unpaired keyring.
fn deserialize_device_id<'de, D>(
    deserializer: D,
) -> core::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|id| !id.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    #[test]
    fn empty_object_uses_defaults() {
        let config = KeyringConfig::from_json("{}").unwrap();
        assert_eq!(config, KeyringConfig::default());
        assert_eq!(config.hd_path.as_str(), DEFAULT_HD_PATH);
        assert!(config.accounts.is_empty());
        assert!(config.device_id.is_none());
    }

    #[test]
    fn null_and_empty_paths_use_default() {
        for json in [r#"{"hdPath": null}"#, r#"{"hdPath": ""}"#] {
            let config = KeyringConfig::from_json(json).unwrap();
            assert_eq!(config.hd_path.as_str(), DEFAULT_HD_PATH);
        }
    }

    #[test]
    fn derivation_path_alias() {
        let config = KeyringConfig::from_json(r#"{"derivationPath": "m/44'/60'/1'/0/0"}"#).unwrap();
        assert_eq!(config.hd_path.as_str(), "m/44'/60'/1'/0/0");
    }

    #[test]
    fn full_config_roundtrip() {
        let json = r#"{
            "hdPath": "m/44'/60'/0'/0/0",
            "accounts": [
                {
                    "address": "0x9e10effa844d7399cdc555613b23a8499e04e386",
                    "hdPath": "m/44'/60'/0'/0/0"
                }
            ],
            "deviceId": "device_1"
        }"#;
        let config = KeyringConfig::from_json(json).unwrap();
        assert_eq!(config.device_id.as_deref(), Some("device_1"));
        assert_eq!(
            config.accounts[0].address,
            Address::from_hex("0x9e10effa844d7399cdc555613b23a8499e04e386").unwrap()
        );

        let back = KeyringConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn device_id_is_omitted_when_absent() {
        let json = KeyringConfig::default().to_json().unwrap();
        assert!(!json.contains("deviceId"));
        assert!(json.contains("\"hdPath\":\"m/44'/60'/0'/0/0\""));
    }

    #[test]
    fn empty_device_id_means_unpaired() {
        for json in [r#"{"deviceId": ""}"#, r#"{"deviceId": null}"#] {
            let config = KeyringConfig::from_json(json).unwrap();
            assert!(config.device_id.is_none());
        }
    }

    #[test]
    fn malformed_account_address_is_rejected() {
        let json = r#"{"accounts": [{"address": "0x1", "hdPath": "m/0"}]}"#;
        assert!(matches!(
            KeyringConfig::from_json(json),
            Err(crate::error::Error::Json(_))
        ));
    }
}
