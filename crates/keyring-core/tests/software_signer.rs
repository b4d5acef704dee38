//! End-to-end keyring flows against an in-memory secp256k1 signer.

// Silence unused crate dependency warnings for test binary
use alloy_rlp as _;
use serde as _;

use std::collections::BTreeMap;
use std::fmt;

use alloy_primitives::{Bytes, U256, eip191_hash_message, keccak256};
use hw_evm_keyring_core::signer::{
    DeviceAccount, ExternalSigner, ScriptedSigner, SignerHandle, SignerResult,
};
use hw_evm_keyring_core::{
    Account, Address, DerivationPath, Eip1559Transaction, Error, KeyringConfig, KeyringState,
    LegacyTransaction, RawSignature, SigningKeyring, Transaction, TypedData,
};
use k256::ecdsa::SigningKey;
use proptest::prelude::*;
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
enum SoftwareError {
    #[error("no key at path {0}")]
    UnknownPath(String),
    #[error("invalid hex from keyring: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("signing failed: {0}")]
    Ecdsa(#[from] k256::ecdsa::Error),
}

/// Holds one secp256k1 key per derivation path and signs the way a hardware
/// wallet app does: `v` is `27 + parity` for messages and bare parity for
/// transactions.
struct SoftwareSigner {
    keys: BTreeMap<DerivationPath, SigningKey>,
}

impl fmt::Debug for SoftwareSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareSigner")
            .field("paths", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SoftwareSigner {
    fn new() -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(
            DerivationPath::default(),
            SigningKey::from_slice(&[0x46; 32]).unwrap(),
        );
        keys.insert(
            DerivationPath::new("m/44'/60'/1'/0/0").unwrap(),
            SigningKey::from_slice(&[0x07; 32]).unwrap(),
        );
        Self { keys }
    }

    fn key(&self, path: &DerivationPath) -> Result<&SigningKey, SoftwareError> {
        self.keys
            .get(path)
            .ok_or_else(|| SoftwareError::UnknownPath(path.to_string()))
    }

    fn sign(
        &self,
        path: &DerivationPath,
        prehash: &[u8],
        v_offset: u64,
    ) -> Result<RawSignature, SoftwareError> {
        let (sig, recid) = self.key(path)?.sign_prehash_recoverable(prehash)?;
        let bytes = sig.to_bytes();
        Ok(RawSignature::new(
            hex::encode(&bytes[..32]),
            hex::encode(&bytes[32..]),
            v_offset + u64::from(recid.to_byte()),
        ))
    }
}

impl ExternalSigner for SoftwareSigner {
    fn get_address(&mut self, path: &DerivationPath) -> SignerResult<DeviceAccount> {
        let key = self.key(path)?.verifying_key();
        Ok(DeviceAccount {
            address: Address::from_public_key(key),
            public_key: hex::encode(key.to_encoded_point(false).as_bytes()),
            chain_code: None,
        })
    }

    fn sign_transaction(
        &mut self,
        path: &DerivationPath,
        raw_tx_hex: &str,
    ) -> SignerResult<RawSignature> {
        let payload = hex::decode(raw_tx_hex).map_err(SoftwareError::from)?;
        Ok(self.sign(path, keccak256(payload).as_slice(), 0)?)
    }

    fn sign_personal_message(
        &mut self,
        path: &DerivationPath,
        message_hex: &str,
    ) -> SignerResult<RawSignature> {
        let message = hex::decode(message_hex).map_err(SoftwareError::from)?;
        Ok(self.sign(path, eip191_hash_message(message).as_slice(), 27)?)
    }

    fn sign_typed_data_hash(
        &mut self,
        path: &DerivationPath,
        domain_separator_hex: &str,
        struct_hash_hex: &str,
    ) -> SignerResult<RawSignature> {
        let mut preimage = vec![0x19, 0x01];
        preimage.extend(hex::decode(domain_separator_hex).map_err(SoftwareError::from)?);
        preimage.extend(hex::decode(struct_hash_hex).map_err(SoftwareError::from)?);
        Ok(self.sign(path, keccak256(preimage).as_slice(), 27)?)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn software_keyring() -> (SigningKeyring, Address) {
    init_tracing();
    let mut keyring = SigningKeyring::new();
    keyring.bind(SignerHandle::new(SoftwareSigner::new()));
    let address = keyring.default_account().unwrap();
    (keyring, address)
}

fn mail() -> TypedData {
    TypedData::from_value(json!({
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "chainId", "type": "uint256"}
            ],
            "Person": [
                {"name": "name", "type": "string"},
                {"name": "wallet", "type": "address"}
            ],
            "Mail": [
                {"name": "from", "type": "Person"},
                {"name": "to", "type": "Person"},
                {"name": "contents", "type": "string"}
            ]
        },
        "primaryType": "Mail",
        "domain": {"name": "Ether Mail", "chainId": 1},
        "message": {
            "from": {"name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"},
            "to": {"name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB"},
            "contents": "Hello, Bob!"
        }
    }))
    .unwrap()
}

#[test]
fn default_account_comes_from_the_default_path() {
    let (keyring, address) = software_keyring();
    assert_eq!(
        address,
        "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f".parse().unwrap()
    );
    assert_eq!(keyring.state(), KeyringState::LockedWithAccount);
    assert_eq!(keyring.accounts(), vec![address]);
}

#[test]
fn personal_message_roundtrip() {
    let (keyring, address) = software_keyring();

    for message in ["hello", "0x5369676e", "0x"] {
        let signature = keyring.sign_personal_message(&address, message).unwrap();
        assert!(signature.recovery_id() <= 1);
        assert_eq!(keyring.sign_message(&address, message).unwrap(), signature);
    }
}

#[test]
fn typed_data_roundtrip() {
    let (keyring, address) = software_keyring();
    let data = mail();

    let signature = keyring
        .sign_typed_data(&address, &data.to_json().unwrap(), "V4")
        .unwrap();
    let recovered = hw_evm_keyring_core::crypto::recover_typed_data_signature(
        &data.digest().unwrap(),
        &signature,
    )
    .unwrap();
    assert_eq!(recovered, address);
}

#[test]
fn eip155_transaction_recovers_to_account() {
    let (keyring, address) = software_keyring();
    let tx = Transaction::Legacy(LegacyTransaction {
        chain_id: Some(1),
        nonce: 9,
        gas_price: U256::from(20_000_000_000u64),
        gas_limit: 21000,
        to: Some(Address::new([0x35; 20])),
        value: U256::from(1_000_000_000_000_000_000u128),
        data: Bytes::new(),
    });

    let signed = keyring.sign_transaction(&address, &tx).unwrap();
    assert!(signed.v() == 37 || signed.v() == 38);
    assert_eq!(signed.recover_signer().unwrap(), address);
}

#[test]
fn eip1559_transaction_recovers_to_account() {
    let (keyring, address) = software_keyring();
    let tx = Transaction::Eip1559(Eip1559Transaction {
        chain_id: 137,
        nonce: 3,
        max_priority_fee_per_gas: U256::from(1_500_000_000u64),
        max_fee_per_gas: U256::from(30_000_000_000u64),
        gas_limit: 60_000,
        to: None,
        value: U256::ZERO,
        data: Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]),
        access_list: vec![],
    });

    let signed = keyring.sign_transaction(&address, &tx).unwrap();
    assert!(signed.v() <= 1);
    assert_eq!(signed.recover_signer().unwrap(), address);
    assert_eq!(signed.rlp()[0], 0x02);
}

#[test]
fn key_at_another_path_is_a_mismatch() {
    init_tracing();
    let registered: Address = "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f".parse().unwrap();
    // The persisted path points at a different key on the device.
    let mut keyring = SigningKeyring::from_config(KeyringConfig {
        accounts: vec![Account::new(
            registered,
            DerivationPath::new("m/44'/60'/1'/0/0").unwrap(),
        )],
        ..KeyringConfig::default()
    });
    keyring.bind(SignerHandle::new(SoftwareSigner::new()));

    let err = keyring.sign_personal_message(&registered, "hello").unwrap_err();
    assert!(matches!(
        err,
        Error::SignatureMismatch { expected, .. } if expected == registered
    ));

    let err = keyring.sign_typed(&registered, &mail(), "V4".parse().unwrap()).unwrap_err();
    assert!(matches!(err, Error::SignatureMismatch { .. }));
}

#[test]
fn device_errors_surface_unchanged() {
    init_tracing();
    let mut keyring = SigningKeyring::new();
    keyring.bind(SignerHandle::new(SoftwareSigner::new()));
    keyring.set_hd_path(DerivationPath::new("m/44'/60'/9'/0/0").unwrap());

    let source = match keyring.add_accounts(1) {
        Err(Error::Signer(source)) => source,
        other => panic!("expected a signer error, got {other:?}"),
    };
    assert!(matches!(
        source.downcast_ref::<SoftwareError>(),
        Some(SoftwareError::UnknownPath(path)) if path == "m/44'/60'/9'/0/0"
    ));
    assert_eq!(keyring.state(), KeyringState::Ready);
}

#[test]
fn forget_with_two_accounts_clears_everything() {
    let config = KeyringConfig::from_json(
        r#"{
            "hdPath": "m/44'/60'/0'/0/0",
            "accounts": [
                {"address": "0x0000000000000000000000000000000000000001", "hdPath": "m/44'/60'/0'/0/0"},
                {"address": "0x0000000000000000000000000000000000000002", "hdPath": "m/44'/60'/1'/0/0"}
            ],
            "deviceId": "device_1"
        }"#,
    )
    .unwrap();
    let mut keyring = SigningKeyring::from_config(config);
    keyring.bind(SignerHandle::new(ScriptedSigner::new()));
    assert_eq!(keyring.accounts().len(), 2);

    keyring.forget();
    assert!(keyring.accounts().is_empty());
    assert!(keyring.device_id().is_none());
    assert_eq!(keyring.serialize().to_json().unwrap(), r#"{"hdPath":"m/44'/60'/0'/0/0","accounts":[]}"#);
}

#[test]
fn shared_handle_serializes_requests() {
    init_tracing();
    let handle = SignerHandle::new(SoftwareSigner::new());
    let mut first = SigningKeyring::new();
    first.bind(handle.clone());
    let address = first.default_account().unwrap();

    let threads: Vec<_> = (0..4)
        .map(|i| {
            let keyring = first.clone();
            std::thread::spawn(move || {
                keyring
                    .sign_personal_message(&address, &format!("message {i}"))
                    .unwrap()
            })
        })
        .collect();
    for thread in threads {
        assert!(thread.join().unwrap().recovery_id() <= 1);
    }
}

fn arb_config() -> impl Strategy<Value = KeyringConfig> {
    let path = "m(/[0-9]{1,3}'?){1,5}";
    (
        path,
        proptest::collection::vec((any::<[u8; 20]>(), path), 0..3),
        proptest::option::of("[a-z0-9_]{0,16}"),
    )
        .prop_map(|(hd_path, accounts, device_id)| KeyringConfig {
            hd_path: DerivationPath::new(hd_path).unwrap(),
            accounts: accounts
                .into_iter()
                .map(|(bytes, path)| {
                    Account::new(Address::new(bytes), DerivationPath::new(path).unwrap())
                })
                .collect(),
            device_id,
        })
}

proptest! {
    #[test]
    fn config_json_roundtrip(config in arb_config()) {
        let json = config.to_json().unwrap();
        let expected = KeyringConfig {
            device_id: config.device_id.clone().filter(|id| !id.is_empty()),
            ..config
        };
        prop_assert_eq!(KeyringConfig::from_json(&json).unwrap(), expected);
    }

    #[test]
    fn keyring_state_roundtrip(config in arb_config()) {
        let keyring = SigningKeyring::from_config(config.clone());
        let restored = SigningKeyring::from_config(keyring.serialize());
        prop_assert_eq!(restored.serialize(), keyring.serialize());
        prop_assert_eq!(
            restored.device_id(),
            config.device_id.as_deref().filter(|id| !id.is_empty())
        );
        for account in &config.accounts {
            prop_assert!(restored.manages_account(&account.address));
        }
    }
}
