//! EIP-712 typed structured data hashing.
//!
//! This module implements version 4 of [EIP-712] typed data hashing, the
//! form hardware signers accept as a pair of pre-computed hashes.
//!
//! # Overview
//!
//! EIP-712 defines a standard for hashing and signing typed data, consisting of:
//!
//! 1. **Domain Separator**: Identifies the DApp and prevents replay across apps
//! 2. **Type Definitions**: Describe the structure of the data being signed
//! 3. **Message Data**: The actual data conforming to the type definitions
//!
//! The device receives `domainSeparator` and `hashStruct(message)` separately
//! and signs:
//!
//! ```text
//! keccak256("\x19\x01" || domainSeparator || hashStruct(message))
//! ```
//!
//! # Encoding Rules
//!
//! - `encodeType` lists the primary type followed by every type it depends on,
//!   directly or transitively, sorted by name
//! - Atomic values (`bool`, `address`, `uintN`, `intN`, `bytesN`) encode as a
//!   single 32-byte word; `intN` uses two's complement
//! - `string` and `bytes` encode as the Keccak-256 of their contents
//! - Arrays (`T[]`, `T[n]`) encode as the Keccak-256 of their concatenated
//!   element encodings
//! - Nested structs encode as their `hashStruct`; a missing or `null` struct
//!   encodes as the zero word
//! - Message fields not declared by the type are ignored
//!
//! # Example
//!
//! ```
//! use hw_evm_keyring_core::TypedData;
//! use serde_json::json;
//!
//! let typed_data = TypedData::from_value(json!({
//!     "types": {
//!         "EIP712Domain": [
//!             {"name": "name", "type": "string"},
//!             {"name": "version", "type": "string"},
//!             {"name": "chainId", "type": "uint256"}
//!         ],
//!         "Person": [
//!             {"name": "name", "type": "string"},
//!             {"name": "wallet", "type": "address"}
//!         ]
//!     },
//!     "primaryType": "Person",
//!     "domain": {"name": "My DApp", "version": "1", "chainId": 1},
//!     "message": {
//!         "name": "Alice",
//!         "wallet": "0x0000000000000000000000000000000000000001"
//!     }
//! }))
//! .unwrap();
//!
//! let digest = typed_data.digest().unwrap();
//! assert_eq!(digest.signing_hash(), typed_data.signing_hash().unwrap());
//! ```
//!
//! [EIP-712]: https://eips.ethereum.org/EIPS/eip-712

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use alloy_primitives::{B256, I256, U256, keccak256};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::address::Address;
use crate::codec::{decode_hex, is_hex_prefixed, strip_hex_prefix};
use crate::error::{Error, Result};

/// The name of the domain type.
pub const DOMAIN_TYPE: &str = "EIP712Domain";

/// A typed-data version name.
///
/// Only [`TypedDataVersion::V4`] can be hashed; the older names exist so that
/// they can be recognized and rejected explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypedDataVersion {
    /// The original, untyped array format.
    V1,
    /// EIP-712 without array or recursive struct support.
    V3,
    /// Full EIP-712 with arrays and recursive structs.
    V4,
}

impl TypedDataVersion {
    /// Returns the canonical name of this version.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "V1",
            Self::V3 => "V3",
            Self::V4 => "V4",
        }
    }

    /// Fails unless this is [`TypedDataVersion::V4`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedVersion`] for `V1` and `V3`.
    pub fn ensure_supported(self) -> Result<()> {
        match self {
            Self::V4 => Ok(()),
            other => Err(Error::UnsupportedVersion(other.as_str().to_string())),
        }
    }
}

impl FromStr for TypedDataVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "V1" => Ok(Self::V1),
            "V3" => Ok(Self::V3),
            "V4" => Ok(Self::V4),
            other => Err(Error::UnsupportedVersion(other.to_string())),
        }
    }
}

/// The pair of hashes a hardware signer needs to sign typed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypedDataDigest {
    /// `hashStruct(EIP712Domain)`.
    pub domain_separator: B256,
    /// `hashStruct(message)` under the primary type.
    pub struct_hash: B256,
}

impl TypedDataDigest {
    /// Returns `keccak256(0x1901 || domainSeparator || structHash)`.
    #[must_use]
    pub fn signing_hash(&self) -> B256 {
        let mut data = [0u8; 66];
        data[0] = 0x19;
        data[1] = 0x01;
        data[2..34].copy_from_slice(self.domain_separator.as_slice());
        data[34..].copy_from_slice(self.struct_hash.as_slice());
        keccak256(data)
    }

    /// Returns the domain separator as hex without a `0x` prefix.
    #[must_use]
    pub fn domain_separator_hex(&self) -> String {
        hex::encode(self.domain_separator)
    }

    /// Returns the struct hash as hex without a `0x` prefix.
    #[must_use]
    pub fn struct_hash_hex(&self) -> String {
        hex::encode(self.struct_hash)
    }
}

/// The EIP-712 domain separator parameters.
///
/// The domain separator is used to prevent signature replay attacks across
/// different applications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Domain {
    /// The human-readable name of the signing domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The version of the signing domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// The chain ID where signatures are valid.
    ///
    /// Accepted as a number, a decimal string or a `0x` hex string.
    #[serde(
        default,
        deserialize_with = "deserialize_chain_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub chain_id: Option<u64>,

    /// The address of the contract verifying the signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifying_contract: Option<String>,

    /// A disambiguating salt for the protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

impl Eip712Domain {
    /// Returns the domain as a JSON object, for hashing under a declared type.
    fn to_value(&self) -> Value {
        let mut obj = Map::new();
        if let Some(ref name) = self.name {
            obj.insert("name".to_string(), Value::from(name.as_str()));
        }
        if let Some(ref version) = self.version {
            obj.insert("version".to_string(), Value::from(version.as_str()));
        }
        if let Some(chain_id) = self.chain_id {
            obj.insert("chainId".to_string(), Value::from(chain_id));
        }
        if let Some(ref contract) = self.verifying_contract {
            obj.insert("verifyingContract".to_string(), Value::from(contract.as_str()));
        }
        if let Some(ref salt) = self.salt {
            obj.insert("salt".to_string(), Value::from(salt.as_str()));
        }
        Value::Object(obj)
    }
}

fn deserialize_chain_id<'de, D>(deserializer: D) -> core::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ChainId {
        Number(u64),
        Text(String),
    }

    match Option::<ChainId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(ChainId::Number(n)) => Ok(Some(n)),
        Some(ChainId::Text(s)) => {
            let parsed = if is_hex_prefixed(&s) {
                u64::from_str_radix(strip_hex_prefix(&s), 16)
            } else {
                s.parse()
            };
            parsed
                .map(Some)
                .map_err(|e| serde::de::Error::custom(format!("invalid chainId {s:?}: {e}")))
        }
    }
}

/// A type field definition for EIP-712.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeField {
    /// The name of the field.
    pub name: String,

    /// The type of the field (e.g., "string", "uint256", "address").
    #[serde(rename = "type")]
    pub field_type: String,
}

impl TypeField {
    /// Creates a field definition.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
        }
    }
}

/// Typed structured data for EIP-712 signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    /// The type definitions, keyed by type name.
    pub types: BTreeMap<String, Vec<TypeField>>,

    /// The primary type being signed.
    pub primary_type: String,

    /// The EIP-712 domain.
    #[serde(default)]
    pub domain: Eip712Domain,

    /// The message data.
    #[serde(default)]
    pub message: Value,
}

impl TypedData {
    /// Creates a new typed data instance.
    #[must_use]
    pub const fn new(
        domain: Eip712Domain,
        types: BTreeMap<String, Vec<TypeField>>,
        primary_type: String,
        message: Value,
    ) -> Self {
        Self {
            types,
            primary_type,
            domain,
            message,
        }
    }

    /// Parses typed data from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if parsing fails.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parses typed data from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the value does not have the typed data
    /// shape.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Serializes the typed data to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Computes the domain separator.
    ///
    /// Uses the declared `EIP712Domain` type. Typed data that declares none is
    /// hashed under an empty `EIP712Domain()` type, so the domain fields do
    /// not take part.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTypedData`] if the domain does not match its
    /// type.
    pub fn domain_separator(&self) -> Result<B256> {
        if self.types.contains_key(DOMAIN_TYPE) {
            self.hash_struct(DOMAIN_TYPE, &self.domain.to_value())
        } else {
            let type_hash = keccak256(format_type(DOMAIN_TYPE, &[]).as_bytes());
            Ok(keccak256(type_hash.as_slice()))
        }
    }

    /// Computes `hashStruct(message)` under the primary type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndefinedType`] if a referenced type is missing, or
    /// [`Error::InvalidTypedData`] if the message does not match its type.
    pub fn struct_hash(&self) -> Result<B256> {
        self.hash_struct(&self.primary_type, &self.message)
    }

    /// Computes both hashes a hardware signer needs.
    ///
    /// # Errors
    ///
    /// See [`Self::domain_separator`] and [`Self::struct_hash`].
    pub fn digest(&self) -> Result<TypedDataDigest> {
        Ok(TypedDataDigest {
            domain_separator: self.domain_separator()?,
            struct_hash: self.struct_hash()?,
        })
    }

    /// Computes the signing hash for this typed data.
    ///
    /// The hash is computed as:
    /// `keccak256("\x19\x01" || domainSeparator || hashStruct(message))`
    ///
    /// # Errors
    ///
    /// See [`Self::digest`].
    pub fn signing_hash(&self) -> Result<B256> {
        self.digest().map(|digest| digest.signing_hash())
    }

    /// Encodes a type with all of its dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndefinedType`] if `type_name` is not defined.
    ///
    /// # Example
    ///
    /// ```
    /// use hw_evm_keyring_core::TypedData;
    /// use serde_json::json;
    ///
    /// let typed_data = TypedData::from_value(json!({
    ///     "types": {
    ///         "Mail": [{"name": "from", "type": "Person"}],
    ///         "Person": [{"name": "wallet", "type": "Wallet"}],
    ///         "Wallet": [{"name": "owner", "type": "address"}]
    ///     },
    ///     "primaryType": "Mail"
    /// }))
    /// .unwrap();
    ///
    /// assert_eq!(
    ///     typed_data.encode_type("Mail").unwrap(),
    ///     "Mail(Person from)Person(Wallet wallet)Wallet(address owner)"
    /// );
    /// ```
    pub fn encode_type(&self, type_name: &str) -> Result<String> {
        let fields = self.fields(type_name)?;

        let mut deps = BTreeSet::new();
        self.collect_dependencies(type_name, &mut deps);
        deps.remove(type_name);

        let mut result = format_type(type_name, fields);
        for dep in deps {
            result.push_str(&format_type(dep, self.fields(dep)?));
        }
        Ok(result)
    }

    /// Computes the type hash for a given type name.
    ///
    /// `typeHash = keccak256(encodeType(type))`
    fn type_hash(&self, type_name: &str) -> Result<B256> {
        let type_string = self.encode_type(type_name)?;
        Ok(keccak256(type_string.as_bytes()))
    }

    /// Computes the hash of a struct.
    ///
    /// `hashStruct(s) = keccak256(typeHash || encodeData(s))`
    fn hash_struct(&self, type_name: &str, data: &Value) -> Result<B256> {
        let type_hash = self.type_hash(type_name)?;
        let encoded_data = self.encode_data(type_name, data)?;

        let mut buf = Vec::with_capacity(32 + encoded_data.len());
        buf.extend_from_slice(type_hash.as_slice());
        buf.extend_from_slice(&encoded_data);

        Ok(keccak256(&buf))
    }

    fn fields(&self, type_name: &str) -> Result<&[TypeField]> {
        self.types
            .get(type_name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UndefinedType(type_name.to_string()))
    }

    /// Adds `type_name` and every struct type reachable from it to `deps`.
    fn collect_dependencies<'a>(&'a self, type_name: &'a str, deps: &mut BTreeSet<&'a str>) {
        let Some((name, fields)) = self.types.get_key_value(type_name) else {
            return;
        };
        if !deps.insert(name.as_str()) {
            return;
        }
        for field in fields {
            self.collect_dependencies(base_type(&field.field_type), deps);
        }
    }

    /// Encodes the data according to the type definition.
    fn encode_data(&self, type_name: &str, data: &Value) -> Result<Vec<u8>> {
        let fields = self.fields(type_name)?;

        let obj = data.as_object().ok_or_else(|| {
            Error::InvalidTypedData(format!("expected object for {type_name}, got {data}"))
        })?;

        let null = Value::Null;
        let mut encoded = Vec::with_capacity(32 * fields.len());
        for field in fields {
            let value = obj.get(&field.name).unwrap_or(&null);
            let word = self
                .encode_field(&field.field_type, value)
                .map_err(|e| match e {
                    Error::InvalidTypedData(msg) => Error::InvalidTypedData(format!(
                        "{type_name}.{}: {msg}",
                        field.name
                    )),
                    other => other,
                })?;
            encoded.extend_from_slice(&word);
        }

        Ok(encoded)
    }

    /// Encodes a single field value as a 32-byte word.
    fn encode_field(&self, field_type: &str, value: &Value) -> Result<[u8; 32]> {
        if let Some((element_type, length)) = split_array_type(field_type)? {
            let items = value.as_array().ok_or_else(|| {
                Error::InvalidTypedData(format!("expected array for {field_type}"))
            })?;
            if let Some(length) = length
                && items.len() != length
            {
                return Err(Error::InvalidTypedData(format!(
                    "expected {length} elements for {field_type}, got {}",
                    items.len()
                )));
            }

            let mut items_encoded = Vec::with_capacity(32 * items.len());
            for item in items {
                items_encoded.extend_from_slice(&self.encode_field(element_type, item)?);
            }
            return Ok(keccak256(&items_encoded).0);
        }

        if self.types.contains_key(field_type) {
            if value.is_null() {
                return Ok([0u8; 32]);
            }
            return Ok(self.hash_struct(field_type, value)?.0);
        }

        if value.is_null() {
            return Err(Error::InvalidTypedData(format!(
                "missing value of type {field_type}"
            )));
        }
        encode_atomic(field_type, value)
    }
}

/// Renders `Name(type1 name1,type2 name2)`.
fn format_type(type_name: &str, fields: &[TypeField]) -> String {
    let members: Vec<String> = fields
        .iter()
        .map(|f| format!("{} {}", f.field_type, f.name))
        .collect();
    format!("{type_name}({})", members.join(","))
}

/// Strips every array suffix from a type: `Person[2][]` becomes `Person`.
fn base_type(field_type: &str) -> &str {
    field_type
        .find('[')
        .map_or(field_type, |idx| &field_type[..idx])
}

/// Splits `T[]` / `T[n]` into `(T, n)`; returns `None` for non-array types.
fn split_array_type(field_type: &str) -> Result<Option<(&str, Option<usize>)>> {
    let Some(inner) = field_type.strip_suffix(']') else {
        return Ok(None);
    };
    let open = inner
        .rfind('[')
        .ok_or_else(|| Error::InvalidTypedData(format!("malformed array type: {field_type}")))?;

    let length = &inner[open + 1..];
    let length = if length.is_empty() {
        None
    } else {
        Some(length.parse::<usize>().map_err(|_| {
            Error::InvalidTypedData(format!("malformed array length: {field_type}"))
        })?)
    };

    Ok(Some((&inner[..open], length)))
}

/// Parses the bit width of `uintN` / `intN`; a bare `uint` / `int` is 256.
fn int_width(digits: &str, field_type: &str) -> Result<usize> {
    if digits.is_empty() {
        return Ok(256);
    }
    match digits.parse::<usize>() {
        Ok(bits) if bits % 8 == 0 && (8..=256).contains(&bits) => Ok(bits),
        _ => Err(Error::UndefinedType(field_type.to_string())),
    }
}

/// Encodes an atomic or dynamic (non-struct, non-array) value.
fn encode_atomic(field_type: &str, value: &Value) -> Result<[u8; 32]> {
    let mut buf = [0u8; 32];

    match field_type {
        "string" => {
            let s = value
                .as_str()
                .ok_or_else(|| Error::InvalidTypedData(format!("expected string, got {value}")))?;
            Ok(keccak256(s.as_bytes()).0)
        }
        "bytes" => {
            let bytes = value_to_bytes(value)?;
            Ok(keccak256(&bytes).0)
        }
        "bool" => {
            let b = value
                .as_bool()
                .ok_or_else(|| Error::InvalidTypedData(format!("expected bool, got {value}")))?;
            buf[31] = u8::from(b);
            Ok(buf)
        }
        "address" => {
            let addr_str = value.as_str().ok_or_else(|| {
                Error::InvalidTypedData(format!("expected address string, got {value}"))
            })?;
            let addr = Address::from_hex(addr_str)
                .map_err(|e| Error::InvalidTypedData(format!("invalid address: {e}")))?;
            buf[12..].copy_from_slice(addr.as_bytes());
            Ok(buf)
        }
        t if t.starts_with("bytes") => {
            // Fixed-size bytes (bytes1 to bytes32)
            let size: usize = t[5..]
                .parse()
                .ok()
                .filter(|size| (1..=32).contains(size))
                .ok_or_else(|| Error::UndefinedType(t.to_string()))?;

            let hex_str = value
                .as_str()
                .ok_or_else(|| Error::InvalidTypedData(format!("expected hex string, got {value}")))?;
            let bytes = decode_hex(hex_str)
                .map_err(|e| Error::InvalidTypedData(format!("invalid {t}: {e}")))?;

            if bytes.len() > size {
                return Err(Error::InvalidTypedData(format!(
                    "bytes too long for {t}: {} > {size}",
                    bytes.len()
                )));
            }

            buf[..bytes.len()].copy_from_slice(&bytes);
            Ok(buf)
        }
        t if t.starts_with("uint") => {
            let bits = int_width(&t[4..], t)?;
            let uint = parse_uint(value)?;
            if uint.bit_len() > bits {
                return Err(Error::InvalidTypedData(format!(
                    "value {uint} does not fit in {t}"
                )));
            }
            Ok(uint.to_be_bytes::<32>())
        }
        t if t.starts_with("int") => {
            let bits = int_width(&t[3..], t)?;
            let int = parse_int(value)?;
            // Two's complement: [-2^(bits-1), 2^(bits-1) - 1].
            let magnitude = int.unsigned_abs();
            let used = if int.is_negative() {
                (magnitude - U256::from(1)).bit_len()
            } else {
                magnitude.bit_len()
            };
            if used >= bits {
                return Err(Error::InvalidTypedData(format!(
                    "value {int} does not fit in {t}"
                )));
            }
            Ok(int.into_raw().to_be_bytes::<32>())
        }
        other => Err(Error::UndefinedType(other.to_string())),
    }
}

/// Converts a `bytes` value: `0x` hex is decoded, other strings are UTF-8.
fn value_to_bytes(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::String(s) if is_hex_prefixed(s) => {
            decode_hex(s).map_err(|e| Error::InvalidTypedData(format!("invalid bytes: {e}")))
        }
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        Value::Number(n) => n.as_u64().map_or_else(
            || Err(Error::InvalidTypedData(format!("invalid bytes value: {n}"))),
            |n| {
                let bytes = n.to_be_bytes();
                let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
                Ok(bytes[start..].to_vec())
            },
        ),
        other => Err(Error::InvalidTypedData(format!(
            "expected bytes, got {other}"
        ))),
    }
}

/// Parses a uint value from JSON.
fn parse_uint(value: &Value) -> Result<U256> {
    if let Some(n) = value.as_u64() {
        return Ok(U256::from(n));
    }
    if let Some(s) = value.as_str() {
        // Handle hex strings
        if is_hex_prefixed(s) {
            return U256::from_str_radix(strip_hex_prefix(s), 16)
                .map_err(|_| Error::InvalidTypedData(format!("invalid hex uint: {s}")));
        }
        // Handle decimal strings
        return U256::from_str_radix(s, 10)
            .map_err(|_| Error::InvalidTypedData(format!("invalid uint: {s}")));
    }
    Err(Error::InvalidTypedData(format!("expected uint, got {value}")))
}

/// Parses an int value from JSON.
///
/// Hex strings are taken as the raw two's complement bit pattern.
fn parse_int(value: &Value) -> Result<I256> {
    if let Some(n) = value.as_i64() {
        return I256::try_from(n)
            .map_err(|_| Error::InvalidTypedData(format!("invalid int: {n}")));
    }
    if let Some(s) = value.as_str() {
        if is_hex_prefixed(s) {
            return U256::from_str_radix(strip_hex_prefix(s), 16)
                .map(I256::from_raw)
                .map_err(|_| Error::InvalidTypedData(format!("invalid hex int: {s}")));
        }
        return I256::from_dec_str(s)
            .map_err(|_| Error::InvalidTypedData(format!("invalid int: {s}")));
    }
    Err(Error::InvalidTypedData(format!("expected int, got {value}")))
}
