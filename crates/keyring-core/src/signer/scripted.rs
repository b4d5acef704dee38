//! A scripted [`ExternalSigner`] for tests and demos.
//!
//! [`ScriptedSigner`] answers requests from a queue of prepared responses, in
//! order, and records every request it receives in a [`CallLog`]. The log is
//! shared, so it stays readable after the signer has been moved into a
//! [`super::SignerHandle`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use super::{DeviceAccount, ExternalSigner, SignerResult};
use crate::registry::DerivationPath;
use crate::signature::RawSignature;

/// An error produced by a [`ScriptedSigner`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ScriptedError(pub String);

/// A request received by a [`ScriptedSigner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerCall {
    /// [`ExternalSigner::get_address`].
    GetAddress {
        /// The requested path.
        path: DerivationPath,
    },
    /// [`ExternalSigner::sign_transaction`].
    SignTransaction {
        /// The requested path.
        path: DerivationPath,
        /// The unsigned payload as hex.
        raw_tx_hex: String,
    },
    /// [`ExternalSigner::sign_personal_message`].
    SignPersonalMessage {
        /// The requested path.
        path: DerivationPath,
        /// The message bytes as hex.
        message_hex: String,
    },
    /// [`ExternalSigner::sign_typed_data_hash`].
    SignTypedDataHash {
        /// The requested path.
        path: DerivationPath,
        /// The domain separator as hex.
        domain_separator_hex: String,
        /// The struct hash as hex.
        struct_hash_hex: String,
    },
}

/// A shared record of the requests a [`ScriptedSigner`] received.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<SignerCall>>>);

impl CallLog {
    fn push(&self, call: SignerCall) {
        match self.0.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }

    /// Returns a copy of every recorded request, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SignerCall> {
        match self.0.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns the number of recorded requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Returns `true` if no request was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
enum Response {
    Account(DeviceAccount),
    Signature(RawSignature),
    Error(String),
}

/// A signer that replays prepared responses.
///
/// # Example
///
/// ```
/// use hw_evm_keyring_core::signer::{ExternalSigner, ScriptedSigner, SignerCall};
/// use hw_evm_keyring_core::{DerivationPath, RawSignature};
///
/// let mut signer = ScriptedSigner::new().with_signature(RawSignature::new("01", "02", 27u64));
/// let calls = signer.calls();
///
/// let path = DerivationPath::default();
/// let sig = signer.sign_personal_message(&path, "6869").unwrap();
/// assert_eq!(sig.r, "01");
/// assert_eq!(
///     calls.snapshot(),
///     vec![SignerCall::SignPersonalMessage { path, message_hex: "6869".to_string() }]
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedSigner {
    responses: VecDeque<Response>,
    calls: CallLog,
}

impl ScriptedSigner {
    /// Creates a signer with no prepared responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an answer for the next address request.
    #[must_use]
    pub fn with_account(mut self, account: DeviceAccount) -> Self {
        self.responses.push_back(Response::Account(account));
        self
    }

    /// Queues an answer for the next signing request.
    #[must_use]
    pub fn with_signature(mut self, signature: RawSignature) -> Self {
        self.responses.push_back(Response::Signature(signature));
        self
    }

    /// Queues a device error for the next request of any kind.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.responses.push_back(Response::Error(message.into()));
        self
    }

    /// Returns the shared log of received requests.
    #[must_use]
    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }

    /// Returns the number of responses not yet consumed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.responses.len()
    }

    fn next(&mut self, call: SignerCall) -> SignerResult<Response> {
        let request = format!("{call:?}");
        self.calls.push(call);
        match self.responses.pop_front() {
            Some(Response::Error(message)) => Err(Box::new(ScriptedError(message))),
            Some(response) => Ok(response),
            None => Err(Box::new(ScriptedError(format!(
                "no scripted response for {request}"
            )))),
        }
    }

    fn next_signature(&mut self, call: SignerCall) -> SignerResult<RawSignature> {
        match self.next(call)? {
            Response::Signature(signature) => Ok(signature),
            other => Err(Box::new(ScriptedError(format!(
                "expected a signature response, found {other:?}"
            )))),
        }
    }
}

impl ExternalSigner for ScriptedSigner {
    fn get_address(&mut self, path: &DerivationPath) -> SignerResult<DeviceAccount> {
        match self.next(SignerCall::GetAddress { path: path.clone() })? {
            Response::Account(account) => Ok(account),
            other => Err(Box::new(ScriptedError(format!(
                "expected an account response, found {other:?}"
            )))),
        }
    }

    fn sign_transaction(
        &mut self,
        path: &DerivationPath,
        raw_tx_hex: &str,
    ) -> SignerResult<RawSignature> {
        self.next_signature(SignerCall::SignTransaction {
            path: path.clone(),
            raw_tx_hex: raw_tx_hex.to_string(),
        })
    }

    fn sign_personal_message(
        &mut self,
        path: &DerivationPath,
        message_hex: &str,
    ) -> SignerResult<RawSignature> {
        self.next_signature(SignerCall::SignPersonalMessage {
            path: path.clone(),
            message_hex: message_hex.to_string(),
        })
    }

    fn sign_typed_data_hash(
        &mut self,
        path: &DerivationPath,
        domain_separator_hex: &str,
        struct_hash_hex: &str,
    ) -> SignerResult<RawSignature> {
        self.next_signature(SignerCall::SignTypedDataHash {
            path: path.clone(),
            domain_separator_hex: domain_separator_hex.to_string(),
            struct_hash_hex: struct_hash_hex.to_string(),
        })
    }
}
