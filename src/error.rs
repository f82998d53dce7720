//! Unified error types for the UTXO signer
//!
//! Every public operation returns `SigningResult<T>`. Errors are typed so that
//! callers (and FFI layers wrapping this crate) can categorize failures without
//! parsing messages.

use serde::{Deserialize, Serialize};

/// Main error type for planning, building and signing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    /// The builder could not produce a valid plan or unsigned transaction
    #[error("Planning failed: {0}")]
    PlanningFailed(String),

    /// An owning script could not be classified for digest computation
    #[error("Unsupported script type for input {index}: {script}")]
    UnsupportedScriptType { index: usize, script: String },

    /// `Normal` mode has no private key for an input (or `HashOnly` has no public key)
    #[error("Missing signing key for input {0}")]
    MissingSigningKey(usize),

    /// `External` mode has no supplied signature for a signature slot
    #[error("Missing external signature for input {index} (slot {slot})")]
    MissingExternalSignature { index: usize, slot: usize },

    /// A supplied signature does not verify or does not belong to the owning script
    #[error("Signature mismatch for input {index}: {reason}")]
    SignatureMismatch { index: usize, reason: String },

    /// The external signing service failed or returned an unusable response
    #[error("Delegated signing service failure: {0}")]
    DelegatedServiceFailure(String),

    /// A script-hash output is spent but the redeem script was not supplied
    #[error("Missing redeem script {script_hash} for input {index}")]
    MissingRedeemScript { index: usize, script_hash: String },

    /// The unsigned transaction is inconsistent with its plan
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// A local signing primitive failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Configuration could not be parsed or failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SigningError {
    /// Category of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            SigningError::PlanningFailed(_) => ErrorCode::PlanningFailed,
            SigningError::UnsupportedScriptType { .. } => ErrorCode::UnsupportedScriptType,
            SigningError::MissingSigningKey(_) => ErrorCode::MissingSigningKey,
            SigningError::MissingExternalSignature { .. } => ErrorCode::MissingExternalSignature,
            SigningError::SignatureMismatch { .. } => ErrorCode::SignatureMismatch,
            SigningError::DelegatedServiceFailure(_) => ErrorCode::DelegatedServiceFailure,
            SigningError::MissingRedeemScript { .. } => ErrorCode::MissingRedeemScript,
            SigningError::InvalidTransaction(_) => ErrorCode::InvalidTransaction,
            SigningError::SigningFailed(_) => ErrorCode::SigningFailed,
            SigningError::InvalidConfig(_) => ErrorCode::InvalidConfig,
        }
    }

    pub fn planning(msg: impl Into<String>) -> Self {
        SigningError::PlanningFailed(msg.into())
    }

    pub fn delegated(msg: impl Into<String>) -> Self {
        SigningError::DelegatedServiceFailure(msg.into())
    }

    pub fn invalid_transaction(msg: impl Into<String>) -> Self {
        SigningError::InvalidTransaction(msg.into())
    }

    pub fn unsupported_script(index: usize, script: &[u8]) -> Self {
        SigningError::UnsupportedScriptType {
            index,
            script: hex::encode(script),
        }
    }
}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    PlanningFailed,
    UnsupportedScriptType,
    MissingSigningKey,
    MissingExternalSignature,
    SignatureMismatch,
    DelegatedServiceFailure,
    MissingRedeemScript,
    InvalidTransaction,
    SigningFailed,
    InvalidConfig,
}

/// Result type alias for signer operations
pub type SigningResult<T> = Result<T, SigningError>;

// Conversions from common error types

impl From<serde_json::Error> for SigningError {
    fn from(e: serde_json::Error) -> Self {
        SigningError::InvalidConfig(e.to_string())
    }
}

impl From<bincode::Error> for SigningError {
    fn from(e: bincode::Error) -> Self {
        SigningError::DelegatedServiceFailure(format!("Codec error: {}", e))
    }
}

impl From<hex::FromHexError> for SigningError {
    fn from(e: hex::FromHexError) -> Self {
        SigningError::InvalidTransaction(format!("Hex error: {}", e))
    }
}

impl From<secp256k1::Error> for SigningError {
    fn from(e: secp256k1::Error) -> Self {
        SigningError::SigningFailed(format!("Secp256k1 error: {}", e))
    }
}
