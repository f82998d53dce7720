//! Signer Configuration
//!
//! Defaults applied to every signing request:
//! - Dust threshold and default input sequence
//! - Default sighash type
//! - Debug logging
//! - Per-variant header parameters

use serde::{Deserialize, Serialize};

use crate::error::{SigningError, SigningResult};
use crate::transaction::SighashType;
use crate::types::{ChainParams, SigningInput, SigningPolicy};
use crate::utils::logging;

/// Signer settings, loadable from JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerSettings {
    /// Change below this is folded into the fee
    pub dust_threshold: u64,
    /// Sequence for coins without an override
    pub default_sequence: u32,
    /// Sighash type written onto requests by [`apply_to`](Self::apply_to)
    pub default_hash_type: u32,
    /// Emit debug-level log lines
    pub debug_logging: bool,
    pub chain: ChainParams,
}

impl Default for SignerSettings {
    fn default() -> Self {
        Self::standard()
    }
}

impl SignerSettings {
    /// Standard Bitcoin-family preset
    pub fn standard() -> Self {
        Self {
            dust_threshold: 546,
            default_sequence: 0xffff_ffff,
            default_hash_type: SighashType::ALL,
            debug_logging: false,
            chain: ChainParams::default(),
        }
    }

    /// Preset for fork-id chains (Bitcoin Cash family)
    pub fn fork_id() -> Self {
        Self {
            default_hash_type: SighashType::ALL | SighashType::FORKID,
            ..Self::standard()
        }
    }

    /// Parse and validate settings from JSON
    pub fn from_json(json: &str) -> SigningResult<Self> {
        let settings: SignerSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> SigningResult<()> {
        let base = self.default_hash_type & !(SighashType::FORKID | SighashType::ANYONECANPAY);
        if !(SighashType::ALL..=SighashType::SINGLE).contains(&base) {
            return Err(SigningError::InvalidConfig(format!(
                "unknown default sighash type 0x{:02x}",
                self.default_hash_type
            )));
        }
        if let Some(version) = self.chain.version {
            if version < 1 {
                return Err(SigningError::InvalidConfig(format!(
                    "transaction version must be positive, got {}",
                    version
                )));
            }
        }
        Ok(())
    }

    /// Apply the logging verbosity
    pub fn apply_logging(&self) {
        logging::set_debug(self.debug_logging);
    }

    pub fn policy(&self) -> SigningPolicy {
        SigningPolicy {
            dust_threshold: self.dust_threshold,
            default_sequence: self.default_sequence,
        }
    }

    /// Stamp these defaults onto a request, replacing the values it carries
    pub fn apply_to(&self, input: &mut SigningInput) {
        input.policy = self.policy();
        input.hash_type = self.default_hash_type;
        input.chain = self.chain.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_defaults() {
        let settings = SignerSettings::standard();
        assert_eq!(settings.dust_threshold, 546);
        assert_eq!(settings.policy().default_sequence, 0xffff_ffff);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let settings =
            SignerSettings::from_json(r#"{"dust_threshold": 1000, "chain": {"time": 7}}"#).unwrap();
        assert_eq!(settings.dust_threshold, 1000);
        assert_eq!(settings.default_hash_type, SighashType::ALL);
        assert_eq!(settings.chain.time, 7);
    }

    #[test]
    fn test_invalid_hash_type_rejected() {
        let err = SignerSettings::from_json(r#"{"default_hash_type": 9}"#).unwrap_err();
        assert!(matches!(err, SigningError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = SignerSettings::from_json("{").unwrap_err();
        assert!(matches!(err, SigningError::InvalidConfig(_)));
    }

    #[test]
    fn test_apply_to_replaces_request_defaults() {
        use crate::script::p2pkh_script;

        let mut input = SigningInput::new(Vec::new(), p2pkh_script(&[1; 20]), 1_000, p2pkh_script(&[2; 20]));
        input.hash_type = SighashType::NONE;
        let settings = SignerSettings {
            dust_threshold: 1_000,
            ..SignerSettings::fork_id()
        };
        settings.apply_to(&mut input);
        assert_eq!(input.hash_type, 0x41);
        assert_eq!(input.policy.dust_threshold, 1_000);
    }

    #[test]
    fn test_apply_logging_toggles_debug() {
        let settings = SignerSettings {
            debug_logging: true,
            ..SignerSettings::standard()
        };
        settings.apply_logging();
        assert!(logging::is_debug_enabled());
        SignerSettings::standard().apply_logging();
        assert!(!logging::is_debug_enabled());
    }

    #[test]
    fn test_fork_id_preset() {
        let settings = SignerSettings::fork_id();
        assert_eq!(settings.default_hash_type, 0x41);
        assert!(settings.validate().is_ok());
    }
}
