//! Shared types for the UTXO signer
//!
//! Signing requests, plans and mode/result lists that cross module
//! boundaries are defined here.

use std::collections::HashMap;

use bitcoin::{OutPoint, ScriptBuf};
use serde::{Deserialize, Serialize};

use crate::error::{SigningError, SigningResult};
use crate::script::hash160;
use crate::signing::keys::SigningKey;
use crate::transaction::SighashType;

// =============================================================================
// Coins & Outputs
// =============================================================================

/// A spendable coin selected for the transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentCoin {
    pub out_point: OutPoint,
    /// Value in base units
    pub amount: u64,
    /// Owning (locking) script
    pub script: ScriptBuf,
    /// Sequence override; the signing policy default is used otherwise
    pub sequence: Option<u32>,
    /// Claim-script payload, only read by the delegated transaction class
    pub claim_script: Option<Vec<u8>>,
}

impl UnspentCoin {
    pub fn new(out_point: OutPoint, amount: u64, script: ScriptBuf) -> Self {
        Self {
            out_point,
            amount,
            script,
            sequence: None,
            claim_script: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_claim_script(mut self, claim_script: Vec<u8>) -> Self {
        self.claim_script = Some(claim_script);
        self
    }
}

/// An output the transaction must pay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRequest {
    pub script: ScriptBuf,
    pub amount: u64,
}

impl OutputRequest {
    pub fn new(script: ScriptBuf, amount: u64) -> Self {
        Self { script, amount }
    }
}

/// Fee policy for planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePolicy {
    /// Absolute fee in base units
    Fixed(u64),
    /// Fee per virtual byte
    PerByte(u64),
}

// =============================================================================
// Chain & Policy Parameters
// =============================================================================

/// Variant-specific header values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParams {
    /// Transaction version; each variant substitutes its own default when unset
    pub version: Option<i32>,
    /// Zcash consensus branch id (Sapling by default)
    pub branch_id: u32,
    /// Zcash expiry height
    pub expiry_height: u32,
    /// Verge transaction time
    pub time: u32,
    /// Bitcoin Diamond previous block hash (display order)
    pub previous_block_hash: Option<[u8; 32]>,
    /// Horizen replay-protection block hash (display order)
    pub replay_block_hash: Option<[u8; 32]>,
    /// Horizen replay-protection block height
    pub replay_block_height: u32,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            version: None,
            branch_id: crate::transaction::zcash::SAPLING_BRANCH_ID,
            expiry_height: 0,
            time: 0,
            previous_block_hash: None,
            replay_block_hash: None,
            replay_block_height: 0,
        }
    }
}

/// Planning and sequencing defaults, produced by `SignerSettings::policy`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningPolicy {
    /// Change below this value is folded into the fee
    pub dust_threshold: u64,
    /// Sequence for coins without an override
    pub default_sequence: u32,
}

impl Default for SigningPolicy {
    fn default() -> Self {
        Self {
            dust_threshold: 546,
            default_sequence: 0xffff_ffff,
        }
    }
}

// =============================================================================
// Signing Input
// =============================================================================

/// Everything needed to plan, build and sign one transaction
#[derive(Debug, Clone)]
pub struct SigningInput {
    pub utxos: Vec<UnspentCoin>,
    /// Amount paid to `to_script`
    pub amount: u64,
    pub to_script: ScriptBuf,
    pub extra_outputs: Vec<OutputRequest>,
    pub change_script: ScriptBuf,
    pub fee: FeePolicy,
    /// Spend every coin and send everything minus fee to `to_script`
    pub use_max_amount: bool,
    pub op_return: Option<Vec<u8>>,
    pub private_keys: Vec<SigningKey>,
    /// Public keys for digest-only requests without private keys
    pub public_keys: Vec<Vec<u8>>,
    /// Redeem / witness scripts keyed by hex HASH160
    pub scripts: HashMap<String, ScriptBuf>,
    pub hash_type: u32,
    pub lock_time: u32,
    /// Pre-computed plan; the builder plans when absent
    pub plan: Option<TransactionPlan>,
    /// Route the whole transaction to the external signing service
    pub delegated: bool,
    pub chain: ChainParams,
    pub policy: SigningPolicy,
}

impl SigningInput {
    pub fn new(
        utxos: Vec<UnspentCoin>,
        to_script: ScriptBuf,
        amount: u64,
        change_script: ScriptBuf,
    ) -> Self {
        Self {
            utxos,
            amount,
            to_script,
            extra_outputs: Vec::new(),
            change_script,
            fee: FeePolicy::PerByte(1),
            use_max_amount: false,
            op_return: None,
            private_keys: Vec::new(),
            public_keys: Vec::new(),
            scripts: HashMap::new(),
            hash_type: SighashType::ALL,
            lock_time: 0,
            plan: None,
            delegated: false,
            chain: ChainParams::default(),
            policy: SigningPolicy::default(),
        }
    }

    /// Add a 32-byte private key
    pub fn add_private_key(&mut self, secret: &[u8]) -> SigningResult<()> {
        self.private_keys.push(SigningKey::from_slice(secret)?);
        Ok(())
    }

    /// Register a redeem or witness script under its HASH160
    pub fn add_script(&mut self, script: ScriptBuf) {
        let key = hex::encode(hash160(script.as_bytes()));
        self.scripts.insert(key, script);
    }

    /// Look up a registered script by HASH160
    pub fn script_for_hash(&self, hash: &[u8; 20]) -> Option<&ScriptBuf> {
        self.scripts.get(&hex::encode(hash))
    }

    /// Sequence to use for a coin
    pub fn sequence_for(&self, coin: &UnspentCoin) -> u32 {
        coin.sequence.unwrap_or(self.policy.default_sequence)
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Reason a plan could not be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlanFailure {
    #[error("no coins available")]
    NoCoins,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("amount is below the dust threshold")]
    DustAmount,
    #[error("amount is zero")]
    ZeroAmount,
    #[error("amounts overflow a 64-bit total")]
    AmountOverflow,
}

/// Sum of amounts, `None` on overflow
pub fn checked_total<I: IntoIterator<Item = u64>>(amounts: I) -> Option<u64> {
    amounts.into_iter().try_fold(0u64, |acc, amount| acc.checked_add(amount))
}

/// Coin selection and value distribution for one transaction
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionPlan {
    /// Chosen coins, in spend order
    pub utxos: Vec<UnspentCoin>,
    pub amount: u64,
    /// Sum of the chosen coins
    pub available_amount: u64,
    pub fee: u64,
    pub change: u64,
    /// Final outputs in order (recipient, extras, change, OP_RETURN)
    pub outputs: Vec<OutputRequest>,
    pub error: Option<PlanFailure>,
}

impl TransactionPlan {
    pub fn failed(error: PlanFailure, available_amount: u64) -> Self {
        Self {
            available_amount,
            error: Some(error),
            ..Default::default()
        }
    }

    /// Reject plans that cannot be built
    pub fn ensure_buildable(&self) -> SigningResult<()> {
        if let Some(failure) = self.error {
            return Err(SigningError::planning(failure.to_string()));
        }
        if self.utxos.is_empty() {
            return Err(SigningError::planning(PlanFailure::NoCoins.to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Modes & Results
// =============================================================================

/// A signature together with the public key it verifies under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePubkey {
    /// DER signature, without the sighash byte
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
}

impl SignaturePubkey {
    pub fn new(signature: Vec<u8>, public_key: Vec<u8>) -> Self {
        Self {
            signature,
            public_key,
        }
    }
}

/// A digest together with the public key expected to sign it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashPubkey {
    pub hash: [u8; 32],
    pub public_key: Vec<u8>,
}

/// One entry per signature slot, in input order
pub type SignaturePubkeyList = Vec<SignaturePubkey>;
/// One entry per signature slot, in input order
pub type HashPubkeyList = Vec<HashPubkey>;

/// How the signature builder obtains signature bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningMode {
    /// Sign locally with the input's private keys
    Normal,
    /// Placeholder signatures of maximal size; keys are never read
    SizeEstimationOnly,
    /// Use caller-supplied signatures, verified against each digest
    External(SignaturePubkeyList),
    /// Collect digests only
    HashOnly,
}

impl SigningMode {
    pub fn name(&self) -> &'static str {
        match self {
            SigningMode::Normal => "normal",
            SigningMode::SizeEstimationOnly => "size_estimation",
            SigningMode::External(_) => "external",
            SigningMode::HashOnly => "hash_only",
        }
    }
}
