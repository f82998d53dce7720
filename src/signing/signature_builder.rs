//! Signature builder
//!
//! Walks the plan's coins in order, computes each input's digest with the
//! variant's rules and fills in scriptSig / witness data. Where signature
//! bytes come from depends on the [`SigningMode`]:
//! - `Normal`: ECDSA over the digest with the request's private keys
//! - `SizeEstimationOnly`: maximal-size placeholders, no key access
//! - `External`: caller-supplied signatures, verified before use
//! - `HashOnly`: digests are recorded and placeholders assembled
//!
//! Each signature slot (one per P2PKH/P2PK input, `m` per multisig input)
//! consumes exactly one list entry, in input order.

use bitcoin::hashes::{ripemd160, sha256, Hash};
use bitcoin::Witness;
use secp256k1::ecdsa::Signature;
use secp256k1::{All, Message, PublicKey, Secp256k1};

use crate::error::{SigningError, SigningResult};
use crate::log_debug;
use crate::script::{hash160, p2pkh_script, push_all, ScriptKind};
use crate::signing::keys::{require_secret, KeyRing};
use crate::transaction::{ChainTransaction, SighashType, SignatureVersion};
use crate::types::{
    HashPubkey, HashPubkeyList, SignaturePubkey, SignaturePubkeyList, SigningInput, SigningMode,
    TransactionPlan,
};

/// Maximum DER signature (72 bytes) plus the sighash byte
pub const PLACEHOLDER_SIGNATURE_LEN: usize = 73;
/// Compressed public key size
pub const PLACEHOLDER_PUBLIC_KEY_LEN: usize = 33;

/// Transaction plus the per-slot data gathered while signing
#[derive(Debug, Clone)]
pub struct SigningOutput<T> {
    pub transaction: T,
    /// Signatures placed in the transaction (`Normal` / `External`)
    pub signatures: SignaturePubkeyList,
    /// Digests awaiting signatures (`HashOnly`)
    pub hashes: HashPubkeyList,
}

/// Key the owning script commits to
#[derive(Debug, Clone, Copy)]
enum KeyTarget<'s> {
    PublicKey(&'s [u8]),
    Hash(&'s [u8; 20]),
}

impl KeyTarget<'_> {
    fn matches(&self, public_key: &[u8]) -> bool {
        match self {
            KeyTarget::PublicKey(expected) => *expected == public_key,
            KeyTarget::Hash(hash) => hash160(public_key) == **hash,
        }
    }
}

/// What a digest is computed over
#[derive(Debug, Clone, Copy)]
struct DigestContext<'s> {
    index: usize,
    script_code: &'s [u8],
    amount: u64,
    version: SignatureVersion,
}

/// Unlocking data for one input
#[derive(Debug, Default)]
struct Unlock {
    script_sig: Vec<Vec<u8>>,
    witness: Vec<Vec<u8>>,
}

pub struct SignatureBuilder<'a, T: ChainTransaction> {
    transaction: T,
    plan: &'a TransactionPlan,
    input: &'a SigningInput,
    mode: SigningMode,
    hash_type: SighashType,
    secp: Secp256k1<All>,
    keys: KeyRing<'a>,
    /// Next unread entry of the external list
    next_slot: usize,
    signatures: SignaturePubkeyList,
    hashes: HashPubkeyList,
}

impl<'a, T: ChainTransaction> SignatureBuilder<'a, T> {
    pub fn new(
        transaction: T,
        plan: &'a TransactionPlan,
        input: &'a SigningInput,
        mode: SigningMode,
    ) -> SigningResult<Self> {
        let secp = Secp256k1::new();
        let keys = match mode {
            SigningMode::Normal | SigningMode::HashOnly => KeyRing::with_private_keys(input, &secp)?,
            SigningMode::SizeEstimationOnly | SigningMode::External(_) => KeyRing::public_only(input),
        };
        Ok(Self {
            transaction,
            plan,
            input,
            mode,
            hash_type: SighashType::new(input.hash_type),
            secp,
            keys,
            next_slot: 0,
            signatures: Vec::new(),
            hashes: Vec::new(),
        })
    }

    /// Sign every input in plan order
    pub fn sign(mut self) -> SigningResult<SigningOutput<T>> {
        let plan = self.plan;
        let input_count = self.transaction.core().inputs.len();
        if input_count != plan.utxos.len() {
            return Err(SigningError::invalid_transaction(format!(
                "transaction has {} inputs but plan has {} coins",
                input_count,
                plan.utxos.len()
            )));
        }

        for index in 0..input_count {
            let coin = &plan.utxos[index];
            if self.transaction.core().inputs[index].previous_output != coin.out_point {
                return Err(SigningError::invalid_transaction(format!(
                    "input {} does not spend planned coin {}",
                    index, coin.out_point
                )));
            }

            let unlock = self.sign_script(index, coin.script.as_bytes(), coin.amount)?;
            if !unlock.witness.is_empty() && !T::SUPPORTS_WITNESS {
                return Err(SigningError::unsupported_script(index, coin.script.as_bytes()));
            }

            let script_sig = push_all(&unlock.script_sig)?;
            let target = &mut self.transaction.core_mut().inputs[index];
            target.script_sig = script_sig;
            target.witness = Witness::from_slice(&unlock.witness);
        }

        log_debug!(
            "signature_builder",
            "Signed inputs",
            chain = T::NAME,
            mode = self.mode.name(),
            inputs = input_count,
            signatures = self.signatures.len(),
            hashes = self.hashes.len()
        );

        Ok(SigningOutput {
            transaction: self.transaction,
            signatures: self.signatures,
            hashes: self.hashes,
        })
    }

    fn sign_script(&mut self, index: usize, script: &[u8], amount: u64) -> SigningResult<Unlock> {
        match ScriptKind::classify(script) {
            ScriptKind::PayToScriptHash { hash } => {
                let redeem = self
                    .input
                    .script_for_hash(&hash)
                    .ok_or_else(|| SigningError::MissingRedeemScript {
                        index,
                        script_hash: hex::encode(hash),
                    })?
                    .as_bytes()
                    .to_vec();
                let redeem_kind = ScriptKind::classify(&redeem);
                let mut unlock = match redeem_kind {
                    ScriptKind::PayToWitnessPublicKeyHash { .. }
                    | ScriptKind::PayToWitnessScriptHash { .. } => {
                        self.sign_witness_program(index, &redeem_kind, &redeem, amount)?
                    }
                    ScriptKind::PayToPublicKey { .. }
                    | ScriptKind::PayToPublicKeyHash { .. }
                    | ScriptKind::Multisig { .. } => {
                        let ctx = DigestContext {
                            index,
                            script_code: &redeem,
                            amount,
                            version: SignatureVersion::Base,
                        };
                        Unlock {
                            script_sig: self.sign_step(&redeem_kind, ctx)?,
                            witness: Vec::new(),
                        }
                    }
                    _ => return Err(SigningError::unsupported_script(index, &redeem)),
                };
                unlock.script_sig.push(redeem);
                Ok(unlock)
            }
            kind @ (ScriptKind::PayToWitnessPublicKeyHash { .. }
            | ScriptKind::PayToWitnessScriptHash { .. }) => {
                self.sign_witness_program(index, &kind, script, amount)
            }
            kind @ (ScriptKind::PayToPublicKey { .. }
            | ScriptKind::PayToPublicKeyHash { .. }
            | ScriptKind::PayToPublicKeyHashReplay { .. }
            | ScriptKind::Multisig { .. }) => {
                let ctx = DigestContext {
                    index,
                    script_code: script,
                    amount,
                    version: SignatureVersion::Base,
                };
                Ok(Unlock {
                    script_sig: self.sign_step(&kind, ctx)?,
                    witness: Vec::new(),
                })
            }
            ScriptKind::WitnessProgram { .. } | ScriptKind::NullData | ScriptKind::NonStandard => {
                Err(SigningError::unsupported_script(index, script))
            }
        }
    }

    /// P2WPKH / P2WSH, native or nested
    fn sign_witness_program(
        &mut self,
        index: usize,
        kind: &ScriptKind,
        program_script: &[u8],
        amount: u64,
    ) -> SigningResult<Unlock> {
        match kind {
            ScriptKind::PayToWitnessPublicKeyHash { hash } => {
                let script_code = p2pkh_script(hash);
                let ctx = DigestContext {
                    index,
                    script_code: script_code.as_bytes(),
                    amount,
                    version: SignatureVersion::WitnessV0,
                };
                let step_kind = ScriptKind::PayToPublicKeyHash { hash: *hash };
                Ok(Unlock {
                    script_sig: Vec::new(),
                    witness: self.sign_step(&step_kind, ctx)?,
                })
            }
            ScriptKind::PayToWitnessScriptHash { program } => {
                let script_hash = ripemd160::Hash::hash(program).to_byte_array();
                let witness_script = self
                    .input
                    .script_for_hash(&script_hash)
                    .ok_or_else(|| SigningError::MissingRedeemScript {
                        index,
                        script_hash: hex::encode(script_hash),
                    })?
                    .as_bytes()
                    .to_vec();
                if sha256::Hash::hash(&witness_script).to_byte_array() != *program {
                    return Err(SigningError::invalid_transaction(format!(
                        "witness script for input {} does not match its program",
                        index
                    )));
                }
                let inner = ScriptKind::classify(&witness_script);
                if !matches!(
                    inner,
                    ScriptKind::PayToPublicKey { .. }
                        | ScriptKind::PayToPublicKeyHash { .. }
                        | ScriptKind::Multisig { .. }
                ) {
                    return Err(SigningError::unsupported_script(index, &witness_script));
                }
                let ctx = DigestContext {
                    index,
                    script_code: &witness_script,
                    amount,
                    version: SignatureVersion::WitnessV0,
                };
                let mut witness = self.sign_step(&inner, ctx)?;
                witness.push(witness_script.clone());
                Ok(Unlock {
                    script_sig: Vec::new(),
                    witness,
                })
            }
            _ => Err(SigningError::unsupported_script(index, program_script)),
        }
    }

    /// Stack items satisfying a single-key or multisig script
    fn sign_step(&mut self, kind: &ScriptKind, ctx: DigestContext<'_>) -> SigningResult<Vec<Vec<u8>>> {
        match kind {
            ScriptKind::PayToPublicKey { public_key } => {
                let (signature, _) = self.signature_slot(KeyTarget::PublicKey(public_key), ctx)?;
                Ok(vec![signature])
            }
            ScriptKind::PayToPublicKeyHash { hash }
            | ScriptKind::PayToPublicKeyHashReplay { hash } => {
                let (signature, public_key) = self.signature_slot(KeyTarget::Hash(hash), ctx)?;
                Ok(vec![signature, public_key])
            }
            ScriptKind::Multisig {
                required,
                public_keys,
            } => {
                let signers = self.multisig_signers(*required, public_keys, ctx.index)?;
                // CHECKMULTISIG pops one extra item
                let mut items = vec![Vec::new()];
                for key in signers {
                    let (signature, _) = self.signature_slot(KeyTarget::PublicKey(&key), ctx)?;
                    items.push(signature);
                }
                Ok(items)
            }
            _ => Err(SigningError::unsupported_script(ctx.index, ctx.script_code)),
        }
    }

    /// Keys that will sign a multisig input, in script order
    fn multisig_signers(
        &self,
        required: usize,
        public_keys: &[Vec<u8>],
        index: usize,
    ) -> SigningResult<Vec<Vec<u8>>> {
        let signers: Vec<Vec<u8>> = match &self.mode {
            SigningMode::SizeEstimationOnly => public_keys.iter().take(required).cloned().collect(),
            SigningMode::External(list) => {
                let mut signers = Vec::with_capacity(required);
                let mut position = 0;
                for slot in self.next_slot..self.next_slot + required {
                    let entry = list
                        .get(slot)
                        .ok_or(SigningError::MissingExternalSignature { index, slot })?;
                    // signatures must follow key order
                    let found = public_keys[position..]
                        .iter()
                        .position(|key| *key == entry.public_key)
                        .ok_or_else(|| SigningError::SignatureMismatch {
                            index,
                            reason: "public key is not an unused multisig key".to_string(),
                        })?;
                    position += found + 1;
                    signers.push(entry.public_key.clone());
                }
                signers
            }
            SigningMode::Normal => public_keys
                .iter()
                .filter(|key| self.keys.by_public_key(key).and_then(|m| m.secret).is_some())
                .take(required)
                .cloned()
                .collect(),
            SigningMode::HashOnly => public_keys
                .iter()
                .filter(|key| self.keys.by_public_key(key).is_some())
                .take(required)
                .cloned()
                .collect(),
        };
        if signers.len() < required {
            return Err(SigningError::MissingSigningKey(index));
        }
        Ok(signers)
    }

    fn digest(&self, ctx: DigestContext<'_>) -> SigningResult<[u8; 32]> {
        self.transaction.signature_hash(
            ctx.script_code,
            ctx.index,
            self.hash_type,
            ctx.amount,
            ctx.version,
        )
    }

    fn placeholder_signature(&self) -> Vec<u8> {
        let mut signature = vec![0u8; PLACEHOLDER_SIGNATURE_LEN - 1];
        signature.push(self.hash_type.signature_byte());
        signature
    }

    fn with_hash_type(&self, der: &[u8]) -> Vec<u8> {
        let mut signature = der.to_vec();
        signature.push(self.hash_type.signature_byte());
        signature
    }

    /// Signature (with sighash byte) and public key for one slot
    fn signature_slot(
        &mut self,
        target: KeyTarget<'_>,
        ctx: DigestContext<'_>,
    ) -> SigningResult<(Vec<u8>, Vec<u8>)> {
        match &self.mode {
            SigningMode::SizeEstimationOnly => {
                let public_key = match target {
                    KeyTarget::PublicKey(key) => key.to_vec(),
                    KeyTarget::Hash(hash) => self
                        .keys
                        .by_hash(hash)
                        .map(|m| m.public_key.to_vec())
                        .unwrap_or_else(|| vec![0x02; PLACEHOLDER_PUBLIC_KEY_LEN]),
                };
                Ok((self.placeholder_signature(), public_key))
            }
            SigningMode::HashOnly => {
                let public_key = match target {
                    KeyTarget::PublicKey(key) => key.to_vec(),
                    KeyTarget::Hash(hash) => self
                        .keys
                        .by_hash(hash)
                        .map(|m| m.public_key.to_vec())
                        .ok_or(SigningError::MissingSigningKey(ctx.index))?,
                };
                let hash = self.digest(ctx)?;
                log_debug!("signature_builder", "Collected digest", input = ctx.index, sighash = hex::encode(hash));
                self.hashes.push(HashPubkey {
                    hash,
                    public_key: public_key.clone(),
                });
                Ok((self.placeholder_signature(), public_key))
            }
            SigningMode::External(list) => {
                let slot = self.next_slot;
                let entry = list
                    .get(slot)
                    .cloned()
                    .ok_or(SigningError::MissingExternalSignature { index: ctx.index, slot })?;
                self.next_slot += 1;
                if !target.matches(&entry.public_key) {
                    return Err(SigningError::SignatureMismatch {
                        index: ctx.index,
                        reason: format!("public key for slot {} does not match the owning script", slot),
                    });
                }
                let hash = self.digest(ctx)?;
                let der = self.verify_external(&entry, &hash, ctx.index)?;
                let signature = self.with_hash_type(&der);
                self.signatures.push(SignaturePubkey::new(der, entry.public_key.clone()));
                Ok((signature, entry.public_key))
            }
            SigningMode::Normal => {
                let found = match target {
                    KeyTarget::PublicKey(key) => self.keys.by_public_key(key),
                    KeyTarget::Hash(hash) => self.keys.by_hash(hash),
                };
                let public_key = found
                    .map(|m| m.public_key.to_vec())
                    .unwrap_or_default();
                let secret = require_secret(found, ctx.index)?.secret_key()?;
                let hash = self.digest(ctx)?;
                let message = Message::from_digest(hash);
                let der = self.secp.sign_ecdsa(&message, &secret).serialize_der().to_vec();
                let signature = self.with_hash_type(&der);
                self.signatures.push(SignaturePubkey::new(der, public_key.clone()));
                Ok((signature, public_key))
            }
        }
    }

    /// Verify a supplied DER signature; returns its low-S encoding
    fn verify_external(
        &self,
        entry: &SignaturePubkey,
        hash: &[u8; 32],
        index: usize,
    ) -> SigningResult<Vec<u8>> {
        let mismatch = |reason: String| SigningError::SignatureMismatch { index, reason };
        let public_key = PublicKey::from_slice(&entry.public_key)
            .map_err(|e| mismatch(format!("invalid public key: {}", e)))?;
        let mut signature = Signature::from_der(&entry.signature)
            .map_err(|e| mismatch(format!("invalid DER signature: {}", e)))?;
        signature.normalize_s();
        self.secp
            .verify_ecdsa(&Message::from_digest(*hash), &signature, &public_key)
            .map_err(|_| mismatch("signature does not verify against the digest".to_string()))?;
        Ok(signature.serialize_der().to_vec())
    }
}
