//! Zcash (Sapling, v4) transaction model
//!
//! Transparent inputs and outputs are signed with the ZIP-243 digest:
//! personalised BLAKE2b-256 over the header, prevouts, sequences, outputs
//! and the signed input, keyed to the consensus branch id. Shielded
//! sections are carried as opaque bytes.

use super::{
    write_compact_size, write_out_point, write_output, write_var_bytes, ChainTransaction,
    SighashType, SignatureVersion, TransactionCore,
};
use crate::error::{SigningError, SigningResult};
use crate::types::ChainParams;

/// Sapling consensus branch id
pub const SAPLING_BRANCH_ID: u32 = 0x76b8_09bb;
/// Sapling version group id
pub const SAPLING_VERSION_GROUP_ID: u32 = 0x892f_2085;
/// Sapling transaction version
pub const SAPLING_VERSION: i32 = 4;

const OVERWINTERED_FLAG: u32 = 1 << 31;
const PREVOUTS_PERSONA: &[u8; 16] = b"ZcashPrevoutHash";
const SEQUENCE_PERSONA: &[u8; 16] = b"ZcashSequencHash";
const OUTPUTS_PERSONA: &[u8; 16] = b"ZcashOutputsHash";
const SIGHASH_PERSONA_PREFIX: &[u8; 12] = b"ZcashSigHash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZcashTransaction {
    pub core: TransactionCore,
    pub version_group_id: u32,
    pub expiry_height: u32,
    pub branch_id: u32,
    pub value_balance: i64,
    /// Encoded spends, outputs and joinsplits; empty for transparent transactions
    pub shielded: Vec<u8>,
}

fn blake2b_256(persona: &[u8; 16], data: &[u8]) -> [u8; 32] {
    let hash = blake2b_simd::Params::new()
        .hash_length(32)
        .personal(persona)
        .hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

impl ZcashTransaction {
    fn header(&self) -> u32 {
        (self.core.version as u32) | OVERWINTERED_FLAG
    }

    fn prevouts_hash(&self, hash_type: SighashType) -> [u8; 32] {
        if hash_type.anyone_can_pay() {
            return [0u8; 32];
        }
        let mut buf = Vec::new();
        for input in &self.core.inputs {
            write_out_point(&mut buf, &input.previous_output);
        }
        blake2b_256(PREVOUTS_PERSONA, &buf)
    }

    fn sequence_hash(&self, hash_type: SighashType) -> [u8; 32] {
        if hash_type.anyone_can_pay() || hash_type.base() != SighashType::ALL {
            return [0u8; 32];
        }
        let mut buf = Vec::new();
        for input in &self.core.inputs {
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        blake2b_256(SEQUENCE_PERSONA, &buf)
    }

    fn outputs_hash(&self, index: usize, hash_type: SighashType) -> [u8; 32] {
        let mut buf = Vec::new();
        match hash_type.base() {
            SighashType::NONE => return [0u8; 32],
            SighashType::SINGLE => match self.core.outputs.get(index) {
                Some(output) => write_output(&mut buf, output),
                None => return [0u8; 32],
            },
            _ => {
                for output in &self.core.outputs {
                    write_output(&mut buf, output);
                }
            }
        }
        blake2b_256(OUTPUTS_PERSONA, &buf)
    }

    fn sighash_persona(&self) -> [u8; 16] {
        let mut persona = [0u8; 16];
        persona[..12].copy_from_slice(SIGHASH_PERSONA_PREFIX);
        persona[12..].copy_from_slice(&self.branch_id.to_le_bytes());
        persona
    }
}

impl ChainTransaction for ZcashTransaction {
    const NAME: &'static str = "zcash";
    const DEFAULT_VERSION: i32 = SAPLING_VERSION;
    const SUPPORTS_WITNESS: bool = false;

    fn unsigned(core: TransactionCore, params: &ChainParams) -> SigningResult<Self> {
        Ok(Self {
            core,
            version_group_id: SAPLING_VERSION_GROUP_ID,
            expiry_height: params.expiry_height,
            branch_id: params.branch_id,
            value_balance: 0,
            shielded: Vec::new(),
        })
    }

    fn core(&self) -> &TransactionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TransactionCore {
        &mut self.core
    }

    /// ZIP-243 digest; the signature version is ignored
    fn signature_hash(
        &self,
        script_code: &[u8],
        index: usize,
        hash_type: SighashType,
        amount: u64,
        _version: SignatureVersion,
    ) -> SigningResult<[u8; 32]> {
        self.core.check_index(index)?;
        if !self.shielded.is_empty() {
            return Err(SigningError::invalid_transaction(
                "shielded sections cannot be signed by the transparent signer",
            ));
        }

        let input = &self.core.inputs[index];
        let mut buf = Vec::with_capacity(256 + script_code.len());
        buf.extend_from_slice(&self.header().to_le_bytes());
        buf.extend_from_slice(&self.version_group_id.to_le_bytes());
        buf.extend_from_slice(&self.prevouts_hash(hash_type));
        buf.extend_from_slice(&self.sequence_hash(hash_type));
        buf.extend_from_slice(&self.outputs_hash(index, hash_type));
        // joinsplits, shielded spends, shielded outputs
        buf.extend_from_slice(&[0u8; 32 * 3]);
        buf.extend_from_slice(&self.core.lock_time.to_le_bytes());
        buf.extend_from_slice(&self.expiry_height.to_le_bytes());
        buf.extend_from_slice(&self.value_balance.to_le_bytes());
        buf.extend_from_slice(&hash_type.raw().to_le_bytes());
        write_out_point(&mut buf, &input.previous_output);
        write_var_bytes(&mut buf, script_code);
        buf.extend_from_slice(&amount.to_le_bytes());
        buf.extend_from_slice(&input.sequence.to_le_bytes());

        Ok(blake2b_256(&self.sighash_persona(), &buf))
    }

    fn encode(&self, _include_witness: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.header().to_le_bytes());
        buf.extend_from_slice(&self.version_group_id.to_le_bytes());
        self.core.write_inputs(&mut buf);
        self.core.write_outputs(&mut buf);
        buf.extend_from_slice(&self.core.lock_time.to_le_bytes());
        buf.extend_from_slice(&self.expiry_height.to_le_bytes());
        buf.extend_from_slice(&self.value_balance.to_le_bytes());
        if self.shielded.is_empty() {
            write_compact_size(&mut buf, 0); // spends
            write_compact_size(&mut buf, 0); // outputs
            write_compact_size(&mut buf, 0); // joinsplits
        } else {
            buf.extend_from_slice(&self.shielded);
        }
        buf
    }
}
