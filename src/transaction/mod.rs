//! Chain Transaction Models
//!
//! Every supported variant shares the Bitcoin input/output/script model and
//! differs only in header fields, wire layout and signature-digest rules.
//! The shared shape lives in [`TransactionCore`]; each variant wraps it and
//! implements [`ChainTransaction`].

pub mod bitcoin;
pub mod bitcoin_diamond;
pub mod groestlcoin;
pub mod verge;
pub mod zcash;

use std::fmt;

use ::bitcoin::hashes::{sha256d, Hash};
use ::bitcoin::{OutPoint, ScriptBuf, Witness};

use crate::error::SigningResult;
use crate::types::ChainParams;

pub use self::bitcoin::BitcoinTransaction;
pub use self::bitcoin_diamond::BitcoinDiamondTransaction;
pub use self::groestlcoin::GroestlcoinTransaction;
pub use self::verge::VergeTransaction;
pub use self::zcash::ZcashTransaction;

// =============================================================================
// Sighash
// =============================================================================

/// Sighash type flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SighashType(u32);

impl SighashType {
    pub const ALL: u32 = 0x01;
    pub const NONE: u32 = 0x02;
    pub const SINGLE: u32 = 0x03;
    pub const FORKID: u32 = 0x40;
    pub const ANYONECANPAY: u32 = 0x80;

    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// ALL / NONE / SINGLE without modifier bits
    pub fn base(self) -> u32 {
        self.0 & 0x1f
    }

    pub fn anyone_can_pay(self) -> bool {
        self.0 & Self::ANYONECANPAY != 0
    }

    pub fn fork_id(self) -> bool {
        self.0 & Self::FORKID != 0
    }

    /// Byte appended to DER signatures
    pub fn signature_byte(self) -> u8 {
        (self.0 & 0xff) as u8
    }
}

/// Which digest algorithm applies to an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureVersion {
    /// Whole-transaction legacy digest
    Base,
    /// BIP-143 digest (segwit v0 and fork-id chains)
    WitnessV0,
}

// =============================================================================
// Shared Transaction Shape
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInput {
    pub previous_output: OutPoint,
    pub sequence: u32,
    pub script_sig: ScriptBuf,
    pub witness: Witness,
}

impl TransactionInput {
    pub fn new(previous_output: OutPoint, sequence: u32) -> Self {
        Self {
            previous_output,
            sequence,
            script_sig: ScriptBuf::new(),
            witness: Witness::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutput {
    pub value: u64,
    pub script_pubkey: ScriptBuf,
}

/// Version, lock time, inputs and outputs common to every variant
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionCore {
    pub version: i32,
    pub lock_time: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
}

/// A variant transaction the signature builder can hash and fill in
pub trait ChainTransaction: Clone + fmt::Debug {
    /// Variant name used in logs
    const NAME: &'static str;
    /// Version used when the request does not set one
    const DEFAULT_VERSION: i32;
    /// Whether inputs may carry witness data
    const SUPPORTS_WITNESS: bool = true;

    /// Wrap an unsigned core with the variant's header fields
    fn unsigned(core: TransactionCore, params: &ChainParams) -> SigningResult<Self>;

    fn core(&self) -> &TransactionCore;

    fn core_mut(&mut self) -> &mut TransactionCore;

    /// Signature digest for input `index`
    fn signature_hash(
        &self,
        script_code: &[u8],
        index: usize,
        hash_type: SighashType,
        amount: u64,
        version: SignatureVersion,
    ) -> SigningResult<[u8; 32]>;

    /// Wire encoding
    fn encode(&self, include_witness: bool) -> Vec<u8>;

    /// Virtual size (weight / 4, rounded up)
    fn vsize(&self) -> u64 {
        let base = self.encode(false).len() as u64;
        let total = self.encode(true).len() as u64;
        (base * 3 + total + 3) / 4
    }
}

/// Value of the legacy SIGHASH_SINGLE digest when the output is missing
pub(crate) const SINGLE_OUT_OF_RANGE: [u8; 32] = {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
};

pub(crate) fn write_compact_size(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => buf.push(n as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x10000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Length-prefixed byte string
pub(crate) fn write_var_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    write_compact_size(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

pub(crate) fn write_out_point(buf: &mut Vec<u8>, out_point: &OutPoint) {
    buf.extend_from_slice(&out_point.txid.to_byte_array());
    buf.extend_from_slice(&out_point.vout.to_le_bytes());
}

pub(crate) fn write_output(buf: &mut Vec<u8>, output: &TransactionOutput) {
    buf.extend_from_slice(&output.value.to_le_bytes());
    write_var_bytes(buf, output.script_pubkey.as_bytes());
}

impl TransactionCore {
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }

    pub(crate) fn write_inputs(&self, buf: &mut Vec<u8>) {
        write_compact_size(buf, self.inputs.len() as u64);
        for input in &self.inputs {
            write_out_point(buf, &input.previous_output);
            write_var_bytes(buf, input.script_sig.as_bytes());
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
    }

    pub(crate) fn write_outputs(&self, buf: &mut Vec<u8>) {
        write_compact_size(buf, self.outputs.len() as u64);
        for output in &self.outputs {
            write_output(buf, output);
        }
    }

    pub(crate) fn write_witnesses(&self, buf: &mut Vec<u8>) {
        for input in &self.inputs {
            write_compact_size(buf, input.witness.len() as u64);
            for item in input.witness.iter() {
                write_var_bytes(buf, item);
            }
        }
    }

    /// Bitcoin-layout encoding with optional extra header bytes after the version
    pub(crate) fn encode_with_header(&self, header_extra: &[u8], include_witness: bool) -> Vec<u8> {
        let witness = include_witness && self.has_witness();
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(header_extra);
        if witness {
            // segwit marker and flag
            buf.extend_from_slice(&[0x00, 0x01]);
        }
        self.write_inputs(&mut buf);
        self.write_outputs(&mut buf);
        if witness {
            self.write_witnesses(&mut buf);
        }
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    /// Legacy signature pre-image, or `None` for SIGHASH_SINGLE without a matching output
    pub(crate) fn legacy_preimage(
        &self,
        header_extra: &[u8],
        script_code: &[u8],
        index: usize,
        hash_type: SighashType,
    ) -> Option<Vec<u8>> {
        let base = hash_type.base();
        if base == SighashType::SINGLE && index >= self.outputs.len() {
            return None;
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(header_extra);

        let inputs: Vec<(usize, &TransactionInput)> = if hash_type.anyone_can_pay() {
            vec![(index, &self.inputs[index])]
        } else {
            self.inputs.iter().enumerate().collect()
        };
        write_compact_size(&mut buf, inputs.len() as u64);
        for (i, input) in inputs {
            write_out_point(&mut buf, &input.previous_output);
            if i == index {
                write_var_bytes(&mut buf, script_code);
            } else {
                buf.push(0x00);
            }
            let sequence = if i != index
                && (base == SighashType::NONE || base == SighashType::SINGLE)
            {
                0
            } else {
                input.sequence
            };
            buf.extend_from_slice(&sequence.to_le_bytes());
        }

        match base {
            SighashType::NONE => write_compact_size(&mut buf, 0),
            SighashType::SINGLE => {
                write_compact_size(&mut buf, index as u64 + 1);
                for _ in 0..index {
                    // blanked output: value -1, empty script
                    buf.extend_from_slice(&u64::MAX.to_le_bytes());
                    buf.push(0x00);
                }
                write_output(&mut buf, &self.outputs[index]);
            }
            _ => self.write_outputs(&mut buf),
        }

        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf.extend_from_slice(&hash_type.raw().to_le_bytes());
        Some(buf)
    }

    fn prevouts_hash(&self, hash_type: SighashType) -> [u8; 32] {
        if hash_type.anyone_can_pay() {
            return [0u8; 32];
        }
        let mut buf = Vec::with_capacity(self.inputs.len() * 36);
        for input in &self.inputs {
            write_out_point(&mut buf, &input.previous_output);
        }
        sha256d::Hash::hash(&buf).to_byte_array()
    }

    fn sequence_hash(&self, hash_type: SighashType) -> [u8; 32] {
        if hash_type.anyone_can_pay() || hash_type.base() != SighashType::ALL {
            return [0u8; 32];
        }
        let mut buf = Vec::with_capacity(self.inputs.len() * 4);
        for input in &self.inputs {
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        sha256d::Hash::hash(&buf).to_byte_array()
    }

    fn outputs_hash(&self, index: usize, hash_type: SighashType) -> [u8; 32] {
        let mut buf = Vec::new();
        match hash_type.base() {
            SighashType::NONE => return [0u8; 32],
            SighashType::SINGLE => match self.outputs.get(index) {
                Some(output) => write_output(&mut buf, output),
                None => return [0u8; 32],
            },
            _ => {
                for output in &self.outputs {
                    write_output(&mut buf, output);
                }
            }
        }
        sha256d::Hash::hash(&buf).to_byte_array()
    }

    /// BIP-143 signature pre-image
    pub(crate) fn witness_v0_preimage(
        &self,
        header_extra: &[u8],
        script_code: &[u8],
        index: usize,
        amount: u64,
        hash_type: SighashType,
    ) -> Vec<u8> {
        let input = &self.inputs[index];
        let mut buf = Vec::with_capacity(160 + script_code.len());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(header_extra);
        buf.extend_from_slice(&self.prevouts_hash(hash_type));
        buf.extend_from_slice(&self.sequence_hash(hash_type));
        write_out_point(&mut buf, &input.previous_output);
        write_var_bytes(&mut buf, script_code);
        buf.extend_from_slice(&amount.to_le_bytes());
        buf.extend_from_slice(&input.sequence.to_le_bytes());
        buf.extend_from_slice(&self.outputs_hash(index, hash_type));
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf.extend_from_slice(&hash_type.raw().to_le_bytes());
        buf
    }

    pub(crate) fn check_index(&self, index: usize) -> SigningResult<()> {
        if index >= self.inputs.len() {
            return Err(crate::error::SigningError::invalid_transaction(format!(
                "input index {} out of range ({} inputs)",
                index,
                self.inputs.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_size_boundaries() {
        let mut buf = Vec::new();
        write_compact_size(&mut buf, 0xfc);
        assert_eq!(buf, vec![0xfc]);

        buf.clear();
        write_compact_size(&mut buf, 0xfd);
        assert_eq!(buf, vec![0xfd, 0xfd, 0x00]);

        buf.clear();
        write_compact_size(&mut buf, 0x1_0000);
        assert_eq!(buf, vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_sighash_flags() {
        let ht = SighashType::new(SighashType::SINGLE | SighashType::ANYONECANPAY);
        assert_eq!(ht.base(), SighashType::SINGLE);
        assert!(ht.anyone_can_pay());
        assert!(!ht.fork_id());
        assert_eq!(ht.signature_byte(), 0x83);

        let forked = SighashType::new(SighashType::ALL | SighashType::FORKID);
        assert!(forked.fork_id());
        assert_eq!(forked.base(), SighashType::ALL);
    }

    #[test]
    fn test_single_without_output_has_no_preimage() {
        let core = TransactionCore {
            version: 1,
            lock_time: 0,
            inputs: vec![
                TransactionInput::new(OutPoint::null(), 0),
                TransactionInput::new(OutPoint::null(), 0),
            ],
            outputs: vec![TransactionOutput {
                value: 1,
                script_pubkey: ScriptBuf::new(),
            }],
        };
        let single = SighashType::new(SighashType::SINGLE);
        assert!(core.legacy_preimage(&[], &[0x51], 1, single).is_none());
        assert!(core.legacy_preimage(&[], &[0x51], 0, single).is_some());
    }
}
