//! Verge transaction model
//!
//! Carries a 32-bit `time` field right after the version. The field is part
//! of the wire encoding and of the legacy digest; BIP-143 digests omit it.

use super::bitcoin::{bitcoin_layout_digest, double_sha256};
use super::{ChainTransaction, SighashType, SignatureVersion, TransactionCore};
use crate::error::SigningResult;
use crate::types::ChainParams;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VergeTransaction {
    pub core: TransactionCore,
    pub time: u32,
}

impl ChainTransaction for VergeTransaction {
    const NAME: &'static str = "verge";
    const DEFAULT_VERSION: i32 = 1;

    fn unsigned(core: TransactionCore, params: &ChainParams) -> SigningResult<Self> {
        Ok(Self {
            core,
            time: params.time,
        })
    }

    fn core(&self) -> &TransactionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TransactionCore {
        &mut self.core
    }

    fn signature_hash(
        &self,
        script_code: &[u8],
        index: usize,
        hash_type: SighashType,
        amount: u64,
        version: SignatureVersion,
    ) -> SigningResult<[u8; 32]> {
        bitcoin_layout_digest(
            &self.core,
            &self.time.to_le_bytes(),
            &[],
            script_code,
            index,
            hash_type,
            amount,
            version,
            double_sha256,
        )
    }

    fn encode(&self, include_witness: bool) -> Vec<u8> {
        self.core
            .encode_with_header(&self.time.to_le_bytes(), include_witness)
    }
}
