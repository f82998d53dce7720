//! Groestlcoin transaction model
//!
//! Bitcoin layout; signature digests are a single SHA-256 of the pre-image.

use bitcoin::hashes::{sha256, Hash};

use super::bitcoin::bitcoin_layout_digest;
use super::{ChainTransaction, SighashType, SignatureVersion, TransactionCore};
use crate::error::SigningResult;
use crate::types::ChainParams;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroestlcoinTransaction {
    pub core: TransactionCore,
}

fn single_sha256(data: &[u8]) -> [u8; 32] {
    sha256::Hash::hash(data).to_byte_array()
}

impl ChainTransaction for GroestlcoinTransaction {
    const NAME: &'static str = "groestlcoin";
    const DEFAULT_VERSION: i32 = 1;

    fn unsigned(core: TransactionCore, _params: &ChainParams) -> SigningResult<Self> {
        Ok(Self { core })
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
            &[],
            &[],
            script_code,
            index,
            hash_type,
            amount,
            version,
            single_sha256,
        )
    }

    fn encode(&self, include_witness: bool) -> Vec<u8> {
        self.core.encode_with_header(&[], include_witness)
    }
}
