//! Bitcoin Diamond transaction model
//!
//! Version 12 transactions carry the previous block hash after the version,
//! both on the wire and in every signature pre-image.

use super::bitcoin::{bitcoin_layout_digest, double_sha256};
use super::{ChainTransaction, SighashType, SignatureVersion, TransactionCore};
use crate::error::{SigningError, SigningResult};
use crate::types::ChainParams;

/// Version that carries the previous block hash
pub const PREBLOCKHASH_VERSION: i32 = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitcoinDiamondTransaction {
    pub core: TransactionCore,
    /// Previous block hash, display byte order
    pub previous_block_hash: [u8; 32],
}

impl BitcoinDiamondTransaction {
    /// Header bytes following the version
    fn header_extra(&self) -> Vec<u8> {
        if self.core.version != PREBLOCKHASH_VERSION {
            return Vec::new();
        }
        let mut hash = self.previous_block_hash.to_vec();
        hash.reverse();
        hash
    }
}

impl ChainTransaction for BitcoinDiamondTransaction {
    const NAME: &'static str = "bitcoin_diamond";
    const DEFAULT_VERSION: i32 = PREBLOCKHASH_VERSION;

    /// Version 12 needs the previous block hash
    fn unsigned(core: TransactionCore, params: &ChainParams) -> SigningResult<Self> {
        let previous_block_hash = match params.previous_block_hash {
            Some(hash) => hash,
            None if core.version == PREBLOCKHASH_VERSION => {
                return Err(SigningError::planning(
                    "version 12 transactions require the previous block hash",
                ));
            }
            None => [0u8; 32],
        };
        Ok(Self {
            core,
            previous_block_hash,
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
        let header = self.header_extra();
        bitcoin_layout_digest(
            &self.core,
            &header,
            &header,
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
            .encode_with_header(&self.header_extra(), include_witness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionInput;
    use bitcoin::OutPoint;

    fn diamond(version: i32) -> BitcoinDiamondTransaction {
        let core = TransactionCore {
            version,
            lock_time: 0,
            inputs: vec![TransactionInput::new(OutPoint::null(), 0xffff_ffff)],
            outputs: vec![],
        };
        let mut hash = [0u8; 32];
        hash[0] = 0xaa;
        let params = ChainParams {
            previous_block_hash: Some(hash),
            ..ChainParams::default()
        };
        BitcoinDiamondTransaction::unsigned(core, &params).unwrap()
    }

    #[test]
    fn test_version_12_carries_block_hash() {
        let encoded = diamond(12).encode(false);
        // reversed into internal order
        assert_eq!(encoded[4 + 31], 0xaa);
        assert_eq!(encoded.len(), diamond(2).encode(false).len() + 32);
    }

    #[test]
    fn test_other_versions_are_plain_bitcoin() {
        let tx = diamond(2);
        assert!(tx.header_extra().is_empty());
    }

    #[test]
    fn test_version_12_without_block_hash_fails() {
        let core = TransactionCore {
            version: PREBLOCKHASH_VERSION,
            ..TransactionCore::default()
        };
        let err = BitcoinDiamondTransaction::unsigned(core.clone(), &ChainParams::default()).unwrap_err();
        assert!(matches!(err, SigningError::PlanningFailed(_)));

        let plain = TransactionCore { version: 2, ..core };
        assert!(BitcoinDiamondTransaction::unsigned(plain, &ChainParams::default()).is_ok());
    }
}
