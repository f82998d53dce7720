//! Bitcoin transaction model
//!
//! Also used by Horizen (replay protection lives in the output scripts) and
//! by fork-id chains, whose signatures always use the BIP-143 digest.

use bitcoin::hashes::{sha256d, Hash};

use super::{ChainTransaction, SighashType, SignatureVersion, TransactionCore, SINGLE_OUT_OF_RANGE};
use crate::error::SigningResult;
use crate::types::ChainParams;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitcoinTransaction {
    pub core: TransactionCore,
}

/// Digest shared by the Bitcoin-layout variants, parameterised by header bytes and final hash
#[allow(clippy::too_many_arguments)]
pub(crate) fn bitcoin_layout_digest(
    core: &TransactionCore,
    header_extra: &[u8],
    witness_header_extra: &[u8],
    script_code: &[u8],
    index: usize,
    hash_type: SighashType,
    amount: u64,
    version: SignatureVersion,
    finish: fn(&[u8]) -> [u8; 32],
) -> SigningResult<[u8; 32]> {
    core.check_index(index)?;
    if version == SignatureVersion::WitnessV0 || hash_type.fork_id() {
        let preimage =
            core.witness_v0_preimage(witness_header_extra, script_code, index, amount, hash_type);
        return Ok(finish(&preimage));
    }
    match core.legacy_preimage(header_extra, script_code, index, hash_type) {
        Some(preimage) => Ok(finish(&preimage)),
        None => Ok(SINGLE_OUT_OF_RANGE),
    }
}

pub(crate) fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(data).to_byte_array()
}

impl ChainTransaction for BitcoinTransaction {
    const NAME: &'static str = "bitcoin";
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
            double_sha256,
        )
    }

    fn encode(&self, include_witness: bool) -> Vec<u8> {
        self.core.encode_with_header(&[], include_witness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TransactionInput, TransactionOutput};
    use bitcoin::{OutPoint, ScriptBuf, Txid};

    fn txid(hex_str: &str) -> Txid {
        let bytes: [u8; 32] = hex::decode(hex_str).unwrap().try_into().unwrap();
        Txid::from_byte_array(bytes)
    }

    fn script(hex_str: &str) -> ScriptBuf {
        ScriptBuf::from_bytes(hex::decode(hex_str).unwrap())
    }

    /// Native P2WPKH example from BIP-143
    fn bip143_native_p2wpkh() -> BitcoinTransaction {
        let core = TransactionCore {
            version: 1,
            lock_time: 0x11,
            inputs: vec![
                TransactionInput::new(
                    OutPoint::new(
                        txid("fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f"),
                        0,
                    ),
                    0xffff_ffee,
                ),
                TransactionInput::new(
                    OutPoint::new(
                        txid("ef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b90ec68a"),
                        1,
                    ),
                    0xffff_ffff,
                ),
            ],
            outputs: vec![
                TransactionOutput {
                    value: 112_340_000,
                    script_pubkey: script("76a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac"),
                },
                TransactionOutput {
                    value: 223_450_000,
                    script_pubkey: script("76a9143bde42dbee7e4dbe6a21b2d50ce2f0167faa815988ac"),
                },
            ],
        };
        BitcoinTransaction::unsigned(core, &ChainParams::default()).unwrap()
    }

    #[test]
    fn test_bip143_native_p2wpkh_digest() {
        let tx = bip143_native_p2wpkh();
        let digest = tx
            .signature_hash(
                &hex::decode("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac").unwrap(),
                1,
                SighashType::new(SighashType::ALL),
                600_000_000,
                SignatureVersion::WitnessV0,
            )
            .unwrap();
        assert_eq!(
            hex::encode(digest),
            "c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670"
        );
    }

    #[test]
    fn test_unsigned_encoding_layout() {
        let tx = bip143_native_p2wpkh();
        let encoded = hex::encode(tx.encode(true));
        // no witness yet, so no marker/flag
        assert!(encoded.starts_with("0100000002fff7f788"));
        assert!(encoded.ends_with("11000000"));
        assert_eq!(tx.encode(true), tx.encode(false));
    }

    #[test]
    fn test_fork_id_uses_witness_digest() {
        let tx = bip143_native_p2wpkh();
        let code = hex::decode("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac").unwrap();
        let forked = SighashType::new(SighashType::ALL | SighashType::FORKID);
        let base = tx
            .signature_hash(&code, 1, forked, 600_000_000, SignatureVersion::Base)
            .unwrap();
        let witness = tx
            .signature_hash(&code, 1, forked, 600_000_000, SignatureVersion::WitnessV0)
            .unwrap();
        assert_eq!(base, witness);
    }

    #[test]
    fn test_legacy_single_out_of_range() {
        let mut tx = bip143_native_p2wpkh();
        tx.core.outputs.truncate(1);
        let digest = tx
            .signature_hash(
                &[0x51],
                1,
                SighashType::new(SighashType::SINGLE),
                0,
                SignatureVersion::Base,
            )
            .unwrap();
        assert_eq!(digest, SINGLE_OUT_OF_RANGE);
    }

    #[test]
    fn test_index_out_of_range() {
        let tx = bip143_native_p2wpkh();
        assert!(tx
            .signature_hash(&[], 5, SighashType::new(1), 0, SignatureVersion::Base)
            .is_err());
    }
}
