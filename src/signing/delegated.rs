//! Delegated transaction class
//!
//! Some transactions (inscription-style token transfers) are built and
//! signed whole by an external signing service. The signer only translates:
//! plan + request fields go out as a bincode-encoded [`DelegatedSigningRequest`],
//! and the returned [`DelegatedSigningResponse`] is rebuilt into the variant
//! transaction. Claim data lands in the scriptSig for P2PKH coins and in a
//! single-element witness for everything else.

use std::fmt;
use std::str::FromStr;

use bitcoin::{OutPoint, ScriptBuf, Txid, Witness};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{SigningError, SigningResult};
use crate::script::ScriptKind;
use crate::transaction::{ChainTransaction, TransactionCore, TransactionInput, TransactionOutput};
use crate::types::{SigningInput, TransactionPlan};
use crate::{log_debug, log_error};

/// Boundary to the external signing service: opaque bytes in, opaque bytes out
pub trait ExternalSigningService {
    fn sign(&self, request: &[u8]) -> SigningResult<Vec<u8>>;
}

impl<F> ExternalSigningService for F
where
    F: Fn(&[u8]) -> SigningResult<Vec<u8>>,
{
    fn sign(&self, request: &[u8]) -> SigningResult<Vec<u8>> {
        self(request)
    }
}

/// Placeholder service for signers that never handle delegated requests
#[derive(Debug, Clone, Copy, Default)]
pub struct NoService;

impl ExternalSigningService for NoService {
    fn sign(&self, _request: &[u8]) -> SigningResult<Vec<u8>> {
        Err(SigningError::delegated("no external signing service configured"))
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedInput {
    /// Previous txid, display (reversed) hex
    pub txid: String,
    pub vout: u32,
    pub sequence: u32,
    pub amount: u64,
    pub script: Vec<u8>,
    pub claim_script: Vec<u8>,
    /// Claim data belongs in the scriptSig rather than the witness
    pub claim_via_script_sig: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedOutput {
    pub amount: u64,
    pub script: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedSigningRequest {
    pub version: i32,
    pub lock_time: u32,
    pub hash_type: u32,
    pub inputs: Vec<DelegatedInput>,
    pub outputs: Vec<DelegatedOutput>,
    pub private_keys: Vec<Vec<u8>>,
}

impl fmt::Debug for DelegatedSigningRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedSigningRequest")
            .field("version", &self.version)
            .field("lock_time", &self.lock_time)
            .field("hash_type", &self.hash_type)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("private_keys", &format_args!("[REDACTED; {}]", self.private_keys.len()))
            .finish()
    }
}

impl Drop for DelegatedSigningRequest {
    fn drop(&mut self) {
        self.private_keys.zeroize();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedSignedInput {
    pub txid: String,
    pub vout: u32,
    pub sequence: u32,
    pub claim_script: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedSigningResponse {
    pub version: i32,
    pub lock_time: u32,
    pub inputs: Vec<DelegatedSignedInput>,
    pub outputs: Vec<DelegatedOutput>,
}

// =============================================================================
// Translation
// =============================================================================

impl DelegatedSigningRequest {
    pub fn from_plan<T: ChainTransaction>(plan: &TransactionPlan, input: &SigningInput) -> SigningResult<Self> {
        plan.ensure_buildable()?;
        let inputs = plan
            .utxos
            .iter()
            .map(|coin| DelegatedInput {
                txid: coin.out_point.txid.to_string(),
                vout: coin.out_point.vout,
                sequence: input.sequence_for(coin),
                amount: coin.amount,
                script: coin.script.to_bytes(),
                claim_script: coin.claim_script.clone().unwrap_or_default(),
                claim_via_script_sig: matches!(
                    ScriptKind::classify(coin.script.as_bytes()),
                    ScriptKind::PayToPublicKeyHash { .. }
                ),
            })
            .collect();
        let outputs = plan
            .outputs
            .iter()
            .map(|output| DelegatedOutput {
                amount: output.amount,
                script: output.script.to_bytes(),
            })
            .collect();
        Ok(Self {
            version: input.chain.version.unwrap_or(T::DEFAULT_VERSION),
            lock_time: input.lock_time,
            hash_type: input.hash_type,
            inputs,
            outputs,
            private_keys: input
                .private_keys
                .iter()
                .map(|key| key.secret_bytes().to_vec())
                .collect(),
        })
    }

    /// Encoded request; the buffer holds key material and is wiped on drop
    pub fn encode(&self) -> SigningResult<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(bincode::serialize(self)?))
    }
}

impl DelegatedSigningResponse {
    pub fn decode(bytes: &[u8]) -> SigningResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn encode(&self) -> SigningResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Rebuild the variant transaction, checking inputs against the request
    pub fn into_transaction<T: ChainTransaction>(
        self,
        request: &DelegatedSigningRequest,
        input: &SigningInput,
    ) -> SigningResult<T> {
        if self.inputs.len() != request.inputs.len() {
            return Err(SigningError::delegated(format!(
                "response has {} inputs, request had {}",
                self.inputs.len(),
                request.inputs.len()
            )));
        }

        let mut inputs = Vec::with_capacity(self.inputs.len());
        for (index, (signed, requested)) in self.inputs.iter().zip(&request.inputs).enumerate() {
            let out_point = OutPoint::new(parse_txid(&signed.txid)?, signed.vout);
            let expected = OutPoint::new(parse_txid(&requested.txid)?, requested.vout);
            if out_point != expected {
                return Err(SigningError::delegated(format!(
                    "response input {} spends {}, expected {}",
                    index, out_point, expected
                )));
            }
            let mut tx_input = TransactionInput::new(out_point, signed.sequence);
            if requested.claim_via_script_sig {
                tx_input.script_sig = ScriptBuf::from_bytes(signed.claim_script.clone());
            } else {
                tx_input.witness = Witness::from_slice(&[signed.claim_script.as_slice()]);
            }
            inputs.push(tx_input);
        }

        let outputs = self
            .outputs
            .into_iter()
            .map(|output| TransactionOutput {
                value: output.amount,
                script_pubkey: ScriptBuf::from_bytes(output.script),
            })
            .collect();

        let core = TransactionCore {
            version: self.version,
            lock_time: self.lock_time,
            inputs,
            outputs,
        };
        T::unsigned(core, &input.chain)
    }
}

fn parse_txid(txid: &str) -> SigningResult<Txid> {
    Txid::from_str(txid).map_err(|e| SigningError::delegated(format!("invalid txid {}: {}", txid, e)))
}

/// Run the delegated path end to end
pub fn sign_delegated<T, S>(service: &S, plan: &TransactionPlan, input: &SigningInput) -> SigningResult<T>
where
    T: ChainTransaction,
    S: ExternalSigningService + ?Sized,
{
    let request = DelegatedSigningRequest::from_plan::<T>(plan, input)?;
    let encoded = request.encode()?;
    log_debug!(
        "delegated",
        "Sending delegated signing request",
        inputs = request.inputs.len(),
        outputs = request.outputs.len(),
        bytes = encoded.len()
    );

    let reply = service.sign(&encoded).map_err(|e| match e {
        SigningError::DelegatedServiceFailure(_) => e,
        other => SigningError::delegated(other.to_string()),
    });
    let reply = match reply {
        Ok(bytes) => bytes,
        Err(e) => {
            log_error!("delegated", "External signing service failed", error = e);
            return Err(e);
        }
    };

    DelegatedSigningResponse::decode(&reply)?.into_transaction(&request, input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{p2pkh_script, p2wpkh_script};
    use crate::transaction::BitcoinTransaction;
    use crate::types::{OutputRequest, UnspentCoin};
    use bitcoin::hashes::Hash;

    fn plan_and_input() -> (TransactionPlan, SigningInput) {
        let coins = vec![
            UnspentCoin::new(
                OutPoint::new(Txid::from_byte_array([0xab; 32]), 0),
                10_000,
                p2wpkh_script(&[1; 20]),
            )
            .with_claim_script(vec![0xaa; 10]),
            UnspentCoin::new(
                OutPoint::new(Txid::from_byte_array([2; 32]), 3),
                20_000,
                p2pkh_script(&[2; 20]),
            )
            .with_claim_script(vec![0xbb; 10]),
        ];
        let mut input = SigningInput::new(coins.clone(), p2pkh_script(&[3; 20]), 546, p2pkh_script(&[4; 20]));
        input.delegated = true;
        input.add_private_key(&[0x11; 32]).unwrap();
        let plan = TransactionPlan {
            utxos: coins,
            amount: 546,
            available_amount: 30_000,
            fee: 1_000,
            change: 28_454,
            outputs: vec![
                OutputRequest::new(p2pkh_script(&[3; 20]), 546),
                OutputRequest::new(p2pkh_script(&[4; 20]), 28_454),
            ],
            error: None,
        };
        (plan, input)
    }

    fn echo_response(request: &DelegatedSigningRequest) -> DelegatedSigningResponse {
        DelegatedSigningResponse {
            version: 2,
            lock_time: 840_000,
            inputs: request
                .inputs
                .iter()
                .map(|i| DelegatedSignedInput {
                    txid: i.txid.clone(),
                    vout: i.vout,
                    sequence: i.sequence,
                    claim_script: i.claim_script.clone(),
                })
                .collect(),
            outputs: request.outputs.clone(),
        }
    }

    #[test]
    fn test_request_marks_p2pkh_for_script_sig() {
        let (plan, input) = plan_and_input();
        let request = DelegatedSigningRequest::from_plan::<BitcoinTransaction>(&plan, &input).unwrap();
        assert!(!request.inputs[0].claim_via_script_sig);
        assert!(request.inputs[1].claim_via_script_sig);
        assert_eq!(request.private_keys.len(), 1);
        assert!(!format!("{:?}", request).contains("17, 17"));
    }

    #[test]
    fn test_response_reconstruction() {
        let (plan, input) = plan_and_input();
        let request = DelegatedSigningRequest::from_plan::<BitcoinTransaction>(&plan, &input).unwrap();
        let tx: BitcoinTransaction = echo_response(&request)
            .into_transaction(&request, &input)
            .unwrap();
        assert_eq!(tx.core.version, 2);
        assert_eq!(tx.core.lock_time, 840_000);
        assert!(tx.core.inputs[0].script_sig.is_empty());
        assert_eq!(tx.core.inputs[0].witness.len(), 1);
        assert_eq!(tx.core.inputs[1].script_sig.as_bytes(), &[0xbb; 10]);
        assert!(tx.core.inputs[1].witness.is_empty());
    }

    #[test]
    fn test_reordered_response_rejected() {
        let (plan, input) = plan_and_input();
        let request = DelegatedSigningRequest::from_plan::<BitcoinTransaction>(&plan, &input).unwrap();
        let mut response = echo_response(&request);
        response.inputs.swap(0, 1);
        let err = response
            .into_transaction::<BitcoinTransaction>(&request, &input)
            .unwrap_err();
        assert!(matches!(err, SigningError::DelegatedServiceFailure(_)));
    }

    #[test]
    fn test_txid_case_is_not_significant() {
        let (plan, input) = plan_and_input();
        let request = DelegatedSigningRequest::from_plan::<BitcoinTransaction>(&plan, &input).unwrap();
        let mut response = echo_response(&request);
        response.inputs[0].txid = response.inputs[0].txid.to_uppercase();
        assert_ne!(response.inputs[0].txid, request.inputs[0].txid);

        let tx: BitcoinTransaction = response.into_transaction(&request, &input).unwrap();
        assert_eq!(tx.core.inputs[0].previous_output, plan.utxos[0].out_point);
    }

    #[test]
    fn test_malformed_txid_is_service_failure() {
        let (plan, input) = plan_and_input();
        let request = DelegatedSigningRequest::from_plan::<BitcoinTransaction>(&plan, &input).unwrap();
        let mut response = echo_response(&request);
        response.inputs[1].txid = "not-a-txid".to_string();
        let err = response
            .into_transaction::<BitcoinTransaction>(&request, &input)
            .unwrap_err();
        assert!(matches!(err, SigningError::DelegatedServiceFailure(_)));
    }

    #[test]
    fn test_service_roundtrip_over_bytes() {
        let (plan, input) = plan_and_input();
        let service = |bytes: &[u8]| -> SigningResult<Vec<u8>> {
            let request: DelegatedSigningRequest = bincode::deserialize(bytes)?;
            echo_response(&request).encode()
        };
        let tx: BitcoinTransaction = sign_delegated(&service, &plan, &input).unwrap();
        assert_eq!(tx.core.inputs.len(), 2);
    }

    #[test]
    fn test_garbage_response_is_service_failure() {
        let (plan, input) = plan_and_input();
        let service = |_: &[u8]| -> SigningResult<Vec<u8>> { Ok(vec![0xff]) };
        let err = sign_delegated::<BitcoinTransaction, _>(&service, &plan, &input).unwrap_err();
        assert!(matches!(err, SigningError::DelegatedServiceFailure(_)));
    }

    #[test]
    fn test_no_service() {
        let (plan, input) = plan_and_input();
        let err = sign_delegated::<BitcoinTransaction, _>(&NoService, &plan, &input).unwrap_err();
        assert!(matches!(err, SigningError::DelegatedServiceFailure(_)));
    }
}
