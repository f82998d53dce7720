//! Transaction builders
//!
//! A builder turns a [`SigningInput`] into a [`TransactionPlan`] and a plan
//! into an unsigned variant transaction. Each builder names the transaction
//! model it produces, which fixes the signer's output type.

pub mod planner;

use std::marker::PhantomData;

use crate::error::{SigningError, SigningResult};
use crate::log_debug;
use crate::script::with_replay_protection;
use crate::transaction::{
    BitcoinTransaction, ChainTransaction, TransactionCore, TransactionInput, TransactionOutput,
};
use crate::types::{checked_total, SigningInput, TransactionPlan};

pub use planner::Planner;

/// `<32-byte hash push> <height push> OP_CHECKBLOCKATHEIGHT`, upper bound
const REPLAY_SUFFIX_BYTES: u64 = 38;

/// Plans and builds unsigned transactions for one chain variant
pub trait TransactionBuilder {
    type Transaction: ChainTransaction;

    fn plan(&self, input: &SigningInput) -> TransactionPlan;

    fn build(
        &self,
        plan: &TransactionPlan,
        input: &SigningInput,
    ) -> SigningResult<Self::Transaction>;
}

/// Unsigned core from a plan: inputs in plan order, outputs as planned
fn core_from_plan<T: ChainTransaction>(
    plan: &TransactionPlan,
    input: &SigningInput,
) -> SigningResult<TransactionCore> {
    plan.ensure_buildable()?;

    let spent = checked_total(plan.outputs.iter().map(|o| o.amount))
        .ok_or_else(|| SigningError::invalid_transaction("output amounts overflow"))?;
    if spent > plan.available_amount {
        return Err(SigningError::invalid_transaction(format!(
            "outputs ({}) exceed available amount ({})",
            spent, plan.available_amount
        )));
    }

    let inputs = plan
        .utxos
        .iter()
        .map(|coin| TransactionInput::new(coin.out_point, input.sequence_for(coin)))
        .collect();
    let outputs = plan
        .outputs
        .iter()
        .map(|output| TransactionOutput {
            value: output.amount,
            script_pubkey: output.script.clone(),
        })
        .collect();

    Ok(TransactionCore {
        version: input.chain.version.unwrap_or(T::DEFAULT_VERSION),
        lock_time: input.lock_time,
        inputs,
        outputs,
    })
}

/// Builder for variants whose outputs need no rewriting
#[derive(Debug, Clone, Copy)]
pub struct StandardBuilder<T> {
    planner: Planner,
    _transaction: PhantomData<T>,
}

impl<T> Default for StandardBuilder<T> {
    fn default() -> Self {
        Self {
            planner: Planner::default(),
            _transaction: PhantomData,
        }
    }
}

impl<T: ChainTransaction> TransactionBuilder for StandardBuilder<T> {
    type Transaction = T;

    fn plan(&self, input: &SigningInput) -> TransactionPlan {
        self.planner.plan(input)
    }

    fn build(&self, plan: &TransactionPlan, input: &SigningInput) -> SigningResult<T> {
        let core = core_from_plan::<T>(plan, input)?;
        log_debug!(
            "builder",
            "Built unsigned transaction",
            chain = T::NAME,
            inputs = core.inputs.len(),
            outputs = core.outputs.len()
        );
        T::unsigned(core, &input.chain)
    }
}

/// Horizen builder: Bitcoin model with replay-protected output scripts
#[derive(Debug, Clone, Copy)]
pub struct ZenBuilder {
    planner: Planner,
}

impl Default for ZenBuilder {
    fn default() -> Self {
        Self {
            planner: Planner::new(REPLAY_SUFFIX_BYTES),
        }
    }
}

impl TransactionBuilder for ZenBuilder {
    type Transaction = BitcoinTransaction;

    fn plan(&self, input: &SigningInput) -> TransactionPlan {
        self.planner.plan(input)
    }

    fn build(
        &self,
        plan: &TransactionPlan,
        input: &SigningInput,
    ) -> SigningResult<BitcoinTransaction> {
        let block_hash = input.chain.replay_block_hash.ok_or_else(|| {
            SigningError::planning("replay protection requires a block hash")
        })?;
        let mut core = core_from_plan::<BitcoinTransaction>(plan, input)?;
        for output in core.outputs.iter_mut() {
            // data carriers are unspendable and left as-is
            if output.script_pubkey.is_op_return() {
                continue;
            }
            output.script_pubkey = with_replay_protection(
                output.script_pubkey.as_bytes(),
                &block_hash,
                input.chain.replay_block_height,
            )?;
        }
        log_debug!(
            "builder",
            "Built replay-protected transaction",
            inputs = core.inputs.len(),
            block_height = input.chain.replay_block_height
        );
        BitcoinTransaction::unsigned(core, &input.chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{p2pkh_script, ScriptKind};
    use crate::transaction::{VergeTransaction, ZcashTransaction};
    use crate::types::{ChainParams, FeePolicy, UnspentCoin};
    use bitcoin::hashes::Hash;
    use bitcoin::{OutPoint, Txid};

    fn input() -> SigningInput {
        let coin = UnspentCoin::new(
            OutPoint::new(Txid::from_byte_array([4; 32]), 1),
            100_000,
            p2pkh_script(&[9; 20]),
        )
        .with_sequence(0xffff_fffd);
        let mut input = SigningInput::new(
            vec![coin],
            p2pkh_script(&[1; 20]),
            30_000,
            p2pkh_script(&[2; 20]),
        );
        input.fee = FeePolicy::Fixed(2_000);
        input.lock_time = 7;
        input
    }

    #[test]
    fn test_standard_build_follows_plan() {
        let builder = StandardBuilder::<BitcoinTransaction>::default();
        let input = input();
        let plan = builder.plan(&input);
        let tx = builder.build(&plan, &input).unwrap();
        assert_eq!(tx.core.version, 1);
        assert_eq!(tx.core.lock_time, 7);
        assert_eq!(tx.core.inputs[0].sequence, 0xffff_fffd);
        assert_eq!(tx.core.outputs.len(), 2);
        assert_eq!(tx.core.outputs[1].value, 68_000);
    }

    #[test]
    fn test_variant_default_versions() {
        let input = input();
        let zcash = StandardBuilder::<ZcashTransaction>::default();
        let tx = zcash.build(&zcash.plan(&input), &input).unwrap();
        assert_eq!(tx.core.version, 4);

        let mut input = input;
        input.chain = ChainParams {
            version: Some(2),
            time: 99,
            ..ChainParams::default()
        };
        let verge = StandardBuilder::<VergeTransaction>::default();
        let tx = verge.build(&verge.plan(&input), &input).unwrap();
        assert_eq!(tx.core.version, 2);
        assert_eq!(tx.time, 99);
    }

    #[test]
    fn test_failed_plan_propagates() {
        let builder = StandardBuilder::<BitcoinTransaction>::default();
        let mut input = input();
        input.amount = 1_000_000;
        let plan = builder.plan(&input);
        let err = builder.build(&plan, &input).unwrap_err();
        assert!(matches!(err, SigningError::PlanningFailed(_)));
    }

    #[test]
    fn test_zen_outputs_are_replay_protected() {
        let builder = ZenBuilder::default();
        let mut input = input();
        input.chain.replay_block_hash = Some([0x11; 32]);
        input.chain.replay_block_height = 142_091;
        let tx = builder.build(&builder.plan(&input), &input).unwrap();
        for output in &tx.core.outputs {
            assert!(matches!(
                ScriptKind::classify(output.script_pubkey.as_bytes()),
                ScriptKind::PayToPublicKeyHashReplay { .. }
            ));
        }
    }

    #[test]
    fn test_overflowing_supplied_plan_is_rejected() {
        let builder = StandardBuilder::<BitcoinTransaction>::default();
        let input = input();
        let mut plan = builder.plan(&input);
        plan.outputs[0].amount = u64::MAX;
        plan.outputs[1].amount = 2;
        let err = builder.build(&plan, &input).unwrap_err();
        assert!(matches!(err, SigningError::InvalidTransaction(_)));
    }

    #[test]
    fn test_zen_requires_block_hash() {
        let builder = ZenBuilder::default();
        let input = input();
        assert!(builder.build(&builder.plan(&input), &input).is_err());
    }
}
