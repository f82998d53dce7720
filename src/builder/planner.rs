//! Deterministic coin planner
//!
//! Accumulates coins in caller order until the payment and fee are covered.
//! Change under the dust threshold is folded into the fee. No selection
//! optimisation is attempted, so identical requests give identical plans.

use crate::script::{op_return_script, output_vsize, ScriptKind};
use crate::types::{
    checked_total, FeePolicy, OutputRequest, PlanFailure, SigningInput, TransactionPlan, UnspentCoin,
};

/// Version, counts and lock time
const TX_OVERHEAD: u64 = 10;

/// Coin planner with a per-output size allowance for variant suffixes
#[derive(Debug, Clone, Copy, Default)]
pub struct Planner {
    /// Bytes appended to every output script by the builder
    pub output_script_extra: u64,
}

impl Planner {
    pub fn new(output_script_extra: u64) -> Self {
        Self {
            output_script_extra,
        }
    }

    /// Estimated virtual size for a set of coins and outputs
    pub fn estimate_vsize(&self, coins: &[UnspentCoin], outputs: &[OutputRequest]) -> u64 {
        let inputs: u64 = coins
            .iter()
            .map(|coin| ScriptKind::classify(coin.script.as_bytes()).input_vsize())
            .sum();
        let outputs: u64 = outputs
            .iter()
            .map(|output| output_vsize(output.script.as_bytes()) + self.output_script_extra)
            .sum();
        TX_OVERHEAD + inputs + outputs
    }

    fn fee_for(&self, input: &SigningInput, coins: &[UnspentCoin], outputs: &[OutputRequest]) -> u64 {
        match input.fee {
            FeePolicy::Fixed(fee) => fee,
            FeePolicy::PerByte(rate) => rate.saturating_mul(self.estimate_vsize(coins, outputs)),
        }
    }

    /// Plan the request
    pub fn plan(&self, input: &SigningInput) -> TransactionPlan {
        if input.utxos.is_empty() {
            return TransactionPlan::failed(PlanFailure::NoCoins, 0);
        }
        let (total, extras) = match (
            checked_total(input.utxos.iter().map(|coin| coin.amount)),
            checked_total(input.extra_outputs.iter().map(|o| o.amount)),
        ) {
            (Some(total), Some(extras)) => (total, extras),
            _ => return TransactionPlan::failed(PlanFailure::AmountOverflow, 0),
        };
        if input.use_max_amount {
            return self.plan_max(input, total, extras);
        }
        if input.amount == 0 {
            return TransactionPlan::failed(PlanFailure::ZeroAmount, total);
        }
        if input.amount < input.policy.dust_threshold {
            return TransactionPlan::failed(PlanFailure::DustAmount, total);
        }

        let target = match input.amount.checked_add(extras) {
            Some(target) => target,
            None => return TransactionPlan::failed(PlanFailure::AmountOverflow, total),
        };
        let fixed = self.fixed_outputs(input, input.amount);
        let mut with_change = fixed.clone();
        with_change.push(OutputRequest::new(input.change_script.clone(), 0));

        let mut selected = Vec::new();
        let mut available = 0u64;
        for coin in &input.utxos {
            selected.push(coin.clone());
            available += coin.amount;

            let fee_without_change = self.fee_for(input, &selected, &fixed);
            if available < target.saturating_add(fee_without_change) {
                continue;
            }

            let fee_with_change = self.fee_for(input, &selected, &with_change);
            let change = available.saturating_sub(target.saturating_add(fee_with_change));
            let (fee, change) = if change >= input.policy.dust_threshold {
                (fee_with_change, change)
            } else {
                (available - target, 0)
            };

            let mut outputs = fixed;
            if change > 0 {
                let position = outputs.len() - usize::from(input.op_return.is_some());
                outputs.insert(position, OutputRequest::new(input.change_script.clone(), change));
            }
            return TransactionPlan {
                utxos: selected,
                amount: input.amount,
                available_amount: available,
                fee,
                change,
                outputs,
                error: None,
            };
        }

        TransactionPlan::failed(PlanFailure::InsufficientFunds, total)
    }

    /// Spend every coin, paying everything minus fee and extras to the recipient
    fn plan_max(&self, input: &SigningInput, total: u64, extras: u64) -> TransactionPlan {
        let sized = self.fixed_outputs(input, 0);
        let fee = self.fee_for(input, &input.utxos, &sized);
        let amount = match total.checked_sub(fee.saturating_add(extras)) {
            Some(amount) => amount,
            None => return TransactionPlan::failed(PlanFailure::InsufficientFunds, total),
        };
        if amount < input.policy.dust_threshold {
            return TransactionPlan::failed(PlanFailure::DustAmount, total);
        }
        TransactionPlan {
            utxos: input.utxos.clone(),
            amount,
            available_amount: total,
            fee,
            change: 0,
            outputs: self.fixed_outputs(input, amount),
            error: None,
        }
    }

    /// Recipient, extra outputs and OP_RETURN, in that order
    fn fixed_outputs(&self, input: &SigningInput, amount: u64) -> Vec<OutputRequest> {
        let mut outputs = vec![OutputRequest::new(input.to_script.clone(), amount)];
        outputs.extend(input.extra_outputs.iter().cloned());
        if let Some(data) = &input.op_return {
            outputs.push(OutputRequest::new(op_return_script(data), 0));
        }
        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{p2pkh_script, p2wpkh_script};
    use bitcoin::hashes::Hash;
    use bitcoin::{OutPoint, Txid};

    fn coin(n: u8, amount: u64) -> UnspentCoin {
        UnspentCoin::new(
            OutPoint::new(Txid::from_byte_array([n; 32]), 0),
            amount,
            p2wpkh_script(&[n; 20]),
        )
    }

    fn request(coins: Vec<UnspentCoin>, amount: u64) -> SigningInput {
        let mut input = SigningInput::new(coins, p2pkh_script(&[1; 20]), amount, p2wpkh_script(&[2; 20]));
        input.fee = FeePolicy::PerByte(10);
        input
    }

    #[test]
    fn test_accumulates_in_order() {
        let input = request(vec![coin(1, 5_000), coin(2, 20_000), coin(3, 50_000)], 15_000);
        let plan = Planner::default().plan(&input);
        assert!(plan.error.is_none());
        assert_eq!(plan.utxos.len(), 2);
        assert_eq!(plan.available_amount, 25_000);
        assert_eq!(plan.amount + plan.fee + plan.change, plan.available_amount);
        assert_eq!(plan.outputs.len(), 2);
        assert_eq!(plan.outputs[1].amount, plan.change);
    }

    #[test]
    fn test_dust_change_folds_into_fee() {
        let planner = Planner::default();
        let probe = request(vec![coin(1, 100_000)], 10_000);
        let fee_no_change = planner.fee_for(&probe, &probe.utxos, &planner.fixed_outputs(&probe, 10_000));
        // leave 100 sats over after the change-less fee
        let input = request(vec![coin(1, 10_000 + fee_no_change + 100)], 10_000);
        let plan = planner.plan(&input);
        assert_eq!(plan.change, 0);
        assert_eq!(plan.fee, fee_no_change + 100);
        assert_eq!(plan.outputs.len(), 1);
    }

    #[test]
    fn test_insufficient_funds() {
        let input = request(vec![coin(1, 1_000)], 5_000);
        let plan = Planner::default().plan(&input);
        assert_eq!(plan.error, Some(PlanFailure::InsufficientFunds));
        assert_eq!(plan.available_amount, 1_000);
        assert!(plan.utxos.is_empty());
    }

    #[test]
    fn test_request_failures() {
        let planner = Planner::default();
        assert_eq!(planner.plan(&request(vec![], 5_000)).error, Some(PlanFailure::NoCoins));
        assert_eq!(
            planner.plan(&request(vec![coin(1, 9_000)], 0)).error,
            Some(PlanFailure::ZeroAmount)
        );
        assert_eq!(
            planner.plan(&request(vec![coin(1, 9_000)], 100)).error,
            Some(PlanFailure::DustAmount)
        );
    }

    #[test]
    fn test_overflowing_coins_fail_cleanly() {
        let input = request(vec![coin(1, u64::MAX), coin(2, 2)], 40_000);
        let plan = Planner::default().plan(&input);
        assert_eq!(plan.error, Some(PlanFailure::AmountOverflow));

        let mut input = request(vec![coin(1, 100_000)], u64::MAX);
        input.extra_outputs.push(OutputRequest::new(p2pkh_script(&[3; 20]), 10));
        assert_eq!(Planner::default().plan(&input).error, Some(PlanFailure::AmountOverflow));
    }

    #[test]
    fn test_max_amount_spends_everything() {
        let mut input = request(vec![coin(1, 30_000), coin(2, 20_000)], 0);
        input.use_max_amount = true;
        let plan = Planner::default().plan(&input);
        assert!(plan.error.is_none());
        assert_eq!(plan.utxos.len(), 2);
        assert_eq!(plan.change, 0);
        assert_eq!(plan.amount + plan.fee, 50_000);
    }

    #[test]
    fn test_fixed_fee_and_op_return() {
        let mut input = request(vec![coin(1, 100_000)], 40_000);
        input.fee = FeePolicy::Fixed(1_000);
        input.op_return = Some(b"memo".to_vec());
        let plan = Planner::default().plan(&input);
        assert_eq!(plan.fee, 1_000);
        assert_eq!(plan.change, 59_000);
        // recipient, change, OP_RETURN
        assert_eq!(plan.outputs.len(), 3);
        assert_eq!(plan.outputs[1].amount, 59_000);
        assert_eq!(plan.outputs[2].amount, 0);
        assert_eq!(plan.outputs[2].script.as_bytes()[0], 0x6a);
    }

    #[test]
    fn test_output_allowance_raises_fee() {
        let input = request(vec![coin(1, 100_000)], 40_000);
        let plain = Planner::default().plan(&input);
        let padded = Planner::new(38).plan(&input);
        assert!(padded.fee > plain.fee);
    }
}
