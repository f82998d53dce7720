//! Transaction signer
//!
//! Entry point for planning, signing and digest extraction. A signer is
//! parameterised by its builder, whose associated transaction type is the
//! chain variant it produces, and by the external service that handles the
//! delegated transaction class.

use crate::builder::{StandardBuilder, TransactionBuilder, ZenBuilder};
use crate::error::SigningResult;
use crate::signing::delegated::{sign_delegated, ExternalSigningService, NoService};
use crate::signing::signature_builder::{SignatureBuilder, SigningOutput};
use crate::transaction::{
    BitcoinDiamondTransaction, BitcoinTransaction, GroestlcoinTransaction, VergeTransaction,
    ZcashTransaction,
};
use crate::types::{HashPubkeyList, SignaturePubkeyList, SigningInput, SigningMode, TransactionPlan};
use crate::{log_debug, log_info, log_warn};

pub type BitcoinSigner<S = NoService> = TransactionSigner<StandardBuilder<BitcoinTransaction>, S>;
pub type ZcashSigner<S = NoService> = TransactionSigner<StandardBuilder<ZcashTransaction>, S>;
pub type ZenSigner<S = NoService> = TransactionSigner<ZenBuilder, S>;
pub type GroestlcoinSigner<S = NoService> = TransactionSigner<StandardBuilder<GroestlcoinTransaction>, S>;
pub type VergeSigner<S = NoService> = TransactionSigner<StandardBuilder<VergeTransaction>, S>;
pub type BitcoinDiamondSigner<S = NoService> =
    TransactionSigner<StandardBuilder<BitcoinDiamondTransaction>, S>;

#[derive(Debug, Clone, Default)]
pub struct TransactionSigner<B, S = NoService> {
    builder: B,
    service: S,
}

impl<B: TransactionBuilder + Default> TransactionSigner<B, NoService> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: TransactionBuilder> TransactionSigner<B, NoService> {
    /// Attach the service used for delegated requests
    pub fn with_service<S: ExternalSigningService>(self, service: S) -> TransactionSigner<B, S> {
        TransactionSigner {
            builder: self.builder,
            service,
        }
    }
}

impl<B, S> TransactionSigner<B, S>
where
    B: TransactionBuilder,
    S: ExternalSigningService,
{
    /// The builder's plan for this request
    pub fn plan(&self, input: &SigningInput) -> TransactionPlan {
        self.builder.plan(input)
    }

    /// Sign a request
    ///
    /// `estimation_mode` produces a size-accurate transaction with placeholder
    /// signatures. Otherwise supplied `external_signatures` are used in place
    /// of local keys.
    pub fn sign(
        &self,
        input: &SigningInput,
        estimation_mode: bool,
        external_signatures: Option<SignaturePubkeyList>,
    ) -> SigningResult<B::Transaction> {
        self.sign_with_signatures(input, estimation_mode, external_signatures)
            .map(|(transaction, _)| transaction)
    }

    /// Like [`sign`](Self::sign), also returning the signatures placed in the transaction
    pub fn sign_with_signatures(
        &self,
        input: &SigningInput,
        estimation_mode: bool,
        external_signatures: Option<SignaturePubkeyList>,
    ) -> SigningResult<(B::Transaction, SignaturePubkeyList)> {
        let plan = self.resolve_plan(input);

        if input.delegated {
            log_info!("signer", "Delegating transaction", inputs = plan.utxos.len());
            let transaction = sign_delegated::<B::Transaction, S>(&self.service, &plan, input)?;
            return Ok((transaction, Vec::new()));
        }

        let mode = if estimation_mode {
            SigningMode::SizeEstimationOnly
        } else if let Some(signatures) = external_signatures {
            SigningMode::External(signatures)
        } else {
            SigningMode::Normal
        };

        let output = self.run(&plan, input, mode)?;
        Ok((output.transaction, output.signatures))
    }

    /// Digests (with expected public keys) for every signature slot
    pub fn pre_image_hashes(&self, input: &SigningInput) -> SigningResult<HashPubkeyList> {
        let plan = self.resolve_plan(input);
        let output = self.run(&plan, input, SigningMode::HashOnly)?;
        Ok(output.hashes)
    }

    fn resolve_plan(&self, input: &SigningInput) -> TransactionPlan {
        match &input.plan {
            Some(plan) => {
                log_debug!("signer", "Using supplied plan", coins = plan.utxos.len());
                plan.clone()
            }
            None => self.builder.plan(input),
        }
    }

    fn run(
        &self,
        plan: &TransactionPlan,
        input: &SigningInput,
        mode: SigningMode,
    ) -> SigningResult<SigningOutput<B::Transaction>> {
        let mode_name = mode.name();
        let transaction = self.builder.build(plan, input).map_err(|e| {
            log_warn!("signer", "Build failed", mode = mode_name, error = e);
            e
        })?;
        log_debug!("signer", "Signing", mode = mode_name, fee = plan.fee, change = plan.change);
        SignatureBuilder::new(transaction, plan, input, mode)?.sign()
    }
}
