//! Hawala UTXO Signer
//!
//! Plans, builds and signs transactions for Bitcoin and its UTXO forks.
//!
//! # Architecture
//!
//! This crate provides:
//! - **transaction**: Per-chain transaction models (Bitcoin, Zcash, Groestlcoin, Verge, Bitcoin Diamond)
//! - **builder**: Deterministic planning and unsigned transaction construction
//! - **signing**: Signature builder, signer entry point and the delegated signing boundary
//! - **script**: Owning-script classification and unlocking data
//! - **utils**: Logging and configuration
//!
//! # Modes
//!
//! A signer produces a signed transaction, a size-estimation transaction with
//! placeholder signatures, a transaction assembled from externally produced
//! signatures, or the list of digests an external signer must sign.
//!
//! # Security
//!
//! Private keys are held in `zeroize` storage, redacted from `Debug` output
//! and never written to logs.
//!
//! # Example
//!
//! ```rust,ignore
//! use hawala_utxo_signer::{BitcoinSigner, SigningInput};
//!
//! let signer = BitcoinSigner::new();
//! let plan = signer.plan(&input);
//! let signed = signer.sign(&input, false, None)?;
//! let digests = signer.pre_image_hashes(&input)?;
//! ```

pub mod builder;
pub mod error;
pub mod script;
pub mod signing;
pub mod transaction;
pub mod types;
pub mod utils;

pub use builder::{StandardBuilder, TransactionBuilder, ZenBuilder};
pub use error::{ErrorCode, SigningError, SigningResult};
pub use signing::{
    BitcoinDiamondSigner, BitcoinSigner, ExternalSigningService, GroestlcoinSigner,
    SigningKey, TransactionSigner, VergeSigner, ZcashSigner, ZenSigner,
};
pub use transaction::{ChainTransaction, SighashType, SignatureVersion};
pub use types::*;
pub use utils::SignerSettings;
