//! Signing
//!
//! Digest computation, signature assembly and the signer entry point:
//! 1. Resolve a plan and build the unsigned transaction
//! 2. Sign, estimate, apply external signatures, or collect digests
//! 3. Or hand the whole transaction to an external signing service

pub mod delegated;
pub mod keys;
pub mod signature_builder;
pub mod signer;

pub use delegated::{
    DelegatedSigningRequest, DelegatedSigningResponse, ExternalSigningService, NoService,
};
pub use keys::SigningKey;
pub use signature_builder::{SignatureBuilder, SigningOutput};
pub use signer::*;
