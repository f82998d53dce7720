//! Signing keys and key lookup
//!
//! Private key bytes are held in zeroizing storage and never printed.
//! [`KeyRing`] resolves the key for an owning script by public key or
//! HASH160, covering both compressed and uncompressed encodings.

use std::fmt;

use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use zeroize::Zeroizing;

use crate::error::{SigningError, SigningResult};
use crate::script::hash160;
use crate::types::SigningInput;

/// A secp256k1 private key
#[derive(Clone)]
pub struct SigningKey(Zeroizing<[u8; 32]>);

impl SigningKey {
    pub fn from_slice(bytes: &[u8]) -> SigningResult<Self> {
        // rejects zero and out-of-range scalars
        SecretKey::from_slice(bytes)?;
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn secret_key(&self) -> SigningResult<SecretKey> {
        Ok(SecretKey::from_slice(&self.0[..])?)
    }

    /// Raw scalar bytes, for handing to the delegated signing service
    pub(crate) fn secret_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn public_key(&self, secp: &Secp256k1<All>) -> SigningResult<PublicKey> {
        Ok(PublicKey::from_secret_key(secp, &self.secret_key()?))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey([REDACTED])")
    }
}

/// A public key with its private key, when one is held
#[derive(Debug, Clone, Copy)]
pub struct KeyMatch<'a> {
    pub public_key: &'a [u8],
    pub secret: Option<&'a SigningKey>,
}

#[derive(Debug)]
struct KeyEntry<'a> {
    public_key: Vec<u8>,
    hash: [u8; 20],
    secret: Option<&'a SigningKey>,
}

/// Public/private key lookup for one signing request
#[derive(Debug, Default)]
pub struct KeyRing<'a> {
    entries: Vec<KeyEntry<'a>>,
}

impl<'a> KeyRing<'a> {
    /// Ring over the input's private keys and bare public keys
    pub fn with_private_keys(input: &'a SigningInput, secp: &Secp256k1<All>) -> SigningResult<Self> {
        let mut ring = Self::public_only(input);
        for key in &input.private_keys {
            let public = key.public_key(secp)?;
            ring.push(public.serialize().to_vec(), Some(key));
            ring.push(public.serialize_uncompressed().to_vec(), Some(key));
        }
        Ok(ring)
    }

    /// Ring over the input's bare public keys; private keys are not touched
    pub fn public_only(input: &'a SigningInput) -> Self {
        let mut ring = Self::default();
        for key in &input.public_keys {
            ring.push(key.clone(), None);
        }
        ring
    }

    fn push(&mut self, public_key: Vec<u8>, secret: Option<&'a SigningKey>) {
        let hash = hash160(&public_key);
        self.entries.push(KeyEntry {
            public_key,
            hash,
            secret,
        });
    }

    /// Entries holding a private key take precedence
    fn best<'s>(&'s self, matches: impl Iterator<Item = &'s KeyEntry<'a>>) -> Option<KeyMatch<'s>> {
        let mut fallback = None;
        for entry in matches {
            let found = KeyMatch {
                public_key: &entry.public_key,
                secret: entry.secret,
            };
            if entry.secret.is_some() {
                return Some(found);
            }
            fallback.get_or_insert(found);
        }
        fallback
    }

    pub fn by_hash(&self, hash: &[u8; 20]) -> Option<KeyMatch<'_>> {
        self.best(self.entries.iter().filter(|e| &e.hash == hash))
    }

    pub fn by_public_key(&self, public_key: &[u8]) -> Option<KeyMatch<'_>> {
        self.best(self.entries.iter().filter(|e| e.public_key == public_key))
    }
}

/// Private key for a match, or `MissingSigningKey`
pub fn require_secret<'a>(found: Option<KeyMatch<'a>>, index: usize) -> SigningResult<&'a SigningKey> {
    found
        .and_then(|m| m.secret)
        .ok_or(SigningError::MissingSigningKey(index))
}
