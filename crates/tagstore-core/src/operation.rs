//! Signed statement operations as exchanged between peers.
//!
//! The signature covers a Blake3 digest of the canonical field encoding,
//! so any change to subject, predicate, object, operation, clock or creator
//! invalidates it.

use crate::error::{Error, Result};
use crate::model::{hex_serde, Operation, Predicate, PublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// One peer's assertion or retraction of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementOperation {
    pub subject: String,
    pub predicate: Predicate,
    pub object: String,
    pub operation: Operation,
    pub clock: u64,
    pub creator_public_key: PublicKey,
}

impl StatementOperation {
    pub fn new(
        subject: impl Into<String>,
        predicate: Predicate,
        object: impl Into<String>,
        operation: Operation,
        clock: u64,
        creator_public_key: PublicKey,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate,
            object: object.into(),
            operation,
            clock,
            creator_public_key,
        }
    }

    /// Digest that gets signed.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"tagstore:operation:v1");
        update_len_prefixed(&mut hasher, self.subject.as_bytes());
        hasher.update(&[self.predicate.code()]);
        update_len_prefixed(&mut hasher, self.object.as_bytes());
        hasher.update(&[self.operation.code()]);
        hasher.update(&self.clock.to_be_bytes());
        update_len_prefixed(&mut hasher, self.creator_public_key.as_bytes());
        *hasher.finalize().as_bytes()
    }

    /// Sign with `key`. The caller is responsible for `creator_public_key`
    /// matching the key's verifying half.
    pub fn sign(&self, key: &SigningKey) -> Vec<u8> {
        key.sign(&self.digest()).to_bytes().to_vec()
    }

    /// Check `signature` against `creator_public_key`.
    pub fn verify(&self, signature: &[u8]) -> Result<()> {
        let key_bytes: [u8; 32] = self
            .creator_public_key
            .as_bytes()
            .try_into()
            .map_err(|_| Error::InvalidSignature("creator key is not an ed25519 key".into()))?;
        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;
        let signature =
            Signature::from_slice(signature).map_err(|e| Error::InvalidSignature(e.to_string()))?;
        key.verify(&self.digest(), &signature)
            .map_err(|e| Error::InvalidSignature(e.to_string()))
    }
}

fn update_len_prefixed(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// An operation together with its creator's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOperation {
    pub operation: StatementOperation,
    #[serde(with = "hex_serde")]
    pub signature: Vec<u8>,
}

impl SignedOperation {
    /// Build and sign in one step.
    pub fn sign(operation: StatementOperation, key: &SigningKey) -> Self {
        let signature = operation.sign(key);
        Self {
            operation,
            signature,
        }
    }

    pub fn verify(&self) -> Result<()> {
        self.operation.verify(&self.signature)
    }
}
