//! Confidential arithmetic port: the boundary to the homomorphic provider.
//!
//! The ledger never sees plaintext. It hands the provider opaque handles and
//! gets opaque handles back; who may later decrypt a handle is recorded in
//! the provider's grant relation.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};

use crate::domain::{CryptoError, Handle, LedgerId, Principal};

const DISCLOSURE_DOMAIN: &[u8] = b"expense-ledger/disclosure/v1";

/// Errors reported by a confidential arithmetic provider.
#[derive(Debug, thiserror::Error)]
pub enum ArithmeticError {
    #[error("Input proof rejected: {0}")]
    ProofVerification(String),

    #[error("Unknown handle {0}")]
    UnknownHandle(Handle),

    #[error("Handle {0} is bound to another ledger")]
    ForeignHandle(Handle),

    #[error("Operation rejected: {0}")]
    Rejected(String),

    #[error("{principal} holds no decrypt grant for {handle}")]
    Unauthorized { handle: Handle, principal: Principal },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Provider state could not be persisted: {0}")]
    Persistence(#[from] std::io::Error),
}

/// A signed request by `requester` to learn the plaintext behind `handle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisclosureRequest {
    pub ledger: LedgerId,
    pub handle: Handle,
    pub requester: Principal,
    pub signature: Vec<u8>,
}

impl DisclosureRequest {
    /// Build and sign a request with the requester's identity key.
    #[must_use]
    pub fn sign(ledger: LedgerId, handle: Handle, key: &SigningKey) -> Self {
        let requester = Principal::from_verifying_key(&key.verifying_key());
        let signature = key.sign(&Self::message(&ledger, &handle));
        Self {
            ledger,
            handle,
            requester,
            signature: signature.to_bytes().to_vec(),
        }
    }

    /// Check that the signature was made by `requester`.
    ///
    /// # Errors
    /// Returns `CryptoError` if the key or signature is malformed or the
    /// signature does not verify.
    pub fn verify(&self) -> Result<(), CryptoError> {
        let key = self.requester.verifying_key()?;
        let signature = Signature::from_slice(&self.signature)
            .map_err(|e| CryptoError::InvalidEncoding(format!("disclosure signature: {e}")))?;
        key.verify(&Self::message(&self.ledger, &self.handle), &signature)
            .map_err(|_| CryptoError::Decryption("disclosure signature mismatch".into()))
    }

    fn message(ledger: &LedgerId, handle: &Handle) -> Vec<u8> {
        let mut msg = Vec::with_capacity(DISCLOSURE_DOMAIN.len() + 64);
        msg.extend_from_slice(DISCLOSURE_DOMAIN);
        msg.extend_from_slice(ledger.as_bytes());
        msg.extend_from_slice(handle.as_bytes());
        msg
    }
}

/// Homomorphic operations over encrypted 32-bit unsigned integers.
///
/// Implementations provide:
/// - Verification of caller-submitted ciphertexts against their proof
/// - A well-known encrypted zero
/// - Homomorphic addition
/// - An additive, idempotent decrypt-grant relation
/// - Disclosure to principals holding a grant
/// - A checkpoint that makes all of the above durable
pub trait ConfidentialArithmetic: Send + Sync {
    /// Proof accompanying a batch of caller-encrypted inputs.
    type InputProof;

    /// Verify that `handle` is one of the inputs carried by `proof`, that the
    /// proof binds it to `ledger` and `submitter`, and import it.
    ///
    /// # Errors
    /// Returns `ArithmeticError::ProofVerification` if any check fails.
    fn verify_input(
        &self,
        ledger: &LedgerId,
        submitter: &Principal,
        handle: &Handle,
        proof: &Self::InputProof,
    ) -> Result<Handle, ArithmeticError>;

    /// Verify several inputs carried by the same proof.
    ///
    /// Implementations should check every handle before importing any of
    /// them; the default imports one at a time.
    ///
    /// # Errors
    /// Returns `ArithmeticError::ProofVerification` if any check fails.
    fn verify_inputs(
        &self,
        ledger: &LedgerId,
        submitter: &Principal,
        handles: &[Handle],
        proof: &Self::InputProof,
    ) -> Result<Vec<Handle>, ArithmeticError> {
        handles
            .iter()
            .map(|handle| self.verify_input(ledger, submitter, handle, proof))
            .collect()
    }

    /// Handle of the trivially-encrypted zero. Anyone may decrypt it.
    fn encrypted_zero(&self) -> Handle;

    /// Homomorphic `lhs + rhs`, scoped to `ledger`.
    ///
    /// # Errors
    /// Returns `ArithmeticError::UnknownHandle` or
    /// `ArithmeticError::ForeignHandle` if an operand is not usable by
    /// `ledger`.
    fn add(&self, ledger: &LedgerId, lhs: &Handle, rhs: &Handle)
        -> Result<Handle, ArithmeticError>;

    /// Allow `principal` to request disclosure of `handle`.
    ///
    /// Granting twice is a no-op. There is no revoke.
    ///
    /// # Errors
    /// Returns `ArithmeticError::UnknownHandle` if the handle does not exist.
    fn grant_decrypt(&self, handle: &Handle, principal: &Principal)
        -> Result<(), ArithmeticError>;

    /// Whether `principal` may request disclosure of `handle`.
    fn is_allowed(&self, handle: &Handle, principal: &Principal) -> bool;

    /// Disclose the plaintext behind a signed request.
    ///
    /// # Errors
    /// Returns `ArithmeticError::Unauthorized` if the requester holds no
    /// grant, and `ArithmeticError::Crypto` if the signature is invalid or
    /// decryption fails.
    fn decrypt(&self, request: &DisclosureRequest) -> Result<u32, ArithmeticError>;

    /// Make every import, sum and grant so far durable.
    ///
    /// The ledger calls this before committing handles to its store, so a
    /// stored handle is never newer than the provider state behind it.
    ///
    /// # Errors
    /// Returns `ArithmeticError::Persistence` if the state cannot be written.
    fn checkpoint(&self) -> Result<(), ArithmeticError> {
        Ok(())
    }
}
