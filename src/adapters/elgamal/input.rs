//! Client-side encrypted inputs and the proof that binds them.
//!
//! A submitter encrypts a batch of values to the provider's public key and
//! signs a digest over the ledger identity, its own principal and every
//! ciphertext. Input handles are derived from that digest, so a handle
//! cannot be replayed against another ledger or by another submitter.

use ed25519_dalek::{Signature, Signer, SigningKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::scheme::{decompress, Ciphertext, CiphertextBytes};
use crate::domain::{CryptoError, EncryptionKey, Handle, LedgerId, Principal};

const PROOF_DOMAIN: &[u8] = b"expense-ledger/input-proof/v1";
const INPUT_HANDLE_TAG: &[u8] = b"expense-ledger/input/v1";

/// Maximum ciphertexts carried by one proof.
pub const MAX_INPUTS_PER_PROOF: usize = 16;

/// Ciphertexts plus the submitter's signature over their binding digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputProof {
    pub ciphertexts: Vec<CiphertextBytes>,
    pub signature: Vec<u8>,
}

impl InputProof {
    /// Digest the signature must cover for this ledger and submitter.
    #[must_use]
    pub fn binding_digest(&self, ledger: &LedgerId, submitter: &Principal) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(PROOF_DOMAIN);
        hasher.update(ledger.as_bytes());
        hasher.update(submitter.as_bytes());
        hasher.update((self.ciphertexts.len() as u32).to_be_bytes());
        for ct in &self.ciphertexts {
            hasher.update(ct.c1);
            hasher.update(ct.c2);
        }
        hasher.finalize().into()
    }

    /// Handles of the carried inputs, in order.
    #[must_use]
    pub fn input_handles(&self, ledger: &LedgerId, submitter: &Principal) -> Vec<Handle> {
        let digest = self.binding_digest(ledger, submitter);
        (0..self.ciphertexts.len())
            .map(|i| input_handle(&digest, i))
            .collect()
    }

    #[must_use]
    pub fn signature(&self) -> Option<Signature> {
        Signature::from_slice(&self.signature).ok()
    }
}

pub(crate) fn input_handle(digest: &[u8; 32], index: usize) -> Handle {
    Handle::derive(
        INPUT_HANDLE_TAG,
        &[digest.as_slice(), (index as u32).to_be_bytes().as_slice()],
    )
}

/// Output of [`InputBuilder::encrypt`]: one handle per value plus the proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedInput {
    pub handles: Vec<Handle>,
    pub proof: InputProof,
}

/// Collects 32-bit values and encrypts them for one ledger.
#[derive(Debug, Clone)]
pub struct InputBuilder {
    ledger: LedgerId,
    key: EncryptionKey,
    values: Vec<u32>,
}

impl InputBuilder {
    #[must_use]
    pub fn new(ledger: LedgerId, key: &EncryptionKey) -> Self {
        Self {
            ledger,
            key: key.clone(),
            values: Vec::new(),
        }
    }

    /// Append a value to the batch.
    #[must_use]
    pub fn add32(mut self, value: u32) -> Self {
        self.values.push(value);
        self
    }

    /// Encrypt the batch and sign it as `submitter`.
    ///
    /// # Errors
    /// Returns `CryptoError::Encryption` if the batch is empty or too large,
    /// or `CryptoError::InvalidKeyFormat` if the encryption key is invalid.
    pub fn encrypt(self, submitter: &SigningKey) -> Result<EncryptedInput, CryptoError> {
        if self.values.is_empty() || self.values.len() > MAX_INPUTS_PER_PROOF {
            return Err(CryptoError::Encryption(format!(
                "input batch must hold 1..={MAX_INPUTS_PER_PROOF} values, got {}",
                self.values.len()
            )));
        }
        let public = decompress(self.key.as_bytes())
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;

        let ciphertexts = self
            .values
            .iter()
            .map(|&v| Ciphertext::encrypt(&public, v).to_bytes())
            .collect();
        let mut proof = InputProof {
            ciphertexts,
            signature: Vec::new(),
        };

        let principal = Principal::from_verifying_key(&submitter.verifying_key());
        let digest = proof.binding_digest(&self.ledger, &principal);
        proof.signature = submitter.sign(&digest).to_bytes().to_vec();

        tracing::debug!(
            "Encrypted {} input(s) for ledger {} as {}",
            proof.ciphertexts.len(),
            self.ledger.short(),
            principal.short()
        );

        let handles = (0..proof.ciphertexts.len())
            .map(|i| input_handle(&digest, i))
            .collect();
        Ok(EncryptedInput { handles, proof })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::ristretto::RistrettoPoint;
    use curve25519_dalek::scalar::Scalar;

    fn encryption_key() -> EncryptionKey {
        let secret = Scalar::from(12345u64);
        EncryptionKey::from_bytes(RistrettoPoint::mul_base(&secret).compress().to_bytes())
    }

    #[test]
    fn test_handles_match_proof_derivation() {
        let ledger = LedgerId::from_bytes([4; 32]);
        let signer = SigningKey::from_bytes(&[5; 32]);
        let submitter = Principal::from_verifying_key(&signer.verifying_key());

        let input = InputBuilder::new(ledger, &encryption_key())
            .add32(1000)
            .add32(2000)
            .add32(500)
            .encrypt(&signer)
            .expect("encrypt");

        assert_eq!(input.handles.len(), 3);
        assert_eq!(input.proof.input_handles(&ledger, &submitter), input.handles);
    }

    #[test]
    fn test_handles_depend_on_ledger_and_submitter() {
        let ledger = LedgerId::from_bytes([4; 32]);
        let signer = SigningKey::from_bytes(&[5; 32]);
        let input = InputBuilder::new(ledger, &encryption_key())
            .add32(1)
            .encrypt(&signer)
            .expect("encrypt");

        let other_ledger = LedgerId::from_bytes([6; 32]);
        let submitter = Principal::from_verifying_key(&signer.verifying_key());
        let other_submitter = Principal::from_bytes([7; 32]);

        assert_ne!(input.proof.input_handles(&other_ledger, &submitter), input.handles);
        assert_ne!(input.proof.input_handles(&ledger, &other_submitter), input.handles);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let signer = SigningKey::from_bytes(&[5; 32]);
        let err = InputBuilder::new(LedgerId::from_bytes([4; 32]), &encryption_key())
            .encrypt(&signer)
            .expect_err("empty");
        assert!(matches!(err, CryptoError::Encryption(_)));
    }
}
