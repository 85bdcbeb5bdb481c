//! Password-based sealing of provider state.
//!
//! - Argon2id derives a 256-bit key from the sealing password
//! - AES-256-GCM encrypts and authenticates the payload
//! - Every seal uses a fresh salt and nonce
//!
//! Wire format of a sealed blob:
//! `salt_len (u32 LE) || salt (b64 ascii) || nonce (12) || ciphertext`.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{password_hash::SaltString, Algorithm, Argon2, Params, PasswordHasher, Version};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

/// Argon2id memory cost in KiB.
const ARGON2_MEMORY_KIB: u32 = 47_104;

const NONCE_LEN: usize = 12;

/// Errors while sealing or opening a blob.
#[derive(Debug, Error)]
pub enum KdfError {
    #[error("Key derivation failed: {0}")]
    Derivation(String),

    #[error("Sealing failed: {0}")]
    Seal(String),

    #[error("Unsealing failed: wrong password or tampered data")]
    Unseal,

    #[error("Invalid sealed blob format")]
    InvalidFormat,
}

/// A sealed payload and the parameters needed to open it.
#[derive(Debug, Clone)]
pub struct SealedBlob {
    pub ciphertext: Vec<u8>,
    /// Argon2id salt (base64, as produced by `SaltString`)
    pub salt: String,
    pub nonce: [u8; NONCE_LEN],
}

impl SealedBlob {
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let salt = self.salt.as_bytes();
        let mut out = Vec::with_capacity(4 + salt.len() + NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&(salt.len() as u32).to_le_bytes());
        out.extend_from_slice(salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// # Errors
    /// Returns `KdfError::InvalidFormat` if the layout is truncated or the
    /// salt is not ASCII.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KdfError> {
        if bytes.len() < 4 {
            return Err(KdfError::InvalidFormat);
        }
        let (len_bytes, rest) = bytes.split_at(4);
        let mut len_arr = [0u8; 4];
        len_arr.copy_from_slice(len_bytes);
        let salt_len = u32::from_le_bytes(len_arr) as usize;
        if rest.len() < salt_len + NONCE_LEN {
            return Err(KdfError::InvalidFormat);
        }
        let (salt, rest) = rest.split_at(salt_len);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let salt = std::str::from_utf8(salt)
            .map_err(|_| KdfError::InvalidFormat)?
            .to_string();
        let mut nonce_arr = [0u8; NONCE_LEN];
        nonce_arr.copy_from_slice(nonce);

        Ok(Self {
            ciphertext: ciphertext.to_vec(),
            salt,
            nonce: nonce_arr,
        })
    }
}

fn derive_key(password: &str, salt: &SaltString) -> Result<Zeroizing<[u8; 32]>, KdfError> {
    let params = Params::new(ARGON2_MEMORY_KIB, 1, 1, Some(32))
        .map_err(|e| KdfError::Derivation(format!("Invalid Argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), salt)
        .map_err(|e| KdfError::Derivation(e.to_string()))?;
    let output = hash
        .hash
        .ok_or_else(|| KdfError::Derivation("Hash output missing".to_string()))?;

    let bytes = output.as_bytes();
    if bytes.len() < 32 {
        return Err(KdfError::Derivation("Hash too short".to_string()));
    }
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&bytes[..32]);
    Ok(key)
}

/// Seal `plaintext` under `password`.
///
/// # Errors
/// Returns error if key derivation or encryption fails.
pub fn seal(plaintext: &[u8], password: &str) -> Result<SealedBlob, KdfError> {
    let salt = SaltString::generate(&mut OsRng);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| KdfError::Seal(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| KdfError::Seal(e.to_string()))?;

    Ok(SealedBlob {
        ciphertext,
        salt: salt.to_string(),
        nonce: nonce_bytes,
    })
}

/// Open a sealed blob.
///
/// # Errors
/// Returns `KdfError::Unseal` if the password is wrong or the blob was
/// modified.
pub fn unseal(sealed: &SealedBlob, password: &str) -> Result<Zeroizing<Vec<u8>>, KdfError> {
    let salt = SaltString::from_b64(&sealed.salt).map_err(|_| KdfError::InvalidFormat)?;
    let key = derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| KdfError::Derivation(e.to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_ref())
        .map(Zeroizing::new)
        .map_err(|_| KdfError::Unseal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_unseal() {
        let sealed = seal(b"provider state", "correct horse").expect("seal");
        let opened = unseal(&sealed, "correct horse").expect("unseal");
        assert_eq!(opened.as_slice(), b"provider state");
    }

    #[test]
    fn test_wrong_password_fails() {
        let sealed = seal(b"provider state", "correct horse").expect("seal");
        assert!(matches!(
            unseal(&sealed, "battery staple"),
            Err(KdfError::Unseal)
        ));
    }

    #[test]
    fn test_blob_bytes_survive_storage() {
        let sealed = seal(b"abc", "pw").expect("seal");
        let parsed = SealedBlob::from_bytes(&sealed.to_bytes()).expect("parse");
        assert_eq!(parsed.salt, sealed.salt);
        assert_eq!(parsed.nonce, sealed.nonce);
        assert_eq!(unseal(&parsed, "pw").expect("unseal").as_slice(), b"abc");
    }

    #[test]
    fn test_truncated_blob_rejected() {
        assert!(matches!(
            SealedBlob::from_bytes(&[1, 0]),
            Err(KdfError::InvalidFormat)
        ));
        assert!(matches!(
            SealedBlob::from_bytes(&[200, 0, 0, 0, b'a']),
            Err(KdfError::InvalidFormat)
        ));
    }
}
