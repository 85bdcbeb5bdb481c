//! Exponential ElGamal over Ristretto255.
//!
//! A value `m` encrypts to `(r·G, m·G + r·P)` for a fresh scalar `r` and
//! public point `P = s·G`. Component-wise point addition adds plaintexts.
//! Decryption yields `m·G`; `m` is then recovered with a baby-step
//! giant-step search, so only bounded exponents can be opened.

use std::collections::HashMap;
use std::sync::OnceLock;

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::domain::CryptoError;

/// log2 of the baby-step table size.
const BABY_STEP_BITS: u32 = 18;

/// Giant steps tried before giving up; with the table this bounds
/// recoverable exponents to `2^36`.
const MAX_GIANT_STEPS: u64 = 1 << 18;

/// Wire form of a ciphertext: two compressed Ristretto points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiphertextBytes {
    pub c1: [u8; 32],
    pub c2: [u8; 32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ciphertext {
    c1: RistrettoPoint,
    c2: RistrettoPoint,
}

impl Ciphertext {
    /// Fresh randomized encryption of `value` under `public`.
    pub(crate) fn encrypt(public: &RistrettoPoint, value: u32) -> Self {
        Self::encrypt_with(public, value, &Scalar::random(&mut OsRng))
    }

    /// Encryption of `value` with caller-chosen randomness `r`.
    pub(crate) fn encrypt_with(public: &RistrettoPoint, value: u32, r: &Scalar) -> Self {
        Self {
            c1: RistrettoPoint::mul_base(r),
            c2: RistrettoPoint::mul_base(&Scalar::from(u64::from(value))) + r * public,
        }
    }

    /// Encryption of zero with no randomness; the same under every key.
    pub(crate) fn trivial_zero() -> Self {
        Self {
            c1: RistrettoPoint::identity(),
            c2: RistrettoPoint::identity(),
        }
    }

    pub(crate) fn add(&self, other: &Self) -> Self {
        Self {
            c1: self.c1 + other.c1,
            c2: self.c2 + other.c2,
        }
    }

    /// Recover the full plaintext exponent.
    pub(crate) fn open(&self, secret: &Scalar) -> Result<u64, CryptoError> {
        let message_point = self.c2 - secret * self.c1;
        discrete_log(&message_point).ok_or_else(|| {
            CryptoError::Decryption("plaintext outside the recoverable range".into())
        })
    }

    /// Open the ciphertext and reduce the exponent modulo 2^32.
    pub(crate) fn decrypt(&self, secret: &Scalar) -> Result<u32, CryptoError> {
        Ok(wrap_u32(self.open(secret)?))
    }

    pub(crate) fn to_bytes(self) -> CiphertextBytes {
        CiphertextBytes {
            c1: self.c1.compress().to_bytes(),
            c2: self.c2.compress().to_bytes(),
        }
    }

    pub(crate) fn from_bytes(bytes: &CiphertextBytes) -> Result<Self, CryptoError> {
        Ok(Self {
            c1: decompress(&bytes.c1)?,
            c2: decompress(&bytes.c2)?,
        })
    }
}

/// Reduce an exponent to its 32-bit wrapping value.
pub(crate) fn wrap_u32(exponent: u64) -> u32 {
    (exponent & u64::from(u32::MAX)) as u32
}

pub(crate) fn decompress(bytes: &[u8; 32]) -> Result<RistrettoPoint, CryptoError> {
    CompressedRistretto(*bytes)
        .decompress()
        .ok_or_else(|| CryptoError::InvalidEncoding("not a Ristretto point".into()))
}

fn baby_steps() -> &'static HashMap<[u8; 32], u32> {
    static TABLE: OnceLock<HashMap<[u8; 32], u32>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let size = 1u32 << BABY_STEP_BITS;
        let mut table = HashMap::with_capacity(size as usize);
        let mut point = RistrettoPoint::identity();
        for j in 0..size {
            table.insert(point.compress().to_bytes(), j);
            point += RISTRETTO_BASEPOINT_POINT;
        }
        tracing::debug!("Built baby-step table ({size} entries)");
        table
    })
}

fn discrete_log(target: &RistrettoPoint) -> Option<u64> {
    let table = baby_steps();
    let giant = RistrettoPoint::mul_base(&Scalar::from(1u64 << BABY_STEP_BITS));

    let mut point = *target;
    for i in 0..MAX_GIANT_STEPS {
        if let Some(&j) = table.get(&point.compress().to_bytes()) {
            return Some((i << BABY_STEP_BITS) + u64::from(j));
        }
        point -= giant;
    }
    None
}
