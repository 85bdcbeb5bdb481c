//! ElGamal adapter: Implementation of ConfidentialArithmetic.
//!
//! Additively homomorphic exponential ElGamal over Ristretto255
//! (`curve25519-dalek`). The provider plays the role of the key-holding
//! coprocessor: it owns the decryption key, stores every ciphertext behind an
//! opaque handle, and discloses plaintexts only to principals in the grant
//! relation.
//!
//! # Handles
//!
//! - Input handles are derived from the input proof (see [`input`]).
//! - Sums are derived from `(ledger, lhs, rhs)`. Point addition is
//!   deterministic, so summing the same handles in the same order reproduces
//!   both the handle and the ciphertext.
//! - The encrypted zero is a fixed constant with public scope.
//!
//! # Wrapping
//!
//! Plaintexts are `u32` and sums wrap modulo 2^32. After each addition the
//! provider opens the sum and, if it carried past `u32::MAX`, replaces it
//! with a fresh encryption of the wrapped value. The randomness for that
//! encryption is hashed from the result handle, so wrapped sums stay
//! reproducible and stored exponents never exceed `2 * u32::MAX`.
//!
//! # Scopes
//!
//! Every stored ciphertext is either public (constants) or bound to the
//! ledger that imported or computed it. A ledger cannot compute on handles
//! bound to another ledger.
//!
//! # Persistence
//!
//! [`ElGamalProvider::seal`] serializes the key and the ciphertext arena with
//! `bincode` and seals the result under a password (Argon2id + AES-256-GCM).
//! A provider built with [`ElGamalProvider::persist_to`] writes that blob to
//! its state file on every checkpoint (temp file, fsync, rename).

pub mod input;
mod scheme;

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub use input::{EncryptedInput, InputBuilder, InputProof, MAX_INPUTS_PER_PROOF};
pub use scheme::CiphertextBytes;

use crate::domain::{
    kdf::{self, SealedBlob},
    CryptoError, DecryptionKey, EncryptionKey, Handle, LedgerId, Principal,
};
use crate::ports::{ArithmeticError, ConfidentialArithmetic, DisclosureRequest};
use scheme::Ciphertext;

const ADD_TAG: &[u8] = b"expense-ledger/add/v1";
const CONSTANT_TAG: &[u8] = b"expense-ledger/constant/v1";
const WRAP_TAG: &[u8] = b"expense-ledger/wrap/v1";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Public,
    Ledger(LedgerId),
}

#[derive(Debug, Clone)]
struct StoredCiphertext {
    ciphertext: Ciphertext,
    scope: Scope,
    readers: BTreeSet<Principal>,
}

impl StoredCiphertext {
    fn usable_by(&self, ledger: &LedgerId) -> bool {
        match self.scope {
            Scope::Public => true,
            Scope::Ledger(owner) => owner == *ledger,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    handle: Handle,
    ciphertext: CiphertextBytes,
    ledger: Option<LedgerId>,
    readers: Vec<Principal>,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct ProviderSnapshot {
    #[zeroize(skip)]
    version: u32,
    secret: [u8; 32],
    #[zeroize(skip)]
    entries: Vec<SnapshotEntry>,
}

struct StateFile {
    path: PathBuf,
    password: Zeroizing<String>,
    write_lock: Mutex<()>,
}

/// Confidential arithmetic provider backed by exponential ElGamal.
pub struct ElGamalProvider {
    secret: DecryptionKey,
    public: EncryptionKey,
    public_point: RistrettoPoint,
    zero: Handle,
    arena: Mutex<HashMap<Handle, StoredCiphertext>>,
    state_file: Option<StateFile>,
}

impl ElGamalProvider {
    /// Create a provider with a freshly generated key.
    #[must_use]
    pub fn generate() -> Self {
        let mut secret = Scalar::random(&mut OsRng);
        let provider = Self::with_secret(secret, HashMap::new());
        secret.zeroize();
        tracing::info!(
            "Generated provider key (fingerprint: {})",
            provider.public.fingerprint
        );
        provider
    }

    /// Unseal the state file at `path` and keep checkpointing to it.
    ///
    /// # Errors
    /// Returns `ArithmeticError::Persistence` if the file cannot be read and
    /// `ArithmeticError::Crypto` if it cannot be unsealed.
    pub fn load(path: impl Into<PathBuf>, password: Zeroizing<String>) -> Result<Self, ArithmeticError> {
        let path = path.into();
        let sealed = fs::read(&path)?;
        Ok(Self::unseal(&sealed, &password)?.persist_to(path, password))
    }

    /// Seal the provider state to `path` on every checkpoint.
    #[must_use]
    pub fn persist_to(mut self, path: impl Into<PathBuf>, password: Zeroizing<String>) -> Self {
        self.state_file = Some(StateFile {
            path: path.into(),
            password,
            write_lock: Mutex::new(()),
        });
        self
    }

    fn with_secret(secret: Scalar, mut arena: HashMap<Handle, StoredCiphertext>) -> Self {
        let public_point = RistrettoPoint::mul_base(&secret);
        let zero = Handle::derive(CONSTANT_TAG, &[b"u32".as_slice(), 0u32.to_be_bytes().as_slice()]);
        arena.entry(zero).or_insert_with(|| StoredCiphertext {
            ciphertext: Ciphertext::trivial_zero(),
            scope: Scope::Public,
            readers: BTreeSet::new(),
        });

        Self {
            secret: DecryptionKey::from_bytes(secret.to_bytes()),
            public: EncryptionKey::from_bytes(public_point.compress().to_bytes()),
            public_point,
            zero,
            arena: Mutex::new(arena),
            state_file: None,
        }
    }

    /// Public key clients encrypt their inputs to.
    #[must_use]
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.public
    }

    /// Number of stored ciphertexts, constants included.
    #[must_use]
    pub fn ciphertext_count(&self) -> usize {
        self.arena.lock().map(|arena| arena.len()).unwrap_or(0)
    }

    /// Seal the key and all stored ciphertexts under `password`.
    ///
    /// # Errors
    /// Returns `CryptoError` if serialization or sealing fails.
    pub fn seal(&self, password: &str) -> Result<Vec<u8>, CryptoError> {
        let entries = {
            let arena = self.arena().map_err(|e| CryptoError::Serialization(e.to_string()))?;
            arena
                .iter()
                .map(|(handle, stored)| SnapshotEntry {
                    handle: *handle,
                    ciphertext: stored.ciphertext.to_bytes(),
                    ledger: match stored.scope {
                        Scope::Public => None,
                        Scope::Ledger(id) => Some(id),
                    },
                    readers: stored.readers.iter().copied().collect(),
                })
                .collect()
        };
        let snapshot = ProviderSnapshot {
            version: SNAPSHOT_VERSION,
            secret: *self.secret.as_bytes(),
            entries,
        };

        let plaintext = Zeroizing::new(
            bincode::serialize(&snapshot).map_err(|e| CryptoError::Serialization(e.to_string()))?,
        );
        let sealed = kdf::seal(&plaintext, password)?;

        tracing::info!("Sealed provider state ({} ciphertexts)", snapshot.entries.len());
        Ok(sealed.to_bytes())
    }

    /// Restore a provider from [`seal`](Self::seal) output.
    ///
    /// # Errors
    /// Returns `CryptoError` if the password is wrong, the blob is corrupt or
    /// the snapshot version is unsupported.
    pub fn unseal(bytes: &[u8], password: &str) -> Result<Self, CryptoError> {
        let sealed = SealedBlob::from_bytes(bytes)?;
        let plaintext = kdf::unseal(&sealed, password)?;
        let snapshot: ProviderSnapshot = bincode::deserialize(&plaintext)
            .map_err(|e| CryptoError::Serialization(format!("provider snapshot: {e}")))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CryptoError::Serialization(format!(
                "unsupported provider snapshot version {}",
                snapshot.version
            )));
        }

        let mut arena = HashMap::with_capacity(snapshot.entries.len());
        for entry in &snapshot.entries {
            arena.insert(
                entry.handle,
                StoredCiphertext {
                    ciphertext: Ciphertext::from_bytes(&entry.ciphertext)?,
                    scope: entry.ledger.map_or(Scope::Public, Scope::Ledger),
                    readers: entry.readers.iter().copied().collect(),
                },
            );
        }

        let secret = scalar_from_key(&DecryptionKey::from_bytes(snapshot.secret))?;
        let provider = Self::with_secret(secret, arena);
        tracing::info!(
            "Unsealed provider state ({} ciphertexts, key fingerprint: {})",
            snapshot.entries.len(),
            provider.public.fingerprint
        );
        Ok(provider)
    }

    fn arena(&self) -> Result<MutexGuard<'_, HashMap<Handle, StoredCiphertext>>, ArithmeticError> {
        self.arena
            .lock()
            .map_err(|_| ArithmeticError::Rejected("provider state lock poisoned".into()))
    }

    /// Check the proof signature and return the digest input handles derive from.
    fn verified_digest(
        &self,
        ledger: &LedgerId,
        submitter: &Principal,
        proof: &InputProof,
    ) -> Result<[u8; 32], ArithmeticError> {
        let count = proof.ciphertexts.len();
        if count == 0 || count > MAX_INPUTS_PER_PROOF {
            return Err(ArithmeticError::ProofVerification(format!(
                "proof carries {count} inputs (allowed 1..={MAX_INPUTS_PER_PROOF})"
            )));
        }

        let key = submitter
            .verifying_key()
            .map_err(|e| ArithmeticError::ProofVerification(e.to_string()))?;
        let signature = proof
            .signature()
            .ok_or_else(|| ArithmeticError::ProofVerification("malformed signature".into()))?;
        let digest = proof.binding_digest(ledger, submitter);
        key.verify_strict(&digest, &signature).map_err(|_| {
            ArithmeticError::ProofVerification(
                "signature does not bind the inputs to this ledger and submitter".into(),
            )
        })?;
        Ok(digest)
    }

    /// Locate `handle` in a verified proof and decode its ciphertext.
    fn carried_input(
        digest: &[u8; 32],
        handle: &Handle,
        proof: &InputProof,
    ) -> Result<Ciphertext, ArithmeticError> {
        let index = (0..proof.ciphertexts.len())
            .find(|&i| input::input_handle(digest, i) == *handle)
            .ok_or_else(|| {
                ArithmeticError::ProofVerification(format!("handle {} not carried by proof", handle.short()))
            })?;
        Ciphertext::from_bytes(&proof.ciphertexts[index])
            .map_err(|e| ArithmeticError::ProofVerification(e.to_string()))
    }

    fn import(&self, ledger: &LedgerId, inputs: Vec<(Handle, Ciphertext)>) -> Result<(), ArithmeticError> {
        let mut arena = self.arena()?;
        for (handle, ciphertext) in inputs {
            arena.entry(handle).or_insert_with(|| StoredCiphertext {
                ciphertext,
                scope: Scope::Ledger(*ledger),
                readers: BTreeSet::new(),
            });
        }
        Ok(())
    }

    /// Reduce `sum` modulo 2^32, re-encrypting it under randomness bound to `result`.
    fn wrap(&self, sum: Ciphertext, result: &Handle) -> Result<Ciphertext, ArithmeticError> {
        let secret = Zeroizing::new(scalar_from_key(&self.secret)?);
        let exponent = sum
            .open(&secret)
            .map_err(|e| ArithmeticError::Rejected(format!("sum for {}: {e}", result.short())))?;
        if exponent <= u64::from(u32::MAX) {
            return Ok(sum);
        }

        let seed: [u8; 64] = Sha512::new()
            .chain_update(WRAP_TAG)
            .chain_update(result.as_bytes())
            .finalize()
            .into();
        let r = Zeroizing::new(Scalar::from_bytes_mod_order_wide(&seed));
        tracing::trace!("wrapped sum {} modulo 2^32", result.short());
        Ok(Ciphertext::encrypt_with(
            &self.public_point,
            scheme::wrap_u32(exponent),
            &r,
        ))
    }
}

fn scalar_from_key(key: &DecryptionKey) -> Result<Scalar, CryptoError> {
    Option::<Scalar>::from(Scalar::from_canonical_bytes(*key.as_bytes()))
        .ok_or_else(|| CryptoError::InvalidKeyFormat("decryption key is not a canonical scalar".into()))
}

/// Replace `path` with `bytes` through a synced temp file.
fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");

    let mut opts = fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        opts.mode(0o600);
    }
    let mut file = opts.open(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

impl ConfidentialArithmetic for ElGamalProvider {
    type InputProof = InputProof;

    fn verify_input(
        &self,
        ledger: &LedgerId,
        submitter: &Principal,
        handle: &Handle,
        proof: &InputProof,
    ) -> Result<Handle, ArithmeticError> {
        let digest = self.verified_digest(ledger, submitter, proof)?;
        let ciphertext = Self::carried_input(&digest, handle, proof)?;
        self.import(ledger, vec![(*handle, ciphertext)])?;

        tracing::debug!(
            "Verified input {} from {} for ledger {}",
            handle.short(),
            submitter.short(),
            ledger.short()
        );
        Ok(*handle)
    }

    fn verify_inputs(
        &self,
        ledger: &LedgerId,
        submitter: &Principal,
        handles: &[Handle],
        proof: &InputProof,
    ) -> Result<Vec<Handle>, ArithmeticError> {
        let digest = self.verified_digest(ledger, submitter, proof)?;
        let inputs = handles
            .iter()
            .map(|handle| Ok((*handle, Self::carried_input(&digest, handle, proof)?)))
            .collect::<Result<Vec<_>, ArithmeticError>>()?;
        self.import(ledger, inputs)?;

        tracing::debug!(
            "Verified {} inputs from {} for ledger {}",
            handles.len(),
            submitter.short(),
            ledger.short()
        );
        Ok(handles.to_vec())
    }

    fn encrypted_zero(&self) -> Handle {
        self.zero
    }

    fn add(
        &self,
        ledger: &LedgerId,
        lhs: &Handle,
        rhs: &Handle,
    ) -> Result<Handle, ArithmeticError> {
        let mut arena = self.arena()?;

        let operand = |handle: &Handle| -> Result<Ciphertext, ArithmeticError> {
            let stored = arena
                .get(handle)
                .ok_or(ArithmeticError::UnknownHandle(*handle))?;
            if !stored.usable_by(ledger) {
                return Err(ArithmeticError::ForeignHandle(*handle));
            }
            Ok(stored.ciphertext)
        };
        let sum = operand(lhs)?.add(&operand(rhs)?);

        let result = Handle::derive(
            ADD_TAG,
            &[
                ledger.as_bytes().as_slice(),
                lhs.as_bytes().as_slice(),
                rhs.as_bytes().as_slice(),
            ],
        );
        if !arena.contains_key(&result) {
            let ciphertext = self.wrap(sum, &result)?;
            arena.insert(
                result,
                StoredCiphertext {
                    ciphertext,
                    scope: Scope::Ledger(*ledger),
                    readers: BTreeSet::new(),
                },
            );
        }

        tracing::trace!("add {} + {} -> {}", lhs.short(), rhs.short(), result.short());
        Ok(result)
    }

    fn grant_decrypt(&self, handle: &Handle, principal: &Principal) -> Result<(), ArithmeticError> {
        let mut arena = self.arena()?;
        let stored = arena
            .get_mut(handle)
            .ok_or(ArithmeticError::UnknownHandle(*handle))?;
        if stored.readers.insert(*principal) {
            tracing::trace!("grant {} -> {}", handle.short(), principal.short());
        }
        Ok(())
    }

    fn is_allowed(&self, handle: &Handle, principal: &Principal) -> bool {
        match self.arena.lock() {
            Ok(arena) => arena.get(handle).is_some_and(|stored| {
                stored.scope == Scope::Public || stored.readers.contains(principal)
            }),
            Err(_) => false,
        }
    }

    fn decrypt(&self, request: &DisclosureRequest) -> Result<u32, ArithmeticError> {
        request.verify()?;

        let ciphertext = {
            let arena = self.arena()?;
            let stored = arena
                .get(&request.handle)
                .ok_or(ArithmeticError::UnknownHandle(request.handle))?;
            let allowed = match stored.scope {
                Scope::Public => true,
                Scope::Ledger(owner) => {
                    owner == request.ledger && stored.readers.contains(&request.requester)
                }
            };
            if !allowed {
                tracing::warn!(
                    "Refused disclosure of {} to {}",
                    request.handle.short(),
                    request.requester.short()
                );
                return Err(ArithmeticError::Unauthorized {
                    handle: request.handle,
                    principal: request.requester,
                });
            }
            stored.ciphertext
        };

        let secret = Zeroizing::new(scalar_from_key(&self.secret)?);
        let value = ciphertext.decrypt(&secret)?;
        tracing::info!(
            "Disclosed {} to {}",
            request.handle.short(),
            request.requester.short()
        );
        Ok(value)
    }

    fn checkpoint(&self) -> Result<(), ArithmeticError> {
        let Some(state) = &self.state_file else {
            return Ok(());
        };
        let _guard = state
            .write_lock
            .lock()
            .map_err(|_| ArithmeticError::Rejected("state file lock poisoned".into()))?;
        let sealed = self.seal(&state.password)?;
        write_atomically(&state.path, &sealed)?;

        tracing::debug!("Checkpointed provider state to {:?}", state.path);
        Ok(())
    }
}
