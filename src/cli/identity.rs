//! Ed25519 identity files for submitters and the project manager.
//!
//! - Private seed (32 bytes, base64) written with 0600 permissions
//! - The principal is the hex-encoded verifying key
//!
//! Seeds are generated from OS entropy and zeroized after use.

use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::domain::Principal;

/// Generate a new identity and write its seed to `path`.
///
/// # Errors
/// Refuses to overwrite an existing file unless `force` is set.
pub fn generate(path: &Path, force: bool) -> Result<Principal> {
    if path.exists() && !force {
        bail!("Refusing to overwrite existing file {path:?}. Use --force.");
    }

    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let signing_key = SigningKey::from_bytes(&seed);
    let seed_b64 = Zeroizing::new(general_purpose::STANDARD.encode(seed));
    seed.zeroize();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {parent:?}"))?;
    }

    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        opts.mode(0o600);
    }

    let mut file = opts
        .open(path)
        .with_context(|| format!("Failed to open {path:?}"))?;
    file.write_all(seed_b64.as_bytes())?;
    file.write_all(b"\n")?;

    Ok(Principal::from_verifying_key(&signing_key.verifying_key()))
}

/// Load the signing key stored at `path`.
///
/// # Errors
/// Returns error if the file is unreadable or does not hold a 32-byte seed.
pub fn load(path: &Path) -> Result<SigningKey> {
    let content = Zeroizing::new(
        std::fs::read_to_string(path).with_context(|| format!("Failed to read identity {path:?}"))?,
    );
    let decoded = Zeroizing::new(
        general_purpose::STANDARD
            .decode(content.trim())
            .context("Identity file is not valid base64")?,
    );
    let seed: Zeroizing<[u8; 32]> = Zeroizing::new(
        decoded
            .as_slice()
            .try_into()
            .context("Identity seed must be 32 bytes")?,
    );
    Ok(SigningKey::from_bytes(&seed))
}
