//! Fixed-width identifiers: principals, ledger identities and confidential handles.
//!
//! All three are 32-byte values rendered as `0x`-prefixed lowercase hex.

use ed25519_dalek::VerifyingKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::CryptoError;

macro_rules! bytes32_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Wrap raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Borrow the raw bytes.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Full `0x`-prefixed hex form.
            #[must_use]
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// Abbreviated form for log lines.
            #[must_use]
            pub fn short(&self) -> String {
                format!("0x{}…", hex::encode(&self.0[..4]))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short())
            }
        }

        impl std::str::FromStr for $name {
            type Err = CryptoError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                let digits = trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                    .unwrap_or(trimmed);
                let bytes = hex::decode(digits).map_err(|e| {
                    CryptoError::InvalidEncoding(format!("{}: {e}", stringify!($name)))
                })?;
                let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
                    CryptoError::InvalidEncoding(format!(
                        "{}: expected 32 bytes",
                        stringify!($name)
                    ))
                })?;
                Ok(Self(bytes))
            }
        }
    };
}

bytes32_id!(
    /// An identity that can submit recordings and request disclosures.
    ///
    /// The bytes are an Ed25519 verifying key, so a principal can always
    /// check signatures made in its name.
    Principal
);

bytes32_id!(
    /// Identity of one ledger instance.
    ///
    /// Encrypted inputs are bound to it, and every computed handle is scoped
    /// to the ledger that produced it.
    LedgerId
);

bytes32_id!(
    /// Opaque reference to an encrypted 32-bit value held by the provider.
    Handle
);

impl Principal {
    /// Principal for an Ed25519 verifying key.
    #[must_use]
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    /// Recover the verifying key behind this principal.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKeyFormat` if the bytes are not a valid
    /// Edwards point.
    pub fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("principal {}: {e}", self.short())))
    }
}

impl LedgerId {
    /// Fresh random ledger identity.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl Handle {
    /// Derive a handle from a domain tag and an ordered list of parts.
    ///
    /// Each part is length-prefixed so distinct part lists never collide.
    #[must_use]
    pub fn derive(tag: &[u8], parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((tag.len() as u32).to_be_bytes());
        hasher.update(tag);
        for part in parts {
            hasher.update((part.len() as u32).to_be_bytes());
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn test_hex_roundtrip_accepts_prefix() {
        let handle = Handle::from_bytes([0xab; 32]);
        let parsed: Handle = handle.to_string().parse().expect("parse");
        assert_eq!(parsed, handle);

        let bare: Handle = hex::encode([0xab; 32]).parse().expect("parse bare");
        assert_eq!(bare, handle);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let err = "0xdeadbeef".parse::<LedgerId>().expect_err("too short");
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn test_debug_is_abbreviated() {
        let principal = Principal::from_bytes([0x11; 32]);
        let debug = format!("{principal:?}");
        assert!(debug.starts_with("Principal(0x11111111"));
        assert!(debug.len() < 30);
    }

    #[test]
    fn test_principal_verifying_key_roundtrip() {
        let signing = SigningKey::from_bytes(&[7u8; 32]);
        let principal = Principal::from_verifying_key(&signing.verifying_key());
        let key = principal.verifying_key().expect("valid key");
        assert_eq!(key, signing.verifying_key());
    }

    #[test]
    fn test_derive_is_deterministic_and_tag_separated() {
        let a = Handle::derive(b"add", &[b"x", b"y"]);
        let b = Handle::derive(b"add", &[b"x", b"y"]);
        let c = Handle::derive(b"add", &[b"xy"]);
        let d = Handle::derive(b"sub", &[b"x", b"y"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_generated_ledger_ids_differ() {
        assert_ne!(LedgerId::generate(), LedgerId::generate());
    }
}
