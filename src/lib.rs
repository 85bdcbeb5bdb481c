//! # Expense Ledger
//!
//! Confidential construction-expense ledger over additively homomorphic
//! encryption.
//!
//! This crate provides:
//! - Per-day accumulation of encrypted (material, labor, rental) cost triples
//! - Encrypted weekly rollups over a 7-day window
//! - A decrypt-grant discipline: only the project manager and the submitter
//!   of a recording may ever learn its plaintext
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types (handles, principals, daily entries, weekly aggregates, keys)
//! - `ports`: Trait definitions for the arithmetic provider and the store
//! - `adapters`: Concrete implementations (ElGamal over Ristretto255, SQLite)
//! - `application`: The accumulation and aggregation engine
//! - `cli`: Command-line front end

pub mod adapters;
pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::ExpenseLedger;
pub use domain::{CostHandles, DailyExpense, DayIndex, Handle, LedgerId, Principal};

use ports::ArithmeticError;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Main error type for ledger operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Proof verification failed: {0}")]
    ProofVerification(String),

    #[error("Arithmetic rejected: {0}")]
    ArithmeticRejection(String),

    #[error("Unauthorized disclosure: {principal} may not decrypt {handle}")]
    UnauthorizedDisclosure { handle: Handle, principal: Principal },

    #[error("Storage operation failed: {0}")]
    Storage(#[from] adapters::StorageError),

    #[error("Cryptographic operation failed: {0}")]
    Crypto(#[from] domain::CryptoError),

    #[error("Week starting at day {0} runs past the last representable day")]
    InvalidWindow(DayIndex),

    #[error("Ledger has not been created in this store")]
    NotInitialized,

    #[error("Ledger already exists in this store")]
    AlreadyInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ArithmeticError> for LedgerError {
    fn from(err: ArithmeticError) -> Self {
        match err {
            ArithmeticError::ProofVerification(reason) => Self::ProofVerification(reason),
            ArithmeticError::Unauthorized { handle, principal } => {
                Self::UnauthorizedDisclosure { handle, principal }
            }
            ArithmeticError::Crypto(e) => Self::Crypto(e),
            ArithmeticError::Persistence(e) => Self::Io(e),
            other => Self::ArithmeticRejection(other.to_string()),
        }
    }
}
