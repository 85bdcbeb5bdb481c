//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external libraries:
//! - `elgamal`: curve25519-dalek for confidential arithmetic
//! - `sqlite`: SQLite for ledger storage

pub mod elgamal;
pub mod sqlite;

// Re-export storage error for lib.rs
pub use sqlite::StorageError;
