//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the ledger engine and its collaborators: the confidential
//! arithmetic provider and the persistent store.

mod arithmetic;
mod store;

pub use arithmetic::{ArithmeticError, ConfidentialArithmetic, DisclosureRequest};
pub use store::LedgerStore;
