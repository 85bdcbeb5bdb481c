//! Domain layer: Core ledger types.
//!
//! Pure data types with no I/O. Confidential values appear only as
//! `Handle`s; nothing in this layer can see a plaintext amount.

mod crypto;
mod event;
mod identity;
pub mod kdf;
mod ledger;

pub use crypto::{CryptoError, DecryptionKey, EncryptionKey};
pub use event::LedgerEvent;
pub use identity::{Handle, LedgerId, Principal};
pub use ledger::{
    week_window, CostHandles, DailyEntry, DailyExpense, DayIndex, LedgerMetadata,
    WeeklyAggregate, WEEK_LENGTH,
};
