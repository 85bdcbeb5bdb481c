//! Ledger store port: keyed persistence for daily entries and weekly aggregates.
//!
//! The store has no confidentiality logic. It also carries the execution
//! environment's append-only notification log and the ledger metadata row.

use crate::domain::{DailyEntry, DayIndex, LedgerEvent, LedgerMetadata, WeeklyAggregate};

/// Trait for ledger persistence.
pub trait LedgerStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Record the ledger's identity and administrator.
    ///
    /// # Errors
    /// Returns error if metadata already exists or the write fails.
    fn init_metadata(&self, metadata: &LedgerMetadata) -> Result<(), Self::Error>;

    /// Load the ledger metadata, if the ledger was created.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn load_metadata(&self) -> Result<Option<LedgerMetadata>, Self::Error>;

    /// Entry for `day`, or `None` if nothing was recorded.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn get_daily(&self, day: DayIndex) -> Result<Option<DailyEntry>, Self::Error>;

    /// Create or replace the entry for `day`.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn put_daily(&self, day: DayIndex, entry: &DailyEntry) -> Result<(), Self::Error>;

    /// Last aggregate computed for `week_start`.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn get_weekly(&self, week_start: DayIndex) -> Result<Option<WeeklyAggregate>, Self::Error>;

    /// Create or replace the aggregate for `week_start`.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn put_weekly(&self, week_start: DayIndex, aggregate: &WeeklyAggregate)
        -> Result<(), Self::Error>;

    /// Whether any recording exists for `day`.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn is_initialized(&self, day: DayIndex) -> Result<bool, Self::Error> {
        Ok(self.get_daily(day)?.is_some_and(|entry| entry.initialized))
    }

    /// Write a daily entry and its notification as one unit.
    ///
    /// # Errors
    /// Returns error if storage operation fails; nothing is written then.
    fn commit_daily(
        &self,
        day: DayIndex,
        entry: &DailyEntry,
        event: &LedgerEvent,
    ) -> Result<(), Self::Error>;

    /// Write a weekly aggregate and its notification as one unit.
    ///
    /// # Errors
    /// Returns error if storage operation fails; nothing is written then.
    fn commit_weekly(
        &self,
        week_start: DayIndex,
        aggregate: &WeeklyAggregate,
        event: &LedgerEvent,
    ) -> Result<(), Self::Error>;

    /// Most recent notifications, newest first.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn recent_events(&self, limit: usize) -> Result<Vec<LedgerEvent>, Self::Error>;
}
