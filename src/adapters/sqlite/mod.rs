//! SQLite adapter: Implementation of LedgerStore.
//!
//! Provides local persistence for the ledger metadata, daily entries, weekly
//! aggregates and the notification log. Only opaque handles are stored; the
//! ciphertexts behind them live with the arithmetic provider.
//!
//! # Schema
//!
//! Day indices are stored as 8-byte big-endian blobs so the full `u64` range
//! is representable and keys sort in day order.
//!
//! # Mutex Behavior
//!
//! The connection is protected by a `Mutex`. A poisoned mutex (from a panic
//! in another thread) is reported as `StorageError::LockPoisoned` rather than
//! propagating the panic.
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{
    DailyEntry, DayIndex, Handle, LedgerEvent, LedgerId, LedgerMetadata, Principal,
    WeeklyAggregate,
};
use crate::ports::LedgerStore;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Ledger metadata already exists")]
    AlreadyInitialized,

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// SQLite ledger store.
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
}

impl SqliteLedgerStore {
    /// Open (or create) a store at the given database path.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS ledger_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                ledger_id BLOB NOT NULL,
                administrator BLOB NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS daily_entries (
                day BLOB PRIMARY KEY,
                material_cost BLOB NOT NULL,
                labor_cost BLOB NOT NULL,
                rental_cost BLOB NOT NULL,
                initialized INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS weekly_aggregates (
                week_start BLOB PRIMARY KEY,
                material_total BLOB NOT NULL,
                labor_total BLOB NOT NULL,
                rental_total BLOB NOT NULL,
                initialized INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )?;

        Ok(())
    }

    fn write_daily(conn: &Connection, day: DayIndex, entry: &DailyEntry) -> Result<(), StorageError> {
        conn.execute(
            r"
            INSERT OR REPLACE INTO daily_entries (
                day, material_cost, labor_cost, rental_cost, initialized, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                day.to_be_bytes().as_slice(),
                entry.material_cost.as_bytes().as_slice(),
                entry.labor_cost.as_bytes().as_slice(),
                entry.rental_cost.as_bytes().as_slice(),
                entry.initialized,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn write_weekly(
        conn: &Connection,
        week_start: DayIndex,
        aggregate: &WeeklyAggregate,
    ) -> Result<(), StorageError> {
        conn.execute(
            r"
            INSERT OR REPLACE INTO weekly_aggregates (
                week_start, material_total, labor_total, rental_total, initialized, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                week_start.to_be_bytes().as_slice(),
                aggregate.material_total.as_bytes().as_slice(),
                aggregate.labor_total.as_bytes().as_slice(),
                aggregate.rental_total.as_bytes().as_slice(),
                aggregate.initialized,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn append_event(conn: &Connection, event: &LedgerEvent) -> Result<(), StorageError> {
        let payload =
            serde_json::to_string(event).map_err(|e| StorageError::Serialization(e.to_string()))?;
        conn.execute(
            "INSERT INTO events (kind, payload, created_at) VALUES (?1, ?2, ?3)",
            params![event.kind(), payload, event.timestamp().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Read three handle columns and a flag from a row.
    fn handle_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<([Handle; 3], bool)> {
        let a: [u8; 32] = row.get(0)?;
        let b: [u8; 32] = row.get(1)?;
        let c: [u8; 32] = row.get(2)?;
        let initialized: bool = row.get(3)?;
        Ok((
            [
                Handle::from_bytes(a),
                Handle::from_bytes(b),
                Handle::from_bytes(c),
            ],
            initialized,
        ))
    }
}

impl LedgerStore for SqliteLedgerStore {
    type Error = StorageError;

    fn init_metadata(&self, metadata: &LedgerMetadata) -> Result<(), Self::Error> {
        let conn = self.conn()?;

        let exists: i64 =
            conn.query_row("SELECT COUNT(*) FROM ledger_meta WHERE id = 1", [], |row| row.get(0))?;
        if exists > 0 {
            return Err(StorageError::AlreadyInitialized);
        }

        conn.execute(
            "INSERT INTO ledger_meta (id, ledger_id, administrator, created_at) VALUES (1, ?1, ?2, ?3)",
            params![
                metadata.ledger_id.as_bytes().as_slice(),
                metadata.administrator.as_bytes().as_slice(),
                metadata.created_at.to_rfc3339(),
            ],
        )?;

        tracing::info!(
            "Stored ledger metadata (ledger: {}, administrator: {})",
            metadata.ledger_id.short(),
            metadata.administrator.short()
        );
        Ok(())
    }

    fn load_metadata(&self) -> Result<Option<LedgerMetadata>, Self::Error> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                "SELECT ledger_id, administrator, created_at FROM ledger_meta WHERE id = 1",
                [],
                |row| {
                    let ledger_id: [u8; 32] = row.get(0)?;
                    let administrator: [u8; 32] = row.get(1)?;
                    let created_at: String = row.get(2)?;
                    Ok((ledger_id, administrator, created_at))
                },
            )
            .optional()?;

        let Some((ledger_id, administrator, created_at)) = row else {
            return Ok(None);
        };
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| StorageError::Corrupt(format!("ledger_meta.created_at: {e}")))?;

        Ok(Some(LedgerMetadata {
            ledger_id: LedgerId::from_bytes(ledger_id),
            administrator: Principal::from_bytes(administrator),
            created_at,
        }))
    }

    fn get_daily(&self, day: DayIndex) -> Result<Option<DailyEntry>, Self::Error> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                r"
                SELECT material_cost, labor_cost, rental_cost, initialized
                FROM daily_entries WHERE day = ?1
                ",
                params![day.to_be_bytes().as_slice()],
                Self::handle_row,
            )
            .optional()?;

        Ok(row.map(|([material_cost, labor_cost, rental_cost], initialized)| DailyEntry {
            material_cost,
            labor_cost,
            rental_cost,
            initialized,
        }))
    }

    fn put_daily(&self, day: DayIndex, entry: &DailyEntry) -> Result<(), Self::Error> {
        let conn = self.conn()?;
        Self::write_daily(&conn, day, entry)
    }

    fn get_weekly(&self, week_start: DayIndex) -> Result<Option<WeeklyAggregate>, Self::Error> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                r"
                SELECT material_total, labor_total, rental_total, initialized
                FROM weekly_aggregates WHERE week_start = ?1
                ",
                params![week_start.to_be_bytes().as_slice()],
                Self::handle_row,
            )
            .optional()?;

        Ok(row.map(
            |([material_total, labor_total, rental_total], initialized)| WeeklyAggregate {
                material_total,
                labor_total,
                rental_total,
                initialized,
            },
        ))
    }

    fn put_weekly(&self, week_start: DayIndex, aggregate: &WeeklyAggregate) -> Result<(), Self::Error> {
        let conn = self.conn()?;
        Self::write_weekly(&conn, week_start, aggregate)
    }

    fn commit_daily(
        &self,
        day: DayIndex,
        entry: &DailyEntry,
        event: &LedgerEvent,
    ) -> Result<(), Self::Error> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::write_daily(&tx, day, entry)?;
        Self::append_event(&tx, event)?;
        tx.commit()?;

        tracing::debug!("Committed daily entry for day {day}");
        Ok(())
    }

    fn commit_weekly(
        &self,
        week_start: DayIndex,
        aggregate: &WeeklyAggregate,
        event: &LedgerEvent,
    ) -> Result<(), Self::Error> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::write_weekly(&tx, week_start, aggregate)?;
        Self::append_event(&tx, event)?;
        tx.commit()?;

        tracing::debug!("Committed weekly aggregate for week starting {week_start}");
        Ok(())
    }

    fn recent_events(&self, limit: usize) -> Result<Vec<LedgerEvent>, Self::Error> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r"
            SELECT payload FROM events
            ORDER BY seq DESC
            LIMIT ?1
            ",
        )?;

        let payloads = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        payloads
            .iter()
            .map(|payload| {
                serde_json::from_str(payload)
                    .map_err(|e| StorageError::Corrupt(format!("event payload: {e}")))
            })
            .collect()
    }
}
