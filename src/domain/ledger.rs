//! Ledger records: daily entries, weekly aggregates and ledger metadata.

use serde::{Deserialize, Serialize};

use super::{Handle, LedgerId, Principal};

/// Calendar day index, counted in days since a fixed epoch.
///
/// Caller-supplied and never checked against wall-clock time.
pub type DayIndex = u64;

/// Number of days covered by a weekly aggregate.
pub const WEEK_LENGTH: u64 = 7;

/// The three cost fields as confidential handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostHandles {
    pub material: Handle,
    pub labor: Handle,
    pub rental: Handle,
}

impl CostHandles {
    /// All three fields set to the same handle.
    #[must_use]
    pub fn splat(handle: Handle) -> Self {
        Self {
            material: handle,
            labor: handle,
            rental: handle,
        }
    }

    /// Handles in field order (material, labor, rental).
    #[must_use]
    pub fn to_array(&self) -> [Handle; 3] {
        [self.material, self.labor, self.rental]
    }
}

/// Accumulated costs for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyEntry {
    pub material_cost: Handle,
    pub labor_cost: Handle,
    pub rental_cost: Handle,
    pub initialized: bool,
}

impl DailyEntry {
    /// Entry after a recording, holding the given accumulated handles.
    #[must_use]
    pub fn recorded(costs: CostHandles) -> Self {
        Self {
            material_cost: costs.material,
            labor_cost: costs.labor,
            rental_cost: costs.rental,
            initialized: true,
        }
    }

    /// Stand-in for a day with no recordings.
    #[must_use]
    pub fn zeroed(zero: Handle) -> Self {
        Self {
            material_cost: zero,
            labor_cost: zero,
            rental_cost: zero,
            initialized: false,
        }
    }

    #[must_use]
    pub fn costs(&self) -> CostHandles {
        CostHandles {
            material: self.material_cost,
            labor: self.labor_cost,
            rental: self.rental_cost,
        }
    }
}

/// Field-wise sum of seven consecutive daily entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyAggregate {
    pub material_total: Handle,
    pub labor_total: Handle,
    pub rental_total: Handle,
    pub initialized: bool,
}

impl WeeklyAggregate {
    #[must_use]
    pub fn computed(totals: CostHandles) -> Self {
        Self {
            material_total: totals.material,
            labor_total: totals.labor,
            rental_total: totals.rental,
            initialized: true,
        }
    }

    #[must_use]
    pub fn totals(&self) -> CostHandles {
        CostHandles {
            material: self.material_total,
            labor: self.labor_total,
            rental: self.rental_total,
        }
    }
}

/// Result of reading one day: handles plus whether anything was recorded.
///
/// When `exists` is false the handles are the provider's encrypted zero,
/// so a caller ignoring the flag still decrypts a correct zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyExpense {
    pub material: Handle,
    pub labor: Handle,
    pub rental: Handle,
    pub exists: bool,
}

/// Immutable facts fixed when a ledger is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    pub ledger_id: LedgerId,
    /// The project manager: standing decrypt rights on every handle.
    pub administrator: Principal,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Inclusive day range covered by a week starting at `week_start`.
///
/// Returns `None` when the window would run past `DayIndex::MAX`.
#[must_use]
pub fn week_window(week_start: DayIndex) -> Option<std::ops::RangeInclusive<DayIndex>> {
    let last = week_start.checked_add(WEEK_LENGTH - 1)?;
    Some(week_start..=last)
}
