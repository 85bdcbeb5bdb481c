//! Notifications emitted after successful ledger operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DayIndex, Principal};

/// Append-only notification emitted on the ledger's event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A recording was accumulated into a day's entry.
    ExpenseRecorded {
        submitter: Principal,
        day: DayIndex,
        timestamp: DateTime<Utc>,
    },

    /// A weekly aggregate was (re)computed.
    WeeklyTotalCalculated {
        week_start: DayIndex,
        timestamp: DateTime<Utc>,
    },
}

impl LedgerEvent {
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ExpenseRecorded { timestamp, .. }
            | Self::WeeklyTotalCalculated { timestamp, .. } => *timestamp,
        }
    }

    /// Stable name used as the event kind column in storage.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExpenseRecorded { .. } => "expense_recorded",
            Self::WeeklyTotalCalculated { .. } => "weekly_total_calculated",
        }
    }
}

impl std::fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExpenseRecorded {
                submitter,
                day,
                timestamp,
            } => write!(
                f,
                "{} ExpenseRecorded day={day} submitter={submitter}",
                timestamp.to_rfc3339()
            ),
            Self::WeeklyTotalCalculated {
                week_start,
                timestamp,
            } => write!(
                f,
                "{} WeeklyTotalCalculated week_start={week_start}",
                timestamp.to_rfc3339()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape_is_tagged() {
        let event = LedgerEvent::WeeklyTotalCalculated {
            week_start: 19_000,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["kind"], "weekly_total_calculated");
        assert_eq!(json["week_start"], 19_000);
        assert_eq!(event.kind(), "weekly_total_calculated");
    }
}
