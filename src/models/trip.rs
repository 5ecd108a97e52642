//! Trip model and its status state machine

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Longest trip the planner accepts, in days (inclusive of both ends)
pub const MAX_TRIP_DAYS: i64 = 14;

/// Trip identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TripId(pub Uuid);

impl TripId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Key bytes used by persistent stores
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for TripId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TripId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Processing status of a trip.
///
/// `Pending -> Processing -> Ready | Failed`. `Ready` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TripStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl TripStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TripStatus::Ready | TripStatus::Failed)
    }

    /// Transition table for the trip pipeline.
    ///
    /// `Processing -> Processing` is accepted so that a redelivered or retried
    /// fetch stage can re-enter without error.
    #[must_use]
    pub fn can_transition_to(self, next: TripStatus) -> bool {
        matches!(
            (self, next),
            (TripStatus::Pending, TripStatus::Processing)
                | (TripStatus::Processing, TripStatus::Processing)
                | (TripStatus::Processing, TripStatus::Ready)
                | (TripStatus::Processing, TripStatus::Failed)
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Pending => "pending",
            TripStatus::Processing => "processing",
            TripStatus::Ready => "ready",
            TripStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a trip cannot be created
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TripValidationError {
    #[error("city cannot be empty")]
    EmptyCity,

    #[error("end date {end} must be on or after start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },

    #[error("trip duration must be between 1 and {max} days (currently {days} days)", max = MAX_TRIP_DAYS)]
    Duration { days: i64 },
}

/// Rejected status change
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid trip status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TripStatus,
    pub to: TripStatus,
}

/// A planned trip to one city over an inclusive date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub city: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: TripStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    /// Create a pending trip, enforcing the date and city invariants
    pub fn new(
        city: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, TripValidationError> {
        let city = city.into().trim().to_string();
        if city.is_empty() {
            return Err(TripValidationError::EmptyCity);
        }
        if end_date < start_date {
            return Err(TripValidationError::EndBeforeStart {
                start: start_date,
                end: end_date,
            });
        }
        let days = (end_date - start_date).num_days() + 1;
        if !(1..=MAX_TRIP_DAYS).contains(&days) {
            return Err(TripValidationError::Duration { days });
        }

        let now = Utc::now();
        Ok(Self {
            id: TripId::new(),
            city,
            start_date,
            end_date,
            status: TripStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// Number of days covered, both ends inclusive
    #[must_use]
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Every date from start to end inclusive, ascending
    #[must_use]
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.start_date
            .iter_days()
            .take_while(|date| *date <= self.end_date)
            .collect()
    }

    /// Apply a status change if the state machine allows it
    pub fn transition(&mut self, next: TripStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    #[test]
    fn test_new_trip_is_pending() {
        let trip = Trip::new("Boston", date(1), date(3)).unwrap();
        assert_eq!(trip.status, TripStatus::Pending);
        assert_eq!(trip.duration_days(), 3);
        assert_eq!(trip.dates(), vec![date(1), date(2), date(3)]);
    }

    #[test]
    fn test_single_day_trip() {
        let trip = Trip::new("Boston", date(1), date(1)).unwrap();
        assert_eq!(trip.duration_days(), 1);
        assert_eq!(trip.dates(), vec![date(1)]);
    }

    #[test]
    fn test_trip_validation() {
        assert_eq!(
            Trip::new("  ", date(1), date(2)).unwrap_err(),
            TripValidationError::EmptyCity
        );
        assert!(matches!(
            Trip::new("Boston", date(3), date(2)).unwrap_err(),
            TripValidationError::EndBeforeStart { .. }
        ));
        assert_eq!(
            Trip::new("Boston", date(1), date(15)).unwrap_err(),
            TripValidationError::Duration { days: 15 }
        );
        assert!(Trip::new("Boston", date(1), date(14)).is_ok());
    }

    #[rstest]
    #[case(TripStatus::Pending, TripStatus::Processing, true)]
    #[case(TripStatus::Processing, TripStatus::Processing, true)]
    #[case(TripStatus::Processing, TripStatus::Ready, true)]
    #[case(TripStatus::Processing, TripStatus::Failed, true)]
    #[case(TripStatus::Pending, TripStatus::Ready, false)]
    #[case(TripStatus::Pending, TripStatus::Failed, false)]
    #[case(TripStatus::Ready, TripStatus::Processing, false)]
    #[case(TripStatus::Failed, TripStatus::Processing, false)]
    #[case(TripStatus::Ready, TripStatus::Failed, false)]
    #[case(TripStatus::Processing, TripStatus::Pending, false)]
    fn test_transition_table(
        #[case] from: TripStatus,
        #[case] to: TripStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_transition_rejects_leaving_terminal() {
        let mut trip = Trip::new("Boston", date(1), date(2)).unwrap();
        trip.transition(TripStatus::Processing).unwrap();
        trip.transition(TripStatus::Ready).unwrap();

        let err = trip.transition(TripStatus::Processing).unwrap_err();
        assert_eq!(err.from, TripStatus::Ready);
        assert_eq!(trip.status, TripStatus::Ready);
    }
}
