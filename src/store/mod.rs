//! Persistence for trips, shared forecasts, links and recommendations
//!
//! The pipeline talks to three narrow traits:
//! - [`ForecastCache`]: the process-wide forecast table keyed by (city, date)
//! - [`TripLinkRegistry`]: the trip <-> forecast join records
//! - [`TripRepository`]: trips, their status and their recommendations
//!
//! [`FjallStore`] is the persistent backend, [`MemoryStore`] keeps everything
//! in process. Both key forecasts by city, then date, so a (city, date) pair can
//! only ever map to one row.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::{
    DailyForecast, Forecast, ForecastId, InvalidTransition, Recommendation, Trip,
    TripForecastLink, TripId, TripStatus,
};

pub mod fjall_store;
pub mod memory;

pub use fjall_store::FjallStore;
pub use memory::MemoryStore;

/// Default maximum age of a cached forecast, in hours
pub const FRESHNESS_WINDOW_HOURS: u32 = 24;

/// Default maximum age of a cached forecast
#[must_use]
pub fn default_freshness_window() -> chrono::Duration {
    chrono::Duration::hours(i64::from(FRESHNESS_WINDOW_HOURS))
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] postcard::Error),

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Trip not found: {0}")]
    TripNotFound(TripId),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Whether a cached forecast may be used without refetching.
///
/// A forecast exactly `window` old is stale.
#[must_use]
pub fn is_fresh(forecast: &Forecast, now: DateTime<Utc>, window: chrono::Duration) -> bool {
    forecast.age(now) < window
}

#[async_trait]
pub trait ForecastCache: Send + Sync {
    /// Cached forecasts for `city` on any of `dates`; absent dates are missing from the map
    async fn lookup(
        &self,
        city: &str,
        dates: &[NaiveDate],
    ) -> Result<BTreeMap<NaiveDate, Forecast>, StoreError>;

    /// Insert or overwrite one forecast per record, all in one write.
    ///
    /// Existing rows keep their id; fields and `last_refreshed_at` are replaced.
    async fn upsert_many(
        &self,
        city: &str,
        records: &[DailyForecast],
        refreshed_at: DateTime<Utc>,
    ) -> Result<Vec<Forecast>, StoreError>;
}

#[async_trait]
pub trait TripLinkRegistry: Send + Sync {
    /// Link each forecast to the trip unless already linked. Returns how many links were created.
    ///
    /// Fails with [`StoreError::TripNotFound`] once the trip has been deleted.
    async fn link(&self, trip_id: TripId, forecasts: &[Forecast]) -> Result<usize, StoreError>;

    async fn links(&self, trip_id: TripId) -> Result<Vec<TripForecastLink>, StoreError>;

    /// Forecasts linked to the trip, ordered by date ascending
    async fn linked_forecasts(&self, trip_id: TripId) -> Result<Vec<Forecast>, StoreError>;
}

#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn insert_trip(&self, trip: &Trip) -> Result<(), StoreError>;

    async fn trip(&self, trip_id: TripId) -> Result<Option<Trip>, StoreError>;

    /// Every stored trip, oldest first
    async fn trips(&self) -> Result<Vec<Trip>, StoreError>;

    /// Move the trip to `next`, rejecting transitions the state machine forbids
    async fn update_status(&self, trip_id: TripId, next: TripStatus) -> Result<Trip, StoreError>;

    /// Replace the trip's recommendation set in one write
    async fn replace_recommendations(
        &self,
        trip_id: TripId,
        recommendations: Vec<Recommendation>,
    ) -> Result<(), StoreError>;

    /// Recommendations ordered by category
    async fn recommendations(&self, trip_id: TripId) -> Result<Vec<Recommendation>, StoreError>;

    /// Delete the trip with its links and recommendations. Shared forecasts stay.
    async fn delete_trip(&self, trip_id: TripId) -> Result<bool, StoreError>;
}

/// Everything the trip pipeline needs from persistence
pub trait Store: ForecastCache + TripLinkRegistry + TripRepository {}

impl<T: ForecastCache + TripLinkRegistry + TripRepository> Store for T {}

/// Merge provider records into one city's forecast document
fn merge_records(
    document: &mut BTreeMap<NaiveDate, Forecast>,
    city: &str,
    records: &[DailyForecast],
    refreshed_at: DateTime<Utc>,
) -> Vec<Forecast> {
    records
        .iter()
        .map(|record| {
            let forecast = document
                .entry(record.date)
                .and_modify(|existing| {
                    existing.weather = record.clone();
                    existing.last_refreshed_at = refreshed_at;
                })
                .or_insert_with(|| Forecast {
                    id: ForecastId::new(),
                    city: city.to_string(),
                    weather: record.clone(),
                    last_refreshed_at: refreshed_at,
                });
            forecast.clone()
        })
        .collect()
}

/// Append links for forecasts not yet linked to the trip
fn add_links(existing: &mut Vec<TripForecastLink>, trip_id: TripId, forecasts: &[Forecast]) -> usize {
    let mut created = 0;
    for forecast in forecasts {
        if existing.iter().any(|link| link.forecast_id == forecast.id) {
            continue;
        }
        existing.push(TripForecastLink::new(trip_id, forecast));
        created += 1;
    }
    created
}

fn sort_trips(trips: &mut [Trip]) {
    trips.sort_by_key(|trip| trip.created_at);
}

fn select_dates(
    document: &BTreeMap<NaiveDate, Forecast>,
    dates: &[NaiveDate],
) -> BTreeMap<NaiveDate, Forecast> {
    dates
        .iter()
        .filter_map(|date| document.get(date).map(|f| (*date, f.clone())))
        .collect()
}
