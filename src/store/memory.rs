//! In-process store backed by hash maps behind a single lock

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{
    ForecastCache, StoreError, TripLinkRegistry, TripRepository, add_links, merge_records,
    select_dates, sort_trips,
};
use crate::models::{
    DailyForecast, Forecast, Recommendation, Trip, TripForecastLink, TripId, TripStatus,
};

#[derive(Default)]
struct Tables {
    trips: HashMap<TripId, Trip>,
    forecasts: HashMap<String, BTreeMap<NaiveDate, Forecast>>,
    links: HashMap<TripId, Vec<TripForecastLink>>,
    recommendations: HashMap<TripId, Vec<Recommendation>>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of cached forecasts across all cities
    pub async fn forecast_count(&self) -> usize {
        self.tables
            .read()
            .await
            .forecasts
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    /// Total number of trip/forecast links across all trips
    pub async fn link_count(&self) -> usize {
        self.tables.read().await.links.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl ForecastCache for MemoryStore {
    async fn lookup(
        &self,
        city: &str,
        dates: &[NaiveDate],
    ) -> Result<BTreeMap<NaiveDate, Forecast>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .forecasts
            .get(city)
            .map(|document| select_dates(document, dates))
            .unwrap_or_default())
    }

    async fn upsert_many(
        &self,
        city: &str,
        records: &[DailyForecast],
        refreshed_at: DateTime<Utc>,
    ) -> Result<Vec<Forecast>, StoreError> {
        let mut tables = self.tables.write().await;
        let document = tables.forecasts.entry(city.to_string()).or_default();
        Ok(merge_records(document, city, records, refreshed_at))
    }
}

#[async_trait]
impl TripLinkRegistry for MemoryStore {
    async fn link(&self, trip_id: TripId, forecasts: &[Forecast]) -> Result<usize, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.trips.contains_key(&trip_id) {
            return Err(StoreError::TripNotFound(trip_id));
        }
        let existing = tables.links.entry(trip_id).or_default();
        Ok(add_links(existing, trip_id, forecasts))
    }

    async fn links(&self, trip_id: TripId) -> Result<Vec<TripForecastLink>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .links
            .get(&trip_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn linked_forecasts(&self, trip_id: TripId) -> Result<Vec<Forecast>, StoreError> {
        let tables = self.tables.read().await;
        let Some(links) = tables.links.get(&trip_id) else {
            return Ok(Vec::new());
        };

        let mut forecasts: Vec<Forecast> = links
            .iter()
            .filter_map(|link| {
                tables
                    .forecasts
                    .get(&link.city)
                    .and_then(|document| document.get(&link.date))
                    .filter(|forecast| forecast.id == link.forecast_id)
                    .cloned()
            })
            .collect();
        forecasts.sort_by_key(Forecast::date);
        Ok(forecasts)
    }
}

#[async_trait]
impl TripRepository for MemoryStore {
    async fn insert_trip(&self, trip: &Trip) -> Result<(), StoreError> {
        self.tables.write().await.trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn trip(&self, trip_id: TripId) -> Result<Option<Trip>, StoreError> {
        Ok(self.tables.read().await.trips.get(&trip_id).cloned())
    }

    async fn trips(&self) -> Result<Vec<Trip>, StoreError> {
        let mut trips: Vec<Trip> = self.tables.read().await.trips.values().cloned().collect();
        sort_trips(&mut trips);
        Ok(trips)
    }

    async fn update_status(&self, trip_id: TripId, next: TripStatus) -> Result<Trip, StoreError> {
        let mut tables = self.tables.write().await;
        let trip = tables
            .trips
            .get_mut(&trip_id)
            .ok_or(StoreError::TripNotFound(trip_id))?;
        trip.transition(next)?;
        Ok(trip.clone())
    }

    async fn replace_recommendations(
        &self,
        trip_id: TripId,
        recommendations: Vec<Recommendation>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.trips.contains_key(&trip_id) {
            return Err(StoreError::TripNotFound(trip_id));
        }
        tables.recommendations.insert(trip_id, recommendations);
        Ok(())
    }

    async fn recommendations(&self, trip_id: TripId) -> Result<Vec<Recommendation>, StoreError> {
        let mut recommendations = self
            .tables
            .read()
            .await
            .recommendations
            .get(&trip_id)
            .cloned()
            .unwrap_or_default();
        recommendations.sort_by_key(|r| r.category);
        Ok(recommendations)
    }

    async fn delete_trip(&self, trip_id: TripId) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let existed = tables.trips.remove(&trip_id).is_some();
        tables.links.remove(&trip_id);
        tables.recommendations.remove(&trip_id);
        Ok(existed)
    }
}
