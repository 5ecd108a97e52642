use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fjall::Keyspace;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::Mutex;
use tokio::task;

use super::{
    ForecastCache, StoreError, TripLinkRegistry, TripRepository, add_links, merge_records,
    select_dates, sort_trips,
};
use crate::models::{
    DailyForecast, Forecast, Recommendation, Trip, TripForecastLink, TripId, TripStatus,
};

type ForecastDocument = BTreeMap<NaiveDate, Forecast>;

/// Persistent store on top of a fjall database.
///
/// Each city's forecasts live in a single postcard-encoded document, so a batch
/// upsert is one insert. Read-modify-write cycles are serialized by `write_lock`.
pub struct FjallStore {
    db: fjall::Database,
    trips: Keyspace,
    forecasts: Keyspace,
    links: Keyspace,
    recommendations: Keyspace,
    write_lock: Mutex<()>,
}

fn get_from_store(store: Keyspace, key: Vec<u8>) -> Result<Option<Vec<u8>>, fjall::Error> {
    Ok(store.get(key)?.map(|v| v.to_vec()))
}

fn values_in_store(store: Keyspace) -> Result<Vec<Vec<u8>>, fjall::Error> {
    store
        .iter()
        .map(|entry| entry.value().map(|v| v.to_vec()))
        .collect()
}

impl FjallStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = fjall::Database::builder(&path).open()?;
        let trips = db.keyspace("trips", fjall::KeyspaceCreateOptions::default)?;
        let forecasts = db.keyspace("forecasts", fjall::KeyspaceCreateOptions::default)?;
        let links = db.keyspace("trip_forecasts", fjall::KeyspaceCreateOptions::default)?;
        let recommendations =
            db.keyspace("recommendations", fjall::KeyspaceCreateOptions::default)?;

        Ok(FjallStore {
            db,
            trips,
            forecasts,
            links,
            recommendations,
            write_lock: Mutex::new(()),
        })
    }

    #[tracing::instrument(name = "query_store", level = "debug", skip(store, key))]
    async fn read<T: DeserializeOwned + Send + 'static>(
        store: &Keyspace,
        key: Vec<u8>,
    ) -> Result<Option<T>, StoreError> {
        let store = store.clone();
        let maybe_bytes = task::spawn_blocking(move || get_from_store(store, key)).await??;

        match maybe_bytes {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => {
                tracing::debug!("Key not found");
                Ok(None)
            }
        }
    }

    #[tracing::instrument(name = "put_store", level = "debug", skip(store, key, value))]
    async fn write<T: Serialize>(store: &Keyspace, key: Vec<u8>, value: &T) -> Result<(), StoreError> {
        let store = store.clone();
        let bytes = postcard::to_stdvec(value)?;
        task::spawn_blocking(move || store.insert(key, bytes)).await??;
        Ok(())
    }


    async fn forecast_document(&self, city: &str) -> Result<ForecastDocument, StoreError> {
        Ok(Self::read(&self.forecasts, city.as_bytes().to_vec())
            .await?
            .unwrap_or_default())
    }

    async fn trip_links(&self, trip_id: TripId) -> Result<Vec<TripForecastLink>, StoreError> {
        Ok(Self::read(&self.links, trip_id.as_bytes().to_vec())
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl ForecastCache for FjallStore {
    async fn lookup(
        &self,
        city: &str,
        dates: &[NaiveDate],
    ) -> Result<BTreeMap<NaiveDate, Forecast>, StoreError> {
        let document = self.forecast_document(city).await?;
        Ok(select_dates(&document, dates))
    }

    async fn upsert_many(
        &self,
        city: &str,
        records: &[DailyForecast],
        refreshed_at: DateTime<Utc>,
    ) -> Result<Vec<Forecast>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.forecast_document(city).await?;
        let saved = merge_records(&mut document, city, records, refreshed_at);
        Self::write(&self.forecasts, city.as_bytes().to_vec(), &document).await?;
        tracing::debug!(city, count = saved.len(), "Upserted forecasts");
        Ok(saved)
    }
}

#[async_trait]
impl TripLinkRegistry for FjallStore {
    async fn link(&self, trip_id: TripId, forecasts: &[Forecast]) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        if self.trip(trip_id).await?.is_none() {
            return Err(StoreError::TripNotFound(trip_id));
        }
        let mut links = self.trip_links(trip_id).await?;
        let created = add_links(&mut links, trip_id, forecasts);
        if created > 0 {
            Self::write(&self.links, trip_id.as_bytes().to_vec(), &links).await?;
        }
        Ok(created)
    }

    async fn links(&self, trip_id: TripId) -> Result<Vec<TripForecastLink>, StoreError> {
        self.trip_links(trip_id).await
    }

    async fn linked_forecasts(&self, trip_id: TripId) -> Result<Vec<Forecast>, StoreError> {
        let links = self.trip_links(trip_id).await?;

        let mut documents: BTreeMap<String, ForecastDocument> = BTreeMap::new();
        let mut forecasts = Vec::with_capacity(links.len());
        for link in links {
            if !documents.contains_key(&link.city) {
                let document = self.forecast_document(&link.city).await?;
                documents.insert(link.city.clone(), document);
            }
            let found = documents
                .get(&link.city)
                .and_then(|document| document.get(&link.date))
                .filter(|forecast| forecast.id == link.forecast_id);
            if let Some(forecast) = found {
                forecasts.push(forecast.clone());
            }
        }

        forecasts.sort_by_key(Forecast::date);
        Ok(forecasts)
    }
}

#[async_trait]
impl TripRepository for FjallStore {
    async fn insert_trip(&self, trip: &Trip) -> Result<(), StoreError> {
        Self::write(&self.trips, trip.id.as_bytes().to_vec(), trip).await
    }

    async fn trip(&self, trip_id: TripId) -> Result<Option<Trip>, StoreError> {
        Self::read(&self.trips, trip_id.as_bytes().to_vec()).await
    }

    async fn trips(&self) -> Result<Vec<Trip>, StoreError> {
        let store = self.trips.clone();
        let rows = task::spawn_blocking(move || values_in_store(store)).await??;
        let mut trips = rows
            .iter()
            .map(|bytes| postcard::from_bytes(bytes))
            .collect::<Result<Vec<Trip>, _>>()?;
        sort_trips(&mut trips);
        Ok(trips)
    }

    async fn update_status(&self, trip_id: TripId, next: TripStatus) -> Result<Trip, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut trip = self
            .trip(trip_id)
            .await?
            .ok_or(StoreError::TripNotFound(trip_id))?;
        trip.transition(next)?;
        Self::write(&self.trips, trip_id.as_bytes().to_vec(), &trip).await?;
        Ok(trip)
    }

    async fn replace_recommendations(
        &self,
        trip_id: TripId,
        recommendations: Vec<Recommendation>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if self.trip(trip_id).await?.is_none() {
            return Err(StoreError::TripNotFound(trip_id));
        }
        Self::write(
            &self.recommendations,
            trip_id.as_bytes().to_vec(),
            &recommendations,
        )
        .await
    }

    async fn recommendations(&self, trip_id: TripId) -> Result<Vec<Recommendation>, StoreError> {
        let mut recommendations: Vec<Recommendation> =
            Self::read(&self.recommendations, trip_id.as_bytes().to_vec())
                .await?
                .unwrap_or_default();
        recommendations.sort_by_key(|r| r.category);
        Ok(recommendations)
    }

    async fn delete_trip(&self, trip_id: TripId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let existed = self.trip(trip_id).await?.is_some();
        let key = trip_id.as_bytes().to_vec();
        let mut batch = self.db.batch();
        batch.remove(&self.recommendations, key.clone());
        batch.remove(&self.links, key.clone());
        batch.remove(&self.trips, key);
        task::spawn_blocking(move || batch.commit()).await??;
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClothingCategory;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn record(day: u32, max: f64) -> DailyForecast {
        DailyForecast {
            temperature_max: Some(max),
            conditions: "Clear, Sunny".to_string(),
            ..DailyForecast::empty(date(day))
        }
    }

    #[tokio::test]
    async fn test_trip_roundtrip_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallStore::open(dir.path()).unwrap();
        let trip = Trip::new("Boston", date(1), date(3)).unwrap();

        store.insert_trip(&trip).await.unwrap();
        assert_eq!(store.trip(trip.id).await.unwrap(), Some(trip.clone()));

        let processing = store
            .update_status(trip.id, TripStatus::Processing)
            .await
            .unwrap();
        assert_eq!(processing.status, TripStatus::Processing);
        assert_eq!(
            store.trip(trip.id).await.unwrap().map(|t| t.status),
            Some(TripStatus::Processing)
        );
    }

    #[tokio::test]
    async fn test_upsert_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallStore::open(dir.path()).unwrap();
        let old = Utc::now() - chrono::Duration::hours(30);

        let first = store
            .upsert_many("Boston", &[record(1, 70.0), record(2, 72.0)], old)
            .await
            .unwrap();
        let now = Utc::now();
        let second = store
            .upsert_many("Boston", &[record(1, 64.0)], now)
            .await
            .unwrap();

        assert_eq!(first[0].id, second[0].id);
        let found = store.lookup("Boston", &[date(1), date(2)]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&date(1)].weather.temperature_max, Some(64.0));
        assert_eq!(found[&date(1)].last_refreshed_at, now);
        assert_eq!(found[&date(2)].last_refreshed_at, old);
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let trip = Trip::new("Denver", date(1), date(1)).unwrap();
        {
            let store = FjallStore::open(dir.path()).unwrap();
            store.insert_trip(&trip).await.unwrap();
            let forecasts = store
                .upsert_many("Denver", &[record(1, 50.0)], Utc::now())
                .await
                .unwrap();
            store.link(trip.id, &forecasts).await.unwrap();
        }

        let store = FjallStore::open(dir.path()).unwrap();
        assert!(store.trip(trip.id).await.unwrap().is_some());
        let linked = store.linked_forecasts(trip.id).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].city, "Denver");
    }

    #[tokio::test]
    async fn test_link_is_idempotent_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallStore::open(dir.path()).unwrap();
        let trip = Trip::new("Boston", date(1), date(3)).unwrap();
        store.insert_trip(&trip).await.unwrap();

        let forecasts = store
            .upsert_many("Boston", &[record(3, 70.0), record(1, 71.0), record(2, 72.0)], Utc::now())
            .await
            .unwrap();

        assert_eq!(store.link(trip.id, &forecasts).await.unwrap(), 3);
        assert_eq!(store.link(trip.id, &forecasts).await.unwrap(), 0);

        let dates: Vec<NaiveDate> = store
            .linked_forecasts(trip.id)
            .await
            .unwrap()
            .iter()
            .map(Forecast::date)
            .collect();
        assert_eq!(dates, vec![date(1), date(2), date(3)]);
    }

    #[tokio::test]
    async fn test_delete_cascades_but_keeps_forecasts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallStore::open(dir.path()).unwrap();
        let trip = Trip::new("Boston", date(1), date(1)).unwrap();
        store.insert_trip(&trip).await.unwrap();

        let forecasts = store
            .upsert_many("Boston", &[record(1, 70.0)], Utc::now())
            .await
            .unwrap();
        store.link(trip.id, &forecasts).await.unwrap();
        store
            .replace_recommendations(
                trip.id,
                vec![Recommendation::new(trip.id, ClothingCategory::Footwear, "Sneakers")],
            )
            .await
            .unwrap();

        assert!(store.delete_trip(trip.id).await.unwrap());
        assert!(!store.delete_trip(trip.id).await.unwrap());

        assert!(store.links(trip.id).await.unwrap().is_empty());
        assert!(store.recommendations(trip.id).await.unwrap().is_empty());
        assert_eq!(store.lookup("Boston", &[date(1)]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_recommendations_requires_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallStore::open(dir.path()).unwrap();
        let missing = TripId::new();

        let err = store
            .replace_recommendations(missing, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TripNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_concurrent_upserts_converge_to_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FjallStore::open(dir.path()).unwrap());

        let writers = (0..8).map(|i| {
            let store = std::sync::Arc::clone(&store);
            async move {
                store
                    .upsert_many("Boston", &[record(1, 60.0 + f64::from(i))], Utc::now())
                    .await
            }
        });
        let saved: Vec<Vec<Forecast>> = futures::future::join_all(writers)
            .await
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();

        let ids: std::collections::HashSet<_> = saved.iter().map(|batch| batch[0].id).collect();
        assert_eq!(ids.len(), 1);
        let found = store.lookup("Boston", &[date(1), date(2)]).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_link_requires_live_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallStore::open(dir.path()).unwrap();
        let trip = Trip::new("Boston", date(1), date(1)).unwrap();
        store.insert_trip(&trip).await.unwrap();
        let forecasts = store
            .upsert_many("Boston", &[record(1, 70.0)], Utc::now())
            .await
            .unwrap();
        store.delete_trip(trip.id).await.unwrap();

        let err = store.link(trip.id, &forecasts).await.unwrap_err();

        assert!(matches!(err, StoreError::TripNotFound(id) if id == trip.id));
        assert!(store.links(trip.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_durable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let trip = Trip::new("Denver", date(1), date(1)).unwrap();
        {
            let store = FjallStore::open(dir.path()).unwrap();
            store.insert_trip(&trip).await.unwrap();
            let forecasts = store
                .upsert_many("Denver", &[record(1, 50.0)], Utc::now())
                .await
                .unwrap();
            store.link(trip.id, &forecasts).await.unwrap();
            store
                .replace_recommendations(
                    trip.id,
                    vec![Recommendation::new(trip.id, ClothingCategory::Outerwear, "Fleece")],
                )
                .await
                .unwrap();
            assert!(store.delete_trip(trip.id).await.unwrap());
        }

        let store = FjallStore::open(dir.path()).unwrap();
        assert!(store.trip(trip.id).await.unwrap().is_none());
        assert!(store.links(trip.id).await.unwrap().is_empty());
        assert!(store.recommendations(trip.id).await.unwrap().is_empty());
        assert_eq!(store.lookup("Denver", &[date(1)]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_trips_listed_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = FjallStore::open(dir.path()).unwrap();
        assert!(store.trips().await.unwrap().is_empty());

        let mut older = Trip::new("Boston", date(1), date(2)).unwrap();
        older.created_at -= chrono::Duration::hours(1);
        let newer = Trip::new("Chicago", date(3), date(4)).unwrap();
        store.insert_trip(&newer).await.unwrap();
        store.insert_trip(&older).await.unwrap();

        let trips = store.trips().await.unwrap();
        assert_eq!(trips, vec![older, newer]);
    }
}
