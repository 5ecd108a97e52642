//! Resolve, refresh and link the forecasts a trip needs

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::ProcessingError;
use crate::models::{Forecast, Trip};
use crate::store::{ForecastCache, TripLinkRegistry, default_freshness_window, is_fresh};
use crate::weather::WeatherProvider;

/// Fetch-and-link stage of the trip pipeline.
///
/// Safe to run repeatedly for the same trip: fresh forecasts are reused, stale
/// or missing ones are refetched as one batch, and links are only added once.
pub struct ForecastProcessor<S, P> {
    store: Arc<S>,
    provider: Arc<P>,
    freshness_window: chrono::Duration,
}

impl<S, P> ForecastProcessor<S, P>
where
    S: ForecastCache + TripLinkRegistry,
    P: WeatherProvider,
{
    pub fn new(store: Arc<S>, provider: Arc<P>) -> Self {
        Self {
            store,
            provider,
            freshness_window: default_freshness_window(),
        }
    }

    #[must_use]
    pub fn with_freshness_window(mut self, window: chrono::Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Forecasts linked to `trip`, ordered by date
    pub async fn process(&self, trip: &Trip) -> Result<Vec<Forecast>, ProcessingError> {
        self.process_at(trip, Utc::now()).await
    }

    /// Same as [`process`](Self::process) with an explicit clock
    #[instrument(name = "process_trip", skip(self, trip, now), fields(trip_id = %trip.id, city = %trip.city))]
    pub async fn process_at(
        &self,
        trip: &Trip,
        now: DateTime<Utc>,
    ) -> Result<Vec<Forecast>, ProcessingError> {
        let required = trip.dates();

        let cached = self.store.lookup(&trip.city, &required).await?;
        let needs_fetch: Vec<NaiveDate> = required
            .iter()
            .filter(|date| {
                !cached
                    .get(date)
                    .is_some_and(|forecast| is_fresh(forecast, now, self.freshness_window))
            })
            .copied()
            .collect();

        if needs_fetch.is_empty() {
            debug!(days = required.len(), "All forecasts fresh in cache");
        } else {
            info!(
                "Refreshing forecasts for {} ({} of {} days missing or stale)",
                trip.city,
                needs_fetch.len(),
                required.len()
            );
            let records: Vec<_> = self
                .provider
                .fetch(&trip.city, trip.start_date, trip.end_date)
                .await?
                .into_iter()
                .filter(|record| record.date >= trip.start_date && record.date <= trip.end_date)
                .collect();
            self.store.upsert_many(&trip.city, &records, now).await?;
        }

        let resolved = self.store.lookup(&trip.city, &required).await?;
        let missing: Vec<NaiveDate> = required
            .iter()
            .filter(|date| !resolved.contains_key(date))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(ProcessingError::Inconsistent {
                city: trip.city.clone(),
                missing,
            });
        }

        // BTreeMap iteration is already date ascending
        let forecasts: Vec<Forecast> = resolved.into_values().collect();
        let created = self.store.link(trip.id, &forecasts).await?;
        debug!(linked = created, total = forecasts.len(), "Linked forecasts to trip");

        Ok(forecasts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DailyForecast;
    use crate::store::{MemoryStore, StoreError, TripRepository};
    use crate::weather::ProviderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed five-day window starting at `first_day`, counting calls
    struct FixedWindowProvider {
        first_day: NaiveDate,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FixedWindowProvider {
        fn new(first_day: NaiveDate) -> Self {
            Self {
                first_day,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(date(1))
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherProvider for FixedWindowProvider {
        async fn fetch(
            &self,
            _city: &str,
            _start_date: NaiveDate,
            _end_date: NaiveDate,
        ) -> Result<Vec<DailyForecast>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Network("connection reset".to_string()));
            }
            Ok(self
                .first_day
                .iter_days()
                .take(5)
                .map(|day| DailyForecast {
                    temperature_max: Some(70.0),
                    temperature_min: Some(50.0),
                    temperature_avg: Some(60.0),
                    ..DailyForecast::empty(day)
                })
                .collect())
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn setup(
        provider: FixedWindowProvider,
    ) -> (
        Arc<MemoryStore>,
        Arc<FixedWindowProvider>,
        ForecastProcessor<MemoryStore, FixedWindowProvider>,
    ) {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(provider);
        let processor = ForecastProcessor::new(Arc::clone(&store), Arc::clone(&provider));
        (store, provider, processor)
    }

    async fn saved_trip(store: &MemoryStore, start: NaiveDate, end: NaiveDate) -> Trip {
        let trip = Trip::new("Boston", start, end).unwrap();
        store.insert_trip(&trip).await.unwrap();
        trip
    }

    #[tokio::test]
    async fn test_fetch_keeps_only_trip_dates() {
        let (store, provider, processor) = setup(FixedWindowProvider::new(date(1)));
        let trip = saved_trip(&store, date(2), date(4)).await;

        let forecasts = processor.process(&trip).await.unwrap();

        let dates: Vec<NaiveDate> = forecasts.iter().map(Forecast::date).collect();
        assert_eq!(dates, vec![date(2), date(3), date(4)]);
        assert_eq!(provider.calls(), 1);
        assert_eq!(store.forecast_count().await, 3);
        assert_eq!(store.links(trip.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let (store, provider, processor) = setup(FixedWindowProvider::new(date(1)));
        let trip = saved_trip(&store, date(1), date(3)).await;

        let first = processor.process(&trip).await.unwrap();
        let second = processor.process(&trip).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);
        assert_eq!(store.links(trip.id).await.unwrap().len(), 3);
        assert_eq!(store.forecast_count().await, 3);
    }

    #[tokio::test]
    async fn test_freshness_boundary_decides_refetch() {
        let (store, provider, processor) = setup(FixedWindowProvider::new(date(1)));
        let trip = saved_trip(&store, date(1), date(1)).await;
        let now = Utc::now();
        let window = default_freshness_window();

        store
            .upsert_many(
                "Boston",
                &[DailyForecast::empty(date(1))],
                now - window + chrono::Duration::minutes(1),
            )
            .await
            .unwrap();
        processor.process_at(&trip, now).await.unwrap();
        assert_eq!(provider.calls(), 0);

        store
            .upsert_many("Boston", &[DailyForecast::empty(date(1))], now - window)
            .await
            .unwrap();
        processor.process_at(&trip, now).await.unwrap();
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_one_stale_day_refetches_whole_range() {
        let (store, provider, processor) = setup(FixedWindowProvider::new(date(1)));
        let trip = saved_trip(&store, date(1), date(2)).await;
        let now = Utc::now();

        store
            .upsert_many("Boston", &[DailyForecast::empty(date(1))], now)
            .await
            .unwrap();
        let forecasts = processor.process_at(&trip, now).await.unwrap();

        assert_eq!(provider.calls(), 1);
        assert_eq!(forecasts.len(), 2);
        assert!(forecasts.iter().all(|f| f.weather.temperature_avg == Some(60.0)));
    }

    #[tokio::test]
    async fn test_provider_failure_links_nothing() {
        let (store, provider, processor) = setup(FixedWindowProvider::failing());
        let trip = saved_trip(&store, date(1), date(3)).await;

        let err = processor.process(&trip).await.unwrap_err();

        assert!(matches!(err, ProcessingError::Provider(_)));
        assert_eq!(provider.calls(), 1);
        assert_eq!(store.forecast_count().await, 0);
        assert!(store.links(trip.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_provider_window_is_inconsistent() {
        // Provider only covers June 1-5
        let (store, _provider, processor) = setup(FixedWindowProvider::new(date(1)));
        let trip = saved_trip(&store, date(4), date(7)).await;

        let err = processor.process(&trip).await.unwrap_err();

        match err {
            ProcessingError::Inconsistent { city, missing } => {
                assert_eq!(city, "Boston");
                assert_eq!(missing, vec![date(6), date(7)]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_deleted_trip_gets_no_links() {
        let (store, provider, processor) = setup(FixedWindowProvider::new(date(1)));
        let trip = saved_trip(&store, date(1), date(3)).await;
        store.delete_trip(trip.id).await.unwrap();

        let err = processor.process(&trip).await.unwrap_err();

        assert!(matches!(
            err,
            ProcessingError::Store(StoreError::TripNotFound(id)) if id == trip.id
        ));
        assert_eq!(provider.calls(), 1);
        assert_eq!(store.link_count().await, 0);
        assert!(store.links(trip.id).await.unwrap().is_empty());
    }
}
