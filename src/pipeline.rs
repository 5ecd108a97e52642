//! Two-stage trip pipeline
//!
//! Stage 1 ([`Job::FetchForecasts`]) moves the trip to `processing`, resolves
//! and links its forecasts, then schedules stage 2. Stage 2
//! ([`Job::AnalyzeForecasts`]) writes the five recommendations and marks the
//! trip `ready`. A stage that fails for good marks the trip `failed` before the
//! error is handed back to the job runner.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::analyzer::ClothingAnalyzer;
use crate::error::PipelineError;
use crate::jobs::{Job, JobHandler, JobStage, RetryPolicy, Scheduler};
use crate::models::{ClothingCategory, Forecast, Trip, TripId, TripStatus};
use crate::processor::ForecastProcessor;
use crate::store::{Store, StoreError, TripLinkRegistry, TripRepository};
use crate::weather::WeatherProvider;

pub const FETCH_EVENT: &str = "trip.forecast_fetch";
pub const ANALYSIS_EVENT: &str = "trip.analysis_duration";

pub struct TripPipeline<S, P> {
    store: Arc<S>,
    processor: ForecastProcessor<S, P>,
    analyzer: ClothingAnalyzer,
    scheduler: Arc<dyn Scheduler>,
    policy: RetryPolicy,
}

fn emit_stage_timing<T>(
    event: &'static str,
    trip_id: TripId,
    started: Instant,
    result: &Result<T, PipelineError>,
) {
    let duration_ms = started.elapsed().as_millis() as u64;
    let outcome = if result.is_ok() { "success" } else { "error" };
    info!(event, trip_id = %trip_id, duration_ms, outcome, "Stage finished");
}

impl<S, P> TripPipeline<S, P>
where
    S: Store + 'static,
    P: WeatherProvider + 'static,
{
    pub fn new(
        store: Arc<S>,
        processor: ForecastProcessor<S, P>,
        scheduler: Arc<dyn Scheduler>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            processor,
            analyzer: ClothingAnalyzer::new(),
            scheduler,
            policy,
        }
    }

    /// Persist a new pending trip and schedule its first stage
    pub async fn submit(&self, trip: Trip) -> Result<Trip, PipelineError> {
        self.store.insert_trip(&trip).await?;
        self.scheduler.perform_later(Job::FetchForecasts(trip.id)).await?;
        info!(trip_id = %trip.id, city = %trip.city, days = trip.duration_days(), "Trip submitted");
        Ok(trip)
    }

    /// Schedule stage 1 again for a trip that never reached a terminal state.
    ///
    /// Covers runs that were interrupted mid-pipeline; stage 1 is idempotent, so
    /// forecasts already cached or linked are reused.
    pub async fn resume(&self, trip_id: TripId) -> Result<Trip, PipelineError> {
        let trip = self.load_trip(trip_id).await?;
        if trip.status.is_terminal() {
            return Err(PipelineError::AlreadyFinished {
                trip_id,
                status: trip.status,
            });
        }
        self.scheduler.perform_later(Job::FetchForecasts(trip_id)).await?;
        info!(trip_id = %trip_id, status = %trip.status, "Trip resumed");
        Ok(trip)
    }

    async fn load_trip(&self, trip_id: TripId) -> Result<Trip, PipelineError> {
        self.store
            .trip(trip_id)
            .await?
            .ok_or(PipelineError::Store(StoreError::TripNotFound(trip_id)))
    }

    async fn mark_failed(&self, trip_id: TripId) {
        match self.store.update_status(trip_id, TripStatus::Failed).await {
            Ok(_) => warn!(trip_id = %trip_id, "Trip marked failed"),
            Err(e) => error!(trip_id = %trip_id, error = %e, "Could not mark trip failed"),
        }
    }

    /// Stage 1: resolve and link forecasts, then schedule analysis
    #[instrument(name = "fetch_stage", skip(self, trip_id), fields(trip_id = %trip_id))]
    pub async fn fetch_forecasts(&self, trip_id: TripId, attempt: u32) -> Result<(), PipelineError> {
        let trip = self.load_trip(trip_id).await?;
        if trip.status.is_terminal() {
            info!(status = %trip.status, "Trip already finished, skipping fetch");
            return Ok(());
        }
        let trip = self.store.update_status(trip_id, TripStatus::Processing).await?;

        let started = Instant::now();
        let result = match self.processor.process(&trip).await {
            Ok(forecasts) => {
                info!(forecasts = forecasts.len(), "Forecasts linked");
                Ok(())
            }
            Err(e) => Err(PipelineError::from(e)),
        };
        emit_stage_timing(FETCH_EVENT, trip_id, started, &result);

        if let Err(e) = result {
            if self.policy.should_retry(JobStage::Fetch, e.kind(), attempt) {
                warn!(attempt, error = %e, "Forecast fetch failed, leaving trip processing for retry");
            } else {
                error!(attempt, error = %e, "Forecast fetch failed");
                self.mark_failed(trip_id).await;
            }
            return Err(e);
        }

        if let Err(e) = self.scheduler.perform_later(Job::AnalyzeForecasts(trip_id)).await {
            self.mark_failed(trip_id).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Stage 2: turn linked forecasts into recommendations and finish the trip
    #[instrument(name = "analysis_stage", skip(self, trip_id), fields(trip_id = %trip_id))]
    pub async fn analyze_forecasts(&self, trip_id: TripId) -> Result<(), PipelineError> {
        let trip = self.load_trip(trip_id).await?;
        if trip.status.is_terminal() {
            info!(status = %trip.status, "Trip already finished, skipping analysis");
            return Ok(());
        }
        if trip.status != TripStatus::Processing {
            return Err(PipelineError::InvariantViolation(format!(
                "analysis scheduled for trip in {} state",
                trip.status
            )));
        }

        let started = Instant::now();
        let result = self.recommend(trip_id).await;
        emit_stage_timing(ANALYSIS_EVENT, trip_id, started, &result);

        if let Err(e) = result {
            error!(error = %e, "Analysis failed");
            self.mark_failed(trip_id).await;
            return Err(e);
        }
        Ok(())
    }

    async fn recommend(&self, trip_id: TripId) -> Result<(), PipelineError> {
        let forecasts: Vec<Forecast> = self.store.linked_forecasts(trip_id).await?;
        if forecasts.is_empty() {
            return Err(PipelineError::InvariantViolation(
                "no forecasts linked to trip after fetch stage".to_string(),
            ));
        }

        let recommendations = self
            .analyzer
            .analyze(&forecasts)
            .into_recommendations(trip_id);
        if recommendations.len() != ClothingCategory::ALL.len()
            || recommendations.iter().any(|r| r.details.trim().is_empty())
        {
            return Err(PipelineError::InvariantViolation(
                "incomplete recommendation set".to_string(),
            ));
        }
        self.store
            .replace_recommendations(trip_id, recommendations)
            .await?;
        self.store.update_status(trip_id, TripStatus::Ready).await?;
        info!(days = forecasts.len(), "Recommendations ready");
        Ok(())
    }
}

#[async_trait]
impl<S, P> JobHandler for TripPipeline<S, P>
where
    S: Store + 'static,
    P: WeatherProvider + 'static,
{
    async fn perform(&self, job: Job, attempt: u32) -> Result<(), PipelineError> {
        match job {
            Job::FetchForecasts(trip_id) => self.fetch_forecasts(trip_id, attempt).await,
            Job::AnalyzeForecasts(trip_id) => self.analyze_forecasts(trip_id).await,
        }
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }
}
