//! `Packwise` - Weather-aware packing lists for multi-day trips
//!
//! This library fetches daily forecasts for a trip's city, caches them across
//! trips, and turns them into clothing recommendations through a two-stage
//! background pipeline.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod store;
pub mod telemetry;
pub mod weather;

// Re-export core types for public API
pub use analyzer::{ClothingAnalyzer, PackingList, WeatherSummary};
pub use config::PackwiseConfig;
pub use error::{ErrorKind, PackwiseError, PipelineError, ProcessingError};
pub use jobs::{Job, JobHandler, JobOutcome, JobQueue, JobReport, JobRunner, RetryPolicy, Scheduler};
pub use models::{
    ClothingCategory, DailyForecast, Forecast, Recommendation, Trip, TripId, TripStatus,
};
pub use pipeline::TripPipeline;
pub use processor::ForecastProcessor;
pub use store::{FjallStore, MemoryStore, Store};
pub use weather::{ProviderError, TomorrowClient, WeatherProvider};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, PackwiseError>;
