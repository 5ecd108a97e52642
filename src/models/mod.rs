//! Data models for the packing planner
//!
//! This module contains the core domain models organized by concern:
//! - Trip: the planned city/date range and its processing status
//! - Forecast: provider day records and the shared cached forecast
//! - Recommendation: per-category packing advice and trip/forecast links

pub mod forecast;
pub mod recommendation;
pub mod trip;

// Re-export all public types for convenient access
pub use forecast::{DailyForecast, Forecast, ForecastId};
pub use recommendation::{ClothingCategory, Recommendation, TripForecastLink};
pub use trip::{InvalidTransition, MAX_TRIP_DAYS, Trip, TripId, TripStatus, TripValidationError};
