//! Weather provider boundary
//!
//! The pipeline only depends on [`WeatherProvider`]; [`tomorrow::TomorrowClient`]
//! is the HTTP implementation used by the binary.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::DailyForecast;

pub mod codes;
pub mod tomorrow;

pub use tomorrow::TomorrowClient;

/// Failure to obtain forecasts from the external provider.
///
/// Every variant is considered transient by the fetch stage's retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid API response structure: {0}")]
    Malformed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// Source of daily forecasts for a city.
///
/// Implementations may return a wider range than requested; callers filter to
/// `[start_date, end_date]`.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch(
        &self,
        city: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<DailyForecast>, ProviderError>;
}
