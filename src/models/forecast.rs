//! Daily forecast records and the cached forecast entity

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Forecast identifier, stable across refreshes of the same (city, date)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForecastId(pub Uuid);

impl ForecastId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ForecastId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ForecastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One day of weather as reported by the provider.
///
/// Temperatures are in degrees Fahrenheit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temperature_max: Option<f64>,
    pub temperature_min: Option<f64>,
    pub temperature_avg: Option<f64>,
    pub temperature_apparent_max: Option<f64>,
    pub temperature_apparent_min: Option<f64>,
    pub temperature_apparent_avg: Option<f64>,
    /// Human-readable conditions derived from the provider weather code
    pub conditions: String,
    /// Precipitation probability (0-100%)
    pub precipitation_probability: Option<f64>,
    pub uv_index_max: Option<u32>,
}

impl DailyForecast {
    /// Record with no measurements, useful as a base for building test data
    #[must_use]
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            temperature_max: None,
            temperature_min: None,
            temperature_avg: None,
            temperature_apparent_max: None,
            temperature_apparent_min: None,
            temperature_apparent_avg: None,
            conditions: "Unknown".to_string(),
            precipitation_probability: None,
            uv_index_max: None,
        }
    }
}

/// A cached forecast for one city on one date, shared by every trip that needs it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub id: ForecastId,
    pub city: String,
    pub weather: DailyForecast,
    /// When this row was last written from provider data
    pub last_refreshed_at: DateTime<Utc>,
}

impl Forecast {
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.weather.date
    }

    /// Age of the data relative to `now`
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_refreshed_at
    }

    /// Format the temperature range for display
    #[must_use]
    pub fn format_temperature(&self) -> String {
        match (self.weather.temperature_min, self.weather.temperature_max) {
            (Some(min), Some(max)) => format!("{min:.1}°F - {max:.1}°F"),
            (Some(t), None) | (None, Some(t)) => format!("{t:.1}°F"),
            (None, None) => "n/a".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_temperature() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let mut forecast = Forecast {
            id: ForecastId::new(),
            city: "Boston".to_string(),
            weather: DailyForecast {
                temperature_min: Some(55.2),
                temperature_max: Some(75.5),
                ..DailyForecast::empty(date)
            },
            last_refreshed_at: Utc::now(),
        };
        assert_eq!(forecast.format_temperature(), "55.2°F - 75.5°F");

        forecast.weather.temperature_max = None;
        assert_eq!(forecast.format_temperature(), "55.2°F");

        forecast.weather.temperature_min = None;
        assert_eq!(forecast.format_temperature(), "n/a");
    }
}
