//! tomorrow.io daily forecast client
//!
//! The API always answers with its own fixed window (currently five days) for
//! the location, so results are filtered to the requested range here.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::codes::weather_code_to_description;
use super::{ProviderError, WeatherProvider};
use crate::config::WeatherConfig;
use crate::models::DailyForecast;

/// HTTP client for the tomorrow.io forecast endpoint
#[derive(Debug, Clone)]
pub struct TomorrowClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl TomorrowClient {
    /// Create a new client with the configured request timeout
    pub fn new(config: &WeatherConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(concat!("packwise/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn forecast_url(&self, city: &str) -> String {
        let mut url = format!(
            "{}/weather/forecast?location={}&timesteps=1d&units=imperial",
            self.base_url,
            urlencoding::encode(city)
        );
        if let Some(key) = &self.api_key {
            url.push_str("&apikey=");
            url.push_str(&urlencoding::encode(key));
        }
        url
    }
}

#[async_trait]
impl WeatherProvider for TomorrowClient {
    #[instrument(name = "fetch_forecast", skip(self))]
    async fn fetch(
        &self,
        city: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<DailyForecast>, ProviderError> {
        let start_time = Instant::now();

        let response = self
            .client
            .get(self.forecast_url(city))
            .header("accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Weather API returned an error status");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let forecasts = parse_daily_timeline(&body, start_date, end_date)?;

        let total_duration = start_time.elapsed();
        info!(
            "Retrieved {} daily forecasts for {} in {:.3}s",
            forecasts.len(),
            city,
            total_duration.as_secs_f64()
        );
        if total_duration.as_secs() > 5 {
            warn!("Slow weather API response: {:.3}s", total_duration.as_secs_f64());
        }

        Ok(forecasts)
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    timelines: Option<Timelines>,
}

#[derive(Debug, Deserialize)]
struct Timelines {
    daily: Option<Vec<DailyEntry>>,
}

#[derive(Debug, Deserialize)]
struct DailyEntry {
    time: String,
    values: DailyValues,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyValues {
    temperature_max: Option<f64>,
    temperature_min: Option<f64>,
    temperature_avg: Option<f64>,
    temperature_apparent_max: Option<f64>,
    temperature_apparent_min: Option<f64>,
    temperature_apparent_avg: Option<f64>,
    weather_code_max: Option<u32>,
    precipitation_probability_max: Option<f64>,
    uv_index_max: Option<f64>,
}

fn round1(value: Option<f64>) -> Option<f64> {
    value.map(|v| (v * 10.0).round() / 10.0)
}

fn parse_day(time: &str) -> Result<NaiveDate, ProviderError> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(time) {
        return Ok(timestamp.date_naive());
    }
    time.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .ok_or_else(|| ProviderError::Malformed(format!("unparseable time '{time}'")))
}

/// Parse a daily timeline body, keeping only days within `[start_date, end_date]`
pub(crate) fn parse_daily_timeline(
    body: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Vec<DailyForecast>, ProviderError> {
    let response: ForecastResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let daily = response
        .timelines
        .and_then(|timelines| timelines.daily)
        .ok_or_else(|| ProviderError::Malformed("missing timelines.daily".to_string()))?;

    let mut forecasts = Vec::with_capacity(daily.len());
    for entry in daily {
        let date = parse_day(&entry.time)?;
        if date < start_date || date > end_date {
            debug!(%date, "Dropping forecast outside requested range");
            continue;
        }

        let values = entry.values;
        forecasts.push(DailyForecast {
            date,
            temperature_max: round1(values.temperature_max),
            temperature_min: round1(values.temperature_min),
            temperature_avg: round1(values.temperature_avg),
            temperature_apparent_max: round1(values.temperature_apparent_max),
            temperature_apparent_min: round1(values.temperature_apparent_min),
            temperature_apparent_avg: round1(values.temperature_apparent_avg),
            conditions: weather_code_to_description(values.weather_code_max).to_string(),
            precipitation_probability: round1(values.precipitation_probability_max),
            uv_index_max: values.uv_index_max.map(|uv| uv.max(0.0).round() as u32),
        });
    }

    Ok(forecasts)
}
