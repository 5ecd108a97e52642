//! Runtime settings: `packwise.toml` overlaid with `PACKWISE__*` environment variables.

use crate::PackwiseError;
use crate::store::FRESHNESS_WINDOW_HOURS;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackwiseConfig {
    /// Forecast provider
    #[serde(default)]
    pub weather: WeatherConfig,
    /// Forecast store configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Job pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// tomorrow.io client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// tomorrow.io API key
    pub api_key: Option<String>,
    /// API root, overridable for tests
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
    /// Per-request timeout (seconds)
    #[serde(default = "default_weather_timeout")]
    pub timeout_seconds: u32,
}

/// Forecast store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum age of a cached forecast before it is refetched, in hours
    #[serde(default = "default_freshness_hours")]
    pub freshness_hours: u32,
    /// Database directory location
    #[serde(default = "default_cache_location")]
    pub location: String,
}

/// Retry and concurrency settings for the trip pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Total attempts for the forecast fetch stage, including the first
    #[serde(default = "default_max_fetch_attempts")]
    pub max_fetch_attempts: u32,
    /// Delay before the first retry; doubles each attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound for a single retry delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Number of jobs processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_weather_base_url() -> String {
    "https://api.tomorrow.io/v4".to_string()
}

fn default_weather_timeout() -> u32 {
    10
}

fn default_freshness_hours() -> u32 {
    FRESHNESS_WINDOW_HOURS
}

fn default_cache_location() -> String {
    "packwise-data".to_string()
}

fn default_max_fetch_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    3_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_workers() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_weather_base_url(),
            timeout_seconds: default_weather_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_hours: default_freshness_hours(),
            location: default_cache_location(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_fetch_attempts: default_max_fetch_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            workers: default_workers(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for PackwiseConfig {
    fn default() -> Self {
        Self {
            weather: WeatherConfig::default(),
            cache: CacheConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Freshness window as a chrono duration
    #[must_use]
    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.freshness_hours))
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl PackwiseConfig {
    /// Load configuration from `packwise.toml` and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load from an explicit file, falling back to `packwise.toml` in the working directory
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| PathBuf::from("packwise.toml"));

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // Environment overrides, e.g. PACKWISE__WEATHER__API_KEY
        builder = builder.add_source(
            Environment::with_prefix("PACKWISE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to read packwise settings")?;

        let mut config: PackwiseConfig = settings
            .try_deserialize()
            .with_context(|| "Invalid packwise settings")?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Replace zero or empty values with defaults
    pub fn apply_defaults(&mut self) {
        if self.weather.base_url.is_empty() {
            self.weather.base_url = default_weather_base_url();
        }
        if self.weather.timeout_seconds == 0 {
            self.weather.timeout_seconds = default_weather_timeout();
        }
        if self.cache.freshness_hours == 0 {
            self.cache.freshness_hours = default_freshness_hours();
        }
        if self.cache.location.is_empty() {
            self.cache.location = default_cache_location();
        }
        if self.pipeline.max_fetch_attempts == 0 {
            self.pipeline.max_fetch_attempts = default_max_fetch_attempts();
        }
        if self.pipeline.workers == 0 {
            self.pipeline.workers = default_workers();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_api_key()?;
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    fn validate_api_key(&self) -> Result<()> {
        if let Some(api_key) = &self.weather.api_key {
            if api_key.trim().is_empty() {
                return Err(PackwiseError::config(
                    "Weather API key cannot be empty if provided. Either remove it or provide a valid key.",
                )
                .into());
            }
        }
        Ok(())
    }

    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.weather.timeout_seconds > 300 {
            return Err(PackwiseError::config("Weather API timeout cannot exceed 300 seconds").into());
        }

        if self.cache.freshness_hours > 168 {
            return Err(PackwiseError::config(
                "Forecast freshness cannot exceed 168 hours (1 week)",
            )
            .into());
        }

        if self.pipeline.max_fetch_attempts > 10 {
            return Err(PackwiseError::config("Fetch attempts cannot exceed 10").into());
        }

        if self.pipeline.initial_backoff_ms > self.pipeline.max_backoff_ms {
            return Err(PackwiseError::config(
                "Initial backoff cannot be larger than the maximum backoff",
            )
            .into());
        }

        Ok(())
    }

    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(PackwiseError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(PackwiseError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        if !self.weather.base_url.starts_with("http://")
            && !self.weather.base_url.starts_with("https://")
        {
            return Err(PackwiseError::config(
                "Weather API base URL must be a valid HTTP or HTTPS URL",
            )
            .into());
        }

        Ok(())
    }
}
