//! Error types and handling for the packing planner

use chrono::NaiveDate;
use thiserror::Error;

use crate::jobs::QueueError;
use crate::models::{TripId, TripStatus};
use crate::store::StoreError;
use crate::weather::ProviderError;

/// How the job runner should treat a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth retrying with backoff (provider trouble)
    Transient,
    /// Retrying will not help
    Fatal,
}

/// Failure while resolving, caching or linking forecasts for a trip
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Failed to fetch weather data: {0}")]
    Provider(#[from] ProviderError),

    #[error("Failed to save forecast data: {0}")]
    Store(#[from] StoreError),

    #[error("Forecasts for {city} still missing after refresh: {missing:?}")]
    Inconsistent {
        city: String,
        missing: Vec<NaiveDate>,
    },
}

impl ProcessingError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessingError::Provider(_) => ErrorKind::Transient,
            ProcessingError::Store(_) | ProcessingError::Inconsistent { .. } => ErrorKind::Fatal,
        }
    }
}

/// Error surfaced by a pipeline stage to the job runner
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to schedule next stage: {0}")]
    Schedule(#[from] QueueError),

    #[error("Trip {trip_id} already finished as {status}")]
    AlreadyFinished { trip_id: TripId, status: TripStatus },
}

impl PipelineError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Processing(err) => err.kind(),
            PipelineError::InvariantViolation(_)
            | PipelineError::Store(_)
            | PipelineError::Schedule(_)
            | PipelineError::AlreadyFinished { .. } => ErrorKind::Fatal,
        }
    }
}

/// Main error type for the application shell
#[derive(Error, Debug)]
pub enum PackwiseError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Trip processing did not complete
    #[error("Pipeline error: {source}")]
    Pipeline {
        #[from]
        source: PipelineError,
    },

    /// Store operation errors
    #[error("Store error: {source}")]
    Store {
        #[from]
        source: StoreError,
    },

    /// General application errors
    #[error("Application error: {message}")]
    General { message: String },
}

impl PackwiseError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new general error
    pub fn general<S: Into<String>>(message: S) -> Self {
        Self::General {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            PackwiseError::Config { .. } => {
                "Configuration error. Please check your config file and API key.".to_string()
            }
            PackwiseError::Validation { message } => format!("Invalid input: {message}"),
            PackwiseError::Pipeline {
                source: PipelineError::AlreadyFinished { trip_id, status },
            } => format!("Trip {trip_id} is already {status}, nothing to resume."),
            PackwiseError::Pipeline { source } => match source.kind() {
                ErrorKind::Transient => {
                    "Unable to reach the weather service. Please try again later.".to_string()
                }
                ErrorKind::Fatal => "Trip processing could not complete.".to_string(),
            },
            PackwiseError::Store { .. } => {
                "Storage operation failed. Please check the data directory.".to_string()
            }
            PackwiseError::General { message } => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let provider = PipelineError::from(ProcessingError::from(ProviderError::Timeout));
        assert_eq!(provider.kind(), ErrorKind::Transient);

        let inconsistent = PipelineError::from(ProcessingError::Inconsistent {
            city: "Boston".to_string(),
            missing: vec![],
        });
        assert_eq!(inconsistent.kind(), ErrorKind::Fatal);

        let invariant = PipelineError::InvariantViolation("no forecasts".to_string());
        assert_eq!(invariant.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn test_processing_error_message_carries_cause() {
        let err = ProcessingError::from(ProviderError::Network("connection refused".to_string()));
        assert!(err.to_string().contains("Failed to fetch weather data"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_user_messages() {
        let config_err = PackwiseError::config("test");
        assert!(config_err.user_message().contains("Configuration error"));

        let validation_err = PackwiseError::validation("test input");
        assert!(validation_err.user_message().contains("test input"));

        let pipeline_err = PackwiseError::from(PipelineError::from(ProcessingError::from(
            ProviderError::Timeout,
        )));
        assert!(pipeline_err.user_message().contains("weather service"));

        let finished = PackwiseError::from(PipelineError::AlreadyFinished {
            trip_id: TripId::new(),
            status: TripStatus::Ready,
        });
        assert!(finished.user_message().contains("already ready"));
    }
}
