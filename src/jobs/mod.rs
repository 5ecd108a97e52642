//! Background jobs for the trip pipeline
//!
//! A trip is processed as two jobs: [`Job::FetchForecasts`] and, once that
//! succeeds, [`Job::AnalyzeForecasts`]. Jobs are delivered at least once, so
//! handlers must tolerate re-delivery.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::{ErrorKind, PipelineError};
use crate::models::TripId;

pub mod retry;
pub mod runner;

pub use retry::RetryPolicy;
pub use runner::JobRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    FetchForecasts(TripId),
    AnalyzeForecasts(TripId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStage {
    Fetch,
    Analyze,
}

impl Job {
    #[must_use]
    pub fn trip_id(&self) -> TripId {
        match self {
            Job::FetchForecasts(id) | Job::AnalyzeForecasts(id) => *id,
        }
    }

    #[must_use]
    pub fn stage(&self) -> JobStage {
        match self {
            Job::FetchForecasts(_) => JobStage::Fetch,
            Job::AnalyzeForecasts(_) => JobStage::Analyze,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::FetchForecasts(id) => write!(f, "fetch_forecasts({id})"),
            Job::AnalyzeForecasts(id) => write!(f, "analyze_forecasts({id})"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job queue is closed, cannot enqueue {0}")]
    Closed(Job),
}

/// Enqueues work for later execution
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn perform_later(&self, job: Job) -> Result<(), QueueError>;
}

/// Executes one delivery of a job
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// `attempt` starts at 1 and grows with each retry of the same job
    async fn perform(&self, job: Job, attempt: u32) -> Result<(), PipelineError>;

    /// Policy the runner follows when `perform` fails.
    ///
    /// Handlers that decide trip status from the attempt number must return the
    /// same policy they decide with.
    fn retry_policy(&self) -> &RetryPolicy;
}

/// How a job ended once the runner stopped working on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed { kind: ErrorKind, message: String },
    /// Shutdown arrived while the job was waiting to run or to retry
    Abandoned,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Completed => f.write_str("completed"),
            JobOutcome::Failed { message, .. } => write!(f, "failed: {message}"),
            JobOutcome::Abandoned => f.write_str("abandoned"),
        }
    }
}

/// Sent by [`JobRunner`] after the last attempt of each job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job: Job,
    pub attempts: u32,
    pub outcome: JobOutcome,
}

impl JobReport {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !matches!(self.outcome, JobOutcome::Completed)
    }
}

pub type ReportSender = mpsc::UnboundedSender<JobReport>;
pub type ReportReceiver = mpsc::UnboundedReceiver<JobReport>;

/// Sending half of the in-process job channel
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<Job>,
}

/// Receiving half, consumed by [`JobRunner::run`]
pub type JobReceiver = mpsc::UnboundedReceiver<Job>;

impl JobQueue {
    #[must_use]
    pub fn new() -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Scheduler for JobQueue {
    async fn perform_later(&self, job: Job) -> Result<(), QueueError> {
        tracing::debug!(%job, "Enqueued job");
        self.sender.send(job).map_err(|err| QueueError::Closed(err.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_delivers_in_order() {
        let (queue, mut receiver) = JobQueue::new();
        let trip_id = TripId::new();

        queue.perform_later(Job::FetchForecasts(trip_id)).await.unwrap();
        queue.perform_later(Job::AnalyzeForecasts(trip_id)).await.unwrap();

        assert_eq!(receiver.recv().await, Some(Job::FetchForecasts(trip_id)));
        assert_eq!(receiver.recv().await, Some(Job::AnalyzeForecasts(trip_id)));
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_jobs() {
        let (queue, receiver) = JobQueue::new();
        drop(receiver);
        let job = Job::FetchForecasts(TripId::new());

        assert_eq!(queue.perform_later(job).await, Err(QueueError::Closed(job)));
    }

    #[test]
    fn test_job_stage_and_trip() {
        let trip_id = TripId::new();
        assert_eq!(Job::FetchForecasts(trip_id).stage(), JobStage::Fetch);
        assert_eq!(Job::AnalyzeForecasts(trip_id).stage(), JobStage::Analyze);
        assert_eq!(Job::AnalyzeForecasts(trip_id).trip_id(), trip_id);
    }
}
