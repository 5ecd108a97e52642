use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Job, JobHandler, JobOutcome, JobReceiver, JobReport, ReportSender};

/// Background worker that executes queued jobs with bounded concurrency.
///
/// Each job runs in its own task. Failed fetch jobs are retried in place with
/// exponential backoff while the handler's retry policy allows it.
pub struct JobRunner<H> {
    handler: Arc<H>,
    semaphore: Arc<Semaphore>,
    reports: Option<ReportSender>,
}

impl<H: JobHandler + 'static> JobRunner<H> {
    pub fn new(handler: Arc<H>, concurrency: usize) -> Self {
        Self {
            handler,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            reports: None,
        }
    }

    /// Send a [`JobReport`] for every job once the runner is done with it
    #[must_use]
    pub fn with_reports(mut self, reports: ReportSender) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Run until `shutdown` is cancelled or every sender is dropped.
    ///
    /// Jobs already in flight are allowed to finish; pending backoff sleeps end
    /// early on shutdown and the job is abandoned.
    pub async fn run(self, mut jobs: JobReceiver, shutdown: CancellationToken) {
        info!(
            concurrency = self.semaphore.available_permits(),
            max_attempts = self.handler.retry_policy().max_attempts,
            "Starting job runner"
        );

        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                next = jobs.recv() => match next {
                    Some(job) => {
                        in_flight.spawn(self.execute(job, shutdown.clone()));
                    }
                    None => break,
                },
                Some(finished) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = finished {
                        error!(error = %e, "Job task panicked");
                    }
                }
            }
        }

        debug!(in_flight = in_flight.len(), "Draining job runner");
        while let Some(finished) = in_flight.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "Job task panicked");
            }
        }
        info!("Job runner stopped");
    }

    fn execute(&self, job: Job, shutdown: CancellationToken) -> impl Future<Output = ()> + Send + 'static {
        let handler = Arc::clone(&self.handler);
        let semaphore = Arc::clone(&self.semaphore);
        let reports = self.reports.clone();

        async move {
            let (attempts, outcome) = attempt_until_done(handler.as_ref(), &semaphore, job, &shutdown).await;
            if let Some(reports) = reports {
                // Nobody listening is fine
                let _ = reports.send(JobReport {
                    job,
                    attempts,
                    outcome,
                });
            }
        }
    }
}

async fn attempt_until_done<H: JobHandler>(
    handler: &H,
    semaphore: &Semaphore,
    job: Job,
    shutdown: &CancellationToken,
) -> (u32, JobOutcome) {
    let policy = handler.retry_policy();
    let mut attempt = 1;
    loop {
        let result = {
            let Ok(_permit) = semaphore.acquire().await else {
                return (attempt - 1, JobOutcome::Abandoned);
            };
            debug!(%job, attempt, "Performing job");
            handler.perform(job, attempt).await
        };

        let e = match result {
            Ok(()) => {
                debug!(%job, attempt, "Job completed");
                return (attempt, JobOutcome::Completed);
            }
            Err(e) => e,
        };

        if !policy.should_retry(job.stage(), e.kind(), attempt) {
            error!(%job, attempt, error = %e, "Job failed");
            return (
                attempt,
                JobOutcome::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                },
            );
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            %job,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "Job failed, will retry"
        );
        tokio::select! {
            () = shutdown.cancelled() => {
                warn!(%job, "Shutdown during backoff, abandoning job");
                return (attempt, JobOutcome::Abandoned);
            }
            () = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
