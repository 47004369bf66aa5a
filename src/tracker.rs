use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::config::PollConfig;
use crate::platform::JobsApi;
use crate::retry::retry_with_backoff;
use crate::types::{Job, JobStatus};
use crate::{AgentError, AgentResult};

/// Finds the proof job behind a request and waits for it to settle.
#[derive(Clone)]
pub struct ProofJobTracker {
    jobs: Arc<dyn JobsApi>,
    endpoint_id: u64,
    poll: PollConfig,
}

impl std::fmt::Debug for ProofJobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofJobTracker")
            .field("endpoint_id", &self.endpoint_id)
            .field("poll", &self.poll)
            .finish()
    }
}

impl ProofJobTracker {
    pub fn new(jobs: Arc<dyn JobsApi>, endpoint_id: u64, poll: PollConfig) -> Self {
        Self {
            jobs,
            endpoint_id,
            poll,
        }
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    /// The job whose request id matches, or [`AgentError::JobNotFound`].
    pub async fn find_job(&self, request_id: &str) -> AgentResult<Job> {
        let jobs = self.jobs.list_jobs(self.endpoint_id, request_id).await?;
        jobs.into_iter()
            .find(|job| job.request_id.as_deref() == Some(request_id))
            .ok_or_else(|| AgentError::JobNotFound(request_id.to_string()))
    }

    /// [`find_job`](Self::find_job), tolerating the window right after
    /// inference where the proof job is not registered yet.
    pub async fn find_job_with_grace(&self, request_id: &str) -> AgentResult<Job> {
        retry_with_backoff(
            "find_proof_job",
            || self.find_job(request_id),
            self.poll.job_lookup_attempts,
        )
        .await
    }

    /// Wait with the configured timeout and poll interval.
    pub async fn wait_for(&self, job: &Job) -> AgentResult<Job> {
        self.wait(job, self.poll.timeout(), self.poll.poll_interval())
            .await
    }

    /// Poll `job` until it completes. Fails on FAILED and once `timeout` has
    /// elapsed. Non-terminal state is re-fetched from the backend on every
    /// iteration; terminal states cannot regress and are trusted as given.
    pub async fn wait(&self, job: &Job, timeout: Duration, poll_interval: Duration) -> AgentResult<Job> {
        if poll_interval.is_zero() {
            return Err(AgentError::Configuration(
                "poll interval must be positive".to_string(),
            ));
        }
        let kind = job.kind;
        let start = Instant::now();
        let mut current = job.clone();
        let mut poll_errors = 0u32;

        loop {
            match current.status {
                JobStatus::Completed => {
                    tracing::info!("{} job {} completed", kind, current.id);
                    return Ok(current);
                }
                JobStatus::Failed => {
                    tracing::error!("{} job {} failed", kind, current.id);
                    return Err(AgentError::JobFailed {
                        kind: kind.to_string(),
                        job_id: current.id,
                    });
                }
                JobStatus::Queued | JobStatus::Processing => {}
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                tracing::error!("{} job {} timed out", kind, current.id);
                return Err(AgentError::JobTimeout {
                    kind: kind.to_string(),
                    job_id: current.id,
                    elapsed_secs: elapsed.as_secs_f64(),
                });
            }

            tracing::info!(
                "{} job {} is still running, elapsed time: {:.1}s",
                kind,
                current.id,
                elapsed.as_secs_f64()
            );
            sleep(poll_interval).await;

            match self.jobs.get_job(current.id, kind).await {
                Ok(job) => {
                    poll_errors = 0;
                    current = job;
                }
                Err(e) if e.is_transient() => {
                    poll_errors += 1;
                    tracing::warn!(
                        "Failed to poll {} job {} (attempt {} of {}): {}",
                        kind,
                        current.id,
                        poll_errors,
                        self.poll.poll_error_threshold,
                        e
                    );
                    if poll_errors >= self.poll.poll_error_threshold {
                        return Err(AgentError::PollingError(format!(
                            "Polling error threshold exceeded ({} consecutive errors). Last error: {}",
                            poll_errors, e
                        )));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
