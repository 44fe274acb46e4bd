//! Waiting on server-side jobs.
//!
//! [`JobPoller`] queries a job at a fixed interval until it reaches a
//! terminal status, the deadline passes, or the run is canceled. It knows
//! nothing about what kind of job it is watching; uploads and index builds
//! share it.
//!
//! ```text
//!          ┌──────────────┐  succeeded   ┌────┐
//!   ──────▶│ query status │─────────────▶│ Ok │
//!          └──────┬───────┘              └────┘
//!      in flight  │  failed / canceled / unknown ──▶ JobFailed
//!                 ▼
//!          ┌──────────────┐  signal      ┌──────────┐
//!          │    sleep     │─────────────▶│ Canceled │
//!          └──────┬───────┘              └──────────┘
//!                 │ elapsed > timeout ──▶ JobTimeout
//!                 └──────▶ query status
//! ```
//!
//! A status query still in flight is also cut short by the deadline or the
//! cancel signal. There is no backoff between polls and no remote
//! cancellation: on timeout or cancel the client just stops watching.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::ClientConfig;
use crate::error::{IngestError, Result};
use crate::models::{JobHandle, JobState, JobStatus, SubmissionReceipt};
use crate::service::CorpusService;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(900);

/// Fixed-interval job waiter.
#[derive(Debug, Clone)]
pub struct JobPoller {
    pub interval: Duration,
    pub timeout: Duration,
    cancel: Option<watch::Receiver<bool>>,
}

impl Default for JobPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_JOB_TIMEOUT)
    }
}

impl JobPoller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            cancel: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.poll_interval(), config.job_timeout())
    }

    /// Abort waits when the receiver observes `true`.
    ///
    /// The signal interrupts both the sleep between queries and a status
    /// query still in flight. Submissions and retrieval calls are not
    /// covered.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Block until `job` succeeds.
    ///
    /// # Errors
    ///
    /// - [`IngestError::JobFailed`] for any terminal status other than
    ///   `succeeded`, carrying the service's error text or `status=<status>`.
    /// - [`IngestError::JobTimeout`] once the deadline has passed; checked
    ///   after each sleep and before the next query.
    /// - [`IngestError::Canceled`] when the cancellation signal fires.
    /// - Any error from the status query itself.
    pub async fn await_completion(
        &self,
        service: &dyn CorpusService,
        job: &JobHandle,
    ) -> Result<()> {
        let start = Instant::now();
        let mut cancel = self.cancel.clone();
        let mut polls = 0u64;

        loop {
            let state = self.query(service, job, start, cancel.as_mut()).await?;
            polls += 1;
            tracing::debug!(job_id = %job, status = %state.status, polls, "job status");

            if state.status.is_terminal() {
                if state.status == JobStatus::Succeeded {
                    tracing::info!(
                        job_id = %job,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "job succeeded"
                    );
                    return Ok(());
                }
                let message = state
                    .error_message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("status={}", state.status));
                tracing::warn!(job_id = %job, %message, "job did not succeed");
                return Err(IngestError::JobFailed {
                    job_id: job.to_string(),
                    message,
                });
            }

            sleep_or_cancel(self.interval, cancel.as_mut(), job).await?;

            let elapsed = start.elapsed();
            if elapsed > self.timeout {
                tracing::warn!(job_id = %job, elapsed_ms = elapsed.as_millis() as u64, "job timed out");
                return Err(IngestError::JobTimeout {
                    job_id: job.to_string(),
                    elapsed,
                });
            }
        }
    }
}

impl JobPoller {
    /// One status query, bounded by the job deadline and interruptible by
    /// the cancel signal. Dropping the query also abandons any retry
    /// backoff the transport is sitting in.
    async fn query(
        &self,
        service: &dyn CorpusService,
        job: &JobHandle,
        start: Instant,
        cancel: Option<&mut watch::Receiver<bool>>,
    ) -> Result<JobState> {
        let status = tokio::time::timeout_at(start + self.timeout, service.get_job(job));
        tokio::pin!(status);

        let outcome = match cancel {
            Some(cancel) => {
                let raced = tokio::select! {
                    outcome = &mut status => Some(outcome),
                    signal = cancel.wait_for(|flag| *flag) => {
                        if signal.is_ok() {
                            return Err(IngestError::Canceled {
                                job_id: job.to_string(),
                            });
                        }
                        None
                    }
                };
                match raced {
                    Some(outcome) => outcome,
                    // Sender dropped: nothing can cancel, finish the query.
                    None => status.await,
                }
            }
            None => status.await,
        };

        outcome.map_err(|_| {
            let elapsed = start.elapsed();
            tracing::warn!(
                job_id = %job,
                elapsed_ms = elapsed.as_millis() as u64,
                "job status query outlived the deadline"
            );
            IngestError::JobTimeout {
                job_id: job.to_string(),
                elapsed,
            }
        })?
    }
}

async fn sleep_or_cancel(
    interval: Duration,
    cancel: Option<&mut watch::Receiver<bool>>,
    job: &JobHandle,
) -> Result<()> {
    let Some(cancel) = cancel else {
        tokio::time::sleep(interval).await;
        return Ok(());
    };

    let wake = Instant::now() + interval;
    let signalled = tokio::select! {
        _ = tokio::time::sleep_until(wake) => false,
        signal = cancel.wait_for(|flag| *flag) => signal.is_ok(),
    };
    if signalled {
        return Err(IngestError::Canceled {
            job_id: job.to_string(),
        });
    }

    // Sender dropped early: nobody can cancel any more, finish the interval.
    tokio::time::sleep_until(wake).await;
    Ok(())
}

/// Decide whether a submission left a job to wait on.
///
/// A response without a job id counts as synchronous completion unless it
/// reports a terminal non-success status, which is a submission failure.
pub fn pending_job(
    operation: &'static str,
    receipt: &SubmissionReceipt,
) -> Result<Option<JobHandle>> {
    if let Some(job) = &receipt.job_id {
        return Ok(Some(job.clone()));
    }
    match &receipt.status {
        Some(status) if status.is_terminal() && *status != JobStatus::Succeeded => {
            Err(IngestError::Submission {
                operation,
                message: receipt
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("status={}", status)),
            })
        }
        _ => {
            tracing::info!(operation, "no job id returned; treating as completed inline");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed list of statuses, repeating the last one.
    struct ScriptedJobs {
        script: Vec<JobState>,
        calls: Mutex<usize>,
    }

    impl ScriptedJobs {
        fn new(script: Vec<JobState>) -> Self {
            Self {
                script,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    fn state(status: JobStatus, error: Option<&str>) -> JobState {
        JobState {
            status,
            error_message: error.map(str::to_string),
        }
    }

    #[async_trait]
    impl CorpusService for ScriptedJobs {
        async fn upload_document(&self, _: &str, _: &DocumentUpload) -> Result<SubmissionReceipt> {
            unreachable!()
        }
        async fn upload_files_batch(&self, _: &str, _: &BatchUpload) -> Result<SubmissionReceipt> {
            unreachable!()
        }
        async fn get_job(&self, _: &JobHandle) -> Result<JobState> {
            let mut calls = self.calls.lock().unwrap();
            let idx = (*calls).min(self.script.len() - 1);
            *calls += 1;
            Ok(self.script[idx].clone())
        }
        async fn build_indexes(&self, _: &str, _: &IndexRequest) -> Result<SubmissionReceipt> {
            unreachable!()
        }
        async fn retrieve(&self, _: &str, _: &RetrievalRequest) -> Result<Vec<RetrievalResult>> {
            unreachable!()
        }
        async fn generate_answer(&self, _: &str, _: &str, _: usize) -> Result<GeneratedAnswer> {
            unreachable!()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_n_running_polls() {
        let n = 3;
        let mut script = vec![state(JobStatus::Running, None); n];
        script.push(state(JobStatus::Succeeded, None));
        let jobs = ScriptedJobs::new(script);
        let poller = JobPoller::new(Duration::from_secs(2), Duration::from_secs(900));

        let start = Instant::now();
        poller
            .await_completion(&jobs, &JobHandle::from("job-1"))
            .await
            .unwrap();

        assert_eq!(jobs.calls(), n + 1);
        // Paused clock only advances through the poller's sleeps.
        let slept = start.elapsed();
        assert!(slept >= Duration::from_secs(6), "slept {:?}", slept);
        assert!(slept < Duration::from_secs(8), "slept {:?}", slept);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_before_querying_again() {
        let jobs = ScriptedJobs::new(vec![state(JobStatus::Running, None)]);
        let poller = JobPoller::new(Duration::from_secs(2), Duration::from_secs(1));

        let err = poller
            .await_completion(&jobs, &JobHandle::from("job-slow"))
            .await
            .unwrap_err();

        match err {
            IngestError::JobTimeout { job_id, elapsed } => {
                assert_eq!(job_id, "job-slow");
                assert!(elapsed >= Duration::from_secs(2));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(jobs.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_carries_service_message() {
        let jobs = ScriptedJobs::new(vec![
            state(JobStatus::Pending, None),
            state(JobStatus::Failed, Some("disk full")),
        ]);
        let err = JobPoller::default()
            .await_completion(&jobs, &JobHandle::from("job-9"))
            .await
            .unwrap_err();

        match err {
            IngestError::JobFailed { job_id, message } => {
                assert_eq!(job_id, "job-9");
                assert_eq!(message, "disk full");
            }
            other => panic!("expected job failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn canceled_and_unknown_statuses_fail_with_generic_message() {
        let jobs = ScriptedJobs::new(vec![state(JobStatus::Canceled, None)]);
        let err = JobPoller::default()
            .await_completion(&jobs, &JobHandle::from("j"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "job j failed: status=canceled");

        let jobs = ScriptedJobs::new(vec![state(JobStatus::parse("archived"), Some(""))]);
        let err = JobPoller::default()
            .await_completion(&jobs, &JobHandle::from("j"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "job j failed: status=archived");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_signal_interrupts_the_wait() {
        let jobs = ScriptedJobs::new(vec![state(JobStatus::Running, None)]);
        let (tx, rx) = watch::channel(false);
        let poller =
            JobPoller::new(Duration::from_secs(60), Duration::from_secs(900)).with_cancel(rx);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(true).unwrap();
        });

        let start = Instant::now();
        let err = poller
            .await_completion(&jobs, &JobHandle::from("job-stuck"))
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, IngestError::Canceled { .. }));
        assert!(start.elapsed() < Duration::from_secs(60));
        assert_eq!(jobs.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_cancel_sender_does_not_abort() {
        let jobs = ScriptedJobs::new(vec![
            state(JobStatus::Running, None),
            state(JobStatus::Succeeded, None),
        ]);
        let (tx, rx) = watch::channel(false);
        drop(tx);
        JobPoller::new(Duration::from_secs(2), Duration::from_secs(900))
            .with_cancel(rx)
            .await_completion(&jobs, &JobHandle::from("job-2"))
            .await
            .unwrap();
        assert_eq!(jobs.calls(), 2);
    }

    /// Status source that never answers, like a transport stuck in backoff.
    struct Unresponsive;

    #[async_trait]
    impl CorpusService for Unresponsive {
        async fn upload_document(&self, _: &str, _: &DocumentUpload) -> Result<SubmissionReceipt> {
            unreachable!()
        }
        async fn upload_files_batch(&self, _: &str, _: &BatchUpload) -> Result<SubmissionReceipt> {
            unreachable!()
        }
        async fn get_job(&self, _: &JobHandle) -> Result<JobState> {
            std::future::pending::<Result<JobState>>().await
        }
        async fn build_indexes(&self, _: &str, _: &IndexRequest) -> Result<SubmissionReceipt> {
            unreachable!()
        }
        async fn retrieve(&self, _: &str, _: &RetrievalRequest) -> Result<Vec<RetrievalResult>> {
            unreachable!()
        }
        async fn generate_answer(&self, _: &str, _: &str, _: usize) -> Result<GeneratedAnswer> {
            unreachable!()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_status_query_is_bounded_by_the_deadline() {
        let poller = JobPoller::new(Duration::from_secs(2), Duration::from_secs(30));

        let start = Instant::now();
        let err = poller
            .await_completion(&Unresponsive, &JobHandle::from("job-stuck"))
            .await
            .unwrap_err();

        assert!(
            matches!(err, IngestError::JobTimeout { ref job_id, .. } if job_id == "job-stuck"),
            "got {:?}",
            err
        );
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_signal_interrupts_a_stuck_query() {
        let (tx, rx) = watch::channel(false);
        let poller =
            JobPoller::new(Duration::from_secs(2), Duration::from_secs(900)).with_cancel(rx);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            tx.send(true).unwrap();
        });
        let start = Instant::now();
        let err = poller
            .await_completion(&Unresponsive, &JobHandle::from("job-stuck"))
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, IngestError::Canceled { .. }), "got {:?}", err);
        assert!(start.elapsed() < Duration::from_secs(6));
    }

    #[test]
    fn missing_job_id_means_inline_completion() {
        assert_eq!(pending_job("upload", &SubmissionReceipt::default()).unwrap(), None);

        let receipt = SubmissionReceipt {
            job_id: Some(JobHandle::from("j-1")),
            ..Default::default()
        };
        assert_eq!(
            pending_job("upload", &receipt).unwrap(),
            Some(JobHandle::from("j-1"))
        );
    }

    #[test]
    fn missing_job_id_with_failed_status_is_a_submission_failure() {
        let receipt = SubmissionReceipt {
            status: Some(JobStatus::Failed),
            error_message: Some("unsupported file type".to_string()),
            ..Default::default()
        };
        let err = pending_job("upload", &receipt).unwrap_err();
        assert!(matches!(err, IngestError::Submission { .. }));
        assert!(err.to_string().contains("unsupported file type"));
    }
}
