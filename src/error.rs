//! Error taxonomy for the ingestion flow.
//!
//! Every stage returns [`IngestError`]. Collection, submission and
//! required job waits are fatal for the run; [`IngestError::Retrieval`]
//! is reserved for optional post-retrieval steps and is reported as a
//! warning by the orchestrator.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Bad paths, an empty selection, or other caller contract violations.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The service rejected an upload or index request outright.
    #[error("{operation} rejected by service: {message}")]
    Submission {
        operation: &'static str,
        message: String,
    },

    /// A job reached a terminal state other than `succeeded`.
    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// The job was still in flight when the deadline passed. Its real
    /// outcome is unknown to the client.
    #[error("timed out waiting for job {job_id} after {:.1}s", .elapsed.as_secs_f64())]
    JobTimeout { job_id: String, elapsed: Duration },

    /// The caller signalled cancellation while a job was being awaited.
    #[error("stopped waiting for job {job_id}: run canceled")]
    Canceled { job_id: String },

    /// The service answered a status query or retrieval with an error.
    #[error("service error: {0}")]
    Service(String),

    /// Failure in a best-effort step after retrieval.
    #[error("retrieval step failed: {0}")]
    Retrieval(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl IngestError {
    /// Whether this error should terminate the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, IngestError::Retrieval(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_retrieval_errors_are_non_fatal() {
        assert!(!IngestError::Retrieval("llm offline".into()).is_fatal());
        assert!(IngestError::InvalidInput("no files selected".into()).is_fatal());
        assert!(IngestError::Canceled {
            job_id: "j1".into()
        }
        .is_fatal());
    }

    #[test]
    fn timeout_message_names_job_and_elapsed() {
        let err = IngestError::JobTimeout {
            job_id: "job-42".into(),
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "timed out waiting for job job-42 after 1.5s"
        );
    }
}
