//! The corpus service seam.
//!
//! [`CorpusService`] is everything the orchestrator needs from the remote
//! service. [`HttpCorpusClient`](crate::client::HttpCorpusClient) talks to
//! the real API; tests drive the orchestrator with in-memory fakes.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use k2_ingest::error::Result;
//! use k2_ingest::models::*;
//! use k2_ingest::service::CorpusService;
//!
//! /// A service that completes everything inline.
//! struct Instant;
//!
//! #[async_trait]
//! impl CorpusService for Instant {
//!     async fn upload_document(&self, _: &str, _: &DocumentUpload) -> Result<SubmissionReceipt> {
//!         Ok(SubmissionReceipt::default())
//!     }
//!     async fn upload_files_batch(&self, _: &str, batch: &BatchUpload) -> Result<SubmissionReceipt> {
//!         Ok(SubmissionReceipt { count: Some(batch.files.len() as u64), ..Default::default() })
//!     }
//!     async fn get_job(&self, _: &JobHandle) -> Result<JobState> {
//!         Ok(JobState { status: JobStatus::Succeeded, error_message: None })
//!     }
//!     async fn build_indexes(&self, _: &str, _: &IndexRequest) -> Result<SubmissionReceipt> {
//!         Ok(SubmissionReceipt::default())
//!     }
//!     async fn retrieve(&self, _: &str, _: &RetrievalRequest) -> Result<Vec<RetrievalResult>> {
//!         Ok(vec![])
//!     }
//!     async fn generate_answer(&self, _: &str, _: &str, _: usize) -> Result<GeneratedAnswer> {
//!         Ok(GeneratedAnswer::default())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    BatchUpload, DocumentUpload, GeneratedAnswer, IndexRequest, JobHandle, JobState,
    RetrievalRequest, RetrievalResult, SubmissionReceipt,
};

/// Remote corpus operations.
///
/// Submissions that the service refuses should fail with
/// [`IngestError::Submission`](crate::error::IngestError::Submission);
/// asynchronous failures are reported later through [`get_job`](Self::get_job).
#[async_trait]
pub trait CorpusService: Send + Sync {
    /// Upload one file as a document. The implementation reads the file.
    async fn upload_document(
        &self,
        corpus_id: &str,
        upload: &DocumentUpload,
    ) -> Result<SubmissionReceipt>;

    /// Upload many files, with their contents inline, in one request.
    async fn upload_files_batch(
        &self,
        corpus_id: &str,
        batch: &BatchUpload,
    ) -> Result<SubmissionReceipt>;

    /// Current status of a job.
    async fn get_job(&self, job: &JobHandle) -> Result<JobState>;

    /// Request dense and/or sparse index construction.
    async fn build_indexes(&self, corpus_id: &str, request: &IndexRequest)
        -> Result<SubmissionReceipt>;

    /// Ranked results, in the service's order.
    async fn retrieve(
        &self,
        corpus_id: &str,
        request: &RetrievalRequest,
    ) -> Result<Vec<RetrievalResult>>;

    /// Grounded answer generation. Requires server-side LLM configuration.
    async fn generate_answer(
        &self,
        corpus_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<GeneratedAnswer>;
}
