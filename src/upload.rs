//! Upload strategy: one request per file, or one batch for everything.
//!
//! Uploads never ask the service to index automatically; indexing is
//! triggered explicitly afterwards. Per-file uploads are submitted strictly
//! in collection order and stop at the first rejected submission. Job
//! failures are not detected here; they surface when the returned jobs are
//! polled.

use serde_json::{Map, Value};

use crate::error::{IngestError, Result};
use crate::models::{
    BatchFile, BatchUpload, DocumentUpload, FileRef, JobHandle, UploadRequest,
};
use crate::poller::pending_job;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::service::CorpusService;

/// Tag attached to every uploaded document's metadata.
pub const UPLOADED_BY: &str = "k2-ingest";

/// A file submitted on its own and the job (if any) tracking it.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub name: String,
    pub job: Option<JobHandle>,
}

/// What the upload stage handed back.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Batch {
        job: Option<JobHandle>,
        count: Option<u64>,
    },
    Documents(Vec<UploadedFile>),
}

impl UploadOutcome {
    /// Jobs still to be awaited, in submission order.
    pub fn jobs(&self) -> Vec<&JobHandle> {
        match self {
            UploadOutcome::Batch { job, .. } => job.iter().collect(),
            UploadOutcome::Documents(files) => {
                files.iter().filter_map(|f| f.job.as_ref()).collect()
            }
        }
    }
}

/// Build the request for a single-file upload.
pub fn document_request(file: &FileRef) -> DocumentUpload {
    let mut metadata = Map::new();
    metadata.insert(
        "filename".to_string(),
        Value::String(file.display_name.clone()),
    );
    metadata.insert(
        "uploaded_by".to_string(),
        Value::String(UPLOADED_BY.to_string()),
    );
    DocumentUpload {
        file: file.clone(),
        source_uri: format!("file://{}", file.display_name),
        metadata,
        auto_index: false,
    }
}

/// Read every file into memory and pack them into one batch request.
pub async fn batch_request(files: &[FileRef]) -> Result<BatchUpload> {
    let mut batch = Vec::with_capacity(files.len());
    for file in files {
        let content = tokio::fs::read(&file.path)
            .await
            .map_err(|e| IngestError::io(&file.path, e))?;
        batch.push(BatchFile {
            name: file.display_name.clone(),
            content,
        });
    }
    Ok(BatchUpload {
        files: batch,
        auto_index: false,
        wait: false,
    })
}

/// Turn collected files into upload requests without submitting anything.
pub async fn plan_uploads(files: &[FileRef], batch: bool) -> Result<Vec<UploadRequest>> {
    if batch {
        Ok(vec![UploadRequest::Batch(batch_request(files).await?)])
    } else {
        Ok(files
            .iter()
            .map(|f| UploadRequest::Single(document_request(f)))
            .collect())
    }
}

/// Submits collected files to the corpus.
pub struct UploadStrategy {
    pub batch: bool,
}

impl UploadStrategy {
    pub fn new(batch: bool) -> Self {
        Self { batch }
    }

    /// Submit every file and return the jobs to wait on.
    ///
    /// Nothing is polled here, so by the time the first job is awaited every
    /// file has already been sent. A job that later fails leaves the other
    /// documents in the corpus; the run still stops before indexing.
    pub async fn upload(
        &self,
        service: &dyn CorpusService,
        corpus_id: &str,
        files: &[FileRef],
        progress: &dyn ProgressReporter,
    ) -> Result<UploadOutcome> {
        let requests = plan_uploads(files, self.batch).await?;
        let total = requests.len() as u64;
        let mut uploaded = Vec::with_capacity(requests.len());

        for (idx, request) in requests.iter().enumerate() {
            match request {
                UploadRequest::Batch(batch) => {
                    progress.report(ProgressEvent::UploadingBatch {
                        files: batch.files.len() as u64,
                    });
                    let receipt = service.upload_files_batch(corpus_id, batch).await?;
                    let job = pending_job("batch upload", &receipt)?;
                    tracing::info!(
                        count = receipt.count,
                        job_id = job.as_ref().map(|j| j.as_str()),
                        "batch uploaded"
                    );
                    return Ok(UploadOutcome::Batch {
                        job,
                        count: receipt.count,
                    });
                }
                UploadRequest::Single(doc) => {
                    progress.report(ProgressEvent::Uploading {
                        n: idx as u64 + 1,
                        total,
                        name: doc.file.display_name.clone(),
                    });
                    let receipt = service.upload_document(corpus_id, doc).await?;
                    let job = pending_job("document upload", &receipt)?;
                    tracing::info!(
                        filename = %doc.file.display_name,
                        job_id = job.as_ref().map(|j| j.as_str()),
                        "document uploaded"
                    );
                    uploaded.push(UploadedFile {
                        name: doc.file.display_name.clone(),
                        job,
                    });
                }
            }
        }

        Ok(UploadOutcome::Documents(uploaded))
    }
}
