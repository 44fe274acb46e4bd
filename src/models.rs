//! Core data models used throughout the ingestion flow.
//!
//! These types describe the files selected for upload, the requests sent to
//! the corpus service, the asynchronous jobs it hands back, and the ranked
//! records returned by retrieval.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// A file selected for upload.
///
/// Identity is the canonical path; `display_name` is the base name of the
/// first spelling that referred to it and is what the service sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub path: PathBuf,
    pub display_name: String,
}

/// One file uploaded as a standalone document.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub file: FileRef,
    pub source_uri: String,
    pub metadata: Map<String, Value>,
    pub auto_index: bool,
}

/// A file carried inline in a batch upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFile {
    pub name: String,
    pub content: Vec<u8>,
}

/// All selected files packed into a single request.
#[derive(Debug, Clone)]
pub struct BatchUpload {
    pub files: Vec<BatchFile>,
    pub auto_index: bool,
    /// Ask the service to finish the work before responding.
    pub wait: bool,
}

/// A planned upload, before submission.
#[derive(Debug, Clone)]
pub enum UploadRequest {
    Single(DocumentUpload),
    Batch(BatchUpload),
}

impl UploadRequest {
    pub fn auto_index(&self) -> bool {
        match self {
            UploadRequest::Single(doc) => doc.auto_index,
            UploadRequest::Batch(batch) => batch.auto_index,
        }
    }
}

/// Opaque identifier of a server-side job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobHandle {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Server-reported job status.
///
/// Values the client does not recognise are kept in [`JobStatus::Unknown`]
/// and count as a terminal failure, so a new server state can never be
/// mistaken for success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Unknown(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "succeeded" => JobStatus::Succeeded,
            "failed" => JobStatus::Failed,
            "canceled" | "cancelled" => JobStatus::Canceled,
            _ => JobStatus::Unknown(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Unknown(raw) => raw,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(JobStatus::parse(&raw))
    }
}

/// Snapshot returned by a job status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub status: JobStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Response to an upload or index-build submission.
///
/// `job_id` is absent when the service finished the work inline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    #[serde(default)]
    pub job_id: Option<JobHandle>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub document_id: Option<String>,
    /// Number of files accepted (batch uploads only).
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    #[default]
    Full,
    Incremental,
}

/// Parameters for an index build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRequest {
    pub dense: bool,
    pub sparse: bool,
    pub mode: IndexMode,
    pub wait: bool,
}

/// How the service fuses dense and sparse rankings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMode {
    #[default]
    Rrf,
    Weighted,
    /// Any other server-side mode, passed through untouched.
    #[serde(untagged)]
    Other(String),
}

/// Hybrid retrieval settings, forwarded verbatim to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridConfig {
    #[serde(default = "default_hybrid_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub fusion_mode: FusionMode,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f64,
    #[serde(default = "default_sparse_weight")]
    pub sparse_weight: f64,
}

fn default_hybrid_enabled() -> bool {
    true
}
fn default_rrf_k() -> u32 {
    60
}
fn default_dense_weight() -> f64 {
    0.6
}
fn default_sparse_weight() -> f64 {
    0.4
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            enabled: default_hybrid_enabled(),
            fusion_mode: FusionMode::default(),
            rrf_k: default_rrf_k(),
            dense_weight: default_dense_weight(),
            sparse_weight: default_sparse_weight(),
        }
    }
}

/// A retrieval query against the corpus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalRequest {
    pub query: String,
    pub top_k: usize,
    pub hybrid: HybridConfig,
    pub filters: BTreeMap<String, Value>,
}

/// One ranked record. The order of a result list is the service's ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub content: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Output of the optional grounded-generation step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    #[serde(default)]
    pub answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_is_terminal() {
        let status: JobStatus = serde_json::from_str("\"archived\"").unwrap();
        assert_eq!(status, JobStatus::Unknown("archived".to_string()));
        assert!(status.is_terminal());
    }

    #[test]
    fn in_flight_statuses_are_not_terminal() {
        assert!(!JobStatus::parse("pending").is_terminal());
        assert!(!JobStatus::parse("RUNNING").is_terminal());
        assert!(JobStatus::parse("cancelled").is_terminal());
        assert_eq!(JobStatus::parse("cancelled"), JobStatus::Canceled);
    }

    #[test]
    fn receipt_without_job_id_parses() {
        let receipt: SubmissionReceipt = serde_json::from_str(r#"{"count": 4}"#).unwrap();
        assert!(receipt.job_id.is_none());
        assert_eq!(receipt.count, Some(4));
    }

    #[test]
    fn fusion_mode_passes_through_unknown_values() {
        let hybrid: HybridConfig =
            serde_json::from_str(r#"{"fusion_mode": "convex", "rrf_k": 10}"#).unwrap();
        assert_eq!(hybrid.fusion_mode, FusionMode::Other("convex".to_string()));
        assert_eq!(hybrid.rrf_k, 10);
        assert!(hybrid.enabled);

        let json = serde_json::to_value(&hybrid).unwrap();
        assert_eq!(json["fusion_mode"], "convex");
    }
}
