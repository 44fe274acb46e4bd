//! HTTP client for the Knowledge2 corpus API.
//!
//! [`HttpCorpusClient`] implements [`CorpusService`] over JSON/HTTP with
//! `reqwest`. File contents travel base64-encoded inside the JSON body.
//!
//! # Endpoints
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | `POST` | `/v1/corpora/{corpus}/documents` | [`upload_document`](CorpusService::upload_document) |
//! | `POST` | `/v1/corpora/{corpus}/documents/batch` | [`upload_files_batch`](CorpusService::upload_files_batch) |
//! | `GET`  | `/v1/jobs/{job_id}` | [`get_job`](CorpusService::get_job) |
//! | `POST` | `/v1/corpora/{corpus}/indexes/build` | [`build_indexes`](CorpusService::build_indexes) |
//! | `POST` | `/v1/corpora/{corpus}/retrieve` | [`retrieve`](CorpusService::retrieve) |
//! | `POST` | `/v1/corpora/{corpus}/generate` | [`generate_answer`](CorpusService::generate_answer) |
//!
//! # Retry Strategy
//!
//! Submissions are sent exactly once; a non-2xx answer is an
//! [`IngestError::Submission`]. Reads (`get_job`, `retrieve`, `generate`)
//! are retried with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{IngestError, Result};
use crate::models::{
    BatchUpload, DocumentUpload, GeneratedAnswer, IndexRequest, JobHandle, JobState,
    RetrievalRequest, RetrievalResult, SubmissionReceipt,
};
use crate::service::CorpusService;

/// Corpus service reached over HTTP.
pub struct HttpCorpusClient {
    http: Client,
    base_url: Url,
    api_key: String,
    max_retries: u32,
}

impl HttpCorpusClient {
    /// Build a client from configuration. No request is made here.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("k2-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            IngestError::Config(format!("invalid base URL '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(IngestError::Config(format!(
                "invalid base URL '{}'",
                config.base_url
            )));
        }
        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    /// Append path segments to the base URL, percent-encoding each one so
    /// ids containing `/`, `?` or `#` stay inside their segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn corpus_url(&self, corpus_id: &str, suffix: &[&str]) -> Url {
        let mut segments = vec!["v1", "corpora", corpus_id];
        segments.extend_from_slice(suffix);
        self.url(&segments)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.api_key)
    }

    /// Send a submission once and decode its receipt.
    ///
    /// An empty 2xx body decodes as `T::default()`.
    async fn submit<T: DeserializeOwned + Default>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| IngestError::Submission {
                operation,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(IngestError::Submission {
                operation,
                message: format!("HTTP {}: {}", status, error_text(&body_text)),
            });
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }
        serde_json::from_slice(&body).map_err(|e| IngestError::Submission {
            operation,
            message: format!("unreadable response: {}", e),
        })
    }

    /// Send an idempotent read, retrying transient failures.
    async fn read<T, F>(&self, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut last_err: Option<IngestError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.authorized(build()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json().await?);
                    }
                    let err = status_error(status, response).await;
                    if is_retryable(status) {
                        tracing::debug!(%status, attempt, "transient service error, retrying");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    tracing::debug!(error = %e, attempt, "request failed, retrying");
                    last_err = Some(e.into());
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| IngestError::Service("request failed after retries".to_string())))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn status_error(status: StatusCode, response: Response) -> IngestError {
    let body_text = response.text().await.unwrap_or_default();
    IngestError::Service(format!("HTTP {}: {}", status, error_text(&body_text)))
}

/// Pull a readable message out of an error body.
///
/// Accepts `{"error": {"message": ...}}`, `{"detail": ...}` and
/// `{"message": ...}`; anything else is returned as-is.
fn error_text(body: &str) -> String {
    #[derive(Deserialize)]
    struct Nested {
        message: String,
    }
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ErrorBody {
        Nested { error: Nested },
        Detail { detail: String },
        Message { message: String },
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody::Nested { error }) => error.message,
        Ok(ErrorBody::Detail { detail }) => detail,
        Ok(ErrorBody::Message { message }) => message,
        Err(_) => body.trim().to_string(),
    }
}

#[derive(Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    results: Vec<RetrievalResult>,
}

#[async_trait]
impl CorpusService for HttpCorpusClient {
    async fn upload_document(
        &self,
        corpus_id: &str,
        upload: &DocumentUpload,
    ) -> Result<SubmissionReceipt> {
        let content = tokio::fs::read(&upload.file.path)
            .await
            .map_err(|e| IngestError::io(&upload.file.path, e))?;

        let body = serde_json::json!({
            "filename": upload.file.display_name,
            "source_uri": upload.source_uri,
            "metadata": upload.metadata,
            "auto_index": upload.auto_index,
            "content_base64": BASE64.encode(&content),
        });
        let request = self
            .http
            .post(self.corpus_url(corpus_id, &["documents"]))
            .json(&body);
        self.submit("document upload", request).await
    }

    async fn upload_files_batch(
        &self,
        corpus_id: &str,
        batch: &BatchUpload,
    ) -> Result<SubmissionReceipt> {
        let files: Vec<serde_json::Value> = batch
            .files
            .iter()
            .map(|f| {
                serde_json::json!({
                    "name": f.name,
                    "content_base64": BASE64.encode(&f.content),
                })
            })
            .collect();
        let body = serde_json::json!({
            "files": files,
            "auto_index": batch.auto_index,
            "wait": batch.wait,
        });
        let request = self
            .http
            .post(self.corpus_url(corpus_id, &["documents", "batch"]))
            .json(&body);
        self.submit("batch upload", request).await
    }

    async fn get_job(&self, job: &JobHandle) -> Result<JobState> {
        let url = self.url(&["v1", "jobs", job.as_str()]);
        self.read(|| self.http.get(url.clone())).await
    }

    async fn build_indexes(
        &self,
        corpus_id: &str,
        request: &IndexRequest,
    ) -> Result<SubmissionReceipt> {
        let request = self
            .http
            .post(self.corpus_url(corpus_id, &["indexes", "build"]))
            .json(request);
        self.submit("index build", request).await
    }

    async fn retrieve(
        &self,
        corpus_id: &str,
        request: &RetrievalRequest,
    ) -> Result<Vec<RetrievalResult>> {
        let url = self.corpus_url(corpus_id, &["retrieve"]);
        let response: RetrieveResponse = self
            .read(|| self.http.post(url.clone()).json(request))
            .await?;
        Ok(response.results)
    }

    async fn generate_answer(
        &self,
        corpus_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<GeneratedAnswer> {
        let url = self.corpus_url(corpus_id, &["generate"]);
        let body = serde_json::json!({ "query": query, "top_k": top_k });
        self.read(|| self.http.post(url.clone()).json(&body)).await
    }
}
