//! Ingestion run orchestration.
//!
//! Coordinates the full flow for one corpus: collect → upload → wait for
//! upload jobs → build indexes → wait for the index job → retrieve →
//! optional generation. Stages run strictly one after another; the only
//! suspension points are network calls and the poller's sleeps.
//!
//! Collection, submission and job waits are fail-fast. Only the optional
//! generation step is best-effort: its failure becomes a warning on the
//! [`RunReport`] and the retrieved results are still returned.

use std::path::PathBuf;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::client::HttpCorpusClient;
use crate::collect::collect_files;
use crate::config::Config;
use crate::error::Result;
use crate::index;
use crate::models::{FileRef, GeneratedAnswer, JobHandle, RetrievalResult};
use crate::poller::JobPoller;
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::retrieve;
use crate::service::CorpusService;
use crate::upload::{UploadOutcome, UploadStrategy};

/// What to ingest and what to ask afterwards.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub directory: Option<PathBuf>,
    pub files: Vec<PathBuf>,
    /// Submit every file in a single batch request.
    pub batch: bool,
    /// Skip the index build; retrieval may see a stale corpus.
    pub skip_index: bool,
    /// Falls back to `retrieval.default_query`.
    pub query: Option<String>,
    pub top_k: Option<usize>,
    pub filters: Vec<(String, String)>,
    /// Overrides `retrieval.generate` when set.
    pub generate: Option<bool>,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub files: Vec<FileRef>,
    pub uploads: UploadOutcome,
    /// Index job that was awaited, if the build ran asynchronously.
    pub index_job: Option<JobHandle>,
    pub indexed: bool,
    pub query: String,
    /// Results in service order.
    pub results: Vec<RetrievalResult>,
    pub answer: Option<GeneratedAnswer>,
    /// Non-fatal problems from optional steps.
    pub warnings: Vec<String>,
}

/// Drives one ingestion run against a corpus service.
///
/// Instances share no mutable state, so several can run side by side
/// against different corpora.
pub struct Orchestrator<S: CorpusService> {
    config: Config,
    service: S,
    progress: Box<dyn ProgressReporter>,
    cancel: Option<watch::Receiver<bool>>,
}

impl Orchestrator<HttpCorpusClient> {
    /// Orchestrator backed by the HTTP client described in `config.client`.
    pub fn connect(config: Config) -> Result<Self> {
        let client = HttpCorpusClient::new(&config.client)?;
        Ok(Self::new(config, client))
    }
}

impl<S: CorpusService> Orchestrator<S> {
    pub fn new(config: Config, service: S) -> Self {
        Self {
            config,
            service,
            progress: Box::new(NoProgress),
            cancel: None,
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Stop waiting on jobs once `cancel` observes `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    fn poller(&self) -> JobPoller {
        let poller = JobPoller::from_config(&self.config.client);
        match &self.cancel {
            Some(cancel) => poller.with_cancel(cancel.clone()),
            None => poller,
        }
    }

    async fn wait(&self, poller: &JobPoller, label: String, job: &JobHandle) -> Result<()> {
        self.progress.report(ProgressEvent::Waiting {
            label,
            job_id: job.to_string(),
        });
        poller.await_completion(&self.service, job).await
    }

    pub async fn run(&self, request: &IngestRequest) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "ingest",
            run_id = %run_id,
            corpus = %self.config.client.corpus_id
        );
        self.run_inner(run_id.clone(), request)
            .instrument(span)
            .await
    }

    async fn run_inner(&self, run_id: String, request: &IngestRequest) -> Result<RunReport> {
        let corpus_id = self.config.client.corpus_id.as_str();
        let poller = self.poller();

        let files = collect_files(
            request.directory.as_deref(),
            &request.files,
            &self.config.collect,
        )?;
        self.progress.report(ProgressEvent::Collected {
            files: files.len() as u64,
        });

        let uploads = UploadStrategy::new(request.batch)
            .upload(&self.service, corpus_id, &files, self.progress.as_ref())
            .await?;

        // Every upload job must succeed before indexing starts. All files
        // are already submitted at this point, even if an early job fails.
        match &uploads {
            UploadOutcome::Batch { job: Some(job), .. } => {
                self.wait(&poller, "batch upload".to_string(), job).await?;
            }
            UploadOutcome::Batch { job: None, .. } => {}
            UploadOutcome::Documents(uploaded) => {
                for file in uploaded {
                    if let Some(job) = &file.job {
                        self.wait(&poller, format!("upload {}", file.name), job)
                            .await?;
                    }
                }
            }
        }

        let index_enabled = self.config.index.enabled && !request.skip_index;
        let mut index_job = None;
        if index_enabled {
            self.progress.report(ProgressEvent::Indexing {
                dense: self.config.index.dense,
                sparse: self.config.index.sparse,
            });
            index_job = index::build_indexes(&self.service, corpus_id, &self.config.index).await?;
            if let Some(job) = &index_job {
                self.wait(&poller, "index".to_string(), job).await?;
            }
        } else {
            tracing::info!("index build skipped; results may reflect a stale corpus");
        }

        let query = request
            .query
            .clone()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| self.config.retrieval.default_query.clone());
        let retrieval = retrieve::retrieval_request(
            &self.config.retrieval,
            &query,
            request.top_k,
            &request.filters,
        );
        self.progress.report(ProgressEvent::Retrieving {
            query: query.clone(),
        });
        let results = retrieve::retrieve(&self.service, corpus_id, &retrieval).await?;

        let mut warnings = Vec::new();
        let mut answer = None;
        if request.generate.unwrap_or(self.config.retrieval.generate) {
            match retrieve::generate_answer(&self.service, corpus_id, &query, retrieval.top_k)
                .await
            {
                Ok(generated) => answer = generated,
                Err(err) => {
                    tracing::warn!(error = %err, "generation skipped");
                    warnings.push(format!("Generation skipped/failed: {}", err));
                }
            }
        }

        Ok(RunReport {
            run_id,
            files,
            uploads,
            index_job,
            indexed: index_enabled,
            query,
            results,
            answer,
            warnings,
        })
    }
}
