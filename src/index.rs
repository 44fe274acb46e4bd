//! Index construction after uploads.

use crate::config::IndexConfig;
use crate::error::{IngestError, Result};
use crate::models::{IndexRequest, JobHandle};
use crate::poller::pending_job;
use crate::service::CorpusService;

/// Ask the service to build the configured indexes.
///
/// Returns the job to wait on, or `None` when the build completed inline.
/// The caller must only invoke this once every upload job has succeeded.
pub async fn build_indexes(
    service: &dyn CorpusService,
    corpus_id: &str,
    config: &IndexConfig,
) -> Result<Option<JobHandle>> {
    if !config.dense && !config.sparse {
        return Err(IngestError::InvalidInput(
            "index build needs dense, sparse, or both".to_string(),
        ));
    }

    let request = IndexRequest {
        dense: config.dense,
        sparse: config.sparse,
        mode: config.mode,
        wait: false,
    };
    tracing::info!(
        dense = request.dense,
        sparse = request.sparse,
        mode = ?request.mode,
        "requesting index build"
    );
    let receipt = service.build_indexes(corpus_id, &request).await?;
    pending_job("index build", &receipt)
}
