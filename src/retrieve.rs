//! Retrieval handoff.
//!
//! Queries an indexed corpus with the caller's hybrid settings and hands the
//! results back exactly as ranked by the service. Fusion is done
//! server-side; nothing here re-sorts or re-scores.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::RetrievalConfig;
use crate::error::{IngestError, Result};
use crate::models::{GeneratedAnswer, RetrievalRequest, RetrievalResult};
use crate::service::CorpusService;

/// Build a request from configuration plus per-run overrides.
///
/// `extra_filters` are merged over the configured filters.
pub fn retrieval_request(
    config: &RetrievalConfig,
    query: &str,
    top_k: Option<usize>,
    extra_filters: &[(String, String)],
) -> RetrievalRequest {
    let mut filters: BTreeMap<String, Value> = config.filters.clone();
    for (key, value) in extra_filters {
        filters.insert(key.clone(), Value::String(value.clone()));
    }
    RetrievalRequest {
        query: query.to_string(),
        top_k: top_k.unwrap_or(config.top_k),
        hybrid: config.hybrid.clone(),
        filters,
    }
}

/// Run the query. Results come back in service order.
pub async fn retrieve(
    service: &dyn CorpusService,
    corpus_id: &str,
    request: &RetrievalRequest,
) -> Result<Vec<RetrievalResult>> {
    if request.query.trim().is_empty() {
        return Err(IngestError::InvalidInput("query must not be empty".to_string()));
    }
    let results = service.retrieve(corpus_id, request).await?;
    tracing::info!(count = results.len(), top_k = request.top_k, "retrieved results");
    Ok(results)
}

/// Optional grounded generation.
///
/// Every failure is downgraded to [`IngestError::Retrieval`] so the caller
/// can report it as a warning. An empty answer is `Ok(None)`.
pub async fn generate_answer(
    service: &dyn CorpusService,
    corpus_id: &str,
    query: &str,
    top_k: usize,
) -> Result<Option<GeneratedAnswer>> {
    match service.generate_answer(corpus_id, query, top_k).await {
        Ok(answer) if answer.answer.trim().is_empty() => Ok(None),
        Ok(answer) => Ok(Some(answer)),
        Err(err) => Err(IngestError::Retrieval(err.to_string())),
    }
}

/// Flatten result text for one-line display.
pub fn preview(text: &str, max_chars: usize) -> String {
    text.replace('\n', " ").chars().take(max_chars).collect()
}
