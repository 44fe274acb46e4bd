//! Run configuration.
//!
//! Everything the orchestrator needs is carried in one [`Config`] value that
//! is handed to its constructor. Non-secret settings may come from an
//! optional TOML file; the credential and corpus id come from the
//! environment (`K2_API_KEY`, `K2_CORPUS_ID`, `K2_BASE_URL`).
//!
//! ```toml
//! [client]
//! base_url = "http://api:8000"
//! poll_interval_secs = 2.0
//! job_timeout_secs = 900
//!
//! [retrieval]
//! top_k = 5
//!
//! [retrieval.hybrid]
//! fusion_mode = "rrf"
//! rrf_k = 60
//!
//! [retrieval.filters]
//! topic = "search"
//!
//! [index]
//! dense = true
//! sparse = true
//! mode = "full"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::IngestError;
use crate::models::{HybridConfig, IndexMode};

pub const ENV_API_KEY: &str = "K2_API_KEY";
pub const ENV_CORPUS_ID: &str = "K2_CORPUS_ID";
pub const ENV_BASE_URL: &str = "K2_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "https://api.knowledge2.ai";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub collect: CollectConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Never read from a config file.
    #[serde(skip)]
    pub api_key: String,
    #[serde(default)]
    pub corpus_id: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: f64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_poll_interval_secs() -> f64 {
    2.0
}
fn default_job_timeout_secs() -> f64 {
    900.0
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            corpus_id: String::new(),
            base_url: default_base_url(),
            poll_interval_secs: default_poll_interval_secs(),
            job_timeout_secs: default_job_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl ClientConfig {
    /// Fill credential, corpus id and base address from a variable lookup.
    ///
    /// The credential and corpus id are required; a corpus id already set
    /// from a file is overridden by the environment when both are present.
    pub fn apply_env<F>(&mut self, lookup: F) -> std::result::Result<(), IngestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(corpus_id) = non_blank(ENV_CORPUS_ID) {
            self.corpus_id = corpus_id;
        }
        if let Some(base_url) = non_blank(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        match non_blank(ENV_API_KEY) {
            Some(api_key) => self.api_key = api_key,
            None => {
                return Err(IngestError::Config(format!(
                    "{} and {} are required",
                    ENV_API_KEY, ENV_CORPUS_ID
                )))
            }
        }
        if self.corpus_id.trim().is_empty() {
            return Err(IngestError::Config(format!(
                "{} and {} are required",
                ENV_API_KEY, ENV_CORPUS_ID
            )));
        }
        Ok(())
    }

    /// Build a client config straight from the process environment.
    pub fn from_env() -> std::result::Result<Self, IngestError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.job_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub hybrid: HybridConfig,
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    #[serde(default = "default_query")]
    pub default_query: String,
    /// Run the optional grounded-generation step after retrieval.
    #[serde(default = "default_generate")]
    pub generate: bool,
}

fn default_top_k() -> usize {
    3
}
fn default_query() -> String {
    "What is in this corpus?".to_string()
}
fn default_generate() -> bool {
    true
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            hybrid: HybridConfig::default(),
            filters: BTreeMap::new(),
            default_query: default_query(),
            generate: default_generate(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// When false, retrieval runs against whatever the corpus already has.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub dense: bool,
    #[serde(default = "default_true")]
    pub sparse: bool,
    #[serde(default)]
    pub mode: IndexMode,
}

fn default_true() -> bool {
    true
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dense: true,
            sparse: true,
            mode: IndexMode::Full,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CollectConfig {
    /// Recurse into symlinked directories. Symlinked files are always kept.
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Relative-path globs skipped during directory traversal.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

/// Parse a config file without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    Ok(config)
}

/// Load the full run configuration.
///
/// Reads `path` when given, overlays the `K2_*` environment variables and
/// validates the result. Missing credentials fail here, before any network
/// activity.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            parse_config(&content)?
        }
        None => Config::default(),
    };

    config.client.apply_env(|key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let client = &config.client;
    if !(client.base_url.starts_with("http://") || client.base_url.starts_with("https://")) {
        bail!(
            "client.base_url must start with http:// or https://, got '{}'",
            client.base_url
        );
    }
    if !client.poll_interval_secs.is_finite() || client.poll_interval_secs <= 0.0 {
        bail!("client.poll_interval_secs must be > 0");
    }
    if !client.job_timeout_secs.is_finite() || client.job_timeout_secs <= 0.0 {
        bail!("client.job_timeout_secs must be > 0");
    }
    if client.request_timeout_secs == 0 {
        bail!("client.request_timeout_secs must be > 0");
    }

    let retrieval = &config.retrieval;
    if retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    let hybrid = &retrieval.hybrid;
    if hybrid.rrf_k < 1 {
        bail!("retrieval.hybrid.rrf_k must be >= 1");
    }
    for (name, weight) in [
        ("dense_weight", hybrid.dense_weight),
        ("sparse_weight", hybrid.sparse_weight),
    ] {
        if !weight.is_finite() || weight < 0.0 {
            bail!("retrieval.hybrid.{} must be a non-negative number", name);
        }
    }

    if config.index.enabled && !config.index.dense && !config.index.sparse {
        bail!("index: at least one of dense or sparse must be enabled");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FusionMode;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_supplies_credentials_and_default_base_url() {
        let mut client = ClientConfig::default();
        client
            .apply_env(env(&[(ENV_API_KEY, "secret"), (ENV_CORPUS_ID, "corp-1")]))
            .unwrap();
        assert_eq!(client.api_key, "secret");
        assert_eq!(client.corpus_id, "corp-1");
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.poll_interval(), Duration::from_secs(2));
        assert_eq!(client.job_timeout(), Duration::from_secs(900));
    }

    #[test]
    fn missing_credential_is_a_config_error() {
        let mut client = ClientConfig::default();
        let err = client
            .apply_env(env(&[(ENV_CORPUS_ID, "corp-1")]))
            .unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));

        let mut client = ClientConfig::default();
        let err = client
            .apply_env(env(&[(ENV_API_KEY, "secret"), (ENV_CORPUS_ID, "  ")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_CORPUS_ID));
    }

    #[test]
    fn file_values_override_defaults() {
        let config = parse_config(
            r#"
[client]
base_url = "http://api:8000"
poll_interval_secs = 0.5

[retrieval]
top_k = 7

[retrieval.hybrid]
fusion_mode = "weighted"
dense_weight = 0.7
sparse_weight = 0.3

[retrieval.filters]
topic = "search"

[index]
sparse = false
mode = "incremental"
"#,
        )
        .unwrap();

        assert_eq!(config.client.base_url, "http://api:8000");
        assert_eq!(config.client.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.client.job_timeout_secs, 900.0);
        assert_eq!(config.retrieval.top_k, 7);
        assert_eq!(config.retrieval.hybrid.fusion_mode, FusionMode::Weighted);
        assert_eq!(config.retrieval.filters["topic"], "search");
        assert!(config.index.dense);
        assert!(!config.index.sparse);
        assert_eq!(config.index.mode, IndexMode::Incremental);
        validate(&config).unwrap();
    }

    #[test]
    fn api_key_is_ignored_in_files() {
        let config = parse_config("[client]\napi_key = \"leaked\"\n");
        // Unknown keys are tolerated but never populate the credential.
        assert!(config.unwrap().client.api_key.is_empty());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = Config::default();
        config.client.poll_interval_secs = 0.0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.client.base_url = "api.knowledge2.ai".to_string();
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.index.dense = false;
        config.index.sparse = false;
        assert!(validate(&config).is_err());
        config.index.enabled = false;
        assert!(validate(&config).is_ok());
    }
}
