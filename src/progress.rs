//! Run progress reporting.
//!
//! Reports what the orchestrator is doing (collecting, uploading n of total,
//! waiting on a job, indexing, retrieving) so long waits are visible.
//! Progress goes to **stderr**, leaving stdout for results.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Collection finished with this many unique files.
    Collected { files: u64 },
    /// Submitting file `n` of `total` as its own document.
    Uploading { n: u64, total: u64, name: String },
    /// Submitting every file in one batch request.
    UploadingBatch { files: u64 },
    /// Polling a job; `label` is only for display.
    Waiting { label: String, job_id: String },
    /// Requesting index construction.
    Indexing { dense: bool, sparse: bool },
    /// Querying the corpus.
    Retrieving { query: String },
}

/// Receives progress events. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "upload  3 / 12  notes.md".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Collected { files } => {
                format!("collect  {} file(s)\n", format_number(*files))
            }
            ProgressEvent::Uploading { n, total, name } => format!(
                "upload  {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                name
            ),
            ProgressEvent::UploadingBatch { files } => {
                format!("upload  batch of {} file(s)\n", format_number(*files))
            }
            ProgressEvent::Waiting { label, job_id } => {
                format!("wait  {} job {}\n", label, job_id)
            }
            ProgressEvent::Indexing { dense, sparse } => {
                let kinds = match (dense, sparse) {
                    (true, true) => "dense+sparse",
                    (true, false) => "dense",
                    (false, true) => "sparse",
                    (false, false) => "none",
                };
                format!("index  building {} indexes\n", kinds)
            }
            ProgressEvent::Retrieving { query } => format!("retrieve  {:?}\n", query),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(line) = serde_json::to_string(&event_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

fn event_json(event: &ProgressEvent) -> serde_json::Value {
    match event {
        ProgressEvent::Collected { files } => serde_json::json!({
            "event": "progress",
            "phase": "collected",
            "files": files
        }),
        ProgressEvent::Uploading { n, total, name } => serde_json::json!({
            "event": "progress",
            "phase": "uploading",
            "n": n,
            "total": total,
            "name": name
        }),
        ProgressEvent::UploadingBatch { files } => serde_json::json!({
            "event": "progress",
            "phase": "uploading_batch",
            "files": files
        }),
        ProgressEvent::Waiting { label, job_id } => serde_json::json!({
            "event": "progress",
            "phase": "waiting",
            "label": label,
            "job_id": job_id
        }),
        ProgressEvent::Indexing { dense, sparse } => serde_json::json!({
            "event": "progress",
            "phase": "indexing",
            "dense": dense,
            "sparse": sparse
        }),
        ProgressEvent::Retrieving { query } => serde_json::json!({
            "event": "progress",
            "phase": "retrieving",
            "query": query
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
