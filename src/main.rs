//! # k2-ingest CLI
//!
//! Uploads files or a directory to a Knowledge2 corpus, builds indexes,
//! and runs a retrieval query against the result.
//!
//! ## Usage
//!
//! ```bash
//! export K2_API_KEY=...
//! export K2_CORPUS_ID=...
//! export K2_BASE_URL=http://api:8000   # optional, defaults to https://api.knowledge2.ai
//!
//! k2-ingest --dir /path/to/docs
//! k2-ingest --file /path/to/a.pdf --file /path/to/b.md --batch
//! k2-ingest --dir ./docs --no-index --query "deployment checklist"
//! ```
//!
//! Exit status is non-zero for invalid input, missing credentials, rejected
//! submissions, failed or timed-out jobs. A failed generation step only
//! prints a warning.

use anyhow::Context;
use clap::Parser;
use k2_ingest::config;
use k2_ingest::orchestrator::{IngestRequest, Orchestrator, RunReport};
use k2_ingest::progress::ProgressMode;
use k2_ingest::retrieve::preview;
use k2_ingest::upload::UploadOutcome;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Upload files/dirs to a Knowledge2 corpus and query it.
///
/// Credentials come from `K2_API_KEY` and `K2_CORPUS_ID`; the service
/// address from `K2_BASE_URL`.
#[derive(Parser)]
#[command(name = "k2-ingest", version, about)]
struct Cli {
    /// Upload all files under this directory.
    #[arg(long = "dir")]
    dir: Option<PathBuf>,

    /// Upload a specific file. Repeatable.
    #[arg(long = "file")]
    files: Vec<PathBuf>,

    /// Upload all selected files as a single batch job.
    #[arg(long)]
    batch: bool,

    /// Skip building indexes after upload.
    #[arg(long)]
    no_index: bool,

    /// Query to run after indexing. Defaults to `retrieval.default_query`.
    #[arg(long)]
    query: Option<String>,

    /// Number of results to retrieve.
    #[arg(long)]
    top_k: Option<usize>,

    /// Metadata filter as `key=value`. Repeatable.
    #[arg(long = "filter", value_parser = parse_key_val)]
    filters: Vec<(String, String)>,

    /// Skip the grounded-generation step after retrieval.
    #[arg(long)]
    no_generate: bool,

    /// Optional TOML file with client, retrieval, index and collect settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
    #[arg(long, value_enum)]
    progress: Option<ProgressMode>,

    /// More log output (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Parse a `key=value` pair for `--filter` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Fails on missing credentials before any network activity.
    let cfg = config::load_config(cli.config.as_deref())?;
    let corpus_id = cfg.client.corpus_id.clone();

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted; no longer waiting on jobs.");
            let _ = cancel_tx.send(true);
        }
    });

    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);
    let orchestrator = Orchestrator::connect(cfg)
        .context("Failed to create corpus client")?
        .with_progress(progress.reporter())
        .with_cancel(cancel_rx);

    let request = IngestRequest {
        directory: cli.dir,
        files: cli.files,
        batch: cli.batch,
        skip_index: cli.no_index,
        query: cli.query,
        top_k: cli.top_k,
        filters: cli.filters,
        generate: if cli.no_generate { Some(false) } else { None },
    };

    let report = orchestrator.run(&request).await?;
    print_report(&corpus_id, &report);
    Ok(())
}

fn print_report(corpus_id: &str, report: &RunReport) {
    println!(
        "Uploaded {} file(s) to corpus {}",
        report.files.len(),
        corpus_id
    );
    match &report.uploads {
        UploadOutcome::Batch { job, count } => {
            println!(
                "  batch uploaded count={} job_id={}",
                count.map(|c| c.to_string()).unwrap_or_else(|| "?".into()),
                job.as_ref().map(|j| j.as_str()).unwrap_or("none")
            );
        }
        UploadOutcome::Documents(files) => {
            let total = files.len();
            for (idx, file) in files.iter().enumerate() {
                println!(
                    "  {:02}/{} uploaded filename={} job_id={}",
                    idx + 1,
                    total,
                    file.name,
                    file.job.as_ref().map(|j| j.as_str()).unwrap_or("none")
                );
            }
        }
    }
    if report.indexed {
        println!(
            "Indexes built (job_id={})",
            report
                .index_job
                .as_ref()
                .map(|j| j.as_str())
                .unwrap_or("none")
        );
    } else {
        println!("Index build skipped.");
    }

    println!();
    println!(
        "Retriever returned {} result(s) for query={:?}",
        report.results.len(),
        report.query
    );
    for (i, result) in report.results.iter().enumerate() {
        let score = result
            .score
            .map(|s| format!("{:.4}", s))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:02}. score={} text={}",
            i + 1,
            score,
            preview(&result.content, 160)
        );
    }

    if let Some(answer) = &report.answer {
        println!();
        println!("Generated answer:");
        println!("{}", answer.answer);
    }
    for warning in &report.warnings {
        println!();
        println!("{}", warning);
    }
}
