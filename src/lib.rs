//! # k2-ingest
//!
//! Upload local files to a Knowledge2 corpus, wait for the server to finish
//! ingesting and indexing them, then query the corpus with hybrid
//! (dense + sparse) retrieval.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌────────────┐   ┌──────────┐   ┌───────────┐
//! │ Collector │──▶│  Upload  │──▶│ Job Poller │──▶│  Index   │──▶│ Retrieval │
//! │ walk+dedup│   │ 1-by-1 / │   │ per upload │   │ trigger  │   │  handoff  │
//! └───────────┘   │  batch   │   └────────────┘   │ + poller │   └───────────┘
//!                 └──────────┘                    └──────────┘
//!                          ╲            │              ╱
//!                           ▼           ▼             ▼
//!                        ┌──────────────────────────────┐
//!                        │ CorpusService (HTTP client)  │
//!                        └──────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export K2_API_KEY=...
//! export K2_CORPUS_ID=...
//! k2-ingest --dir ./docs --query "How does hybrid retrieval work?"
//! k2-ingest --file a.pdf --file b.md --batch --no-index
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Environment + TOML configuration |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`collect`] | File discovery and deduplication |
//! | [`service`] | Corpus service trait |
//! | [`client`] | HTTP implementation of the service |
//! | [`upload`] | Single vs batch upload strategy |
//! | [`poller`] | Job completion polling |
//! | [`index`] | Index build trigger |
//! | [`retrieve`] | Retrieval handoff and optional generation |
//! | [`orchestrator`] | End-to-end run |
//! | [`progress`] | Progress reporting on stderr |

pub mod client;
pub mod collect;
pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod orchestrator;
pub mod poller;
pub mod progress;
pub mod retrieve;
pub mod service;
pub mod upload;
