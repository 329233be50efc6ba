//! Orchestration: ingest, worker dispatch, the merger and search.
//!
//! Write authority is split exactly once: workers write only their own
//! run-db, the merger writes the corpus, the orchestrator coordinates.

pub mod ingest;
pub mod merger;
pub mod mime;
pub mod orchestrator;
pub mod search;

pub use ingest::Ingestor;
pub use merger::{gc_orphan_runs, MergeOutcome, Merger, QueueStatus};
pub use orchestrator::{ExportFormat, Orchestrator, ProcessSummary, SystemStatus};
pub use search::{SearchOptions, SearchResponse, SearchResult};
