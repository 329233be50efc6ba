//! Step dispatch. Each operation materializes the step's output table in
//! the run-db; the returned note (if any) lands in the execution log.

pub mod diff;
pub mod external;
pub mod fork;
pub mod hash;
pub mod relational;
pub mod vectorize;
pub mod window;

use std::collections::BTreeMap;

use raglite_core::errors::{StepError, StorageError};
use raglite_core::tokens::TokenCounter;
use raglite_core::config::VectorConfig;
use raglite_storage::Database;

use crate::types::{Operation, Step};

/// Everything a step implementation may need.
pub struct StepContext<'a> {
    pub run_db: &'a Database,
    pub params: &'a BTreeMap<String, String>,
    pub extractors: &'a raglite_extract::Registry,
    pub vectors: &'a VectorConfig,
    pub token_counter: &'a dyn TokenCounter,
    pub run_id: &'a str,
    pub sample_size: usize,
}

/// Execute one step against its resolved source table.
pub fn execute(
    ctx: &StepContext<'_>,
    step: &Step,
    source: &str,
) -> Result<Option<String>, StepError> {
    match step.operation {
        Operation::Filter => relational::filter(ctx, step, source),
        Operation::Project => relational::project(ctx, step, source),
        Operation::Join => relational::join(ctx, step, source),
        Operation::Aggregate => relational::aggregate(ctx, step, source),
        Operation::Window => window::execute(ctx, step, source),
        Operation::Hash => hash::execute(ctx, step, source),
        Operation::Vectorize => vectorize::execute(ctx, step, source),
        Operation::External => external::execute(ctx, step, source),
        Operation::Diff => diff::execute(ctx, step, source),
        Operation::Fork => fork::fork(ctx, step, source),
        Operation::Merge => fork::merge(ctx, step, source),
    }
}

pub(crate) fn storage_err(e: StorageError) -> StepError {
    StepError::sqlite(e.to_string())
}

/// Escape a value for embedding as a SQL string literal.
pub(crate) fn sql_str(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
