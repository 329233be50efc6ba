//! Run-db schema. Underscore-prefixed bookkeeping tables; every step
//! materializes its own output table next to them.

pub const SCHEMA: &str = r#"
-- Single-row run metadata; copied steps make the file self-contained.
CREATE TABLE IF NOT EXISTS _run_meta (
    run_id TEXT PRIMARY KEY,
    workflow_id TEXT NOT NULL,
    workflow_version INTEGER NOT NULL,
    input_source TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending','running','completed','failed')),
    worker_id TEXT,
    config TEXT
) STRICT;

CREATE TABLE IF NOT EXISTS _workflow_steps (
    step_order INTEGER PRIMARY KEY,
    step_name TEXT NOT NULL,
    operation TEXT NOT NULL,
    source TEXT NOT NULL,
    predicate TEXT,
    output TEXT NOT NULL,
    config TEXT,
    expects_delta INTEGER NOT NULL DEFAULT 0,
    on_empty TEXT NOT NULL DEFAULT 'continue'
) STRICT;

CREATE TABLE IF NOT EXISTS _step_executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    step_order INTEGER NOT NULL,
    step_name TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    rows_in INTEGER NOT NULL DEFAULT 0,
    rows_out INTEGER NOT NULL DEFAULT 0,
    delta_score REAL NOT NULL DEFAULT 0.0,
    output_table TEXT NOT NULL,
    notes TEXT,
    error TEXT
) STRICT;

CREATE TABLE IF NOT EXISTS _deltas (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    step_from INTEGER NOT NULL,
    step_to INTEGER NOT NULL,
    rows_before INTEGER NOT NULL,
    rows_after INTEGER NOT NULL,
    rows_lost INTEGER NOT NULL,
    rows_gained INTEGER NOT NULL,
    delta_type TEXT NOT NULL,
    delta_score REAL NOT NULL,
    jaccard_index REAL NOT NULL,
    sample_lost TEXT,
    sample_gained TEXT
) STRICT;
"#;
