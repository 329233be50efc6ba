//! Workflow-definitions schema. Read-only at runtime, loaded once.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workflows (
    id TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    name TEXT NOT NULL,
    description TEXT,
    input_schema TEXT,
    output_schema TEXT,
    status TEXT NOT NULL DEFAULT 'draft'
        CHECK (status IN ('draft','active','deprecated')),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (id, version)
) STRICT;

CREATE TABLE IF NOT EXISTS workflow_steps (
    workflow_id TEXT NOT NULL,
    step_order INTEGER NOT NULL,
    step_name TEXT NOT NULL,
    operation TEXT NOT NULL
        CHECK (operation IN ('filter','project','join','aggregate','diff',
                             'window','hash','vectorize','external','fork','merge')),
    source TEXT NOT NULL,
    predicate TEXT,
    output TEXT NOT NULL,
    config TEXT,
    expects_delta INTEGER NOT NULL DEFAULT 0,
    on_empty TEXT NOT NULL DEFAULT 'continue'
        CHECK (on_empty IN ('continue','skip_remaining','fail')),
    PRIMARY KEY (workflow_id, step_order)
) STRICT;

CREATE TABLE IF NOT EXISTS workflow_tags (
    workflow_id TEXT NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (workflow_id, tag)
) STRICT;

-- Editable MIME type -> workflow dispatch table.
CREATE TABLE IF NOT EXISTS workflow_mappings (
    mime_type TEXT PRIMARY KEY,
    workflow_id TEXT NOT NULL
) STRICT;
"#;
