//! Corpus schema: files, chunks, features, vectors, relations, history.

pub const SCHEMA: &str = r#"
-- Ingested files. The id is the SHA-256 of the content; bytes live in the
-- external blob store at external_path, never in the row.
CREATE TABLE IF NOT EXISTS raw_files (
    id TEXT PRIMARY KEY,
    source_path TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    size INTEGER NOT NULL,
    external_path TEXT NOT NULL,
    checksum TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending','extracted','chunked','vectorized','failed')),
    ingested_at TEXT NOT NULL DEFAULT (datetime('now'))
) STRICT;

CREATE INDEX IF NOT EXISTS idx_raw_files_status ON raw_files(status);
CREATE INDEX IF NOT EXISTS idx_raw_files_mime ON raw_files(mime_type);

-- The unit of retrieval. Deduplicated corpus-wide by content hash (= id).
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL REFERENCES raw_files(id),
    content TEXT NOT NULL,
    token_count INTEGER NOT NULL CHECK (token_count > 0),
    chunk_type TEXT NOT NULL,
    overlap_prev INTEGER NOT NULL DEFAULT 0,
    overlap_next INTEGER NOT NULL DEFAULT 0,
    position INTEGER NOT NULL,
    parent_id TEXT,
    section TEXT,
    created_by_run TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
) STRICT;

CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_id, position);
CREATE INDEX IF NOT EXISTS idx_chunks_run ON chunks(created_by_run);

-- Named numeric features per chunk.
CREATE TABLE IF NOT EXISTS chunk_features (
    chunk_id TEXT NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    feature_name TEXT NOT NULL,
    feature_value REAL NOT NULL,
    feature_meta TEXT,
    PRIMARY KEY (chunk_id, feature_name)
) STRICT;

-- Per-layer vectors: little-endian packed f32, length(vector) = 4*dimensions.
CREATE TABLE IF NOT EXISTS chunk_vectors (
    chunk_id TEXT NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    layer TEXT NOT NULL
        CHECK (layer IN ('structure','lexical','contextual','blend','final')),
    vector BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    model_version TEXT NOT NULL,
    PRIMARY KEY (chunk_id, layer)
) STRICT;

-- Directed edges between chunks. Cycles permitted, no ownership.
CREATE TABLE IF NOT EXISTS chunk_relations (
    from_chunk_id TEXT NOT NULL,
    to_chunk_id TEXT NOT NULL,
    relation_type TEXT NOT NULL
        CHECK (relation_type IN ('references','follows','parent_of','similar_to','calls','imports')),
    weight REAL NOT NULL DEFAULT 1.0 CHECK (weight >= 0.0 AND weight <= 1.0),
    created_by_run TEXT,
    PRIMARY KEY (from_chunk_id, to_chunk_id, relation_type)
) STRICT;

CREATE INDEX IF NOT EXISTS idx_relations_to ON chunk_relations(to_chunk_id);

-- Merge history: metadata only, no step tables.
CREATE TABLE IF NOT EXISTS run_history (
    run_id TEXT PRIMARY KEY,
    workflow_id TEXT NOT NULL,
    workflow_version INTEGER NOT NULL,
    started_at TEXT,
    finished_at TEXT,
    status TEXT,
    rows_produced INTEGER NOT NULL DEFAULT 0,
    merge_status TEXT NOT NULL DEFAULT 'pending'
        CHECK (merge_status IN ('pending','merged','skipped','failed')),
    merged_at TEXT
) STRICT;

-- Key/value configuration.
CREATE TABLE IF NOT EXISTS config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
) STRICT;

-- Append-only audit trail of orchestrator actions.
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    actor TEXT NOT NULL,
    action TEXT NOT NULL,
    target TEXT,
    details TEXT,
    at TEXT NOT NULL DEFAULT (datetime('now'))
) STRICT;

-- Full-text index over chunk content, kept in sync by triggers.
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    content,
    content='chunks',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS chunks_fts_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, content) VALUES (new.rowid, new.content);
END;

CREATE TRIGGER IF NOT EXISTS chunks_fts_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, content)
    VALUES ('delete', old.rowid, old.content);
END;

CREATE TRIGGER IF NOT EXISTS chunks_fts_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, content)
    VALUES ('delete', old.rowid, old.content);
    INSERT INTO chunks_fts(rowid, content) VALUES (new.rowid, new.content);
END;
"#;
