//! Built-in workflow definitions, loaded into workflows.db at init.
//!
//! Definitions are plain rows: the engine has no knowledge of these
//! beyond what the tables say. MIME mappings seed with OR IGNORE so user
//! edits survive re-init; definitions upgrade with OR REPLACE.

pub const ALL: &[(&str, &str)] = &[
    ("code_chunking_v1", CODE_CHUNKING_V1),
    ("text_chunking_v1", TEXT_CHUNKING_V1),
    ("pdf_chunking_v1", PDF_CHUNKING_V1),
    ("docx_chunking_v1", DOCX_CHUNKING_V1),
    ("xlsx_chunking_v1", XLSX_CHUNKING_V1),
    ("search_v1", SEARCH_V1),
    ("mime_mappings", MIME_MAPPINGS),
];

const CODE_CHUNKING_V1: &str = r#"
INSERT OR REPLACE INTO workflows (id, version, name, description, input_schema, status)
VALUES (
    'code_chunking_v1', 1,
    'Code chunking',
    'Split source files into semantic units, vectorize all layers',
    '{"source": "corpus.raw_files",
      "mime_types": ["text/x-go", "text/x-rust", "text/x-python", "text/javascript",
                     "text/typescript", "text/x-sql", "application/sql",
                     "text/x-shellscript", "application/x-sh", "text/x-c", "text/x-java"],
      "statuses": ["pending"]}',
    'active'
);

INSERT OR REPLACE INTO workflow_steps
(workflow_id, step_order, step_name, operation, source, predicate, output, config, expects_delta, on_empty)
VALUES
('code_chunking_v1', 1, 'select_files', 'filter', '_input', '', 'files',
 NULL, 0, 'skip_remaining'),
('code_chunking_v1', 2, 'extract_units', 'external', 'files', '', 'segments',
 '{"extractor": "code"}', 0, 'skip_remaining'),
('code_chunking_v1', 3, 'window_units', 'window', 'segments', '', '_output',
 '{"strategy": "semantic", "max_tokens": 512, "min_tokens": 1, "overlap_tokens": 0}',
 1, 'skip_remaining'),
('code_chunking_v1', 4, 'chunk_features', 'aggregate', '_output', '', '_output_features',
 '{"emit": "rows", "key_column": "id", "features": [
   {"name": "line_count", "expr": "length(content) - length(replace(content, char(10), '''')) + 1"},
   {"name": "token_count", "expr": "token_count"},
   {"name": "has_func", "expr": "CASE WHEN instr(content, ''func '') > 0 OR instr(content, ''fn '') > 0 OR instr(content, ''def '') > 0 THEN 1 ELSE 0 END"},
   {"name": "has_return", "expr": "CASE WHEN instr(content, ''return'') > 0 THEN 1 ELSE 0 END"},
   {"name": "content_length", "expr": "length(content)"}
 ]}', 0, 'continue'),
('code_chunking_v1', 5, 'vec_structure', 'vectorize', '_output', '', 'structure_vectors',
 '{"layer": "structure"}', 0, 'continue'),
('code_chunking_v1', 6, 'vec_lexical', 'vectorize', '_output', '', 'lexical_vectors',
 '{"layer": "lexical"}', 0, 'continue'),
('code_chunking_v1', 7, 'vec_contextual', 'vectorize', '_output', '', 'contextual_vectors',
 '{"layer": "contextual", "relations_output": "_output_relations"}', 0, 'continue'),
('code_chunking_v1', 8, 'vec_blend', 'vectorize', '_output', '', 'blend_vectors',
 '{"layer": "blend",
   "sources": {"structure": "structure_vectors", "lexical": "lexical_vectors",
               "contextual": "contextual_vectors"},
   "weights": {"structure": 0.45, "lexical": 0.30, "contextual": 0.25}}', 0, 'continue'),
('code_chunking_v1', 9, 'collect_vectors', 'merge', 'structure_vectors', '', '_output_vectors',
 '{"sources": ["structure_vectors", "lexical_vectors", "contextual_vectors", "blend_vectors"]}',
 0, 'continue');

INSERT OR IGNORE INTO workflow_tags (workflow_id, tag) VALUES
('code_chunking_v1', 'code'), ('code_chunking_v1', 'ingest');
"#;

const TEXT_CHUNKING_V1: &str = r#"
INSERT OR REPLACE INTO workflows (id, version, name, description, input_schema, status)
VALUES (
    'text_chunking_v1', 1,
    'Text chunking',
    'Paragraph-window plain text and Markdown, vectorize structure and lexical layers',
    '{"source": "corpus.raw_files",
      "mime_types": ["text/plain", "text/markdown"],
      "statuses": ["pending"]}',
    'active'
);

INSERT OR REPLACE INTO workflow_steps
(workflow_id, step_order, step_name, operation, source, predicate, output, config, expects_delta, on_empty)
VALUES
('text_chunking_v1', 1, 'select_files', 'filter', '_input', '', 'files',
 NULL, 0, 'skip_remaining'),
('text_chunking_v1', 2, 'extract_blocks', 'external', 'files', '', 'segments',
 '{"extractor": "text"}', 0, 'skip_remaining'),
('text_chunking_v1', 3, 'window_blocks', 'window', 'segments', '', '_output',
 '{"strategy": "paragraph", "max_tokens": 512, "min_tokens": 50, "overlap_tokens": 64,
   "boundary_markers": ["heading"]}', 1, 'skip_remaining'),
('text_chunking_v1', 4, 'chunk_features', 'aggregate', '_output', '', '_output_features',
 '{"emit": "rows", "key_column": "id", "features": [
   {"name": "line_count", "expr": "length(content) - length(replace(content, char(10), '''')) + 1"},
   {"name": "token_count", "expr": "token_count"},
   {"name": "has_section", "expr": "CASE WHEN section IS NOT NULL THEN 1 ELSE 0 END"},
   {"name": "content_length", "expr": "length(content)"}
 ]}', 0, 'continue'),
('text_chunking_v1', 5, 'vec_structure', 'vectorize', '_output', '', 'structure_vectors',
 '{"layer": "structure"}', 0, 'continue'),
('text_chunking_v1', 6, 'vec_lexical', 'vectorize', '_output', '', 'lexical_vectors',
 '{"layer": "lexical"}', 0, 'continue'),
('text_chunking_v1', 7, 'vec_blend', 'vectorize', '_output', '', 'blend_vectors',
 '{"layer": "blend",
   "sources": {"structure": "structure_vectors", "lexical": "lexical_vectors"},
   "weights": {"structure": 0.6, "lexical": 0.4}}', 0, 'continue'),
('text_chunking_v1', 8, 'collect_vectors', 'merge', 'structure_vectors', '', '_output_vectors',
 '{"sources": ["structure_vectors", "lexical_vectors", "blend_vectors"]}', 0, 'continue');

INSERT OR IGNORE INTO workflow_tags (workflow_id, tag) VALUES
('text_chunking_v1', 'text'), ('text_chunking_v1', 'ingest');
"#;

const PDF_CHUNKING_V1: &str = r#"
INSERT OR REPLACE INTO workflows (id, version, name, description, input_schema, status)
VALUES (
    'pdf_chunking_v1', 1,
    'PDF chunking',
    'Extract PDF pages through the registered pdf extractor and window them',
    '{"source": "corpus.raw_files",
      "mime_types": ["application/pdf"],
      "statuses": ["pending"]}',
    'active'
);

INSERT OR REPLACE INTO workflow_steps
(workflow_id, step_order, step_name, operation, source, predicate, output, config, expects_delta, on_empty)
VALUES
('pdf_chunking_v1', 1, 'select_files', 'filter', '_input', '', 'files',
 NULL, 0, 'skip_remaining'),
('pdf_chunking_v1', 2, 'extract_pages', 'external', 'files', '', 'segments',
 '{"extractor": "pdf"}', 0, 'skip_remaining'),
('pdf_chunking_v1', 3, 'window_pages', 'window', 'segments', '', '_output',
 '{"strategy": "paragraph", "max_tokens": 512, "min_tokens": 50, "overlap_tokens": 64,
   "boundary_markers": ["heading"]}', 1, 'skip_remaining'),
('pdf_chunking_v1', 4, 'chunk_features', 'aggregate', '_output', '', '_output_features',
 '{"emit": "rows", "key_column": "id", "features": [
   {"name": "token_count", "expr": "token_count"},
   {"name": "content_length", "expr": "length(content)"}
 ]}', 0, 'continue'),
('pdf_chunking_v1', 5, 'vec_structure', 'vectorize', '_output', '', 'structure_vectors',
 '{"layer": "structure"}', 0, 'continue'),
('pdf_chunking_v1', 6, 'vec_lexical', 'vectorize', '_output', '', 'lexical_vectors',
 '{"layer": "lexical"}', 0, 'continue'),
('pdf_chunking_v1', 7, 'vec_blend', 'vectorize', '_output', '', 'blend_vectors',
 '{"layer": "blend",
   "sources": {"structure": "structure_vectors", "lexical": "lexical_vectors"},
   "weights": {"structure": 0.5, "lexical": 0.5}}', 0, 'continue'),
('pdf_chunking_v1', 8, 'collect_vectors', 'merge', 'structure_vectors', '', '_output_vectors',
 '{"sources": ["structure_vectors", "lexical_vectors", "blend_vectors"]}', 0, 'continue');

INSERT OR IGNORE INTO workflow_tags (workflow_id, tag) VALUES
('pdf_chunking_v1', 'document'), ('pdf_chunking_v1', 'ingest');
"#;

const DOCX_CHUNKING_V1: &str = r#"
INSERT OR REPLACE INTO workflows (id, version, name, description, input_schema, status)
VALUES (
    'docx_chunking_v1', 1,
    'DOCX chunking',
    'Extract Word documents through the registered docx extractor',
    '{"source": "corpus.raw_files",
      "mime_types": ["application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                     "application/msword"],
      "statuses": ["pending"]}',
    'active'
);

INSERT OR REPLACE INTO workflow_steps
(workflow_id, step_order, step_name, operation, source, predicate, output, config, expects_delta, on_empty)
VALUES
('docx_chunking_v1', 1, 'select_files', 'filter', '_input', '', 'files',
 NULL, 0, 'skip_remaining'),
('docx_chunking_v1', 2, 'extract_body', 'external', 'files', '', 'segments',
 '{"extractor": "docx"}', 0, 'skip_remaining'),
('docx_chunking_v1', 3, 'window_body', 'window', 'segments', '', '_output',
 '{"strategy": "paragraph", "max_tokens": 512, "min_tokens": 50, "overlap_tokens": 64,
   "boundary_markers": ["heading"]}', 1, 'skip_remaining'),
('docx_chunking_v1', 4, 'vec_structure', 'vectorize', '_output', '', 'structure_vectors',
 '{"layer": "structure"}', 0, 'continue'),
('docx_chunking_v1', 5, 'vec_lexical', 'vectorize', '_output', '', 'lexical_vectors',
 '{"layer": "lexical"}', 0, 'continue'),
('docx_chunking_v1', 6, 'vec_blend', 'vectorize', '_output', '', 'blend_vectors',
 '{"layer": "blend",
   "sources": {"structure": "structure_vectors", "lexical": "lexical_vectors"},
   "weights": {"structure": 0.5, "lexical": 0.5}}', 0, 'continue'),
('docx_chunking_v1', 7, 'collect_vectors', 'merge', 'structure_vectors', '', '_output_vectors',
 '{"sources": ["structure_vectors", "lexical_vectors", "blend_vectors"]}', 0, 'continue');

INSERT OR IGNORE INTO workflow_tags (workflow_id, tag) VALUES
('docx_chunking_v1', 'document'), ('docx_chunking_v1', 'ingest');
"#;

const XLSX_CHUNKING_V1: &str = r#"
INSERT OR REPLACE INTO workflows (id, version, name, description, input_schema, status)
VALUES (
    'xlsx_chunking_v1', 1,
    'XLSX chunking',
    'Extract spreadsheets through the registered xlsx extractor, one chunk per table region',
    '{"source": "corpus.raw_files",
      "mime_types": ["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                     "application/vnd.ms-excel"],
      "statuses": ["pending"]}',
    'active'
);

INSERT OR REPLACE INTO workflow_steps
(workflow_id, step_order, step_name, operation, source, predicate, output, config, expects_delta, on_empty)
VALUES
('xlsx_chunking_v1', 1, 'select_files', 'filter', '_input', '', 'files',
 NULL, 0, 'skip_remaining'),
('xlsx_chunking_v1', 2, 'extract_sheets', 'external', 'files', '', 'segments',
 '{"extractor": "xlsx"}', 0, 'skip_remaining'),
('xlsx_chunking_v1', 3, 'window_rows', 'window', 'segments', '', '_output',
 '{"strategy": "fixed_window", "max_tokens": 256, "min_tokens": 10, "overlap_tokens": 0}',
 1, 'skip_remaining'),
('xlsx_chunking_v1', 4, 'vec_lexical', 'vectorize', '_output', '', 'lexical_vectors',
 '{"layer": "lexical"}', 0, 'continue'),
('xlsx_chunking_v1', 5, 'vec_blend', 'vectorize', '_output', '', 'blend_vectors',
 '{"layer": "blend", "sources": {"lexical": "lexical_vectors"},
   "weights": {"lexical": 1.0}}', 0, 'continue'),
('xlsx_chunking_v1', 6, 'collect_vectors', 'merge', 'lexical_vectors', '', '_output_vectors',
 '{"sources": ["lexical_vectors", "blend_vectors"]}', 0, 'continue');

INSERT OR IGNORE INTO workflow_tags (workflow_id, tag) VALUES
('xlsx_chunking_v1', 'document'), ('xlsx_chunking_v1', 'ingest');
"#;

const SEARCH_V1: &str = r#"
INSERT OR REPLACE INTO workflows (id, version, name, description, status)
VALUES (
    'search_v1', 1,
    'Hybrid search',
    'FTS candidate filter, per-layer cosine scoring, weighted blend, top-k, enrich',
    'active'
);

INSERT OR REPLACE INTO workflow_steps
(workflow_id, step_order, step_name, operation, source, predicate, output, config, expects_delta, on_empty)
VALUES
('search_v1', 1, 'fts_candidates', 'filter', 'corpus.chunks',
 'rowid IN (SELECT rowid FROM corpus.chunks_fts WHERE chunks_fts MATCH :fts_query LIMIT :candidate_cap)',
 'candidates', NULL, 0, 'skip_remaining'),
('search_v1', 2, 'score_structure', 'vectorize', 'candidates', '', 's_structure',
 '{"layer": "structure", "mode": "similarity"}', 0, 'continue'),
('search_v1', 3, 'score_lexical', 'vectorize', 'candidates', '', 's_lexical',
 '{"layer": "lexical", "mode": "similarity"}', 0, 'continue'),
('search_v1', 4, 'score_contextual', 'vectorize', 'candidates', '', 's_contextual',
 '{"layer": "contextual", "mode": "similarity"}', 0, 'continue'),
('search_v1', 5, 'blend_scores', 'join', 'candidates',
 'LEFT JOIN s_structure ss ON ss.chunk_id = candidates.id LEFT JOIN s_lexical sl ON sl.chunk_id = candidates.id LEFT JOIN s_contextual sc ON sc.chunk_id = candidates.id',
 'scored',
 '{"select": "candidates.id AS chunk_id, COALESCE(ss.score, 0.0) * :w_structure + COALESCE(sl.score, 0.0) * :w_lexical + COALESCE(sc.score, 0.0) * :w_contextual AS score, COALESCE(ss.score, 0.0) AS structure_score, COALESCE(sl.score, 0.0) AS lexical_score, COALESCE(sc.score, 0.0) AS contextual_score"}',
 0, 'continue'),
('search_v1', 6, 'top_k', 'filter', 'scored', 'score >= :min_score',
 'topk', '{"order_by": "score DESC", "limit": ":top_k"}', 0, 'continue'),
('search_v1', 7, 'enrich', 'join', 'topk',
 'JOIN corpus.chunks c ON c.id = topk.chunk_id',
 '_output',
 '{"select": "topk.chunk_id AS chunk_id, topk.score AS score, json_object(''structure'', topk.structure_score, ''lexical'', topk.lexical_score, ''contextual'', topk.contextual_score) AS layer_scores, substr(c.content, 1, 240) AS snippet, c.file_id AS file_id"}',
 0, 'continue');

INSERT OR IGNORE INTO workflow_tags (workflow_id, tag) VALUES ('search_v1', 'search');
"#;

const MIME_MAPPINGS: &str = r#"
INSERT OR IGNORE INTO workflow_mappings (mime_type, workflow_id) VALUES
('text/x-go', 'code_chunking_v1'),
('text/x-rust', 'code_chunking_v1'),
('text/x-python', 'code_chunking_v1'),
('text/javascript', 'code_chunking_v1'),
('text/typescript', 'code_chunking_v1'),
('text/x-sql', 'code_chunking_v1'),
('application/sql', 'code_chunking_v1'),
('text/x-shellscript', 'code_chunking_v1'),
('application/x-sh', 'code_chunking_v1'),
('text/x-c', 'code_chunking_v1'),
('text/x-java', 'code_chunking_v1'),
('text/plain', 'text_chunking_v1'),
('text/markdown', 'text_chunking_v1'),
('application/pdf', 'pdf_chunking_v1'),
('application/vnd.openxmlformats-officedocument.wordprocessingml.document', 'docx_chunking_v1'),
('application/msword', 'docx_chunking_v1'),
('application/vnd.openxmlformats-officedocument.spreadsheetml.sheet', 'xlsx_chunking_v1'),
('application/vnd.ms-excel', 'xlsx_chunking_v1');
"#;
