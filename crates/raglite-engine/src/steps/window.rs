//! window: chunk a stream of segments by token budget.
//!
//! Segments are consumed per group (file by default) in position order.
//! Boundary markers close the open chunk and set the section context;
//! overlap carries trailing tokens of one chunk into the next. Chunks
//! below `min_tokens` are never emitted: a short tail folds into the
//! previous chunk, and a group whose whole content is under the floor
//! produces nothing.

use rusqlite::params;

use raglite_core::errors::{StepError, StorageError};
use raglite_core::hash::sha256_str;
use raglite_core::types::SegmentMeta;
use raglite_storage::ident::{require_column_name, require_table_name};

use crate::types::{decode_config, Step, WindowConfig};

use super::{storage_err, StepContext};

struct SegRow {
    content: String,
    style: Option<String>,
    language: Option<String>,
    name: Option<String>,
    kind: Option<String>,
}

struct OpenChunk {
    pieces: Vec<SegRow>,
    tokens: usize,
    overlap_prev: usize,
    overlap_text: Option<String>,
}

impl OpenChunk {
    fn new() -> Self {
        Self {
            pieces: Vec::new(),
            tokens: 0,
            overlap_prev: 0,
            overlap_text: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    fn content(&self) -> String {
        let mut parts = Vec::with_capacity(self.pieces.len() + 1);
        if let Some(overlap) = &self.overlap_text {
            parts.push(overlap.clone());
        }
        for piece in &self.pieces {
            parts.push(piece.content.clone());
        }
        parts.join("\n\n")
    }
}

struct OutChunk {
    content: String,
    token_count: usize,
    overlap_prev: usize,
    overlap_next: usize,
    section: Option<String>,
    language: Option<String>,
    name: Option<String>,
    kind: Option<String>,
}

pub fn execute(
    ctx: &StepContext<'_>,
    step: &Step,
    source: &str,
) -> Result<Option<String>, StepError> {
    let cfg: WindowConfig = decode_config(step)?;
    require_table_name(source)?;
    require_table_name(&step.output)?;
    let group_by = require_column_name(if cfg.group_by.is_empty() {
        "file_id"
    } else {
        &cfg.group_by
    })?
    .to_string();
    let chunk_type = match cfg.strategy.as_str() {
        "semantic" | "fixed_window" | "sentence" | "paragraph" => cfg.strategy.clone(),
        other => {
            return Err(StepError::InvalidConfig {
                operation: "window".to_string(),
                message: format!("unknown strategy {other:?}"),
            })
        }
    };

    ctx.run_db
        .with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE {} (
                    id TEXT PRIMARY KEY,
                    file_id TEXT NOT NULL,
                    content TEXT NOT NULL,
                    token_count INTEGER NOT NULL,
                    chunk_type TEXT NOT NULL,
                    overlap_prev INTEGER NOT NULL DEFAULT 0,
                    overlap_next INTEGER NOT NULL DEFAULT 0,
                    position INTEGER NOT NULL,
                    parent_id TEXT,
                    section TEXT,
                    language TEXT,
                    name TEXT,
                    kind TEXT
                )",
                step.output
            ))
            .map_err(|e| StorageError::sqlite(e.to_string()))?;

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {group_by}, content, meta FROM {source} ORDER BY {group_by}, position"
                ))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    let group: String = row.get(0)?;
                    let content: String = row.get(1)?;
                    let meta_raw: Option<String> = row.get(2)?;
                    Ok((group, content, meta_raw))
                })
                .map_err(|e| StorageError::sqlite(e.to_string()))?;

            let mut insert = conn
                .prepare(&format!(
                    "INSERT OR IGNORE INTO {}
                     (id, file_id, content, token_count, chunk_type, overlap_prev,
                      overlap_next, position, section, language, name, kind)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    step.output
                ))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;

            let mut current_group: Option<String> = None;
            let mut segs: Vec<SegRow> = Vec::new();

            let mut flush_group = |group: &str, segs: &mut Vec<SegRow>| -> Result<(), StorageError> {
                let chunks = window_group(ctx, &cfg, std::mem::take(segs));
                for (position, chunk) in chunks.iter().enumerate() {
                    insert
                        .execute(params![
                            sha256_str(&chunk.content),
                            group,
                            chunk.content,
                            chunk.token_count as i64,
                            chunk_type,
                            chunk.overlap_prev as i64,
                            chunk.overlap_next as i64,
                            position as i64,
                            chunk.section,
                            chunk.language,
                            chunk.name,
                            chunk.kind,
                        ])
                        .map_err(|e| StorageError::sqlite(e.to_string()))?;
                }
                Ok(())
            };

            for row in rows {
                let (group, content, meta_raw) =
                    row.map_err(|e| StorageError::sqlite(e.to_string()))?;
                if current_group.as_deref() != Some(group.as_str()) {
                    if let Some(prev) = current_group.take() {
                        flush_group(&prev, &mut segs)?;
                    }
                    current_group = Some(group);
                }
                let meta: SegmentMeta = meta_raw
                    .as_deref()
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or_default();
                segs.push(SegRow {
                    content,
                    style: meta.style,
                    language: meta.language,
                    name: meta.name,
                    kind: meta.kind,
                });
            }
            if let Some(prev) = current_group.take() {
                flush_group(&prev, &mut segs)?;
            }
            Ok(())
        })
        .map_err(storage_err)?;
    Ok(None)
}

/// Cut one group's segments into chunks.
fn window_group(ctx: &StepContext<'_>, cfg: &WindowConfig, segs: Vec<SegRow>) -> Vec<OutChunk> {
    let mut out: Vec<OutChunk> = Vec::new();
    let mut open = OpenChunk::new();
    let mut section: Option<String> = None;

    let flush = |open: &mut OpenChunk, out: &mut Vec<OutChunk>, section: &Option<String>| {
        if open.is_empty() {
            return;
        }
        let finished = std::mem::replace(open, OpenChunk::new());
        let content = finished.content();
        let token_count = ctx.token_counter.count(&content);
        if token_count == 0 {
            return;
        }
        if token_count < cfg.min_tokens {
            // Fold the short tail into the previous chunk; drop it when
            // there is nothing to fold into.
            if let Some(prev) = out.last_mut() {
                prev.content.push_str("\n\n");
                prev.content.push_str(&content);
                prev.token_count = ctx.token_counter.count(&prev.content);
            }
            return;
        }
        let single = finished.pieces.len() == 1;
        out.push(OutChunk {
            content,
            token_count,
            overlap_prev: finished.overlap_prev,
            overlap_next: 0,
            section: section.clone(),
            language: finished.pieces.first().and_then(|p| p.language.clone()),
            name: if single {
                finished.pieces[0].name.clone()
            } else {
                None
            },
            kind: if single {
                finished.pieces[0].kind.clone()
            } else {
                None
            },
        });
    };

    for seg in segs {
        let style = seg.style.clone().unwrap_or_default();
        if !cfg.boundary_markers.is_empty() && cfg.boundary_markers.contains(&style) {
            flush(&mut open, &mut out, &section);
            section = Some(seg.content.trim().trim_start_matches('#').trim().to_string());
            open.pieces.push(seg);
            open.tokens = ctx.token_counter.count(&open.content());
            continue;
        }

        let seg_tokens = ctx.token_counter.count(&seg.content);
        if !open.is_empty() && open.tokens + seg_tokens > cfg.max_tokens {
            let overlap = carry_overlap(ctx, cfg, &open);
            flush(&mut open, &mut out, &section);
            if let Some((text, tokens)) = overlap {
                if let Some(prev) = out.last_mut() {
                    prev.overlap_next = tokens;
                    open.overlap_prev = tokens;
                    open.overlap_text = Some(text);
                    open.tokens = tokens;
                }
            }
        }
        open.pieces.push(seg);
        open.tokens += seg_tokens;

        if open.tokens >= cfg.max_tokens {
            let overlap = carry_overlap(ctx, cfg, &open);
            flush(&mut open, &mut out, &section);
            if let Some((text, tokens)) = overlap {
                if let Some(prev) = out.last_mut() {
                    prev.overlap_next = tokens;
                    open.overlap_prev = tokens;
                    open.overlap_text = Some(text);
                    open.tokens = tokens;
                }
            }
        }
    }
    flush(&mut open, &mut out, &section);
    out
}

/// Tail words of the open chunk that will seed the next one.
fn carry_overlap(
    ctx: &StepContext<'_>,
    cfg: &WindowConfig,
    open: &OpenChunk,
) -> Option<(String, usize)> {
    if cfg.overlap_tokens == 0 || open.is_empty() {
        return None;
    }
    let content = open.content();
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    let mut taken: Vec<&str> = Vec::new();
    let mut tokens = 0usize;
    for word in words.iter().rev() {
        let cost = ctx.token_counter.count(word);
        if tokens + cost > cfg.overlap_tokens {
            break;
        }
        taken.push(word);
        tokens += cost;
    }
    if taken.is_empty() {
        return None;
    }
    taken.reverse();
    Some((taken.join(" "), tokens))
}
