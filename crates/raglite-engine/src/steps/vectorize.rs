//! vectorize: produce (chunk_id, layer, vector, dimensions, model_version)
//! rows, or — in similarity mode — score candidates against the query
//! vector of a layer.

use rusqlite::params;
use rustc_hash::FxHashMap;

use raglite_core::errors::{StepError, StorageError};
use raglite_core::types::VectorLayer;
use raglite_storage::ident::require_table_name;
use raglite_vectorize::{
    query as vquery, vector, BlendMethod, Blender, CallGraph, ChunkInput, ContextualVectorizer,
    Language, LexicalVectorizer, Outline, StructureVectorizer, Vector,
};

use crate::types::{decode_config, Step, VectorizeConfig};

use super::{storage_err, StepContext};

fn sql_err(e: rusqlite::Error) -> StorageError {
    StorageError::sqlite(e.to_string())
}

pub fn execute(
    ctx: &StepContext<'_>,
    step: &Step,
    source: &str,
) -> Result<Option<String>, StepError> {
    let cfg: VectorizeConfig = decode_config(step)?;
    require_table_name(source)?;
    require_table_name(&step.output)?;

    let layer = VectorLayer::parse(&cfg.layer).ok_or_else(|| StepError::InvalidConfig {
        operation: "vectorize".to_string(),
        message: format!("unknown layer {:?}", cfg.layer),
    })?;

    match cfg.mode.as_str() {
        "" | "embed" => embed(ctx, step, source, &cfg, layer),
        "similarity" => similarity(ctx, step, source, &cfg, layer),
        other => Err(StepError::InvalidConfig {
            operation: "vectorize".to_string(),
            message: format!("unknown mode {other:?}"),
        }),
    }
}

/// Read the chunks a vectorize step consumes from its source table.
fn load_chunks(ctx: &StepContext<'_>, source: &str) -> Result<Vec<ChunkInput>, StepError> {
    ctx.run_db
        .with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT * FROM {source} ORDER BY file_id, position"))
                .map_err(sql_err)?;
            let names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(|s| s.to_string())
                .collect();
            let col = |name: &str| names.iter().position(|n| n == name);
            let (id_col, file_col, content_col) =
                match (col("id"), col("file_id"), col("content")) {
                    (Some(a), Some(b), Some(c)) => (a, b, c),
                    _ => {
                        return Err(StorageError::sqlite(format!(
                            "table {source} lacks id/file_id/content columns"
                        )))
                    }
                };
            let language_col = col("language");
            let name_col = col("name");
            let kind_col = col("kind");

            let mut rows = stmt.query([]).map_err(sql_err)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(sql_err)? {
                let opt = |idx: Option<usize>| -> Result<Option<String>, rusqlite::Error> {
                    match idx {
                        Some(i) => row.get(i),
                        None => Ok(None),
                    }
                };
                out.push(ChunkInput {
                    id: row.get(id_col).map_err(sql_err)?,
                    file_id: row.get(file_col).map_err(sql_err)?,
                    content: row.get(content_col).map_err(sql_err)?,
                    language: opt(language_col).map_err(sql_err)?,
                    name: opt(name_col).map_err(sql_err)?,
                    kind: opt(kind_col).map_err(sql_err)?,
                });
            }
            Ok(out)
        })
        .map_err(storage_err)
}

fn create_vector_table(ctx: &StepContext<'_>, table: &str) -> Result<(), StepError> {
    ctx.run_db
        .with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    chunk_id TEXT NOT NULL,
                    layer TEXT NOT NULL,
                    vector BLOB NOT NULL,
                    dimensions INTEGER NOT NULL,
                    model_version TEXT NOT NULL,
                    PRIMARY KEY (chunk_id, layer)
                )"
            ))
            .map_err(sql_err)
        })
        .map_err(storage_err)
}

fn insert_vectors(
    ctx: &StepContext<'_>,
    table: &str,
    layer: VectorLayer,
    model_version: &str,
    rows: &[(String, Vector)],
) -> Result<(), StepError> {
    ctx.run_db
        .with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "INSERT OR REPLACE INTO {table}
                     (chunk_id, layer, vector, dimensions, model_version)
                     VALUES (?1, ?2, ?3, ?4, ?5)"
                ))
                .map_err(sql_err)?;
            for (chunk_id, vec) in rows {
                stmt.execute(params![
                    chunk_id,
                    layer.as_str(),
                    vec.to_bytes(),
                    vec.len() as i64,
                    model_version,
                ])
                .map_err(sql_err)?;
            }
            Ok(())
        })
        .map_err(storage_err)
}

fn embed(
    ctx: &StepContext<'_>,
    step: &Step,
    source: &str,
    cfg: &VectorizeConfig,
    layer: VectorLayer,
) -> Result<Option<String>, StepError> {
    let chunks = load_chunks(ctx, source)?;
    let seed = ctx.vectors.hash_seed;
    let model_version = if cfg.model_version.is_empty() {
        format!("{}-v1", layer.as_str())
    } else {
        cfg.model_version.clone()
    };

    let rows: Vec<(String, Vector)> = match layer {
        VectorLayer::Structure => {
            let dims = pick_dims(cfg.dimensions, ctx.vectors.structure_dims);
            let vz = StructureVectorizer::new(dims, seed);
            chunks
                .iter()
                .map(|c| {
                    let outline = outline_of(c);
                    (c.id.clone(), vz.vectorize(&outline, &c.content))
                })
                .collect()
        }
        VectorLayer::Lexical => {
            let dims = pick_dims(cfg.dimensions, ctx.vectors.lexical_dims);
            let mut vz = LexicalVectorizer::new(dims, seed);
            vz.build_idf(chunks.iter().map(|c| c.content.as_str()));
            chunks
                .iter()
                .map(|c| (c.id.clone(), vz.vectorize(&c.content)))
                .collect()
        }
        VectorLayer::Contextual => {
            let dims = pick_dims(cfg.dimensions, ctx.vectors.contextual_dims);
            let vz = ContextualVectorizer::new(dims, seed);
            let (graph, names) = build_graph(&chunks);
            let rows: Vec<(String, Vector)> = chunks
                .iter()
                .map(|c| {
                    let symbol = c.name.as_deref().filter(|n| !n.is_empty());
                    (c.id.clone(), vz.vectorize(symbol, &graph))
                })
                .collect();
            if !cfg.relations_output.is_empty() {
                write_relations(ctx, &cfg.relations_output, &chunks, &graph, &names)?;
            }
            rows
        }
        VectorLayer::Blend => {
            let dims = pick_dims(cfg.dimensions, ctx.vectors.blend_dims);
            return blend(ctx, step, cfg, dims, &chunks, &model_version);
        }
        VectorLayer::Final => {
            return Err(StepError::InvalidConfig {
                operation: "vectorize".to_string(),
                message: "the final layer is written by blend".to_string(),
            })
        }
    };

    create_vector_table(ctx, &step.output)?;
    insert_vectors(ctx, &step.output, layer, &model_version, &rows)?;
    Ok(None)
}

fn pick_dims(configured: usize, default: usize) -> usize {
    if configured > 0 {
        configured
    } else {
        default
    }
}

fn outline_of(chunk: &ChunkInput) -> Outline {
    let language = Language::from_hint(chunk.language.as_deref());
    Outline::scan(&chunk.content, language, chunk.kind.as_deref())
}

/// Call graph over the step's chunks, plus symbol-name -> chunk-id map.
fn build_graph(chunks: &[ChunkInput]) -> (CallGraph, FxHashMap<String, String>) {
    let mut names = FxHashMap::default();
    let symbols: Vec<(String, String, Vec<String>, Vec<String>)> = chunks
        .iter()
        .filter_map(|c| {
            let name = c.name.clone().filter(|n| !n.is_empty())?;
            let outline = outline_of(c);
            // Dotted unresolved calls double as import evidence.
            let mut imports = outline.imports.clone();
            for call in &outline.calls {
                if let Some((prefix, _)) = call.split_once('.') {
                    imports.push(prefix.to_string());
                }
            }
            names.insert(name.clone(), c.id.clone());
            Some((name, c.file_id.clone(), outline.calls, imports))
        })
        .collect();
    (CallGraph::build(symbols), names)
}

/// Emit calls (resolved within the run) and follows (sequential chunks of
/// one file) edges.
fn write_relations(
    ctx: &StepContext<'_>,
    table: &str,
    chunks: &[ChunkInput],
    graph: &CallGraph,
    names: &FxHashMap<String, String>,
) -> Result<(), StepError> {
    require_table_name(table)?;
    ctx.run_db
        .with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    from_chunk_id TEXT NOT NULL,
                    to_chunk_id TEXT NOT NULL,
                    relation_type TEXT NOT NULL,
                    weight REAL NOT NULL,
                    PRIMARY KEY (from_chunk_id, to_chunk_id, relation_type)
                )"
            ))
            .map_err(sql_err)?;
            let mut insert = conn
                .prepare(&format!(
                    "INSERT OR IGNORE INTO {table}
                     (from_chunk_id, to_chunk_id, relation_type, weight)
                     VALUES (?1, ?2, ?3, ?4)"
                ))
                .map_err(sql_err)?;

            for chunk in chunks {
                let Some(name) = chunk.name.as_deref().filter(|n| !n.is_empty()) else {
                    continue;
                };
                for callee in graph.callees(name) {
                    if let Some(to_id) = names.get(callee) {
                        if to_id != &chunk.id {
                            insert
                                .execute(params![chunk.id, to_id, "calls", 1.0])
                                .map_err(sql_err)?;
                        }
                    }
                }
            }
            // Chunks are ordered by (file_id, position) at load time.
            for pair in chunks.windows(2) {
                if pair[0].file_id == pair[1].file_id && pair[0].id != pair[1].id {
                    insert
                        .execute(params![pair[0].id, pair[1].id, "follows", 1.0])
                        .map_err(sql_err)?;
                }
            }
            Ok(())
        })
        .map_err(storage_err)
}

fn blend(
    ctx: &StepContext<'_>,
    step: &Step,
    cfg: &VectorizeConfig,
    dims: usize,
    chunks: &[ChunkInput],
    model_version: &str,
) -> Result<Option<String>, StepError> {
    if cfg.sources.is_empty() {
        return Err(StepError::InvalidConfig {
            operation: "vectorize".to_string(),
            message: "blend requires sources".to_string(),
        });
    }
    for table in cfg.sources.values() {
        require_table_name(table)?;
    }

    let mut blender = Blender::new(dims, BlendMethod::parse(&cfg.method));
    for (layer, weight) in &cfg.weights {
        blender = blender.with_weight(layer, *weight as f32);
    }

    let rows = ctx
        .run_db
        .with_conn(|conn| {
            let mut rows: Vec<(String, Vector)> = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                let mut layers: Vec<(String, Vector)> = Vec::new();
                for (layer_name, table) in &cfg.sources {
                    let blob: Option<Vec<u8>> = conn
                        .query_row(
                            &format!("SELECT vector FROM {table} WHERE chunk_id = ?1"),
                            params![chunk.id],
                            |row| row.get(0),
                        )
                        .map(Some)
                        .or_else(|e| match e {
                            rusqlite::Error::QueryReturnedNoRows => Ok(None),
                            other => Err(sql_err(other)),
                        })?;
                    if let Some(blob) = blob {
                        if let Some(vec) = Vector::from_bytes(&blob) {
                            layers.push((layer_name.clone(), vec));
                        }
                    }
                }
                let refs: Vec<(&str, &Vector)> =
                    layers.iter().map(|(n, v)| (n.as_str(), v)).collect();
                rows.push((chunk.id.clone(), blender.blend(&refs)));
            }
            Ok(rows)
        })
        .map_err(storage_err)?;

    create_vector_table(ctx, &step.output)?;
    insert_vectors(ctx, &step.output, VectorLayer::Blend, model_version, &rows)?;
    Ok(None)
}

/// Similarity mode: left-join the corpus vectors of this layer against the
/// candidate set and score by cosine against the query vector.
fn similarity(
    ctx: &StepContext<'_>,
    step: &Step,
    source: &str,
    cfg: &VectorizeConfig,
    layer: VectorLayer,
) -> Result<Option<String>, StepError> {
    let query = ctx
        .params
        .get("query")
        .ok_or_else(|| StepError::UnknownParameter {
            name: "query".to_string(),
        })?;

    let seed = ctx.vectors.hash_seed;
    let structure = StructureVectorizer::new(ctx.vectors.structure_dims, seed);
    let lexical = LexicalVectorizer::new(ctx.vectors.lexical_dims, seed);
    let contextual = ContextualVectorizer::new(ctx.vectors.contextual_dims, seed);
    let vectors = vquery::query_vectors(query, &structure, &lexical, &contextual);
    let query_vec = vectors
        .get(layer.as_str())
        .ok_or_else(|| StepError::VectorizerFailed {
            layer: layer.as_str().to_string(),
            message: "no query vector for layer".to_string(),
        })?;

    let vector_table = if cfg.vector_table.is_empty() {
        "corpus.chunk_vectors"
    } else {
        cfg.vector_table.as_str()
    };
    require_table_name(vector_table)?;

    ctx.run_db
        .with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE {} (chunk_id TEXT PRIMARY KEY, score REAL NOT NULL)",
                step.output
            ))
            .map_err(sql_err)?;

            let mut candidates = conn
                .prepare(&format!("SELECT id FROM {source}"))
                .map_err(sql_err)?;
            let mut fetch = conn
                .prepare(&format!(
                    "SELECT vector FROM {vector_table} WHERE chunk_id = ?1 AND layer = ?2"
                ))
                .map_err(sql_err)?;
            let mut insert = conn
                .prepare(&format!(
                    "INSERT OR REPLACE INTO {} (chunk_id, score) VALUES (?1, ?2)",
                    step.output
                ))
                .map_err(sql_err)?;

            let ids = candidates
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(sql_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(sql_err)?;

            for chunk_id in ids {
                let blob: Option<Vec<u8>> = fetch
                    .query_row(params![chunk_id, layer.as_str()], |row| row.get(0))
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(sql_err(other)),
                    })?;
                let score = match blob.and_then(|b| Vector::from_bytes(&b)) {
                    Some(stored) => vector::cosine(query_vec.as_slice(), stored.as_slice()),
                    None => 0.0,
                };
                insert
                    .execute(params![chunk_id, score])
                    .map_err(sql_err)?;
            }
            Ok(())
        })
        .map_err(storage_err)?;
    Ok(None)
}
