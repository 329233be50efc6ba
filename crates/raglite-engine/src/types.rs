//! Workflow and step definitions.
//!
//! The eleven operations form a tagged variant dispatched on the
//! `operation` column; per-operation config stays an opaque JSON blob
//! through storage and is decoded at dispatch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A workflow definition: ordered, versioned, data-defined.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub id: String,
    pub version: i64,
    pub name: String,
    pub description: String,
    pub input_schema: Option<String>,
    pub output_schema: Option<String>,
    pub status: WorkflowStatus,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Draft,
    Active,
    Deprecated,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Deprecated => "deprecated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "deprecated" => Some(Self::Deprecated),
            _ => None,
        }
    }
}

/// One step of a workflow.
#[derive(Debug, Clone)]
pub struct Step {
    pub workflow_id: String,
    pub step_order: i64,
    pub step_name: String,
    pub operation: Operation,
    /// Source table name, or the sentinel `_input`.
    pub source: String,
    /// Operation-specific expression (filter predicate, projection list,
    /// join clause, aggregate select list, diff reference table).
    pub predicate: String,
    /// Output table name; materializing it is the step's side-effect.
    pub output: String,
    /// Opaque per-operation JSON config.
    pub config: Option<String>,
    pub expects_delta: bool,
    pub on_empty: OnEmpty,
}

/// The tagged operation variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Filter,
    Project,
    Join,
    Aggregate,
    Diff,
    Window,
    Hash,
    Vectorize,
    External,
    Fork,
    Merge,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Project => "project",
            Self::Join => "join",
            Self::Aggregate => "aggregate",
            Self::Diff => "diff",
            Self::Window => "window",
            Self::Hash => "hash",
            Self::Vectorize => "vectorize",
            Self::External => "external",
            Self::Fork => "fork",
            Self::Merge => "merge",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "filter" => Some(Self::Filter),
            "project" => Some(Self::Project),
            "join" => Some(Self::Join),
            "aggregate" => Some(Self::Aggregate),
            "diff" => Some(Self::Diff),
            "window" => Some(Self::Window),
            "hash" => Some(Self::Hash),
            "vectorize" => Some(Self::Vectorize),
            "external" => Some(Self::External),
            "fork" => Some(Self::Fork),
            "merge" => Some(Self::Merge),
            _ => None,
        }
    }
}

/// Policy when a step materializes zero rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnEmpty {
    Continue,
    SkipRemaining,
    Fail,
}

impl OnEmpty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::SkipRemaining => "skip_remaining",
            Self::Fail => "fail",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "continue" => Some(Self::Continue),
            "skip_remaining" => Some(Self::SkipRemaining),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}

/// Per-run configuration handed to the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Named parameters substituted into predicates as `:name`.
    pub parameters: BTreeMap<String, String>,
    /// Keep intermediate tables even on failure (they are kept anyway;
    /// this flag additionally skips the orchestrator's cleanup of search
    /// run-dbs).
    pub keep_tables: bool,
    /// Optional deadline in seconds; 0 disables.
    pub deadline_secs: u64,
    /// Sample size for diff records.
    pub sample_size: usize,
    pub debug: bool,
}

/// Input-schema projection for the `_input` sentinel on step 1.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InputSchema {
    /// Corpus table to project, e.g. `corpus.raw_files`.
    pub source: String,
    pub mime_types: Vec<String>,
    pub statuses: Vec<String>,
}

/// window step config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub strategy: String,
    pub max_tokens: usize,
    pub min_tokens: usize,
    pub overlap_tokens: usize,
    pub boundary_markers: Vec<String>,
    pub group_by: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            strategy: "semantic".to_string(),
            max_tokens: 512,
            min_tokens: 1,
            overlap_tokens: 0,
            boundary_markers: Vec::new(),
            group_by: "file_id".to_string(),
        }
    }
}

/// hash step config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HashConfig {
    pub algorithm: String,
    pub columns: Vec<String>,
    pub output_column: String,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            algorithm: "sha256".to_string(),
            columns: Vec::new(),
            output_column: "hash".to_string(),
        }
    }
}

/// vectorize step config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VectorizeConfig {
    /// structure, lexical, contextual or blend.
    pub layer: String,
    /// "embed" (default) or "similarity" for search scoring.
    pub mode: String,
    pub dimensions: usize,
    pub model_version: String,
    /// Blend inputs: layer-name -> run-db vector table.
    pub sources: BTreeMap<String, String>,
    pub weights: BTreeMap<String, f64>,
    pub method: String,
    /// Table to receive calls/follows relations (contextual layer).
    pub relations_output: String,
    /// Similarity mode: corpus vector table to score against.
    pub vector_table: String,
}

/// external step config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub extractor: String,
    pub extractor_version: String,
    pub options: serde_json::Value,
}

/// aggregate step config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub features: Vec<FeatureSpec>,
    /// "columns" (default) widens the source; "rows" unpivots into
    /// (chunk_id, feature_name, feature_value) rows keyed by `key_column`.
    pub emit: String,
    pub key_column: String,
    pub group_by: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub expr: String,
}

/// join step config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Projection list; `*` when empty.
    pub select: String,
}

/// filter step config; order/limit serve the top-k search step.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub order_by: String,
    pub limit: String,
}

/// diff step config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    pub key_column: String,
    pub sample_size: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            key_column: "id".to_string(),
            sample_size: 5,
        }
    }
}

/// fork step config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ForkConfig {
    pub branches: Vec<ForkBranch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForkBranch {
    pub label: String,
    pub predicate: String,
}

/// merge step config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub sources: Vec<String>,
}

/// Decode a step's opaque config into the given shape.
pub fn decode_config<T: Default + for<'de> Deserialize<'de>>(
    step: &Step,
) -> Result<T, raglite_core::errors::StepError> {
    match step.config.as_deref() {
        None | Some("") => Ok(T::default()),
        Some(raw) => serde_json::from_str(raw).map_err(|e| {
            raglite_core::errors::StepError::InvalidConfig {
                operation: step.operation.as_str().to_string(),
                message: e.to_string(),
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_roundtrip() {
        for op in [
            Operation::Filter,
            Operation::Project,
            Operation::Join,
            Operation::Aggregate,
            Operation::Diff,
            Operation::Window,
            Operation::Hash,
            Operation::Vectorize,
            Operation::External,
            Operation::Fork,
            Operation::Merge,
        ] {
            assert_eq!(Operation::parse(op.as_str()), Some(op));
        }
        assert_eq!(Operation::parse("nope"), None);
    }

    #[test]
    fn window_config_defaults() {
        let step = Step {
            workflow_id: "w".into(),
            step_order: 1,
            step_name: "s".into(),
            operation: Operation::Window,
            source: "_input".into(),
            predicate: String::new(),
            output: "out".into(),
            config: Some(r#"{"max_tokens": 256}"#.into()),
            expects_delta: false,
            on_empty: OnEmpty::Continue,
        };
        let cfg: WindowConfig = decode_config(&step).unwrap();
        assert_eq!(cfg.max_tokens, 256);
        assert_eq!(cfg.group_by, "file_id");
        assert_eq!(cfg.strategy, "semantic");
    }

    #[test]
    fn bad_config_is_invalid() {
        let step = Step {
            workflow_id: "w".into(),
            step_order: 1,
            step_name: "s".into(),
            operation: Operation::Hash,
            source: "a".into(),
            predicate: String::new(),
            output: "out".into(),
            config: Some("not json".into()),
            expects_delta: false,
            on_empty: OnEmpty::Continue,
        };
        assert!(decode_config::<HashConfig>(&step).is_err());
    }
}
