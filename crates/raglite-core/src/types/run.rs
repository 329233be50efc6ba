//! Run metadata, step telemetry and merge history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    Pending,
    Merged,
    Skipped,
    Failed,
}

impl MergeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Merged => "merged",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "merged" => Some(Self::Merged),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Per-execution metadata; lives in the run-db `_run_meta` table so the
/// file is self-contained for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub workflow_id: String,
    pub workflow_version: i64,
    pub input_source: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub worker_id: String,
    /// Opaque run configuration (JSON).
    pub config: String,
}

/// One row of the run-db step-execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_order: i64,
    pub step_name: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub rows_in: i64,
    pub rows_out: i64,
    /// 1 − rows_out/max(1, rows_in); negative for expansions.
    pub delta_score: f64,
    pub output_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Row-set divergence between two steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub step_from: i64,
    pub step_to: i64,
    pub rows_before: i64,
    pub rows_after: i64,
    pub rows_lost: i64,
    pub rows_gained: i64,
    /// reduction, expansion or transformation.
    pub delta_type: String,
    pub delta_score: f64,
    pub jaccard_index: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_lost: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_gained: Option<String>,
}
