//! Sub-configurations: workers, merger, vector layers, search.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of parallel workflow workers.
    pub count: usize,
    /// Orchestrator poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Optional per-run deadline in seconds; 0 disables.
    pub run_deadline_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 4,
            poll_interval_ms: 5000,
            run_deadline_secs: 0,
        }
    }
}

/// Merger loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergerConfig {
    /// Run-dbs merged per tick.
    pub batch_size: usize,
    /// Tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Age after which done/ entries are garbage collected, in hours.
    pub gc_max_age_hours: u64,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            tick_interval_ms: 1000,
            gc_max_age_hours: 24 * 7,
        }
    }
}

/// Per-layer vector dimensions and the feature-hashing seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub structure_dims: usize,
    pub lexical_dims: usize,
    pub contextual_dims: usize,
    pub blend_dims: usize,
    /// Seed for H1/H2 feature hashing; must stay fixed across runs.
    pub hash_seed: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            structure_dims: 256,
            lexical_dims: 128,
            contextual_dims: 128,
            blend_dims: 256,
            hash_seed: 42,
        }
    }
}

impl VectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_input = self
            .structure_dims
            .max(self.lexical_dims)
            .max(self.contextual_dims);
        if self.blend_dims < max_input {
            return Err(ConfigError::Invalid {
                field: "vectors.blend_dims".to_string(),
                message: format!("must be >= largest input layer ({max_input})"),
            });
        }
        for (field, dims) in [
            ("vectors.structure_dims", self.structure_dims),
            ("vectors.lexical_dims", self.lexical_dims),
            ("vectors.contextual_dims", self.contextual_dims),
        ] {
            if dims < 64 {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    message: "must be at least 64".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Search workflow defaults; weights can be overridden per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// First-stage full-text candidate cap.
    pub candidate_cap: usize,
    pub top_k: usize,
    pub min_score: f64,
    pub structure_weight: f64,
    pub lexical_weight: f64,
    pub contextual_weight: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            candidate_cap: 1000,
            top_k: 10,
            min_score: 0.0,
            structure_weight: 0.45,
            lexical_weight: 0.30,
            contextual_weight: 0.25,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.structure_weight + self.lexical_weight + self.contextual_weight;
        if sum <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "search".to_string(),
                message: "layer weights must sum to a positive value".to_string(),
            });
        }
        if self.candidate_cap == 0 {
            return Err(ConfigError::Invalid {
                field: "search.candidate_cap".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
