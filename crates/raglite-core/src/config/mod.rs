//! Layered configuration.

pub mod sections;

pub use sections::{MergerConfig, SearchConfig, VectorConfig, WorkerConfig};

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Environment variable overriding the default data directory.
pub const DATA_DIR_ENV: &str = "RAGLITE_DATA_DIR";

/// Top-level configuration aggregating all sub-configs.
///
/// Resolution order (highest priority first):
/// 1. CLI flags (applied by the binary)
/// 2. Environment variables (`RAGLITE_*`)
/// 3. `config.toml` in the data directory
/// 4. Compiled defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagliteConfig {
    pub data_dir: PathBuf,
    pub workers: WorkerConfig,
    pub merger: MergerConfig,
    pub vectors: VectorConfig,
    pub search: SearchConfig,
}

impl Default for RagliteConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            workers: WorkerConfig::default(),
            merger: MergerConfig::default(),
            vectors: VectorConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

/// `~/.raglite`, or `.raglite` when no home directory resolves.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    match env::var_os("HOME") {
        Some(home) => Path::new(&home).join(".raglite"),
        None => PathBuf::from(".raglite"),
    }
}

impl RagliteConfig {
    /// Load configuration for a data directory with layered resolution.
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self {
            data_dir: data_dir.unwrap_or_else(default_data_dir),
            ..Self::default()
        };

        let file = config.data_dir.join("config.toml");
        if file.exists() {
            Self::merge_toml_file(&mut config, &file)?;
        }

        Self::apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML string (for testing).
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigError::Parse {
            path: "<string>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn merge_toml_file(config: &mut Self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let loaded: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let data_dir = config.data_dir.clone();
        *config = loaded;
        // The data directory is decided by flag/env, never by the file it
        // was found in.
        config.data_dir = data_dir;
        Ok(())
    }

    fn apply_env_overrides(config: &mut Self) {
        if let Ok(v) = env::var("RAGLITE_WORKERS") {
            if let Ok(n) = v.parse() {
                config.workers.count = n;
            }
        }
        if let Ok(v) = env::var("RAGLITE_MERGER_BATCH") {
            if let Ok(n) = v.parse() {
                config.merger.batch_size = n;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.count == 0 {
            return Err(ConfigError::Invalid {
                field: "workers.count".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.merger.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "merger.batch_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        self.vectors.validate()?;
        self.search.validate()?;
        Ok(())
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    pub fn queue_dir(&self, state: &str) -> PathBuf {
        self.data_dir.join("queue").join(state)
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.data_dir.join("storage").join("raw")
    }

    pub fn corpus_db_path(&self) -> PathBuf {
        self.data_dir.join("corpus.db")
    }

    pub fn workflows_db_path(&self) -> PathBuf {
        self.data_dir.join("workflows.db")
    }
}
