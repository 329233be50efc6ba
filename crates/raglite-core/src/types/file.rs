//! Raw file rows in the corpus database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an ingested file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Extracted,
    Chunked,
    Vectorized,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Extracted => "extracted",
            Self::Chunked => "chunked",
            Self::Vectorized => "vectorized",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "extracted" => Some(Self::Extracted),
            "chunked" => Some(Self::Chunked),
            "vectorized" => Some(Self::Vectorized),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// An ingested file. The id is the SHA-256 of the content; the bytes live
/// in the external blob store, never in the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFile {
    pub id: String,
    pub source_path: String,
    pub mime_type: String,
    pub size: i64,
    pub external_path: String,
    pub checksum: String,
    pub status: FileStatus,
    pub ingested_at: DateTime<Utc>,
}
