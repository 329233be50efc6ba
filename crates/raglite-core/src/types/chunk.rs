//! Chunks, their features and their per-layer vectors.

use serde::{Deserialize, Serialize};

/// How a chunk was cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Semantic,
    FixedWindow,
    Sentence,
    Paragraph,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::FixedWindow => "fixed_window",
            Self::Sentence => "sentence",
            Self::Paragraph => "paragraph",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "semantic" => Some(Self::Semantic),
            "fixed_window" => Some(Self::FixedWindow),
            "sentence" => Some(Self::Sentence),
            "paragraph" => Some(Self::Paragraph),
            _ => None,
        }
    }
}

/// The unit of retrieval. `id` is the SHA-256 of the content, which is also
/// the corpus-wide deduplication key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub file_id: String,
    pub content: String,
    pub token_count: i64,
    pub chunk_type: ChunkType,
    pub overlap_prev: i64,
    pub overlap_next: i64,
    /// Position within the file; increases monotonically.
    pub position: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_run: Option<String>,
    /// Section context preserved from the window step (nearest heading).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

/// A named numeric feature of a chunk, keyed by (chunk_id, feature_name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkFeature {
    pub chunk_id: String,
    pub feature_name: String,
    pub feature_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_meta: Option<String>,
}

/// Named feature space of a chunk vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorLayer {
    Structure,
    Lexical,
    Contextual,
    Blend,
    Final,
}

impl VectorLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Lexical => "lexical",
            Self::Contextual => "contextual",
            Self::Blend => "blend",
            Self::Final => "final",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "structure" => Some(Self::Structure),
            "lexical" => Some(Self::Lexical),
            "contextual" => Some(Self::Contextual),
            "blend" => Some(Self::Blend),
            "final" => Some(Self::Final),
            _ => None,
        }
    }
}

/// A stored vector: little-endian packed IEEE-754 f32, len(blob) = 4·dims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkVector {
    pub chunk_id: String,
    pub layer: VectorLayer,
    pub vector: Vec<u8>,
    pub dimensions: i64,
    pub model_version: String,
}
