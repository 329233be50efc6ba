//! Directed chunk relations. Cycles are permitted and carry no ownership.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    References,
    Follows,
    ParentOf,
    SimilarTo,
    Calls,
    Imports,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::References => "references",
            Self::Follows => "follows",
            Self::ParentOf => "parent_of",
            Self::SimilarTo => "similar_to",
            Self::Calls => "calls",
            Self::Imports => "imports",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "references" => Some(Self::References),
            "follows" => Some(Self::Follows),
            "parent_of" => Some(Self::ParentOf),
            "similar_to" => Some(Self::SimilarTo),
            "calls" => Some(Self::Calls),
            "imports" => Some(Self::Imports),
            _ => None,
        }
    }
}

/// Directed edge keyed by (from, to, relation_type); weight in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRelation {
    pub from_chunk_id: String,
    pub to_chunk_id: String,
    pub relation_type: RelationType,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_run: Option<String>,
}
