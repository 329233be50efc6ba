//! Extracted segments — the output of the extractor contract.

use serde::{Deserialize, Serialize};

/// What kind of content a segment carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    Text,
    Table,
    ImageOcr,
    Metadata,
    Code,
}

impl SegmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Table => "table",
            Self::ImageOcr => "image_ocr",
            Self::Metadata => "metadata",
            Self::Code => "code",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "table" => Some(Self::Table),
            "image_ocr" => Some(Self::ImageOcr),
            "metadata" => Some(Self::Metadata),
            "code" => Some(Self::Code),
            _ => None,
        }
    }
}

/// Extraction metadata attached to a segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<i64>,
    /// Symbol name for code segments (function, type, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Code unit kind: function, method, struct, interface, type, const, var, snippet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// One extracted segment of a raw file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub file_id: String,
    pub extractor: String,
    pub extractor_version: String,
    pub segment_type: SegmentType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    /// Positional index within the file; increases monotonically.
    pub position: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub meta: SegmentMeta,
}
