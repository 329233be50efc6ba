//! Plain text / Markdown extractor: one segment per block.
//!
//! Blocks are split on blank lines; Markdown headings, list runs, tables
//! and fenced code become their own segments with style metadata so the
//! window step can honor boundary markers.

use raglite_core::errors::ExtractError;
use raglite_core::types::{Segment, SegmentMeta, SegmentType};

use crate::{segment_id, Extractor, SegmentIter};

pub struct TextExtractor;

const NAME: &str = "text";
const VERSION: &str = "1.1.0";

const MIME_TYPES: &[&str] = &["text/plain", "text/markdown"];

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for TextExtractor {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn supported_types(&self) -> &[&str] {
        MIME_TYPES
    }

    fn extract(
        &self,
        file_id: &str,
        content: &[u8],
        _config: &serde_json::Value,
    ) -> Result<SegmentIter, ExtractError> {
        let text = String::from_utf8_lossy(content).into_owned();
        let blocks = split_blocks(&text);
        let file_id = file_id.to_string();

        let iter = blocks.into_iter().enumerate().map(move |(i, block)| {
            let position = i as i64;
            let segment_type = match block.style {
                BlockStyle::Code => SegmentType::Code,
                BlockStyle::Table => SegmentType::Table,
                _ => SegmentType::Text,
            };
            Ok(Segment {
                id: segment_id(&file_id, NAME, position),
                file_id: file_id.clone(),
                extractor: NAME.to_string(),
                extractor_version: VERSION.to_string(),
                segment_type,
                content: block.content,
                page: None,
                position,
                bbox: None,
                confidence: 1.0,
                meta: SegmentMeta {
                    style: Some(block.style.as_str().to_string()),
                    level: block.level.map(|l| l as i64),
                    line_start: Some(block.line_start as i64),
                    line_end: Some(block.line_end as i64),
                    ..Default::default()
                },
            })
        });
        Ok(Box::new(iter))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockStyle {
    Heading,
    Paragraph,
    List,
    Table,
    Code,
}

impl BlockStyle {
    fn as_str(self) -> &'static str {
        match self {
            Self::Heading => "heading",
            Self::Paragraph => "paragraph",
            Self::List => "list",
            Self::Table => "table",
            Self::Code => "code",
        }
    }
}

struct Block {
    style: BlockStyle,
    level: Option<usize>,
    line_start: usize,
    line_end: usize,
    content: String,
}

fn classify(line: &str) -> BlockStyle {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        BlockStyle::Heading
    } else if trimmed.starts_with("- ")
        || trimmed.starts_with("* ")
        || trimmed.starts_with("+ ")
        || starts_ordered(trimmed)
    {
        BlockStyle::List
    } else if trimmed.starts_with('|') {
        BlockStyle::Table
    } else {
        BlockStyle::Paragraph
    }
}

fn starts_ordered(line: &str) -> bool {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && line[digits..].starts_with(". ")
}

fn split_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut style = BlockStyle::Paragraph;
    let mut start = 0usize;
    let mut in_fence = false;

    let flush = |current: &mut Vec<&str>, style: BlockStyle, start: usize, end: usize, blocks: &mut Vec<Block>| {
        if current.is_empty() {
            return;
        }
        let content = current.join("\n");
        let level = if style == BlockStyle::Heading {
            Some(content.trim_start().chars().take_while(|&c| c == '#').count())
        } else {
            None
        };
        blocks.push(Block {
            style,
            level,
            line_start: start + 1,
            line_end: end,
            content,
        });
        current.clear();
    };

    for (i, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();

        if trimmed.starts_with("```") {
            if in_fence {
                current.push(line);
                flush(&mut current, BlockStyle::Code, start, i + 1, &mut blocks);
                in_fence = false;
            } else {
                flush(&mut current, style, start, i, &mut blocks);
                in_fence = true;
                style = BlockStyle::Code;
                start = i;
                current.push(line);
            }
            continue;
        }
        if in_fence {
            current.push(line);
            continue;
        }

        if trimmed.is_empty() {
            flush(&mut current, style, start, i, &mut blocks);
            continue;
        }

        let line_style = classify(line);
        // Headings always stand alone; other styles accumulate runs.
        if current.is_empty() {
            style = line_style;
            start = i;
            current.push(line);
        } else if line_style == style && style != BlockStyle::Heading {
            current.push(line);
        } else {
            flush(&mut current, style, start, i, &mut blocks);
            style = line_style;
            start = i;
            current.push(line);
        }
    }
    let end = text.lines().count();
    flush(&mut current, style, start, end, &mut blocks);
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(content: &str) -> Vec<Segment> {
        TextExtractor::new()
            .extract("file-1", content.as_bytes(), &json!({}))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let segments = extract("first paragraph\nstill first\n\nsecond paragraph\n");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].content, "first paragraph\nstill first");
        assert_eq!(segments[1].content, "second paragraph");
    }

    #[test]
    fn heading_is_its_own_segment_with_level() {
        let segments = extract("## Install\n\nRun the installer.\n");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].meta.style.as_deref(), Some("heading"));
        assert_eq!(segments[0].meta.level, Some(2));
        assert_eq!(segments[1].meta.style.as_deref(), Some("paragraph"));
    }

    #[test]
    fn consecutive_headings_do_not_merge() {
        let segments = extract("# A\n## B\n");
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn list_run_is_one_segment() {
        let segments = extract("- one\n- two\n- three\n");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].meta.style.as_deref(), Some("list"));
    }

    #[test]
    fn fenced_code_keeps_blank_lines() {
        let segments = extract("```\nlet a = 1;\n\nlet b = 2;\n```\n");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].segment_type, SegmentType::Code);
        assert!(segments[0].content.contains("let b = 2;"));
    }

    #[test]
    fn table_rows_group() {
        let segments = extract("| a | b |\n| 1 | 2 |\n");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].segment_type, SegmentType::Table);
    }

    #[test]
    fn positions_are_monotone() {
        let segments = extract("# T\n\npara\n\n- l1\n");
        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.position, i as i64);
        }
    }
}
