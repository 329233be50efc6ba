//! Source-code extractor: one segment per top-level unit.
//!
//! Brace-balanced scanning for Go/Rust/C-family, indentation for Python,
//! statement splitting for SQL, function blocks for shell. Anything else
//! becomes a single code segment and the window step does the cutting.

use raglite_core::errors::ExtractError;
use raglite_core::types::{Segment, SegmentMeta, SegmentType};

use crate::{segment_id, Extractor, SegmentIter};

pub struct CodeExtractor;

const NAME: &str = "code";
const VERSION: &str = "1.2.0";

const MIME_TYPES: &[&str] = &[
    "text/x-go",
    "text/x-rust",
    "text/x-python",
    "text/javascript",
    "text/typescript",
    "text/x-sql",
    "application/sql",
    "text/x-shellscript",
    "application/x-sh",
    "text/x-c",
    "text/x-java",
];

impl CodeExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CodeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for CodeExtractor {
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
        config: &serde_json::Value,
    ) -> Result<SegmentIter, ExtractError> {
        let text = String::from_utf8_lossy(content).into_owned();
        let language = language_for(config);
        let units = match language.as_str() {
            "sql" => split_sql(&text),
            "bash" => split_shell(&text),
            "python" => split_indented(&text),
            "go" | "rust" | "javascript" | "c" | "java" => split_braced(&text, &language),
            _ => vec![Unit {
                name: None,
                kind: "snippet",
                line_start: 1,
                line_end: text.lines().count().max(1),
                content: text.clone(),
            }],
        };

        let file_id = file_id.to_string();
        let iter = units.into_iter().enumerate().map(move |(i, unit)| {
            let position = i as i64;
            Ok(Segment {
                id: segment_id(&file_id, NAME, position),
                file_id: file_id.clone(),
                extractor: NAME.to_string(),
                extractor_version: VERSION.to_string(),
                segment_type: SegmentType::Code,
                content: unit.content,
                page: None,
                position,
                bbox: None,
                confidence: 1.0,
                meta: SegmentMeta {
                    language: Some(language.clone()),
                    name: unit.name,
                    kind: Some(unit.kind.to_string()),
                    line_start: Some(unit.line_start as i64),
                    line_end: Some(unit.line_end as i64),
                    ..Default::default()
                },
            })
        });
        Ok(Box::new(iter))
    }
}

struct Unit {
    name: Option<String>,
    kind: &'static str,
    line_start: usize,
    line_end: usize,
    content: String,
}

fn language_for(config: &serde_json::Value) -> String {
    if let Some(lang) = config.get("language").and_then(|v| v.as_str()) {
        return lang.to_string();
    }
    let mime = config.get("mime_type").and_then(|v| v.as_str()).unwrap_or("");
    match mime {
        "text/x-go" => "go",
        "text/x-rust" => "rust",
        "text/x-python" => "python",
        "text/javascript" | "text/typescript" => "javascript",
        "text/x-sql" | "application/sql" => "sql",
        "text/x-shellscript" | "application/x-sh" => "bash",
        "text/x-c" => "c",
        "text/x-java" => "java",
        _ => "unknown",
    }
    .to_string()
}

/// Kind and name of a top-level declaration line, if it is one.
fn decl_of(line: &str, language: &str) -> Option<(&'static str, Option<String>)> {
    let trimmed = line.trim_start();
    let words: Vec<&str> = trimmed
        .split(|c: char| c.is_whitespace() || c == '(' || c == '{' || c == '<')
        .filter(|w| !w.is_empty())
        .collect();
    let first = *words.first()?;
    let second = words.get(1).copied();

    let named = |idx: usize| -> Option<String> {
        words
            .get(idx)
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '_').to_string())
            .filter(|w| !w.is_empty())
    };

    match (language, first) {
        ("go", "func") => {
            // `func (r *Recv) Name(` is a method.
            if trimmed.starts_with("func (") {
                let after = trimmed.split(')').nth(1).unwrap_or("");
                let name = after
                    .trim_start()
                    .split(|c: char| !c.is_alphanumeric() && c != '_')
                    .next()
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string());
                Some(("method", name))
            } else {
                Some(("function", named(1)))
            }
        }
        ("go", "type") => match words.get(2).copied() {
            Some("struct") => Some(("struct", named(1))),
            Some("interface") => Some(("interface", named(1))),
            _ => Some(("type", named(1))),
        },
        ("go", "const") => Some(("const", named(1))),
        ("go", "var") => Some(("var", named(1))),
        ("rust", "fn") => Some(("function", named(1))),
        ("rust", "pub") => match second {
            Some("fn") => Some(("function", named(2))),
            Some("struct") => Some(("struct", named(2))),
            Some("trait") => Some(("interface", named(2))),
            Some("enum") | Some("type") => Some(("type", named(2))),
            Some("const") | Some("static") => Some(("const", named(2))),
            _ => None,
        },
        ("rust", "struct") => Some(("struct", named(1))),
        ("rust", "trait") => Some(("interface", named(1))),
        ("rust", "enum") | ("rust", "impl") => Some(("type", named(1))),
        ("rust", "const") | ("rust", "static") => Some(("const", named(1))),
        (_, "function") => Some(("function", named(1))),
        ("javascript", "class") | ("java", "class") | ("python", "class") => {
            Some(("struct", named(1)))
        }
        ("javascript", "const") | ("javascript", "let") | ("javascript", "var") => {
            // Only arrow-function bindings count as units.
            if trimmed.contains("=>") {
                Some(("function", named(1)))
            } else {
                None
            }
        }
        ("python", "def") => Some(("function", named(1))),
        _ => None,
    }
}

/// Split brace-delimited source into top-level units.
fn split_braced(text: &str, language: &str) -> Vec<Unit> {
    struct Open {
        start: usize,
        kind: &'static str,
        name: Option<String>,
        saw_brace: bool,
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut units = Vec::new();
    let mut depth: i64 = 0;
    let mut current: Option<Open> = None;
    let mut header_end: Option<usize> = None;

    let close = |units: &mut Vec<Unit>, lines: &[&str], open: Open, end: usize| {
        units.push(Unit {
            name: open.name,
            kind: open.kind,
            line_start: open.start + 1,
            line_end: end + 1,
            content: lines[open.start..=end].join("\n"),
        });
    };

    for (i, line) in lines.iter().enumerate() {
        if depth <= 0 && !line.starts_with(char::is_whitespace) {
            if let Some((kind, name)) = decl_of(line, language) {
                // A braceless unit (one-line const, var block pending)
                // closes at the next top-level declaration.
                if let Some(open) = current.take() {
                    if open.saw_brace {
                        current = Some(open);
                    } else {
                        close(&mut units, &lines, open, i - 1);
                    }
                }
                if current.is_none() {
                    if header_end.is_none() && i > 0 {
                        header_end = Some(i);
                    }
                    current = Some(Open {
                        start: i,
                        kind,
                        name,
                        saw_brace: false,
                    });
                    depth = 0;
                }
            }
        }

        let mut opened = false;
        let mut closed = false;
        for c in line.chars() {
            match c {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => {
                    depth -= 1;
                    closed = true;
                }
                _ => {}
            }
        }
        let state = current.as_mut().map(|open| {
            open.saw_brace |= opened;
            (open.saw_brace, open.start)
        });
        if let Some((saw_brace, start)) = state {
            if saw_brace && depth <= 0 && (opened || closed) {
                let open = current.take().unwrap();
                close(&mut units, &lines, open, i);
                depth = 0;
            } else if !saw_brace && start == i && line.trim_end().ends_with(';') {
                let open = current.take().unwrap();
                close(&mut units, &lines, open, i);
            }
        }
    }

    if let Some(open) = current.take() {
        close(&mut units, &lines, open, lines.len() - 1);
    }

    // File header (package clause, imports) rides along as a snippet.
    if let Some(end) = header_end {
        let header = lines[..end].join("\n");
        if !header.trim().is_empty() {
            units.insert(
                0,
                Unit {
                    name: None,
                    kind: "snippet",
                    line_start: 1,
                    line_end: end,
                    content: header,
                },
            );
        }
    }

    if units.is_empty() && !text.trim().is_empty() {
        units.push(Unit {
            name: None,
            kind: "snippet",
            line_start: 1,
            line_end: lines.len().max(1),
            content: text.to_string(),
        });
    }
    units
}

/// Split SQL into statements on top-level semicolons.
fn split_sql(text: &str) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut start_line = 1usize;
    let mut line = 1usize;
    let mut in_string = false;
    let mut current = String::new();

    for c in text.chars() {
        if c == '\n' {
            line += 1;
        }
        if c == '\'' {
            in_string = !in_string;
        }
        current.push(c);
        if c == ';' && !in_string {
            let stmt = current.trim();
            if !stmt.is_empty() {
                units.push(Unit {
                    name: sql_object_name(stmt),
                    kind: "snippet",
                    line_start: start_line,
                    line_end: line,
                    content: stmt.to_string(),
                });
            }
            current.clear();
            start_line = line;
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        units.push(Unit {
            name: sql_object_name(tail),
            kind: "snippet",
            line_start: start_line,
            line_end: line,
            content: tail.to_string(),
        });
    }
    units
}

fn sql_object_name(stmt: &str) -> Option<String> {
    let upper = stmt.to_uppercase();
    let words: Vec<&str> = stmt.split_whitespace().collect();
    let idx = if upper.starts_with("CREATE TABLE IF NOT EXISTS") {
        5
    } else if upper.starts_with("CREATE TABLE") || upper.starts_with("CREATE INDEX") {
        2
    } else if upper.starts_with("INSERT INTO") || upper.starts_with("DELETE FROM") {
        2
    } else if upper.starts_with("UPDATE") {
        1
    } else {
        return None;
    };
    words.get(idx).map(|w| w.trim_matches('"').to_string())
}

/// Split shell into function blocks and the command runs between them.
fn split_shell(text: &str) -> Vec<Unit> {
    let lines: Vec<&str> = text.lines().collect();
    let mut units = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut func: Option<(usize, Option<String>)> = None;
    let mut depth = 0i64;

    let flush_run = |units: &mut Vec<Unit>, lines: &[&str], start: usize, end: usize| {
        let content = lines[start..end].join("\n");
        if !content.trim().is_empty() {
            units.push(Unit {
                name: None,
                kind: "snippet",
                line_start: start + 1,
                line_end: end,
                content,
            });
        }
    };

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        let is_func_start = func.is_none()
            && (trimmed.contains("() {")
                || (trimmed.starts_with("function ") && trimmed.ends_with('{')));
        if is_func_start {
            if let Some(start) = run_start.take() {
                flush_run(&mut units, &lines, start, i);
            }
            let name = trimmed
                .trim_start_matches("function ")
                .split(|c: char| c == '(' || c.is_whitespace())
                .next()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string());
            func = Some((i, name));
        } else if func.is_none() && run_start.is_none() && !trimmed.is_empty() {
            run_start = Some(i);
        }

        for c in line.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }

        if let Some((start, name)) = func.clone() {
            if depth <= 0 && i > start {
                units.push(Unit {
                    name,
                    kind: "function",
                    line_start: start + 1,
                    line_end: i + 1,
                    content: lines[start..=i].join("\n"),
                });
                func = None;
                depth = 0;
            }
        }
    }
    if let Some((start, name)) = func {
        units.push(Unit {
            name,
            kind: "function",
            line_start: start + 1,
            line_end: lines.len(),
            content: lines[start..].join("\n"),
        });
    }
    if let Some(start) = run_start {
        flush_run(&mut units, &lines, start, lines.len());
    }
    units
}

/// Split Python on column-zero def/class declarations.
fn split_indented(text: &str) -> Vec<Unit> {
    let lines: Vec<&str> = text.lines().collect();
    let mut boundaries = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if !line.starts_with(char::is_whitespace) {
            if let Some((kind, name)) = decl_of(line, "python") {
                boundaries.push((i, kind, name));
            }
        }
    }
    if boundaries.is_empty() {
        if text.trim().is_empty() {
            return Vec::new();
        }
        return vec![Unit {
            name: None,
            kind: "snippet",
            line_start: 1,
            line_end: lines.len().max(1),
            content: text.to_string(),
        }];
    }

    let mut units = Vec::new();
    if boundaries[0].0 > 0 {
        units.push(Unit {
            name: None,
            kind: "snippet",
            line_start: 1,
            line_end: boundaries[0].0,
            content: lines[..boundaries[0].0].join("\n"),
        });
    }
    for (b, boundary) in boundaries.iter().enumerate() {
        let end = boundaries
            .get(b + 1)
            .map(|next| next.0)
            .unwrap_or(lines.len());
        units.push(Unit {
            name: boundary.2.clone(),
            kind: boundary.1,
            line_start: boundary.0 + 1,
            line_end: end,
            content: lines[boundary.0..end].join("\n"),
        });
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(content: &str, mime: &str) -> Vec<Segment> {
        CodeExtractor::new()
            .extract("file-1", content.as_bytes(), &json!({"mime_type": mime}))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn go_single_function() {
        let segments = extract("func Add(a, b int) int { return a + b }\n", "text/x-go");
        assert_eq!(segments.len(), 1);
        let seg = &segments[0];
        assert_eq!(seg.segment_type, SegmentType::Code);
        assert_eq!(seg.meta.name.as_deref(), Some("Add"));
        assert_eq!(seg.meta.kind.as_deref(), Some("function"));
        assert_eq!(seg.meta.language.as_deref(), Some("go"));
    }

    #[test]
    fn go_file_with_header_and_method() {
        let src = "package calc\n\nimport \"fmt\"\n\nfunc Add(a, b int) int {\n\treturn a + b\n}\n\nfunc (c *Calc) Total() int {\n\treturn c.sum\n}\n";
        let segments = extract(src, "text/x-go");
        let kinds: Vec<_> = segments
            .iter()
            .map(|s| s.meta.kind.as_deref().unwrap())
            .collect();
        assert_eq!(kinds, vec!["snippet", "function", "method"]);
        assert_eq!(segments[2].meta.name.as_deref(), Some("Total"));
        // Positions increase monotonically.
        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.position, i as i64);
        }
    }

    #[test]
    fn rust_units() {
        let src = "pub struct Config {\n    pub dims: usize,\n}\n\npub fn load() -> Config {\n    Config { dims: 4 }\n}\n";
        let segments = extract(src, "text/x-rust");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].meta.kind.as_deref(), Some("struct"));
        assert_eq!(segments[0].meta.name.as_deref(), Some("Config"));
        assert_eq!(segments[1].meta.name.as_deref(), Some("load"));
    }

    #[test]
    fn sql_statements() {
        let src = "CREATE TABLE users (id INTEGER);\nINSERT INTO users VALUES (1);";
        let segments = extract(src, "text/x-sql");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].meta.name.as_deref(), Some("users"));
    }

    #[test]
    fn shell_function_and_run() {
        let src = "set -e\n\ngreet() {\n  echo hello\n}\n";
        let segments = extract(src, "text/x-shellscript");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].meta.kind.as_deref(), Some("snippet"));
        assert_eq!(segments[1].meta.name.as_deref(), Some("greet"));
    }

    #[test]
    fn unknown_language_is_one_segment() {
        let segments = extract("anything at all", "application/octet-stream");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].meta.kind.as_deref(), Some("snippet"));
    }

    #[test]
    fn segment_ids_are_deterministic() {
        let a = extract("func A() {}\n", "text/x-go");
        let b = extract("func A() {}\n", "text/x-go");
        assert_eq!(a[0].id, b[0].id);
    }
}
