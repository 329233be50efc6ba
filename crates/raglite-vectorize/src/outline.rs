//! Lightweight syntax outlines.
//!
//! Line and token scanners that turn a chunk into the structural signal the
//! vectorizers consume: node kinds with depth, outgoing calls, imports and
//! unit kind. Not a parser — the extractors own real parsing; this only has
//! to be deterministic and cheap.

/// Source language of a chunk, detected from extractor metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Go,
    Rust,
    Sql,
    Shell,
    Python,
    JavaScript,
    Markdown,
    Text,
    Other,
}

impl Language {
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint.map(|h| h.to_ascii_lowercase()).as_deref() {
            Some("go") => Self::Go,
            Some("rust" | "rs") => Self::Rust,
            Some("sql") => Self::Sql,
            Some("bash" | "sh" | "shell" | "zsh") => Self::Shell,
            Some("python" | "py") => Self::Python,
            Some("javascript" | "js" | "typescript" | "ts") => Self::JavaScript,
            Some("markdown" | "md") => Self::Markdown,
            Some("text" | "txt" | "plain") => Self::Text,
            _ => Self::Other,
        }
    }

    pub fn is_code(self) -> bool {
        !matches!(self, Self::Markdown | Self::Text)
    }
}

/// What kind of unit a code chunk is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Function,
    Method,
    Struct,
    Interface,
    Type,
    Const,
    Var,
    Snippet,
}

impl UnitKind {
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint {
            Some("function") => Self::Function,
            Some("method") => Self::Method,
            Some("struct") => Self::Struct,
            Some("interface") => Self::Interface,
            Some("type") => Self::Type,
            Some("const") => Self::Const,
            Some("var") => Self::Var,
            _ => Self::Snippet,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Struct => "struct",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Const => "const",
            Self::Var => "var",
            Self::Snippet => "snippet",
        }
    }

    /// Index into the one-hot tail of the structure vector.
    pub fn one_hot_index(self) -> usize {
        match self {
            Self::Function => 0,
            Self::Method => 1,
            Self::Struct => 2,
            Self::Interface => 3,
            Self::Type => 4,
            Self::Const => 5,
            Self::Var => 6,
            Self::Snippet => 7,
        }
    }
}

/// One structural node observed in the chunk.
#[derive(Debug, Clone)]
pub struct OutlineNode {
    pub kind: &'static str,
    pub depth: usize,
}

/// Structural summary of one chunk.
#[derive(Debug, Clone)]
pub struct Outline {
    pub language: Language,
    pub kind: UnitKind,
    pub nodes: Vec<OutlineNode>,
    pub calls: Vec<String>,
    pub imports: Vec<String>,
    pub line_count: usize,
    pub max_depth: usize,
    pub param_count: usize,
    /// Prose-only markers.
    pub heading_level: usize,
    pub list_items: usize,
    pub table_rows: usize,
}

impl Outline {
    /// Scan a chunk's content.
    pub fn scan(content: &str, language: Language, kind_hint: Option<&str>) -> Self {
        let mut outline = Self {
            language,
            kind: UnitKind::from_hint(kind_hint),
            nodes: Vec::new(),
            calls: Vec::new(),
            imports: Vec::new(),
            line_count: content.lines().count(),
            max_depth: 0,
            param_count: 0,
            heading_level: 0,
            list_items: 0,
            table_rows: 0,
        };
        match language {
            Language::Sql => outline.scan_sql(content),
            Language::Shell => outline.scan_shell(content),
            Language::Markdown | Language::Text => outline.scan_prose(content),
            _ => outline.scan_code(content),
        }
        outline
    }

    fn push(&mut self, kind: &'static str, depth: usize) {
        self.max_depth = self.max_depth.max(depth);
        self.nodes.push(OutlineNode { kind, depth });
    }

    fn scan_code(&mut self, content: &str) {
        let mut depth: usize = 0;
        let mut saw_signature = false;
        for raw in content.lines() {
            let line = strip_line_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(import) = parse_import(line, self.language) {
                self.imports.push(import);
                self.push("import", depth);
            } else if starts_with_word(line, &["func", "fn", "def", "function"]) {
                self.push("func_decl", depth);
                if !saw_signature {
                    self.param_count = count_params(line);
                    saw_signature = true;
                }
            } else if starts_with_word(line, &["type", "struct", "interface", "trait", "impl", "enum", "class"]) {
                self.push("type_decl", depth);
            } else if starts_with_word(line, &["if", "else"]) {
                self.push("if", depth);
            } else if starts_with_word(line, &["for"]) {
                self.push("for", depth);
            } else if starts_with_word(line, &["while", "loop"]) {
                self.push("loop", depth);
            } else if starts_with_word(line, &["switch", "match", "select"]) {
                self.push("switch", depth);
            } else if starts_with_word(line, &["case", "default"]) {
                self.push("case", depth);
            } else if starts_with_word(line, &["return"]) {
                self.push("return", depth);
            } else if starts_with_word(line, &["defer"]) {
                self.push("defer", depth);
            } else if starts_with_word(line, &["go", "spawn", "await", "async"]) {
                self.push("spawn", depth);
            } else if line.contains(":=") || line.contains("= ") || starts_with_word(line, &["let", "var", "const"]) {
                self.push("assign", depth);
            } else {
                self.push("stmt", depth);
            }

            let before = self.calls.len();
            collect_calls(line, &mut self.calls);
            for _ in before..self.calls.len() {
                self.push("call", depth);
            }

            for c in line.chars() {
                match c {
                    '{' | '(' => depth += 1,
                    '}' | ')' => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
        }
    }

    fn scan_sql(&mut self, content: &str) {
        let upper = content.to_uppercase();
        let mut depth: usize = 0;
        let mut words = Vec::new();
        let mut current = String::new();
        for c in upper.chars() {
            if c.is_ascii_alphanumeric() || c == '_' {
                current.push(c);
            } else {
                if !current.is_empty() {
                    words.push((std::mem::take(&mut current), depth));
                }
                match c {
                    '(' => depth += 1,
                    ')' => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
        }
        if !current.is_empty() {
            words.push((current, depth));
        }

        let mut prev_kw: Option<&str> = None;
        for i in 0..words.len() {
            let (word, d) = (&words[i].0, words[i].1);
            let kind = match word.as_str() {
                "SELECT" => Some(if d > 0 { "subquery" } else { "select" }),
                "INSERT" => Some("insert"),
                "UPDATE" => Some("update"),
                "DELETE" => Some("delete"),
                "CREATE" => Some("create"),
                "WITH" => Some("cte"),
                "JOIN" => Some("join"),
                "WHERE" => Some("where"),
                "GROUP" => Some("group_by"),
                "HAVING" => Some("having"),
                "ORDER" => Some("order_by"),
                "UNION" => Some("union"),
                "CASE" => Some("case"),
                "OVER" => Some("window_fn"),
                _ => None,
            };
            if let Some(kind) = kind {
                self.push(kind, d);
            }
            // Referenced tables show up after FROM / JOIN / INTO / UPDATE.
            if matches!(prev_kw, Some("FROM" | "JOIN" | "INTO" | "UPDATE"))
                && !is_sql_keyword(word)
            {
                self.imports.push(word.to_lowercase());
            }
            // Aggregate and scalar function calls.
            if matches!(
                word.as_str(),
                "COUNT" | "SUM" | "AVG" | "MAX" | "MIN" | "COALESCE" | "LENGTH" | "LOWER"
                    | "UPPER" | "INSTR" | "REPLACE" | "CAST"
            ) {
                self.calls.push(word.to_lowercase());
                self.push("call", d);
            }
            prev_kw = Some(words[i].0.as_str());
        }
    }

    fn scan_shell(&mut self, content: &str) {
        let mut depth: usize = 0;
        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if starts_with_word(line, &["if", "elif"]) {
                self.push("if", depth);
                depth += 1;
            } else if starts_with_word(line, &["for", "while", "until"]) {
                self.push("loop", depth);
                depth += 1;
            } else if starts_with_word(line, &["case"]) {
                self.push("switch", depth);
                depth += 1;
            } else if starts_with_word(line, &["fi", "done", "esac"]) {
                depth = depth.saturating_sub(1);
                self.push("block_end", depth);
            } else if line.contains("() {") || starts_with_word(line, &["function"]) {
                self.push("func_decl", depth);
            } else if starts_with_word(line, &["source"]) || line.starts_with(". ") {
                if let Some(target) = line.split_whitespace().nth(1) {
                    self.imports.push(target.to_string());
                }
                self.push("import", depth);
            } else {
                self.push("stmt", depth);
            }

            for _ in 0..count_unescaped(line, '|') {
                self.push("pipe", depth);
            }
            if line.contains('>') || line.contains('<') {
                self.push("redirect", depth);
            }
            if line.contains("$(") || line.contains('`') {
                self.push("subst", depth);
            }
            // First word of the command is the call target.
            if let Some(first) = line.split_whitespace().next() {
                if !is_shell_keyword(first) && first.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.') {
                    self.calls.push(first.to_string());
                }
            }
        }
    }

    fn scan_prose(&mut self, content: &str) {
        let mut in_fence = false;
        for raw in content.lines() {
            let line = raw.trim_end();
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") {
                in_fence = !in_fence;
                self.push("code_fence", 0);
                continue;
            }
            if in_fence {
                continue;
            }
            if trimmed.starts_with('#') {
                let level = trimmed.chars().take_while(|&c| c == '#').count();
                if self.heading_level == 0 {
                    self.heading_level = level;
                }
                self.push("heading", level);
            } else if trimmed.starts_with("- ")
                || trimmed.starts_with("* ")
                || trimmed.starts_with("+ ")
                || is_ordered_item(trimmed)
            {
                self.list_items += 1;
                self.push("list_item", 1);
            } else if trimmed.starts_with('|') && trimmed.ends_with('|') {
                self.table_rows += 1;
                self.push("table_row", 1);
            } else if !trimmed.is_empty() {
                self.push("paragraph", 0);
            }
        }
    }
}

fn starts_with_word(line: &str, words: &[&str]) -> bool {
    let first = line
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .next()
        .unwrap_or("");
    words.contains(&first)
}

fn strip_line_comment(line: &str) -> &str {
    match line.find("//") {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn parse_import(line: &str, language: Language) -> Option<String> {
    match language {
        Language::Go => line
            .strip_prefix("import ")
            .map(|rest| rest.trim_matches(|c| c == '"' || c == ' ').to_string()),
        Language::Rust => line
            .strip_prefix("use ")
            .map(|rest| rest.trim_end_matches(';').to_string()),
        Language::Python => {
            if line.starts_with("import ") || line.starts_with("from ") {
                line.split_whitespace().nth(1).map(|s| s.to_string())
            } else {
                None
            }
        }
        Language::JavaScript => {
            if line.starts_with("import ") || line.contains("require(") {
                Some(
                    line.split(|c| c == '\'' || c == '"')
                        .nth(1)
                        .unwrap_or("")
                        .to_string(),
                )
                .filter(|s| !s.is_empty())
            } else {
                None
            }
        }
        _ => {
            if line.starts_with("import ") {
                line.split_whitespace().nth(1).map(|s| s.to_string())
            } else {
                None
            }
        }
    }
}

/// Collect `ident(` and `recv.method(` shapes, skipping control keywords.
fn collect_calls(line: &str, out: &mut Vec<String>) {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() {
                let c = bytes[i] as char;
                if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                    i += 1;
                } else {
                    break;
                }
            }
            let ident = &line[start..i];
            if i < bytes.len() && bytes[i] == b'(' && !is_control_keyword(ident) {
                out.push(ident.to_string());
            }
        } else {
            i += 1;
        }
    }
}

fn is_control_keyword(word: &str) -> bool {
    matches!(
        word,
        "if" | "else" | "for" | "while" | "switch" | "match" | "select" | "return" | "fn"
            | "func" | "def" | "function" | "loop" | "catch" | "defer" | "go"
    )
}

fn is_sql_keyword(word: &str) -> bool {
    matches!(
        word,
        "SELECT" | "FROM" | "WHERE" | "JOIN" | "INNER" | "LEFT" | "RIGHT" | "OUTER" | "CROSS"
            | "ON" | "AS" | "AND" | "OR" | "NOT" | "GROUP" | "BY" | "ORDER" | "HAVING"
            | "LIMIT" | "INSERT" | "INTO" | "VALUES" | "UPDATE" | "SET" | "DELETE" | "CREATE"
            | "TABLE" | "INDEX" | "WITH" | "UNION" | "ALL" | "DISTINCT" | "CASE" | "WHEN"
            | "THEN" | "ELSE" | "END" | "NULL" | "IS" | "IN" | "EXISTS" | "BETWEEN" | "LIKE"
    )
}

fn is_shell_keyword(word: &str) -> bool {
    matches!(
        word,
        "if" | "then" | "else" | "elif" | "fi" | "for" | "while" | "until" | "do" | "done"
            | "case" | "esac" | "function" | "local" | "export" | "readonly" | "return"
            | "source" | "set" | "trap" | "shift"
    )
}

fn is_ordered_item(line: &str) -> bool {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && line[digits..].starts_with(". ")
}

fn count_unescaped(line: &str, target: char) -> usize {
    let mut count = 0;
    let mut prev = ' ';
    let mut next_same = line.chars().skip(1).chain(std::iter::once(' '));
    for c in line.chars() {
        let next = next_same.next().unwrap_or(' ');
        if c == target && prev != target && next != target {
            count += 1;
        }
        prev = c;
    }
    count
}

fn count_params(line: &str) -> usize {
    let open = match line.find('(') {
        Some(i) => i,
        None => return 0,
    };
    let close = line[open..].find(')').map(|i| open + i).unwrap_or(line.len());
    let inner = line[open + 1..close].trim();
    if inner.is_empty() {
        0
    } else {
        inner.matches(',').count() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GO_FUNC: &str = "func Add(a, b int) int {\n\tif a > 0 {\n\t\treturn a + b\n\t}\n\treturn b\n}\n";

    #[test]
    fn go_function_outline() {
        let o = Outline::scan(GO_FUNC, Language::Go, Some("function"));
        assert_eq!(o.kind, UnitKind::Function);
        assert!(o.nodes.iter().any(|n| n.kind == "func_decl"));
        assert!(o.nodes.iter().any(|n| n.kind == "if"));
        assert_eq!(o.nodes.iter().filter(|n| n.kind == "return").count(), 2);
        assert_eq!(o.param_count, 2);
        assert!(o.max_depth > 0);
    }

    #[test]
    fn go_calls_and_imports() {
        let src = "import \"fmt\"\nfunc run() {\n\tfmt.Println(compute(1))\n}\n";
        let o = Outline::scan(src, Language::Go, Some("function"));
        assert!(o.imports.iter().any(|i| i == "fmt"));
        assert!(o.calls.iter().any(|c| c == "fmt.Println"));
        assert!(o.calls.iter().any(|c| c == "compute"));
    }

    #[test]
    fn sql_shapes() {
        let src = "SELECT a, COUNT(*) FROM users u LEFT JOIN orders o ON u.id = o.uid \
                   WHERE a IN (SELECT id FROM x) GROUP BY a";
        let o = Outline::scan(src, Language::Sql, None);
        assert!(o.nodes.iter().any(|n| n.kind == "select"));
        assert!(o.nodes.iter().any(|n| n.kind == "join"));
        assert!(o.nodes.iter().any(|n| n.kind == "subquery"));
        assert!(o.nodes.iter().any(|n| n.kind == "group_by"));
        assert!(o.imports.iter().any(|t| t == "users"));
        assert!(o.calls.iter().any(|c| c == "count"));
    }

    #[test]
    fn shell_pipes_and_redirects() {
        let src = "#!/bin/sh\ngrep -r foo . | sort | uniq > out.txt\nif [ -f out.txt ]; then\n  cat out.txt\nfi\n";
        let o = Outline::scan(src, Language::Shell, None);
        assert_eq!(o.nodes.iter().filter(|n| n.kind == "pipe").count(), 2);
        assert!(o.nodes.iter().any(|n| n.kind == "redirect"));
        assert!(o.nodes.iter().any(|n| n.kind == "if"));
        assert!(o.calls.iter().any(|c| c == "grep"));
    }

    #[test]
    fn markdown_markers() {
        let src = "## Setup\n\nSome intro text.\n\n- one\n- two\n\n| a | b |\n| 1 | 2 |\n";
        let o = Outline::scan(src, Language::Markdown, None);
        assert_eq!(o.heading_level, 2);
        assert_eq!(o.list_items, 2);
        assert_eq!(o.table_rows, 2);
        assert!(o.nodes.iter().any(|n| n.kind == "paragraph"));
    }

    #[test]
    fn language_hints() {
        assert_eq!(Language::from_hint(Some("go")), Language::Go);
        assert_eq!(Language::from_hint(Some("SH")), Language::Shell);
        assert_eq!(Language::from_hint(None), Language::Other);
        assert!(!Language::Markdown.is_code());
    }
}
