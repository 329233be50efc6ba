//! Structure layer: what shape the code (or prose) has.
//!
//! Slice layout for D dims: [0, D/4) node unigrams, [D/4, D/2) node
//! bigrams, [D/2, 5D/8) control flow, [5D/8, 3D/4) language idioms,
//! [D-48, D-16) numeric metrics, [D-16, D) one-hot unit kind.

use crate::hashing::FeatureHasher;
use crate::outline::{Language, Outline, UnitKind};
use crate::sigmoid;
use crate::vector::Vector;

pub struct StructureVectorizer {
    dims: usize,
    max_depth: usize,
    hasher: FeatureHasher,
}

impl StructureVectorizer {
    pub fn new(dims: usize, seed: u64) -> Self {
        Self {
            dims: dims.max(128),
            max_depth: 10,
            hasher: FeatureHasher::new(seed),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Vectorize one chunk from its outline and raw content.
    pub fn vectorize(&self, outline: &Outline, content: &str) -> Vector {
        let d = self.dims;
        let mut vec = vec![0.0f32; d];

        self.add_unigrams(&mut vec, outline, 0, d / 4);
        self.add_bigrams(&mut vec, outline, d / 4, d / 4);
        self.add_control_flow(&mut vec, outline, d / 2, d / 8);

        let idiom_offset = d / 2 + d / 8;
        let idiom_dims = d / 8;
        match outline.language {
            Language::Sql => self.add_idioms(&mut vec, idiom_offset, idiom_dims, "sql", &sql_idioms(content)),
            Language::Shell => self.add_idioms(&mut vec, idiom_offset, idiom_dims, "sh", &shell_idioms(content)),
            Language::Markdown | Language::Text => {
                self.add_prose_markers(&mut vec, outline, idiom_offset, idiom_dims)
            }
            _ => self.add_idioms(&mut vec, idiom_offset, idiom_dims, "code", &code_idioms(content)),
        }

        self.add_metrics(&mut vec, outline, d - 48, 32);
        add_kind_one_hot(&mut vec, outline.kind, d - 16);

        let mut vector = Vector(vec);
        vector.normalize();
        vector
    }

    fn add_unigrams(&self, vec: &mut [f32], outline: &Outline, offset: usize, dims: usize) {
        let mut counts: rustc_hash::FxHashMap<&str, usize> = Default::default();
        for node in &outline.nodes {
            if node.depth <= self.max_depth {
                *counts.entry(node.kind).or_default() += 1;
            }
        }
        for (kind, count) in counts {
            self.hasher.add(vec, offset, dims, kind, count as f32);
        }
    }

    fn add_bigrams(&self, vec: &mut [f32], outline: &Outline, offset: usize, dims: usize) {
        for pair in outline.nodes.windows(2) {
            if pair[0].depth > self.max_depth || pair[1].depth > self.max_depth {
                continue;
            }
            let bigram = format!("{}>{}", pair[0].kind, pair[1].kind);
            self.hasher.add(vec, offset, dims, &bigram, 1.0);
        }
    }

    fn add_control_flow(&self, vec: &mut [f32], outline: &Outline, offset: usize, dims: usize) {
        let cf: Vec<&str> = outline
            .nodes
            .iter()
            .filter(|n| {
                matches!(
                    n.kind,
                    "if" | "for" | "loop" | "switch" | "case" | "return" | "defer" | "spawn"
                )
            })
            .map(|n| n.kind)
            .collect();

        let half = dims / 2;
        let mut counts: rustc_hash::FxHashMap<&str, usize> = Default::default();
        for kind in &cf {
            *counts.entry(*kind).or_default() += 1;
        }
        for (kind, count) in &counts {
            let name = format!("cf:{kind}");
            self.hasher.add_unsigned(vec, offset, half, &name, *count as f32);
        }
        for pair in cf.windows(2) {
            let name = format!("cfseq:{}>{}", pair[0], pair[1]);
            self.hasher.add_unsigned(vec, offset + half, half - 8, &name, 1.0);
        }

        // Named pattern slots at the tail of the control-flow slice.
        let tail = offset + dims - 8;
        let nested_if = cf.windows(2).filter(|w| w[0] == "if" && w[1] == "if").count();
        let loop_break = cf.windows(2).filter(|w| w[0] == "for" || w[0] == "loop").count();
        let patterns = [
            nested_if as f32,
            loop_break as f32,
            counts.get("defer").copied().unwrap_or(0) as f32,
            counts.get("spawn").copied().unwrap_or(0) as f32,
            counts.get("return").copied().unwrap_or(0) as f32,
        ];
        for (i, value) in patterns.iter().enumerate() {
            if *value > 0.0 {
                vec[tail + i] = sigmoid(value / 3.0);
            }
        }
    }

    fn add_idioms(&self, vec: &mut [f32], offset: usize, dims: usize, prefix: &str, idioms: &[(&str, f32)]) {
        for (name, count) in idioms {
            if *count <= 0.0 {
                continue;
            }
            let key = format!("{prefix}:{name}");
            let idx = offset + self.hasher.index(&key, dims);
            vec[idx] += sigmoid(count / 2.0);
        }
    }

    fn add_prose_markers(&self, vec: &mut [f32], outline: &Outline, offset: usize, dims: usize) {
        let markers: [(&str, f32); 4] = [
            ("heading_level", outline.heading_level as f32 / 6.0),
            ("list_items", sigmoid(outline.list_items as f32 / 5.0)),
            ("table_rows", sigmoid(outline.table_rows as f32 / 5.0)),
            (
                "paragraphs",
                sigmoid(outline.nodes.iter().filter(|n| n.kind == "paragraph").count() as f32 / 5.0),
            ),
        ];
        for (name, value) in markers {
            if value > 0.0 {
                let idx = offset + self.hasher.index(&format!("prose:{name}"), dims);
                vec[idx] += value;
            }
        }
    }

    fn add_metrics(&self, vec: &mut [f32], outline: &Outline, offset: usize, _dims: usize) {
        vec[offset] = sigmoid(outline.line_count as f32 / 50.0);
        vec[offset + 1] = sigmoid(outline.nodes.len() as f32 / 100.0);
        vec[offset + 2] = outline.max_depth.min(self.max_depth) as f32 / self.max_depth as f32;

        let total_depth: usize = outline.nodes.iter().map(|n| n.depth).sum();
        if !outline.nodes.is_empty() {
            vec[offset + 3] =
                total_depth as f32 / outline.nodes.len() as f32 / self.max_depth as f32;
        }

        vec[offset + 4] = sigmoid(outline.imports.len() as f32 / 10.0);
        vec[offset + 5] = sigmoid(outline.calls.len() as f32 / 15.0);

        let unique_calls: rustc_hash::FxHashSet<&String> = outline.calls.iter().collect();
        if !outline.calls.is_empty() {
            vec[offset + 6] = unique_calls.len() as f32 / outline.calls.len() as f32;
        }

        let branches = outline
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, "if" | "for" | "loop" | "switch" | "case"))
            .count();
        vec[offset + 7] = sigmoid(branches as f32 / 10.0);

        let unique_kinds: rustc_hash::FxHashSet<&str> =
            outline.nodes.iter().map(|n| n.kind).collect();
        vec[offset + 8] = unique_kinds.len() as f32 / 30.0;
        if !outline.nodes.is_empty() {
            vec[offset + 9] = unique_kinds.len() as f32 / outline.nodes.len() as f32;
        }

        vec[offset + 10] = sigmoid(outline.param_count as f32 / 5.0);
        let returns = outline.nodes.iter().filter(|n| n.kind == "return").count();
        vec[offset + 11] = sigmoid(returns as f32 / 5.0);
        if outline.kind == UnitKind::Method {
            vec[offset + 12] = 1.0;
        }
    }
}

fn add_kind_one_hot(vec: &mut [f32], kind: UnitKind, offset: usize) {
    vec[offset + kind.one_hot_index()] = 1.0;
    match kind {
        UnitKind::Function | UnitKind::Method => vec[offset + 8] = 1.0,
        UnitKind::Struct | UnitKind::Interface | UnitKind::Type => vec[offset + 9] = 1.0,
        UnitKind::Const | UnitKind::Var => vec[offset + 10] = 1.0,
        UnitKind::Snippet => {}
    }
}

fn count(content: &str, needle: &str) -> f32 {
    content.matches(needle).count() as f32
}

/// Error handling, concurrency and test idioms for Go/Rust-shaped code.
fn code_idioms(content: &str) -> Vec<(&'static str, f32)> {
    vec![
        ("err_check", count(content, "err != nil") + count(content, ".is_err()")),
        ("err_return", count(content, "return err") + count(content, "?;")),
        ("err_wrap", count(content, "%w") + count(content, "map_err")),
        ("panic", count(content, "panic(") + count(content, "panic!") + count(content, "unwrap()")),
        ("channel", count(content, "make(chan") + count(content, "<-") + count(content, "channel")),
        ("mutex", count(content, ".Lock()") + count(content, ".lock()")),
        ("context", count(content, "ctx") + count(content, "context.")),
        ("nil_check", count(content, "== nil") + count(content, "!= nil") + count(content, "is_none()") + count(content, "is_some()")),
        ("append", count(content, "append(") + count(content, ".push(")),
        ("closure", count(content, "func(") + count(content, "|_|") + count(content, "=> ")),
        ("test_assert", count(content, "t.Error") + count(content, "t.Fatal") + count(content, "assert")),
        ("defer_close", if content.contains("Close") { count(content, "defer") } else { 0.0 }),
    ]
}

/// Query-shape fingerprints for SQL.
fn sql_idioms(content: &str) -> Vec<(&'static str, f32)> {
    let upper = content.to_uppercase();
    let c = |needle: &str| upper.matches(needle).count() as f32;
    vec![
        ("select_star", c("SELECT *")),
        ("distinct", c("DISTINCT")),
        ("subquery", c("(SELECT")),
        ("cte", if upper.trim_start().starts_with("WITH") { 1.0 } else { 0.0 }),
        ("inner_join", c("INNER JOIN")),
        ("left_join", c("LEFT JOIN")),
        ("multi_join", if c("JOIN") >= 3.0 { 1.0 } else { 0.0 }),
        ("group_by", c("GROUP BY")),
        ("having", c("HAVING")),
        ("window_fn", c("OVER(") + c("OVER (")),
        ("where_in", c(" IN (")),
        ("like", c(" LIKE ")),
        ("null_check", c("IS NULL") + c("IS NOT NULL")),
        ("case_when", c("CASE WHEN")),
        ("insert_select", if upper.contains("SELECT") { c("INSERT INTO") } else { 0.0 }),
        ("upsert", c("ON CONFLICT")),
        ("ddl", c("CREATE TABLE") + c("CREATE INDEX")),
        ("transaction", c("BEGIN") + c("COMMIT") + c("ROLLBACK")),
        ("guarded_delete", if upper.contains("WHERE") { c("DELETE FROM") } else { 0.0 }),
    ]
}

/// Redirection, piping and safety idioms for shell.
fn shell_idioms(content: &str) -> Vec<(&'static str, f32)> {
    vec![
        ("pipe", count(content, "|") - count(content, "||") * 2.0),
        ("and_list", count(content, "&&")),
        ("or_list", count(content, "||")),
        ("cmd_subst", count(content, "$(")),
        ("append_redirect", count(content, ">>")),
        ("stderr_redirect", count(content, "2>")),
        ("heredoc", count(content, "<<")),
        ("param_expansion", count(content, "${")),
        ("default_value", count(content, ":-")),
        ("test_bracket", count(content, "[ ") + count(content, "[[ ")),
        ("exit_code", count(content, "$?")),
        ("set_strict", count(content, "set -e") + count(content, "set -u") + count(content, "set -o")),
        ("trap", count(content, "trap ")),
        ("local_var", count(content, "local ")),
        ("array", count(content, "[@]") + count(content, "=(")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::Outline;

    const GO_ADD: &str = "func Add(a, b int) int { return a + b }\n";

    fn vectorize(content: &str, lang: Language, kind: Option<&str>) -> Vector {
        let outline = Outline::scan(content, lang, kind);
        StructureVectorizer::new(256, 42).vectorize(&outline, content)
    }

    #[test]
    fn output_is_unit_norm() {
        let v = vectorize(GO_ADD, Language::Go, Some("function"));
        assert_eq!(v.len(), 256);
        assert!((v.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn deterministic() {
        let a = vectorize(GO_ADD, Language::Go, Some("function"));
        let b = vectorize(GO_ADD, Language::Go, Some("function"));
        assert_eq!(a, b);
    }

    #[test]
    fn kind_one_hot_set() {
        let outline = Outline::scan(GO_ADD, Language::Go, Some("function"));
        let v = StructureVectorizer::new(256, 42).vectorize(&outline, GO_ADD);
        // One-hot tail is at D-16; function is slot 0, callable flag slot 8.
        assert!(v.0[256 - 16] > 0.0);
        assert!(v.0[256 - 16 + 8] > 0.0);
    }

    #[test]
    fn similar_code_scores_higher_than_different_domain() {
        let add = vectorize(GO_ADD, Language::Go, Some("function"));
        let sub = vectorize(
            "func Sub(a, b int) int { return a - b }\n",
            Language::Go,
            Some("function"),
        );
        let query = vectorize(
            "SELECT COUNT(*) FROM t GROUP BY a HAVING COUNT(*) > 1",
            Language::Sql,
            None,
        );
        let close = crate::vector::cosine(add.as_slice(), sub.as_slice());
        let far = crate::vector::cosine(add.as_slice(), query.as_slice());
        assert!(close > far);
    }

    #[test]
    fn prose_markers_fill_idiom_slice() {
        let v = vectorize("# Title\n\n- a\n- b\n\ntext\n", Language::Markdown, None);
        assert!((v.norm() - 1.0).abs() < 1e-5);
    }
}
