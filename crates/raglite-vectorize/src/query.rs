//! Query-side vectorization and expansion.
//!
//! The search workflow needs one vector per layer for the query text, plus
//! the tokenized/expanded form that feeds the full-text filter.

use rustc_hash::FxHashMap;

use crate::contextual::ContextualVectorizer;
use crate::graph::CallGraph;
use crate::lexical::LexicalVectorizer;
use crate::outline::{Language, Outline};
use crate::structure::StructureVectorizer;
use crate::vector::Vector;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "for", "from", "how", "in", "is",
    "it", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when", "where",
    "which", "with",
];

/// Code-aware related terms, applied to short query tokens.
fn synonyms(word: &str) -> &'static [&'static str] {
    match word {
        "auth" => &["authentication", "authorization", "login", "session"],
        "db" => &["database", "sql", "query", "schema"],
        "api" => &["endpoint", "route", "handler", "rest"],
        "test" => &["spec", "assertion", "mock", "fixture"],
        "err" => &["error", "failure", "panic"],
        "config" => &["configuration", "settings", "env"],
        "cache" => &["caching", "memoize", "ttl"],
        "log" => &["logging", "trace", "debug"],
        "async" => &["concurrent", "parallel", "spawn"],
        "fn" | "func" => &["function", "method"],
        "add" => &["sum", "plus"],
        _ => &[],
    }
}

/// Tokenize a query: lowercase, drop stopwords, append synonyms for terms
/// that have them. Returns the terms for the FTS MATCH expression.
pub fn expand_query(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in query.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if word.len() < 2 {
            continue;
        }
        let lower = word.to_lowercase();
        if STOPWORDS.contains(&lower.as_str()) {
            continue;
        }
        if !terms.contains(&lower) {
            terms.push(lower.clone());
        }
        for syn in synonyms(&lower) {
            let syn = syn.to_string();
            if !terms.contains(&syn) {
                terms.push(syn);
            }
        }
    }
    terms
}

/// Render expanded terms as an FTS5 MATCH expression (OR of quoted terms).
pub fn fts_match_expr(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Per-layer query vectors. The query is treated as a snippet: outlined for
/// the structure layer, tokenized for the lexical layer, and its terms
/// stand in for call names on the contextual layer.
pub fn query_vectors(
    query: &str,
    structure: &StructureVectorizer,
    lexical: &LexicalVectorizer,
    contextual: &ContextualVectorizer,
) -> FxHashMap<String, Vector> {
    let mut out = FxHashMap::default();

    let outline = Outline::scan(query, Language::Other, None);
    out.insert(
        "structure".to_string(),
        structure.vectorize(&outline, query),
    );
    out.insert("lexical".to_string(), lexical.vectorize(query));

    // A one-node graph whose outgoing calls are the query terms.
    let terms = expand_query(query);
    let graph = CallGraph::build(vec![(
        "_query".to_string(),
        "_query".to_string(),
        terms,
        Vec::new(),
    )]);
    out.insert(
        "contextual".to_string(),
        contextual.vectorize(Some("_query"), &graph),
    );

    out
}
