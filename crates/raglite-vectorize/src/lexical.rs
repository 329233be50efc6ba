//! Lexical layer: what things are called.
//!
//! TF-IDF over identifier subwords after camelCase/snake_case splitting.
//! Slice layout for D dims: [0, D-64) hashed TF-IDF terms, [D-64, D-32)
//! domain vocabulary buckets, [D-32, D) naming-convention ratios.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::hashing::FeatureHasher;
use crate::sigmoid;
use crate::vector::Vector;

pub struct LexicalVectorizer {
    dims: usize,
    min_token_len: usize,
    hasher: FeatureHasher,
    idf: FxHashMap<String, f32>,
    doc_count: usize,
}

impl LexicalVectorizer {
    pub fn new(dims: usize, seed: u64) -> Self {
        Self {
            dims: dims.max(128),
            min_token_len: 2,
            hasher: FeatureHasher::new(seed),
            idf: FxHashMap::default(),
            doc_count: 0,
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Build IDF scores over a corpus of contents. Optional; without it
    /// every term scores IDF = 1.
    pub fn build_idf<'a, I>(&mut self, contents: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut doc_freq: FxHashMap<String, usize> = FxHashMap::default();
        let mut docs = 0usize;
        for content in contents {
            docs += 1;
            let tokens = self.tokenize(&extract_identifiers(content));
            let mut seen = FxHashSet::default();
            for tok in tokens {
                if seen.insert(tok.clone()) {
                    *doc_freq.entry(tok).or_default() += 1;
                }
            }
        }
        self.doc_count = docs;
        self.idf = doc_freq
            .into_iter()
            .map(|(tok, df)| {
                let idf = ((docs + 1) as f32 / (df + 1) as f32).ln();
                (tok, idf)
            })
            .collect();
    }

    pub fn vectorize(&self, content: &str) -> Vector {
        let d = self.dims;
        let mut vec = vec![0.0f32; d];
        let term_dims = d - 64;

        let identifiers = extract_identifiers(content);
        let tokens = self.tokenize(&identifiers);

        let mut tf: FxHashMap<&str, usize> = FxHashMap::default();
        for tok in &tokens {
            *tf.entry(tok.as_str()).or_default() += 1;
        }
        let total = tokens.len().max(1) as f32;

        for (tok, count) in &tf {
            let tf_score = *count as f32 / total;
            let idf_score = self.idf.get(*tok).copied().unwrap_or(1.0);
            self.hasher.add(&mut vec, 0, term_dims, tok, tf_score * idf_score);
        }

        self.add_domain_features(&mut vec, &tf, d - 64);
        add_naming_features(&mut vec, &identifiers, d - 32);

        let mut vector = Vector(vec);
        vector.normalize();
        vector
    }

    fn tokenize(&self, identifiers: &[String]) -> Vec<String> {
        let mut tokens = Vec::new();
        for ident in identifiers {
            for subword in split_identifier(ident) {
                let lower = subword.to_lowercase();
                if lower.len() >= self.min_token_len {
                    tokens.push(lower);
                }
            }
        }
        tokens
    }

    fn add_domain_features(&self, vec: &mut [f32], tf: &FxHashMap<&str, usize>, offset: usize) {
        for (i, (_, vocab)) in DOMAINS.iter().enumerate() {
            let matches = vocab.iter().filter(|w| tf.contains_key(**w)).count();
            if matches > 0 {
                vec[offset + i] = matches as f32 / vocab.len() as f32;
            }
        }
    }
}

/// Domain vocabulary buckets, one reserved slot each.
const DOMAINS: &[(&str, &[&str])] = &[
    ("http", &["http", "request", "response", "handler", "server", "client", "url", "header", "route", "api"]),
    ("db", &["db", "database", "query", "sql", "row", "column", "table", "insert", "update", "select", "transaction", "commit"]),
    ("io", &["file", "read", "write", "buffer", "stream", "reader", "writer", "open", "close", "path", "dir"]),
    ("error", &["error", "err", "panic", "recover", "fatal", "warn", "log", "debug", "trace"]),
    ("async", &["goroutine", "channel", "chan", "mutex", "lock", "unlock", "wait", "sync", "async", "spawn", "thread"]),
    ("test", &["test", "assert", "expect", "mock", "stub", "bench", "fixture"]),
    ("crypto", &["hash", "encrypt", "decrypt", "sign", "verify", "key", "token", "secret", "digest"]),
    ("serde", &["json", "marshal", "unmarshal", "encode", "decode", "serialize", "deserialize", "parse"]),
];

/// Pull identifier-shaped tokens out of source text, skipping keywords.
fn extract_identifiers(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in content.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            current.push(c);
        } else if !current.is_empty() {
            let ident = std::mem::take(&mut current);
            if !ident.chars().next().unwrap().is_ascii_digit() && !is_keyword(&ident) {
                out.push(ident);
            }
        }
    }
    if !current.is_empty() && !is_keyword(&current) {
        out.push(current);
    }
    out
}

/// Split camelCase and snake_case identifiers into subwords.
fn split_identifier(s: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = s.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            if !current.is_empty() {
                result.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            if prev.is_lowercase() && !current.is_empty() {
                result.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        result.push(current);
    }
    result
}

fn add_naming_features(vec: &mut [f32], identifiers: &[String], offset: usize) {
    if identifiers.is_empty() {
        return;
    }
    let total = identifiers.len() as f32;
    let mut camel = 0usize;
    let mut snake = 0usize;
    let mut all_caps = 0usize;
    let mut short = 0usize;
    let mut total_len = 0usize;

    for id in identifiers {
        total_len += id.len();
        if id.contains('_') {
            snake += 1;
        } else if id.chars().any(|c| c.is_uppercase()) && id.chars().any(|c| c.is_lowercase()) {
            camel += 1;
        }
        if id.len() > 1 && id.chars().all(|c| !c.is_lowercase()) {
            all_caps += 1;
        }
        if id.len() <= 3 {
            short += 1;
        }
    }

    vec[offset] = camel as f32 / total;
    vec[offset + 1] = snake as f32 / total;
    vec[offset + 2] = all_caps as f32 / total;
    vec[offset + 3] = short as f32 / total;
    vec[offset + 4] = sigmoid(total_len as f32 / total / 10.0);
    vec[offset + 5] = sigmoid(total / 20.0);
}

fn is_keyword(s: &str) -> bool {
    matches!(
        s,
        "break" | "case" | "chan" | "const" | "continue" | "default" | "defer" | "else"
            | "fallthrough" | "for" | "func" | "go" | "goto" | "if" | "import" | "interface"
            | "map" | "package" | "range" | "return" | "select" | "struct" | "switch" | "type"
            | "var" | "true" | "false" | "nil" | "fn" | "let" | "mut" | "impl" | "trait"
            | "pub" | "use" | "mod" | "match" | "loop" | "while" | "enum" | "ref" | "self"
            | "Self" | "crate" | "super" | "async" | "await" | "dyn" | "move" | "static"
            | "where" | "def" | "class" | "lambda" | "None" | "True" | "False" | "int"
            | "string" | "bool" | "byte" | "error" | "make" | "new" | "len" | "cap"
            | "append" | "usize" | "u32" | "u64" | "i32" | "i64" | "f32" | "f64"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_camel_and_snake() {
        assert_eq!(split_identifier("parseFileName"), vec!["parse", "File", "Name"]);
        assert_eq!(split_identifier("snake_case_name"), vec!["snake", "case", "name"]);
        assert_eq!(split_identifier("HTTPServer"), vec!["HTTPServer"]);
    }

    #[test]
    fn output_is_unit_norm_and_deterministic() {
        let v = LexicalVectorizer::new(128, 42);
        let a = v.vectorize("func ReadFile(path string) ([]byte, error)");
        let b = v.vectorize("func ReadFile(path string) ([]byte, error)");
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        assert!((a.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_content_is_zero_vector() {
        let v = LexicalVectorizer::new(128, 42);
        let out = v.vectorize("");
        assert!(out.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn shared_vocabulary_raises_similarity() {
        let v = LexicalVectorizer::new(128, 42);
        let a = v.vectorize("readFile writeFile openFile closeFile");
        let b = v.vectorize("readFile writeFile flushBuffer");
        let c = v.vectorize("renderTemplate layoutWidget paintCanvas");
        let ab = crate::vector::cosine(a.as_slice(), b.as_slice());
        let ac = crate::vector::cosine(a.as_slice(), c.as_slice());
        assert!(ab > ac);
    }

    #[test]
    fn idf_downweights_ubiquitous_terms() {
        let mut v = LexicalVectorizer::new(128, 42);
        let docs = [
            "common_term alpha",
            "common_term beta",
            "common_term gamma",
            "common_term delta",
        ];
        v.build_idf(docs.iter().copied());
        let rare = v.idf.get("alpha").copied().unwrap_or(1.0);
        let common = v.idf.get("common").copied().unwrap_or(1.0);
        assert!(rare > common);
    }

    #[test]
    fn domain_bucket_fires() {
        let v = LexicalVectorizer::new(128, 42);
        let out = v.vectorize("query insert update select row table");
        // db bucket is slot 1 of the domain slice at D-64.
        assert!(out.0[128 - 64 + 1] > 0.0);
    }
}
