//! Contextual layer: where a chunk sits in the call graph.
//!
//! Slice layout for D dims: [0, D/4) outgoing calls, [D/4, D/2) incoming
//! calls, [D/2, 3D/4) import histogram, [3D/4, D) graph metrics.

use crate::graph::CallGraph;
use crate::hashing::FeatureHasher;
use crate::sigmoid;
use crate::vector::Vector;

pub struct ContextualVectorizer {
    dims: usize,
    hasher: FeatureHasher,
}

const IMPORT_CATEGORIES: &[&str] = &[
    "net", "http", "io", "os", "fmt", "strings", "sync", "context", "json", "sql",
    "testing", "crypto", "time", "path",
];

impl ContextualVectorizer {
    pub fn new(dims: usize, seed: u64) -> Self {
        Self {
            dims: dims.max(128),
            hasher: FeatureHasher::new(seed),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Vectorize one symbol against the run's call graph. Unnamed chunks
    /// get the zero vector — they have no graph identity.
    pub fn vectorize(&self, name: Option<&str>, graph: &CallGraph) -> Vector {
        let d = self.dims;
        let mut vec = vec![0.0f32; d];
        let name = match name {
            Some(n) if !n.is_empty() => n,
            _ => return Vector(vec),
        };

        self.add_outgoing(&mut vec, name, graph, 0, d / 4);
        self.add_incoming(&mut vec, name, graph, d / 4, d / 4);
        self.add_imports(&mut vec, name, graph, d / 2, d / 4);
        self.add_graph_metrics(&mut vec, name, graph, 3 * d / 4);

        let mut vector = Vector(vec);
        vector.normalize();
        vector
    }

    fn add_outgoing(&self, vec: &mut [f32], name: &str, graph: &CallGraph, offset: usize, dims: usize) {
        let callees = graph.callees(name);
        let unresolved = graph.unresolved_calls(name);
        if callees.is_empty() && unresolved.is_empty() {
            return;
        }
        let half = dims / 2;
        for callee in &callees {
            self.hasher.add_unsigned(vec, offset, half, callee, 1.0);
        }
        for call in unresolved {
            self.hasher.add_unsigned(vec, offset, half, call, 1.0);
        }

        let stdlib = unresolved.iter().filter(|c| is_stdlib_call(c)).count();
        let external = unresolved.len() - stdlib;
        let internal = callees.len();
        let total = (internal + unresolved.len()).max(1);

        let cat = offset + half;
        vec[cat] = sigmoid(stdlib as f32 / 5.0);
        vec[cat + 1] = sigmoid(internal as f32 / 5.0);
        vec[cat + 2] = sigmoid(external as f32 / 5.0);
        vec[cat + 3] = sigmoid(total as f32 / 10.0);
    }

    fn add_incoming(&self, vec: &mut [f32], name: &str, graph: &CallGraph, offset: usize, dims: usize) {
        let callers = graph.callers(name);
        if callers.is_empty() {
            return;
        }
        let half = dims / 2;
        for caller in &callers {
            self.hasher.add_unsigned(vec, offset, half, caller, 1.0);
        }
        let metrics = offset + half;
        vec[metrics] = sigmoid(callers.len() as f32 / 10.0);
        vec[metrics + 1] = callers.len() as f32 / graph.len().max(1) as f32;
        vec[metrics + 2] = sigmoid(graph.caller_file_spread(name) as f32 / 5.0);
    }

    fn add_imports(&self, vec: &mut [f32], name: &str, graph: &CallGraph, offset: usize, dims: usize) {
        let imports = graph.imports_of(name);
        if imports.is_empty() {
            return;
        }
        let half = dims / 2;
        for category in IMPORT_CATEGORIES {
            let hits = imports.iter().filter(|i| i.contains(category)).count();
            if hits > 0 {
                let key = format!("import:{category}");
                self.hasher.add_unsigned(vec, offset, half, &key, hits as f32);
            }
        }
        let metrics = offset + half;
        vec[metrics] = sigmoid(imports.len() as f32 / 10.0);
        let stdlib = imports.iter().filter(|i| !i.contains('.') && !i.contains('/')).count();
        vec[metrics + 1] = stdlib as f32 / imports.len() as f32;
    }

    fn add_graph_metrics(&self, vec: &mut [f32], name: &str, graph: &CallGraph, offset: usize) {
        let out_degree = graph.out_degree(name) + graph.unresolved_calls(name).len();
        let in_degree = graph.in_degree(name);

        vec[offset] = sigmoid(out_degree as f32 / 10.0);
        vec[offset + 1] = sigmoid(in_degree as f32 / 10.0);
        if in_degree + out_degree > 0 {
            vec[offset + 2] = in_degree as f32 / (in_degree + out_degree) as f32;
        }
        vec[offset + 3] = sigmoid(graph.hub_score(name) as f32 / 20.0);
        vec[offset + 4] = sigmoid(graph.authority_score(name) as f32 / 20.0);
        vec[offset + 5] = sigmoid(graph.co_located(name) as f32 / 10.0);
        vec[offset + 6] = graph.transitivity(name) as f32;
        if out_degree == 0 {
            vec[offset + 7] = 1.0;
        }
        if in_degree == 0 {
            vec[offset + 8] = 1.0;
        }
        let hash = graph.neighborhood_hash(name, &self.hasher);
        vec[offset + 9] = (hash % 1000) as f32 / 1000.0;
    }
}

fn is_stdlib_call(call: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "fmt.", "strings.", "strconv.", "bytes.", "io.", "os.", "path.", "sync.", "context.",
        "time.", "math.", "sort.", "json.", "http.", "net.", "sql.", "log.", "errors.",
        "std::", "core::", "String::", "Vec::",
    ];
    PREFIXES.iter().any(|p| call.starts_with(p))
}
