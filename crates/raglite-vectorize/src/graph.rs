//! Call graph over the chunks of one run.
//!
//! petgraph StableGraph keyed by symbol name; built once per vectorize
//! step, read by the contextual layer for degree/hub/authority metrics.

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::hashing::FeatureHasher;

/// A function-level node.
#[derive(Debug, Clone)]
pub struct SymbolNode {
    pub name: String,
    pub file_id: String,
}

/// Directed call graph plus the import lists that rode in with each symbol.
pub struct CallGraph {
    graph: StableDiGraph<SymbolNode, ()>,
    by_name: FxHashMap<String, NodeIndex>,
    imports: FxHashMap<String, Vec<String>>,
    /// Calls that never resolved to a node in this run (stdlib, external).
    unresolved: FxHashMap<String, Vec<String>>,
    co_located: FxHashMap<String, usize>,
}

impl CallGraph {
    /// Build from (symbol name, file id, calls, imports) tuples.
    pub fn build<I>(symbols: I) -> Self
    where
        I: IntoIterator<Item = (String, String, Vec<String>, Vec<String>)>,
    {
        let mut graph = StableDiGraph::new();
        let mut by_name: FxHashMap<String, NodeIndex> = FxHashMap::default();
        let mut pending: Vec<(String, Vec<String>)> = Vec::new();
        let mut imports = FxHashMap::default();
        let mut files: FxHashMap<String, Vec<String>> = FxHashMap::default();

        for (name, file_id, calls, import_list) in symbols {
            if name.is_empty() {
                continue;
            }
            by_name.entry(name.clone()).or_insert_with(|| {
                graph.add_node(SymbolNode {
                    name: name.clone(),
                    file_id: file_id.clone(),
                })
            });
            files.entry(file_id).or_default().push(name.clone());
            imports.insert(name.clone(), import_list);
            pending.push((name, calls));
        }

        let mut unresolved: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for (caller, calls) in pending {
            let from = by_name[&caller];
            for call in calls {
                // `pkg.Fn` resolves against the bare symbol too.
                let target = by_name
                    .get(&call)
                    .or_else(|| by_name.get(call.rsplit('.').next().unwrap_or(&call)));
                match target {
                    Some(&to) if to != from => {
                        graph.update_edge(from, to, ());
                    }
                    Some(_) => {}
                    None => unresolved.entry(caller.clone()).or_default().push(call),
                }
            }
        }

        // Symbols sharing a file co-occur; counted per symbol.
        let mut co_located = FxHashMap::default();
        for names in files.values() {
            if names.len() < 2 {
                continue;
            }
            for name in names {
                *co_located.entry(name.clone()).or_default() += names.len() - 1;
            }
        }

        Self {
            graph,
            by_name,
            imports,
            unresolved,
            co_located,
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn out_degree(&self, name: &str) -> usize {
        self.by_name
            .get(name)
            .map(|&idx| self.graph.neighbors_directed(idx, Direction::Outgoing).count())
            .unwrap_or(0)
    }

    pub fn in_degree(&self, name: &str) -> usize {
        self.by_name
            .get(name)
            .map(|&idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .unwrap_or(0)
    }

    pub fn callees(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    pub fn callers(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, dir: Direction) -> Vec<&str> {
        match self.by_name.get(name) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, dir)
                .map(|n| self.graph[n].name.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Calls from `name` that did not resolve inside the run.
    pub fn unresolved_calls(&self, name: &str) -> &[String] {
        self.unresolved.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn imports_of(&self, name: &str) -> &[String] {
        self.imports.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Symbols defined in the same file.
    pub fn co_located(&self, name: &str) -> usize {
        self.co_located.get(name).copied().unwrap_or(0)
    }

    /// Hub score: sum of the in-degrees of callees.
    pub fn hub_score(&self, name: &str) -> f64 {
        self.callees(name)
            .iter()
            .map(|c| self.in_degree(c) as f64)
            .sum()
    }

    /// Authority score: sum of the out-degrees of callers.
    pub fn authority_score(&self, name: &str) -> f64 {
        self.callers(name)
            .iter()
            .map(|c| self.out_degree(c) as f64)
            .sum()
    }

    /// Local clustering: how many callee pairs call each other.
    pub fn transitivity(&self, name: &str) -> f64 {
        let callees = self.callees(name);
        if callees.len() < 2 {
            return 0.0;
        }
        let callee_set: FxHashSet<&str> = callees.iter().copied().collect();
        let mut edges = 0usize;
        for callee in &callees {
            for second in self.callees(callee) {
                if callee_set.contains(second) && second != *callee {
                    edges += 1;
                }
            }
        }
        let possible = callees.len() * (callees.len() - 1);
        edges as f64 / possible as f64
    }

    /// Diversity of caller files.
    pub fn caller_file_spread(&self, name: &str) -> usize {
        let files: FxHashSet<&str> = match self.by_name.get(name) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|n| self.graph[n].file_id.as_str())
                .collect(),
            None => return 0,
        };
        files.len()
    }

    /// Order-independent signature of the local neighborhood.
    pub fn neighborhood_hash(&self, name: &str, hasher: &FeatureHasher) -> u64 {
        let mut callees: Vec<&str> = self.callees(name);
        callees.sort_unstable();
        let mut callers: Vec<&str> = self.callers(name);
        callers.sort_unstable();
        let mut acc = hasher.raw(name);
        for n in callees.iter().chain(callers.iter()) {
            acc = acc.rotate_left(7) ^ hasher.raw(n);
        }
        acc
    }
}
