//! Extractor contract and registry.
//!
//! Extractors turn raw file bytes into a finite, non-restartable sequence
//! of segments. Binary-format extractors (PDF, Office) plug in behind the
//! same trait; the built-ins cover source code and plain text/markdown.

pub mod code;
pub mod text;

use rustc_hash::FxHashMap;

use raglite_core::errors::ExtractError;
use raglite_core::types::Segment;

/// A lazy, finite, non-restartable sequence of segments.
pub type SegmentIter = Box<dyn Iterator<Item = Result<Segment, ExtractError>> + Send>;

/// The narrow contract every extractor satisfies.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn supported_types(&self) -> &[&str];

    /// Produce segments from raw content. The iterator's lifetime is the
    /// consuming step; it is drained exactly once.
    fn extract(
        &self,
        file_id: &str,
        content: &[u8],
        config: &serde_json::Value,
    ) -> Result<SegmentIter, ExtractError>;
}

/// Process-local extractor registry, populated at startup.
#[derive(Default)]
pub struct Registry {
    extractors: FxHashMap<String, Box<dyn Extractor>>,
    mime_map: FxHashMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in extractors.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(code::CodeExtractor::new()));
        registry.register(Box::new(text::TextExtractor::new()));
        registry
    }

    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        for mime in extractor.supported_types() {
            self.mime_map
                .insert((*mime).to_string(), extractor.name().to_string());
        }
        self.extractors
            .insert(extractor.name().to_string(), extractor);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Extractor> {
        self.extractors.get(name).map(|e| e.as_ref())
    }

    pub fn for_mime(&self, mime_type: &str) -> Option<&dyn Extractor> {
        self.mime_map
            .get(mime_type)
            .and_then(|name| self.get(name))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.extractors.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Deterministic segment id: file id, extractor and position.
pub(crate) fn segment_id(file_id: &str, extractor: &str, position: i64) -> String {
    raglite_core::hash::sha256_str(&format!("{file_id}:{extractor}:{position}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = Registry::with_builtins();
        assert!(registry.get("code").is_some());
        assert!(registry.get("text").is_some());
        assert!(registry.get("pdf").is_none());
        assert_eq!(registry.names(), vec!["code", "text"]);
    }

    #[test]
    fn mime_dispatch() {
        let registry = Registry::with_builtins();
        assert_eq!(registry.for_mime("text/x-go").unwrap().name(), "code");
        assert_eq!(registry.for_mime("text/markdown").unwrap().name(), "text");
        assert!(registry.for_mime("application/pdf").is_none());
    }
}
