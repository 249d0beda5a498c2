//! Shared parsed-module cache
//!
//! Parsed ASTs are immutable, so one cache can back any number of
//! concurrently running evaluators. Evaluated module objects are NOT shared
//! here; the object graph carries interior mutability and stays local to one
//! evaluator.

use std::sync::Arc;

use dashmap::DashMap;

/// Process-wide cache of parsed modules, keyed by resolved URI.
///
/// Concurrent first-time insertion under the same key is last-writer-wins;
/// both writers hold an equivalent parse of the same source, so readers see
/// a complete module either way.
#[derive(Debug, Default, Clone)]
pub struct ModuleCache {
    parsed: Arc<DashMap<String, Arc<marl_ast::Module>>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Option<Arc<marl_ast::Module>> {
        self.parsed.get(uri).map(|entry| Arc::clone(&entry))
    }

    pub fn insert(&self, uri: impl Into<String>, module: Arc<marl_ast::Module>) {
        self.parsed.insert(uri.into(), module);
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.parsed.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.parsed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marl_ast::builder;

    #[test]
    fn clones_share_entries() {
        let cache = ModuleCache::new();
        let clone = cache.clone();
        cache.insert("repl:a", Arc::new(builder::module(vec![])));
        assert!(clone.contains("repl:a"));
    }

    #[test]
    fn get_returns_same_arc() {
        let cache = ModuleCache::new();
        let module = Arc::new(builder::module(vec![]));
        cache.insert("file:///m.marl", Arc::clone(&module));
        let got = cache.get("file:///m.marl").unwrap();
        assert!(Arc::ptr_eq(&got, &module));
    }
}
