//! Process-wide read-through caches
//!
//! Compiled regular expressions and compiled transforms are shared, read-mostly
//! state across unrelated stream instances. Caches are explicit, injectable
//! objects so tests can substitute fresh instances; process-wide singletons are
//! provided through `OnceLock` accessors. No eviction: entries live for the
//! process lifetime.

use crate::error::Result;
use regex::Regex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, OnceLock, RwLock};

/// Generic keyed cache with compile-once, read-through semantics.
///
/// Safe for concurrent reads from multiple threads; the value factory runs at
/// most once per key, under the write lock.
pub struct ReadThroughCache<K, V> {
    entries: RwLock<HashMap<K, Arc<V>>>,
}

impl<K: Eq + Hash + Clone, V> ReadThroughCache<K, V> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Look up `key`, compiling the value with `compile` on first use.
    pub fn get_or_compile<F>(&self, key: &K, compile: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(hit) = self.entries.read().expect("cache lock poisoned").get(key) {
            return Ok(Arc::clone(hit));
        }
        let mut entries = self.entries.write().expect("cache lock poisoned");
        // another thread may have compiled while we waited for the write lock
        if let Some(hit) = entries.get(key) {
            return Ok(Arc::clone(hit));
        }
        let value = Arc::new(compile()?);
        entries.insert(key.clone(), Arc::clone(&value));
        Ok(value)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone, V> Default for ReadThroughCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache of compiled regular expressions keyed by pattern string.
pub struct RegexCache {
    inner: ReadThroughCache<String, Regex>,
}

impl RegexCache {
    /// Create an empty pattern cache.
    pub fn new() -> Self {
        Self { inner: ReadThroughCache::new() }
    }

    /// The process-wide pattern cache.
    pub fn global() -> &'static RegexCache {
        static GLOBAL: OnceLock<RegexCache> = OnceLock::new();
        GLOBAL.get_or_init(RegexCache::new)
    }

    /// Look up or compile `pattern`.
    pub fn get(&self, pattern: &str) -> Result<Arc<Regex>> {
        self.inner
            .get_or_compile(&pattern.to_owned(), || Ok(Regex::new(pattern)?))
    }
}

impl Default for RegexCache {
    fn default() -> Self {
        Self::new()
    }
}
