//! In-process execution cache shared by all steps of one engine.
//!
//! Some steps (markdown rendering, anything that parses or transforms large
//! content) are expensive and deterministic: given the same document, they
//! produce the same result. In watch mode the engine re-executes every
//! pipeline on each change, so this cache lets those steps skip work for
//! documents that did not change between runs.
//!
//! # Design
//!
//! The cache is a concurrent map from string keys to type-erased shared
//! values. Steps pick the value type; readers downcast with
//! [`ExecutionCache::get_as`]. A value stored under a key with a different
//! type reads as a miss.
//!
//! ## Cache keys
//!
//! A key is either a plain string chosen by the step, or a [`Document`]. A
//! document key is **content-addressed**: SHA-256 over the document source, a
//! NUL separator and the content bytes. Renaming a file therefore invalidates
//! its entry, and identical content under the same source hits even though
//! the document value is new on every run. Both kinds of key share one
//! namespace; hex digests do not collide with readable step keys in practice.
//!
//! ## Lifetime
//!
//! Entries live as long as the engine and are never expired. There is no
//! on-disk format. With `no_cache` the engine uses [`ExecutionCache::disabled`],
//! where every lookup misses and every write is dropped.

use crate::document::{Document, DocumentError};
use sha2::{Digest, Sha256};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Type-erased cached value.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// A cache key: a step-chosen string or a document fingerprint.
#[derive(Debug, Clone, Copy)]
pub enum CacheKey<'a> {
    Text(&'a str),
    Document(&'a Document),
}

impl<'a> From<&'a str> for CacheKey<'a> {
    fn from(key: &'a str) -> Self {
        CacheKey::Text(key)
    }
}

impl<'a> From<&'a String> for CacheKey<'a> {
    fn from(key: &'a String) -> Self {
        CacheKey::Text(key)
    }
}

impl<'a> From<&'a Document> for CacheKey<'a> {
    fn from(doc: &'a Document) -> Self {
        CacheKey::Document(doc)
    }
}

impl CacheKey<'_> {
    /// The string the entry is stored under. Document keys read content.
    pub fn resolve(&self) -> Result<String, DocumentError> {
        match self {
            CacheKey::Text(key) => Ok((*key).to_string()),
            CacheKey::Document(doc) => document_fingerprint(doc),
        }
    }
}

/// SHA-256 of a document's source and content, returned as a hex string.
pub fn document_fingerprint(doc: &Document) -> Result<String, DocumentError> {
    let content = doc.content()?;
    let mut hasher = Sha256::new();
    hasher.update(doc.source().as_bytes());
    hasher.update(b"\0");
    hasher.update(content.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

pub struct ExecutionCache {
    enabled: bool,
    entries: RwLock<HashMap<String, CachedValue>>,
    hits: AtomicU32,
    misses: AtomicU32,
}

impl ExecutionCache {
    pub fn new() -> Self {
        Self::with_enabled(true)
    }

    /// A pass-through cache: lookups miss, writes are discarded.
    pub fn disabled() -> Self {
        Self::with_enabled(false)
    }

    fn with_enabled(enabled: bool) -> Self {
        Self {
            enabled,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU32::new(0),
            misses: AtomicU32::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn contains<'k>(&self, key: impl Into<CacheKey<'k>>) -> Result<bool, DocumentError> {
        if !self.enabled {
            return Ok(false);
        }
        let key = key.into().resolve()?;
        Ok(self.read().contains_key(&key))
    }

    /// Look up a value, counting the lookup as a hit or a miss.
    pub fn get<'k>(&self, key: impl Into<CacheKey<'k>>) -> Result<Option<CachedValue>, DocumentError> {
        let found = if self.enabled {
            let key = key.into().resolve()?;
            self.read().get(&key).cloned()
        } else {
            None
        };
        self.record(found.is_some());
        Ok(found)
    }

    /// Typed lookup. A value of another type counts as a miss.
    pub fn get_as<'k, T: Any + Send + Sync>(
        &self,
        key: impl Into<CacheKey<'k>>,
    ) -> Result<Option<Arc<T>>, DocumentError> {
        let found = if self.enabled {
            let key = key.into().resolve()?;
            self.read()
                .get(&key)
                .and_then(|value| Arc::clone(value).downcast::<T>().ok())
        } else {
            None
        };
        self.record(found.is_some());
        Ok(found)
    }

    /// Store a value. Last writer wins.
    pub fn set<'k, T: Any + Send + Sync>(
        &self,
        key: impl Into<CacheKey<'k>>,
        value: T,
    ) -> Result<(), DocumentError> {
        if !self.enabled {
            return Ok(());
        }
        let key = key.into().resolve()?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::new(value));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit/miss counters accumulated since creation or the last reset.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Zero the counters. Entries are kept.
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, CachedValue>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ExecutionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionCache")
            .field("enabled", &self.enabled)
            .field("entries", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Summary of cache lookups for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} computed ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} computed", self.misses)
        }
    }
}
