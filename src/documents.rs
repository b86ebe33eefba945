//! Cross-pipeline document access and lookup helpers.
//!
//! [`DocumentCollection`] holds the final outputs of every pipeline that has
//! finished in the current run, keyed by pipeline name in execution order.
//! Steps read it through [`ExecutionContext::documents`](crate::context::ExecutionContext::documents);
//! only the engine writes to it.
//!
//! The lookup helpers index a document list by a metadata key. Multi-valued
//! keys (lists) put the document under every value they contain, and values
//! go through the usual metadata conversion, so `"4"` and `4` land under the
//! same integer key.

use crate::document::Document;
use crate::metadata::FromValue;
use std::collections::HashMap;
use std::hash::Hash;

/// Final outputs of finished pipelines, in execution order.
#[derive(Debug, Default, Clone)]
pub struct DocumentCollection {
    pipelines: Vec<(String, Vec<Document>)>,
}

impl DocumentCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outputs of one pipeline, `None` if it has not finished this run.
    pub fn get(&self, pipeline: &str) -> Option<&[Document]> {
        self.pipelines
            .iter()
            .find(|(name, _)| name == pipeline)
            .map(|(_, docs)| docs.as_slice())
    }

    /// Record (or replace) the outputs of a pipeline.
    pub(crate) fn insert(&mut self, pipeline: &str, docs: Vec<Document>) {
        match self.pipelines.iter_mut().find(|(name, _)| name == pipeline) {
            Some((_, existing)) => *existing = docs,
            None => self.pipelines.push((pipeline.to_string(), docs)),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.pipelines.clear();
    }

    pub fn pipeline_names(&self) -> impl Iterator<Item = &str> {
        self.pipelines.iter().map(|(name, _)| name.as_str())
    }

    /// Every recorded document across pipelines.
    pub fn all(&self) -> impl Iterator<Item = &Document> {
        self.pipelines.iter().flat_map(|(_, docs)| docs.iter())
    }

    /// Every recorded document outside the named pipeline.
    pub fn except<'a>(&'a self, pipeline: &'a str) -> impl Iterator<Item = &'a Document> + 'a {
        self.pipelines
            .iter()
            .filter(move |(name, _)| name != pipeline)
            .flat_map(|(_, docs)| docs.iter())
    }

    /// Number of recorded pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Index documents by the values under `key`.
///
/// A document appears once under each distinct value its key converts to.
/// Documents without the key, or whose value does not convert, are skipped.
/// Each bucket keeps input order.
pub fn to_lookup<K>(docs: &[Document], key: &str) -> HashMap<K, Vec<Document>>
where
    K: FromValue + Eq + Hash + Clone,
{
    let mut lookup: HashMap<K, Vec<Document>> = HashMap::new();
    for doc in docs {
        for k in distinct_keys::<K>(doc, key) {
            lookup.entry(k).or_default().push(doc.clone());
        }
    }
    lookup
}

/// Index the values under `value_key` by the values under `key`.
///
/// Like [`to_lookup`], but each bucket holds the converted `value_key`
/// value of the document instead of the document itself. Documents whose
/// `value_key` is missing or does not convert are skipped.
pub fn to_lookup_values<K, V>(docs: &[Document], key: &str, value_key: &str) -> HashMap<K, Vec<V>>
where
    K: FromValue + Eq + Hash + Clone,
    V: FromValue + Clone,
{
    let mut lookup: HashMap<K, Vec<V>> = HashMap::new();
    for doc in docs {
        let Ok(value) = doc.get_as::<V>(value_key) else {
            continue;
        };
        for k in distinct_keys::<K>(doc, key) {
            lookup.entry(k).or_default().push(value.clone());
        }
    }
    lookup
}

fn distinct_keys<K: FromValue + Eq + Clone>(doc: &Document, key: &str) -> Vec<K> {
    let Ok(keys) = doc.get_as::<Vec<K>>(key) else {
        return Vec::new();
    };
    let mut distinct: Vec<K> = Vec::with_capacity(keys.len());
    for k in keys {
        if !distinct.contains(&k) {
            distinct.push(k);
        }
    }
    distinct
}
