//! Immutable, ordered document metadata.
//!
//! Every [`Document`] carries a [`Metadata`] store: an ordered mapping from
//! case-sensitive string keys to typed [`Value`]s. Stores are never mutated
//! once handed out. Adding keys produces a new store that *overlays* the old
//! one:
//!
//! ```text
//! base:    { Title: "Home", Layout: "page" }
//! overlay: { Title: "About" }
//! result:  { Title: "About", Layout: "page" }   ← Title shadowed, Layout inherited
//! ```
//!
//! The result shares the base layer through an `Arc`, so cloning a document
//! with a handful of new keys costs only those keys. Enumeration yields the
//! overlay's entries in insertion order, followed by inherited entries that
//! are not shadowed.
//!
//! ## Typed access
//!
//! Values are converted on read through [`FromValue`]. Conversions are
//! lenient in the directions a template author expects: `"42"` reads as an
//! integer, `3` reads as the string `"3"`, and a scalar reads as a
//! one-element list. That last rule is what lets multi-valued keys mix lists
//! and single values (see [`crate::documents::to_lookup`]).
//!
//! ## Chain depth
//!
//! Each overlay adds one layer. A long pipeline would otherwise build a deep
//! chain that every lookup walks, so once a chain exceeds [`MAX_CHAIN_DEPTH`]
//! layers the new store is flattened into a single layer. Flattening is
//! invisible to readers: it preserves enumeration order and values.

use crate::document::Document;
use std::any::Any;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Layers beyond this depth are flattened on the next overlay.
pub const MAX_CHAIN_DEPTH: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Metadata key not found: {0}")]
    Missing(String),
    #[error("Cannot convert metadata '{key}' from {found} to {expected}")]
    Conversion {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Well-known metadata keys written by the built-in steps.
///
/// The path keys are stable across a read → write round trip: a document read
/// from `input/Subfolder/a.md` and written as `.html` still reports
/// `RelativeFileDir = "Subfolder"`.
pub mod keys {
    pub const SOURCE_FILE_ROOT: &str = "SourceFileRoot";
    pub const SOURCE_FILE_BASE: &str = "SourceFileBase";
    pub const SOURCE_FILE_EXT: &str = "SourceFileExt";
    pub const SOURCE_FILE_NAME: &str = "SourceFileName";
    pub const SOURCE_FILE_DIR: &str = "SourceFileDir";
    pub const SOURCE_FILE_PATH: &str = "SourceFilePath";
    pub const SOURCE_FILE_PATH_BASE: &str = "SourceFilePathBase";
    pub const RELATIVE_FILE_PATH: &str = "RelativeFilePath";
    pub const RELATIVE_FILE_PATH_BASE: &str = "RelativeFilePathBase";
    pub const RELATIVE_FILE_DIR: &str = "RelativeFileDir";
    pub const DESTINATION_FILE_BASE: &str = "DestinationFileBase";
    pub const DESTINATION_FILE_EXT: &str = "DestinationFileExt";
    pub const DESTINATION_FILE_NAME: &str = "DestinationFileName";
    pub const DESTINATION_FILE_DIR: &str = "DestinationFileDir";
    pub const DESTINATION_FILE_PATH: &str = "DestinationFilePath";
    pub const DESTINATION_FILE_PATH_BASE: &str = "DestinationFilePathBase";
    pub const GROUP_KEY: &str = "GroupKey";
    pub const GROUP_DOCUMENTS: &str = "GroupDocuments";
}

// ============================================================================
// Values
// ============================================================================

/// A typed metadata payload.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    /// Ordered key/value pairs, e.g. a nested TOML table from front matter.
    Table(Vec<(String, Value)>),
    Document(Document),
    /// Opaque shared payload, read back with `get_as::<Arc<T>>`.
    Object(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Short name of the variant, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Table(_) => "table",
            Value::Document(_) => "document",
            Value::Object(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Wrap an arbitrary shared value.
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Value::Object(Arc::new(value))
    }

    /// Wrap a list of documents, e.g. the members of a group.
    pub fn documents(docs: impl IntoIterator<Item = Document>) -> Self {
        Value::List(docs.into_iter().map(Value::Document).collect())
    }

    /// Collect every document reachable from this value, recursing into the
    /// metadata of the documents found. Used by pipelines to decide which
    /// tracked documents are still live.
    pub(crate) fn collect_documents(&self, seen: &mut HashSet<u64>) {
        match self {
            Value::Document(doc) => {
                if seen.insert(doc.id()) {
                    for (_, value) in doc.metadata().iter() {
                        value.collect_documents(seen);
                    }
                }
            }
            Value::List(items) => items.iter().for_each(|v| v.collect_documents(seen)),
            Value::Table(pairs) => pairs.iter().for_each(|(_, v)| v.collect_documents(seen)),
            _ => {}
        }
    }

    /// Ordering used by sorting steps: null < bool < number < string < rest.
    ///
    /// Integers and floats compare numerically with each other. Values of
    /// kinds that have no natural order compare equal.
    pub fn compare(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Int(_) | Value::Float(_) => 2,
                Value::String(_) => 3,
                _ => 4,
            }
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a.id() == b.id(),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Table(pairs) => f
                .debug_map()
                .entries(pairs.iter().map(|(k, v)| (k, v)))
                .finish(),
            Value::Document(doc) => write!(f, "Document({:?})", doc.source()),
            Value::Object(_) => write!(f, "Object(..)"),
        }
    }
}

/// Display renders the value the way it would appear in generated content:
/// strings without quotes, lists comma separated.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Table(pairs) => {
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k} = {v}")?;
                }
                Ok(())
            }
            Value::Document(doc) => f.write_str(doc.source()),
            Value::Object(_) => f.write_str("[object]"),
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        i64::try_from(v).map(Value::Int).unwrap_or(Value::Float(v as f64))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map(Value::Int).unwrap_or(Value::Float(v as f64))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Document(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(v: [T; N]) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<toml::Value> for Value {
    fn from(v: toml::Value) -> Self {
        match v {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Int(i),
            toml::Value::Float(x) => Value::Float(x),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(d) => Value::String(d.to_string()),
            toml::Value::Array(items) => Value::List(items.into_iter().map(Into::into).collect()),
            toml::Value::Table(table) => {
                Value::Table(table.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .unwrap_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN))),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Table(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Conversion from a metadata [`Value`] into a concrete Rust type.
///
/// Returns `None` when the value cannot represent the target type; callers
/// turn that into [`MetadataError::Conversion`] or fall back to a default.
pub trait FromValue: Sized {
    /// Name used in conversion errors.
    fn type_name() -> &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

/// Convert a value with the same rules metadata reads use.
pub fn convert<T: FromValue>(value: &Value) -> Option<T> {
    T::from_value(value)
}

impl FromValue for Value {
    fn type_name() -> &'static str {
        "value"
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for String {
    fn type_name() -> &'static str {
        "string"
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => Some(value.to_string()),
            _ => None,
        }
    }
}

impl FromValue for bool {
    fn type_name() -> &'static str {
        "bool"
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    fn type_name() -> &'static str {
        "float"
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(x) => Some(*x),
            Value::Int(i) => Some(*i as f64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Float(x) if x.fract() == 0.0 && x.is_finite() => Some(*x as i64),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

macro_rules! from_value_int {
    ($($t:ty => $name:literal),*) => {
        $(impl FromValue for $t {
            fn type_name() -> &'static str {
                $name
            }

            fn from_value(value: &Value) -> Option<Self> {
                to_i64(value).and_then(|i| <$t>::try_from(i).ok())
            }
        })*
    };
}

from_value_int!(
    i32 => "i32",
    i64 => "i64",
    u32 => "u32",
    u64 => "u64",
    usize => "usize"
);

impl FromValue for Document {
    fn type_name() -> &'static str {
        "document"
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Document(doc) => Some(doc.clone()),
            _ => None,
        }
    }
}

/// Lists convert item by item; a single scalar converts to a one-element
/// list and null to an empty one.
impl<T: FromValue> FromValue for Vec<T> {
    fn type_name() -> &'static str {
        "list"
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Vec::new()),
            Value::List(items) => items.iter().map(T::from_value).collect(),
            other => T::from_value(other).map(|v| vec![v]),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn type_name() -> &'static str {
        T::type_name()
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: Any + Send + Sync> FromValue for Arc<T> {
    fn type_name() -> &'static str {
        std::any::type_name::<T>()
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(obj) => Arc::clone(obj).downcast::<T>().ok(),
            _ => None,
        }
    }
}

// ============================================================================
// Store
// ============================================================================

struct Layer {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
    parent: Option<Arc<Layer>>,
    depth: usize,
    len: usize,
}

impl Layer {
    fn lookup(&self, key: &str) -> Option<&Value> {
        let mut layer = Some(self);
        while let Some(current) = layer {
            if let Some(&i) = current.index.get(key) {
                return Some(&current.entries[i].1);
            }
            layer = current.parent.as_deref();
        }
        None
    }
}

/// Immutable, ordered key/value store with overlay cloning.
#[derive(Clone, Default)]
pub struct Metadata {
    top: Option<Arc<Layer>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from pairs (last write wins for repeated keys).
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::default().with_overlay(pairs)
    }

    /// Return a new store whose lookups prefer `pairs` and otherwise fall back
    /// to `self`. Repeated keys within `pairs` are last-write-wins and keep the
    /// position of their first occurrence.
    pub fn with_overlay<K, V>(&self, pairs: impl IntoIterator<Item = (K, V)>) -> Metadata
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut entries: Vec<(String, Value)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            match index.get(&key) {
                Some(&i) => entries[i].1 = value,
                None => {
                    index.insert(key.clone(), entries.len());
                    entries.push((key, value));
                }
            }
        }
        if entries.is_empty() {
            return self.clone();
        }

        let parent = self.top.clone();
        let depth = parent.as_ref().map(|p| p.depth + 1).unwrap_or(0);
        if depth > MAX_CHAIN_DEPTH {
            // Flatten: overlay entries first, then every inherited entry not
            // shadowed, in enumeration order.
            let inherited: Vec<(String, Value)> = self
                .iter()
                .filter(|(k, _)| !index.contains_key(*k))
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            for (key, value) in inherited {
                index.insert(key.clone(), entries.len());
                entries.push((key, value));
            }
            let len = entries.len();
            return Metadata {
                top: Some(Arc::new(Layer {
                    entries,
                    index,
                    parent: None,
                    depth: 0,
                    len,
                })),
            };
        }

        let shadowed = match &parent {
            Some(p) => entries.iter().filter(|(k, _)| p.lookup(k).is_some()).count(),
            None => 0,
        };
        let inherited_len = parent.as_ref().map(|p| p.len).unwrap_or(0);
        let len = entries.len() + inherited_len - shadowed;
        Metadata {
            top: Some(Arc::new(Layer {
                entries,
                index,
                parent,
                depth,
                len,
            })),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.top.as_ref().and_then(|layer| layer.lookup(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Typed read. Fails if the key is absent or cannot convert.
    pub fn get_as<T: FromValue>(&self, key: &str) -> Result<T, MetadataError> {
        let value = self
            .get(key)
            .ok_or_else(|| MetadataError::Missing(key.to_string()))?;
        T::from_value(value).ok_or_else(|| MetadataError::Conversion {
            key: key.to_string(),
            expected: T::type_name(),
            found: value.kind(),
        })
    }

    /// Typed read falling back to `default` when absent or incompatible.
    pub fn get_or<T: FromValue>(&self, key: &str, default: T) -> T {
        self.get(key).and_then(T::from_value).unwrap_or(default)
    }

    /// String read, `None` when absent or not representable as a string.
    pub fn string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(String::from_value)
    }

    /// Entries in enumeration order: newest layer first, shadowed keys skipped.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::with_capacity(self.len());
        let mut layer = self.top.as_deref();
        while let Some(current) = layer {
            for (key, value) in &current.entries {
                if seen.insert(key.as_str()) {
                    out.push((key.as_str(), value));
                }
            }
            layer = current.parent.as_deref();
        }
        out.into_iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.top.as_ref().map(|layer| layer.len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Metadata::from_pairs(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Metadata {
        Metadata::from_pairs([("Title", Value::from("Home")), ("Layout", "page".into())])
    }

    // =========================================================================
    // Overlay semantics
    // =========================================================================

    #[test]
    fn overlay_shadows_and_inherits() {
        let meta = base().with_overlay([("Title", "About")]);
        assert_eq!(meta.string("Title").as_deref(), Some("About"));
        assert_eq!(meta.string("Layout").as_deref(), Some("page"));
        assert_eq!(meta.len(), 2);
    }

    #[test]
    fn overlay_does_not_touch_original() {
        let original = base();
        let _derived = original.with_overlay([("Title", "About"), ("Extra", "x")]);
        assert_eq!(original.string("Title").as_deref(), Some("Home"));
        assert!(!original.contains_key("Extra"));
        assert_eq!(original.len(), 2);
    }

    #[test]
    fn overlay_last_write_wins_within_one_call() {
        let meta = Metadata::new().with_overlay([("A", 1), ("B", 2), ("A", 3)]);
        assert_eq!(meta.get_as::<i64>("A").unwrap(), 3);
        let keys: Vec<&str> = meta.keys().collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn enumeration_is_overlay_then_inherited() {
        let meta = base().with_overlay([("New", "n"), ("Title", "t")]);
        let keys: Vec<&str> = meta.keys().collect();
        assert_eq!(keys, vec!["New", "Title", "Layout"]);
    }

    #[test]
    fn empty_overlay_yields_same_pairs() {
        let original = base();
        let same = original.with_overlay(Vec::<(String, Value)>::new());
        let a: Vec<_> = original.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        let b: Vec<_> = same.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn deep_chain_is_flattened_without_changing_reads() {
        let mut meta = Metadata::new();
        for i in 0..(MAX_CHAIN_DEPTH * 3) {
            meta = meta.with_overlay([(format!("k{i}"), i), ("last".to_string(), i)]);
        }
        assert_eq!(meta.len(), MAX_CHAIN_DEPTH * 3 + 1);
        assert_eq!(meta.get_as::<usize>("k0").unwrap(), 0);
        assert_eq!(meta.get_as::<usize>("last").unwrap(), MAX_CHAIN_DEPTH * 3 - 1);
        assert_eq!(meta.keys().next(), Some(format!("k{}", MAX_CHAIN_DEPTH * 3 - 1).as_str()));
        assert!(meta.top.as_ref().unwrap().depth <= MAX_CHAIN_DEPTH);
    }

    // =========================================================================
    // Typed reads
    // =========================================================================

    #[test]
    fn string_converts_to_int() {
        let meta = Metadata::from_pairs([("N", "42")]);
        assert_eq!(meta.get_as::<i32>("N").unwrap(), 42);
    }

    #[test]
    fn int_converts_to_string() {
        let meta = Metadata::from_pairs([("N", 7)]);
        assert_eq!(meta.get_as::<String>("N").unwrap(), "7");
    }

    #[test]
    fn incompatible_conversion_is_error() {
        let meta = Metadata::from_pairs([("N", "not a number")]);
        let err = meta.get_as::<i64>("N").unwrap_err();
        assert_eq!(
            err,
            MetadataError::Conversion {
                key: "N".into(),
                expected: "i64",
                found: "string"
            }
        );
    }

    #[test]
    fn missing_key_is_error() {
        let meta = Metadata::new();
        assert_eq!(
            meta.get_as::<i64>("Nope").unwrap_err(),
            MetadataError::Missing("Nope".into())
        );
    }

    #[test]
    fn get_or_falls_back_on_mismatch_and_absence() {
        let meta = Metadata::from_pairs([("N", "abc")]);
        assert_eq!(meta.get_or("N", 5i64), 5);
        assert_eq!(meta.get_or("Missing", 9i64), 9);
    }

    #[test]
    fn scalar_reads_as_single_element_list() {
        let meta = Metadata::from_pairs([("N", Value::from(3)), ("S", Value::from("4"))]);
        assert_eq!(meta.get_as::<Vec<i64>>("N").unwrap(), vec![3]);
        assert_eq!(meta.get_as::<Vec<i64>>("S").unwrap(), vec![4]);
    }

    #[test]
    fn list_converts_item_by_item() {
        let meta = Metadata::from_pairs([("N", Value::from(vec!["1", "2"]))]);
        assert_eq!(meta.get_as::<Vec<u32>>("N").unwrap(), vec![1, 2]);
        let mixed = Metadata::from_pairs([("N", Value::List(vec![1.into(), "x".into()]))]);
        assert!(mixed.get_as::<Vec<u32>>("N").is_err());
    }

    #[test]
    fn object_round_trips_through_downcast() {
        #[derive(Debug, PartialEq)]
        struct Custom(u8);
        let meta = Metadata::from_pairs([("C", Value::object(Custom(4)))]);
        let read: Arc<Custom> = meta.get_as("C").unwrap();
        assert_eq!(*read, Custom(4));
        assert!(meta.get_as::<Arc<String>>("C").is_err());
    }

    #[test]
    fn float_with_no_fraction_reads_as_int() {
        let meta = Metadata::from_pairs([("F", 2.0)]);
        assert_eq!(meta.get_as::<i64>("F").unwrap(), 2);
        let meta = Metadata::from_pairs([("F", 2.5)]);
        assert!(meta.get_as::<i64>("F").is_err());
    }

    // =========================================================================
    // Value helpers
    // =========================================================================

    #[test]
    fn toml_tables_keep_structure() {
        let parsed: toml::Value = toml::from_str("title = \"x\"\ntags = [\"a\", \"b\"]").unwrap();
        let value = Value::from(parsed);
        let Value::Table(pairs) = value else {
            panic!("expected table");
        };
        assert!(pairs.contains(&("title".to_string(), Value::from("x"))));
        assert!(pairs.contains(&("tags".to_string(), Value::from(vec!["a", "b"]))));
    }

    #[test]
    fn compare_mixes_ints_and_floats() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::from("b").compare(&Value::from("a")), Ordering::Greater);
        assert_eq!(Value::Null.compare(&Value::Int(0)), Ordering::Less);
    }

    #[test]
    fn display_joins_lists() {
        assert_eq!(Value::from(vec![1, 2, 3]).to_string(), "1, 2, 3");
        assert_eq!(Value::from("plain").to_string(), "plain");
    }
}
