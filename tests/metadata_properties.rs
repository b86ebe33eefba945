//! Property tests for layered metadata.

use proptest::prelude::*;
use simple_press::metadata::{MAX_CHAIN_DEPTH, Metadata, Value};
use std::collections::{BTreeMap, HashSet};

fn pairs() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::vec(("[a-e]{1,2}", any::<i64>()), 0..12)
}

/// Expected view after applying layers in order: last write wins.
fn model(layers: &[Vec<(String, i64)>]) -> BTreeMap<String, i64> {
    let mut map = BTreeMap::new();
    for layer in layers {
        for (k, v) in layer {
            map.insert(k.clone(), *v);
        }
    }
    map
}

fn snapshot(meta: &Metadata) -> BTreeMap<String, i64> {
    meta.iter()
        .map(|(k, v)| (k.to_string(), meta.get_as::<i64>(k).unwrap_or_else(|_| panic!("{v:?}"))))
        .collect()
}

proptest! {
    #[test]
    fn empty_overlay_enumerates_same_pairs(base in pairs()) {
        let meta = Metadata::from_pairs(base.clone());
        let same = meta.with_overlay(Vec::<(String, Value)>::new());
        let before: Vec<(String, Value)> = meta.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        let after: Vec<(String, Value)> = same.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn overlays_match_last_write_wins_model(layers in prop::collection::vec(pairs(), 1..6)) {
        let mut meta = Metadata::new();
        for layer in &layers {
            meta = meta.with_overlay(layer.clone());
        }
        let expected = model(&layers);
        prop_assert_eq!(snapshot(&meta), expected.clone());
        prop_assert_eq!(meta.len(), expected.len());
    }

    #[test]
    fn iteration_yields_each_key_once(layers in prop::collection::vec(pairs(), 1..6)) {
        let mut meta = Metadata::new();
        for layer in &layers {
            meta = meta.with_overlay(layer.clone());
        }
        let keys: Vec<&str> = meta.keys().collect();
        let distinct: HashSet<&str> = keys.iter().copied().collect();
        prop_assert_eq!(keys.len(), distinct.len());
    }

    #[test]
    fn parent_is_unchanged_by_overlay(base in pairs(), overlay in pairs()) {
        let parent = Metadata::from_pairs(base.clone());
        let before = snapshot(&parent);
        let _child = parent.with_overlay(overlay);
        prop_assert_eq!(snapshot(&parent), before);
    }
}

#[test]
fn deep_chains_still_resolve() {
    let mut meta = Metadata::from_pairs([("root", 0)]);
    for i in 0..(MAX_CHAIN_DEPTH * 3) {
        meta = meta.with_overlay([(format!("k{i}"), i as i64)]);
    }
    assert_eq!(meta.get_as::<i64>("root").unwrap(), 0);
    assert_eq!(meta.get_as::<i64>("k0").unwrap(), 0);
    assert_eq!(meta.len(), MAX_CHAIN_DEPTH * 3 + 1);
}
