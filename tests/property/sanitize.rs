//! Sanitizer properties over arbitrary document trees

use guardgen::document::Document;
use guardgen::sanitize::{is_sanitized, sanitize};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn leaf() -> impl Strategy<Value = Document> {
    prop_oneof![
        Just(Document::Undefined),
        Just(Document::Null),
        any::<bool>().prop_map(Document::from),
        any::<u64>().prop_map(Document::from),
        "[a-z ]{0,12}".prop_map(Document::from),
    ]
}

fn document() -> impl Strategy<Value = Document> {
    leaf().prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Document::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..6).prop_map(Document::Object),
        ]
    })
}

/// Defined nodes of the tree, in document order, with their depth.
fn defined_leaves(doc: &Document, depth: usize, out: &mut Vec<(usize, Document)>) {
    match doc {
        Document::Undefined => {}
        Document::Array(items) => items.iter().for_each(|d| defined_leaves(d, depth + 1, out)),
        Document::Object(map) => map.values().for_each(|d| defined_leaves(d, depth + 1, out)),
        other => out.push((depth, other.clone())),
    }
}

fn object_keys(doc: &Document, out: &mut Vec<String>) {
    match doc {
        Document::Array(items) => items.iter().for_each(|d| object_keys(d, out)),
        Document::Object(map) => {
            for (key, value) in map {
                if !value.is_undefined() {
                    out.push(key.clone());
                }
                object_keys(value, out);
            }
        }
        _ => {}
    }
}

proptest! {
    #[test]
    fn sanitized_trees_hold_no_undefined(doc in document()) {
        let clean = sanitize(doc);
        prop_assert!(is_sanitized(&clean));
        prop_assert!(clean.to_json().is_ok());
    }

    #[test]
    fn sanitizing_is_idempotent(doc in document()) {
        let once = sanitize(doc);
        let twice = sanitize(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn defined_values_survive(doc in document()) {
        // a bare undefined root becomes null
        prop_assume!(!doc.is_undefined());
        let mut before = Vec::new();
        defined_leaves(&doc, 0, &mut before);
        let mut keys_before = Vec::new();
        object_keys(&doc, &mut keys_before);

        let clean = sanitize(doc);
        let mut after = Vec::new();
        defined_leaves(&clean, 0, &mut after);
        let mut keys_after = Vec::new();
        object_keys(&clean, &mut keys_after);

        prop_assert_eq!(before, after);
        prop_assert_eq!(keys_before, keys_after);
    }

    #[test]
    fn defined_trees_pass_through(
        map in prop::collection::btree_map("[a-z]{1,6}", "[a-z]{0,8}", 0..8)
    ) {
        let doc = Document::Object(
            map.into_iter()
                .map(|(k, v)| (k, Document::from(v)))
                .collect::<BTreeMap<_, _>>(),
        );
        prop_assert_eq!(sanitize(doc.clone()), doc);
    }
}
