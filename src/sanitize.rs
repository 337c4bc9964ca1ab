//! Storage sanitizer
//!
//! Removes values the storage layer cannot represent from a generated artifact. Object keys
//! holding `Undefined` are dropped, `Undefined` array elements are removed (not replaced by
//! null), and everything else passes through. `Null` is preserved.

use crate::document::Document;

/// Strip every `Undefined` from the tree.
///
/// Total and idempotent. A top-level `Undefined` becomes `Null`, since the result must be a
/// storable value.
pub fn sanitize(value: Document) -> Document {
    match strip(value) {
        Some(clean) => clean,
        None => Document::Null,
    }
}

/// True if no node at any depth is `Undefined`.
pub fn is_sanitized(value: &Document) -> bool {
    !value.contains_undefined()
}

fn strip(value: Document) -> Option<Document> {
    match value {
        Document::Undefined => None,
        Document::Array(items) => Some(Document::Array(
            items.into_iter().filter_map(strip).collect(),
        )),
        Document::Object(map) => Some(Document::Object(
            map.into_iter()
                .filter_map(|(k, v)| strip(v).map(|v| (k, v)))
                .collect(),
        )),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drops_undefined_keys_and_elements() {
        let doc = Document::object([
            ("keep", Document::from("x")),
            ("gone", Document::Undefined),
            ("nothing", Document::Null),
            (
                "list",
                Document::Array(vec![
                    Document::from(1u64),
                    Document::Undefined,
                    Document::object([("inner", Document::Undefined)]),
                    Document::Null,
                ]),
            ),
        ]);

        let clean = sanitize(doc);
        assert!(is_sanitized(&clean));
        assert_eq!(
            clean.to_json().unwrap(),
            json!({ "keep": "x", "nothing": null, "list": [1, {}, null] })
        );
    }

    #[test]
    fn top_level_undefined_becomes_null() {
        assert_eq!(sanitize(Document::Undefined), Document::Null);
    }

    #[test]
    fn sanitizing_twice_changes_nothing() {
        let doc = Document::Array(vec![
            Document::Undefined,
            Document::Array(vec![Document::Undefined, Document::from(true)]),
        ]);
        let once = sanitize(doc);
        let twice = sanitize(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn scalars_pass_through() {
        for value in [
            Document::Null,
            Document::from(false),
            Document::from(2.5),
            Document::from("text"),
        ] {
            assert_eq!(sanitize(value.clone()), value);
        }
    }
}
