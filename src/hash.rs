//! Content fingerprints.
//!
//! Values are re-serialized with object keys sorted at every level before
//! hashing, so two structurally equal payloads always share a digest no matter
//! which order the scraper wrote their fields in.

use crate::snapshot::SnapshotContent;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Fingerprint of the fields that define a meaningful page change:
/// price, availability, features, pricing blocks and text content.
pub fn canonical_hash(content: &SnapshotContent) -> String {
    let fingerprint = json!({
        "price": content.price,
        "availability": content.availability,
        "features": content.features,
        "pricing_blocks": content.pricing_blocks,
        "text_content": content.text_content,
    });
    content_hash(&fingerprint)
}

/// Fingerprint of an arbitrary JSON value, e.g. one pricing block.
pub fn content_hash(value: &Value) -> String {
    hash_string(&canonicalize(value).to_string())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotContent;
    use pretty_assertions::{assert_eq, assert_ne};

    fn content(value: Value) -> SnapshotContent {
        SnapshotContent::from_value(value).0
    }

    #[test]
    fn digest_is_hex_sha256() {
        let h = canonical_hash(&SnapshotContent::default());
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(
            r#"{"price":"$10","features":["a"],"pricing_blocks":[{"name":"Pro","price":"$10"}]}"#,
        )
        .unwrap();
        let b: Value = serde_json::from_str(
            r#"{"pricing_blocks":[{"price":"$10","name":"Pro"}],"features":["a"],"price":"$10"}"#,
        )
        .unwrap();
        assert_eq!(canonical_hash(&content(a)), canonical_hash(&content(b)));
    }

    #[test]
    fn missing_keys_equal_empty_values() {
        let a = content(json!({}));
        let b = content(json!({"price": "", "features": [], "text_content": ""}));
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn each_hashed_field_changes_digest() {
        let base = json!({
            "price": "$10",
            "availability": "in stock",
            "features": ["a"],
            "pricing_blocks": [{"name": "Pro"}],
            "text_content": "hello",
        });
        let base_hash = canonical_hash(&content(base.clone()));
        for (key, replacement) in [
            ("price", json!("$11")),
            ("availability", json!("sold out")),
            ("features", json!(["a", "b"])),
            ("pricing_blocks", json!([{"name": "Team"}])),
            ("text_content", json!("bye")),
        ] {
            let mut changed = base.clone();
            changed[key] = replacement;
            assert_ne!(canonical_hash(&content(changed)), base_hash, "{key}");
        }
    }

    #[test]
    fn unhashed_fields_are_ignored() {
        let a = content(json!({"price": "$10", "title": "Old", "scraped_by": "bot-1"}));
        let b = content(json!({"price": "$10", "title": "New", "scraped_by": "bot-2"}));
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn block_hash_ignores_field_order() {
        let a = json!({"name": "Pro", "price": "$10", "limits": {"seats": 5, "projects": 3}});
        let b: Value =
            serde_json::from_str(r#"{"limits":{"projects":3,"seats":5},"price":"$10","name":"Pro"}"#)
                .unwrap();
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_ne!(content_hash(&a), content_hash(&json!({"name": "Pro"})));
    }
}
