use crate::hash::content_hash;
use crate::price::{change_percent, parse_price};
use crate::snapshot::SnapshotContent;
use itertools::Itertools;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PricingDiff {
    pub has_change: bool,
    pub price_changed: bool,
    pub old_price: Option<f64>,
    pub new_price: Option<f64>,
    pub change_percent: Option<f64>,
    pub blocks_added: Vec<Value>,
    pub blocks_removed: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureDiff {
    pub has_change: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessagingDiff {
    pub has_change: bool,
    pub old_text: String,
    pub new_text: String,
}

pub fn diff_pricing(old: &SnapshotContent, new: &SnapshotContent) -> PricingDiff {
    let mut diff = PricingDiff::default();

    if let (Some(old_price), Some(new_price)) = (parse_price(&old.price), parse_price(&new.price)) {
        if old_price != new_price {
            diff.price_changed = true;
            diff.old_price = Some(old_price);
            diff.new_price = Some(new_price);
            diff.change_percent = Some(change_percent(old_price, new_price));
        }
    }

    diff.blocks_added = blocks_only_in(&new.pricing_blocks, &old.pricing_blocks);
    diff.blocks_removed = blocks_only_in(&old.pricing_blocks, &new.pricing_blocks);
    diff.has_change =
        diff.price_changed || !diff.blocks_added.is_empty() || !diff.blocks_removed.is_empty();
    diff
}

/// Blocks of `side` whose content hash does not appear in `other`, each
/// distinct block reported once in order of first appearance.
fn blocks_only_in(side: &[Value], other: &[Value]) -> Vec<Value> {
    let other: HashSet<String> = other.iter().map(content_hash).collect();
    let mut seen = HashSet::new();
    side.iter()
        .filter(|block| {
            let hash = content_hash(block);
            !other.contains(&hash) && seen.insert(hash)
        })
        .cloned()
        .collect()
}

pub fn diff_features(old: &SnapshotContent, new: &SnapshotContent) -> FeatureDiff {
    let old: HashSet<&str> = old.features.iter().map(String::as_str).collect();
    let new: HashSet<&str> = new.features.iter().map(String::as_str).collect();

    let added: Vec<String> = new.difference(&old).sorted().map(|s| s.to_string()).collect();
    let removed: Vec<String> = old.difference(&new).sorted().map(|s| s.to_string()).collect();

    FeatureDiff {
        has_change: !added.is_empty() || !removed.is_empty(),
        added,
        removed,
    }
}

pub fn diff_messaging(old: &SnapshotContent, new: &SnapshotContent) -> MessagingDiff {
    let (old_text, new_text) = (old.messaging_text(), new.messaging_text());
    if old_text == new_text {
        return MessagingDiff::default();
    }
    MessagingDiff {
        has_change: true,
        old_text: old_text.to_string(),
        new_text: new_text.to_string(),
    }
}
