use crate::diff::{FeatureDiff, MessagingDiff, PricingDiff};
use crate::snapshot::PageType;
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeTag {
    PriceIncrease,
    PriceDecrease,
    FeatureAdded,
    FeatureRemoved,
    MessagingChange,
    ContentChange,
}

impl ChangeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeTag::PriceIncrease => "price_increase",
            ChangeTag::PriceDecrease => "price_decrease",
            ChangeTag::FeatureAdded => "feature_added",
            ChangeTag::FeatureRemoved => "feature_removed",
            ChangeTag::MessagingChange => "messaging_change",
            ChangeTag::ContentChange => "content_change",
        }
    }
}

/// Ordered, duplicate-free list of tags. Never empty once built by [`classify`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeType(Vec<ChangeTag>);

impl ChangeType {
    fn push(&mut self, tag: ChangeTag) {
        if !self.0.contains(&tag) {
            self.0.push(tag);
        }
    }

    pub fn tags(&self) -> &[ChangeTag] {
        &self.0
    }

    pub fn contains(&self, tag: ChangeTag) -> bool {
        self.0.contains(&tag)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tag) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("_")?;
            }
            f.write_str(tag.as_str())?;
        }
        Ok(())
    }
}

impl Serialize for ChangeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Turn the three diffs of a page into its change type.
///
/// Tags are emitted in a fixed order: price direction, feature additions and
/// removals (features pages only), messaging, then `content_change` for block-only
/// pricing edits or when nothing more specific matched.
pub fn classify(
    pricing: &PricingDiff,
    features: &FeatureDiff,
    messaging: &MessagingDiff,
    page_type: PageType,
) -> ChangeType {
    let mut change_type = ChangeType::default();

    if pricing.price_changed {
        match pricing.change_percent {
            Some(p) if p > 0.0 => change_type.push(ChangeTag::PriceIncrease),
            _ => change_type.push(ChangeTag::PriceDecrease),
        }
    }

    if page_type == PageType::Features {
        if !features.added.is_empty() {
            change_type.push(ChangeTag::FeatureAdded);
        }
        if !features.removed.is_empty() {
            change_type.push(ChangeTag::FeatureRemoved);
        }
    }

    if messaging.has_change {
        change_type.push(ChangeTag::MessagingChange);
    }

    if pricing.has_change && !pricing.price_changed {
        change_type.push(ChangeTag::ContentChange);
    }

    if change_type.0.is_empty() {
        change_type.push(ChangeTag::ContentChange);
    }

    change_type
}
