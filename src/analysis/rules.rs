use super::{Summarizer, Summary};
use crate::change::PendingChange;
use crate::DetectorError;

/// Deterministic summaries keyed on the tags in `change_type`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBased;

impl RuleBased {
    pub fn summarize_change(&self, change: &PendingChange) -> Summary {
        let change_type = change.change_type.as_str();
        let old_price = change.old_price.as_deref().unwrap_or("N/A");
        let new_price = change.new_price.as_deref().unwrap_or("N/A");
        let percent = change.change_percent.unwrap_or(0.0);

        let (summary, recommendation) = if change_type.contains("price_increase") {
            (
                format!("Competitor increased price from {old_price} to {new_price} (+{percent:.1}%)"),
                "Review your pricing strategy",
            )
        } else if change_type.contains("price_decrease") {
            (
                format!("Competitor decreased price from {old_price} to {new_price} ({percent:.1}%)"),
                "Consider matching or reducing price",
            )
        } else if change_type.contains("feature_added") {
            ("Competitor added new features".to_string(), "Evaluate feature gap")
        } else if change_type.contains("feature_removed") {
            ("Competitor removed features".to_string(), "Highlight your superior features")
        } else if change_type.contains("messaging_change") {
            ("Competitor changed messaging".to_string(), "Update your value proposition")
        } else {
            (format!("Competitor made changes: {change_type}"), "Analyze impact")
        };

        Summary {
            summary,
            recommendation: recommendation.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Summarizer for RuleBased {
    fn model(&self) -> &str {
        "rule-based"
    }

    async fn summarize(&self, change: &PendingChange) -> Result<Summary, DetectorError> {
        Ok(self.summarize_change(change))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn recommend(change_type: &str) -> String {
        RuleBased
            .summarize_change(&PendingChange {
                change_type: change_type.to_string(),
                ..Default::default()
            })
            .recommendation
    }

    #[test]
    fn rule_table() {
        assert_eq!(recommend("price_increase"), "Review your pricing strategy");
        assert_eq!(recommend("price_decrease"), "Consider matching or reducing price");
        assert_eq!(recommend("feature_added"), "Evaluate feature gap");
        assert_eq!(recommend("feature_removed"), "Highlight your superior features");
        assert_eq!(recommend("messaging_change"), "Update your value proposition");
        assert_eq!(recommend("content_change"), "Analyze impact");
    }

    #[test]
    fn first_matching_tag_wins() {
        assert_eq!(
            recommend("price_decrease_feature_added_messaging_change"),
            "Consider matching or reducing price"
        );
        assert_eq!(recommend("feature_removed_messaging_change"), "Highlight your superior features");
    }

    #[test]
    fn price_summary_formatting() {
        let summary = RuleBased.summarize_change(&PendingChange {
            change_type: "price_decrease".into(),
            old_price: Some("20".into()),
            new_price: Some("15".into()),
            change_percent: Some(-25.0),
            ..Default::default()
        });
        assert_eq!(summary.summary, "Competitor decreased price from 20 to 15 (-25.0%)");

        let summary = RuleBased.summarize_change(&PendingChange {
            change_type: "price_increase".into(),
            ..Default::default()
        });
        assert_eq!(summary.summary, "Competitor increased price from N/A to N/A (+0.0%)");
    }

    #[test]
    fn default_summary_names_the_change_type() {
        let summary = RuleBased.summarize_change(&PendingChange {
            change_type: "content_change".into(),
            ..Default::default()
        });
        assert_eq!(summary.summary, "Competitor made changes: content_change");
    }
}
