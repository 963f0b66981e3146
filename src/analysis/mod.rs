//! Summaries and recommendations for detected changes.
//!
//! A language model is used when one is configured; any failure on that path
//! falls back to the deterministic rule table so a change is never left without
//! an analysis because of an upstream outage.

mod openai;
mod rules;

pub use openai::OpenAiClient;
pub use rules::RuleBased;

use crate::change::PendingChange;
use crate::{utils, AnalysisStore, ChangeStore, DetectorError};
use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

pub const MAX_RECOMMENDATION_CHARS: usize = 500;
pub const DEFAULT_BATCH_SIZE: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub id: Option<i64>,
    pub change_id: i64,
    pub summary: String,
    pub recommendation: Option<String>,
    pub change_type: String,
    pub page_type: String,
    pub old_price: Option<String>,
    pub new_price: Option<String>,
    pub change_percent: Option<String>,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Summary {
    pub summary: String,
    pub recommendation: String,
}

#[async_trait::async_trait]
pub trait Summarizer {
    /// Tag stored alongside each analysis produced by this summarizer.
    fn model(&self) -> &str;

    async fn summarize(&self, change: &PendingChange) -> Result<Summary, DetectorError>;
}

pub struct Analyzer<'a, S, L> {
    store: &'a S,
    llm: Option<L>,
    rules: RuleBased,
}

impl<'a, S, L> Analyzer<'a, S, L>
where
    S: ChangeStore + AnalysisStore + Sync,
    L: Summarizer + Sync,
{
    pub fn new(store: &'a S, llm: Option<L>) -> Self {
        Analyzer {
            store,
            llm,
            rules: RuleBased,
        }
    }

    async fn summarize(&self, change: &PendingChange) -> (Summary, String) {
        if let Some(llm) = &self.llm {
            match llm.summarize(change).await {
                Ok(summary) => return (summary, llm.model().to_string()),
                Err(e) => warn!(
                    "LLM failed for change {}, using rules: {}",
                    change.change_id, e
                ),
            }
        }
        (self.rules.summarize_change(change), self.rules.model().to_string())
    }

    /// Produce and store the analysis of one change.
    #[instrument(skip(self, change), fields(change_id = change.change_id))]
    pub async fn analyze_change(&self, change: &PendingChange) -> Result<Analysis, DetectorError> {
        let (summary, model) = self.summarize(change).await;
        let recommendation = utils::truncate_chars(&summary.recommendation, MAX_RECOMMENDATION_CHARS);

        let mut analysis = Analysis {
            id: None,
            change_id: change.change_id,
            summary: summary.summary,
            recommendation: (!recommendation.is_empty()).then_some(recommendation),
            change_type: change.change_type.clone(),
            page_type: change.page_type.clone(),
            old_price: change.old_price.clone(),
            new_price: change.new_price.clone(),
            change_percent: change.change_percent.map(|p| format!("{:?}", p)),
            model,
            created_at: utils::get_now(),
        };
        analysis.id = Some(self.store.analysis_insert(&analysis).await?);

        info!(
            "Analyzed change {}: {}",
            change.change_id,
            utils::truncate_chars(&analysis.summary, 50)
        );
        Ok(analysis)
    }

    /// Analyze up to `limit` pending changes, newest first. Returns how many were
    /// stored; failures are logged and skipped.
    pub async fn run_analysis(&self, limit: u32) -> Result<usize, DetectorError> {
        let pending = self.store.changes_unanalyzed(limit).await?;
        if pending.is_empty() {
            info!("No new changes to analyze");
            return Ok(0);
        }
        info!("Analyzing {} changes", pending.len());

        let mut analyzed = 0;
        for change in &pending {
            match self.analyze_change(change).await {
                Ok(_) => analyzed += 1,
                Err(e) => error!("Error analyzing change {}: {}", change.change_id, e),
            }
        }

        info!("Analysis complete: {} changes analyzed", analyzed);
        Ok(analyzed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::snapshot::PageType;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: Result<Summary, String>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Summarizer for Scripted {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn summarize(&self, _change: &PendingChange) -> Result<Summary, DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().map_err(DetectorError::LlmResponseError)
        }
    }

    fn pending(store: &MemoryStore, change_type: &str) -> PendingChange {
        store.add_pending(PendingChange {
            page_id: 1,
            change_type: change_type.to_string(),
            page_type: PageType::Pricing.to_string(),
            old_price: Some("49.99".into()),
            new_price: Some("59.99".into()),
            change_percent: Some(20.0),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn rules_without_llm() {
        let store = MemoryStore::new();
        let change = pending(&store, "price_increase");
        let analyzer = Analyzer::new(&store, None::<RuleBased>);

        let analysis = analyzer.analyze_change(&change).await.unwrap();
        assert_eq!(analysis.model, "rule-based");
        assert_eq!(analysis.summary, "Competitor increased price from 49.99 to 59.99 (+20.0%)");
        assert_eq!(analysis.recommendation.as_deref(), Some("Review your pricing strategy"));
        assert_eq!(analysis.change_percent.as_deref(), Some("20.0"));
        assert_eq!(store.analyses(), vec![analysis]);
    }

    #[tokio::test]
    async fn llm_reply_is_used_and_truncated() {
        let store = MemoryStore::new();
        let change = pending(&store, "messaging_change");
        let llm = Scripted {
            reply: Ok(Summary {
                summary: "Tagline now targets enterprises.".into(),
                recommendation: "x".repeat(600),
            }),
            calls: AtomicUsize::new(0),
        };
        let analyzer = Analyzer::new(&store, Some(llm));

        let analysis = analyzer.analyze_change(&change).await.unwrap();
        assert_eq!(analysis.model, "scripted");
        assert_eq!(analysis.summary, "Tagline now targets enterprises.");
        assert_eq!(analysis.recommendation.map(|r| r.len()), Some(MAX_RECOMMENDATION_CHARS));
    }

    #[tokio::test]
    async fn empty_recommendation_is_absent() {
        let store = MemoryStore::new();
        let change = pending(&store, "content_change");
        let llm = Scripted {
            reply: Ok(Summary {
                summary: "Layout changed".into(),
                recommendation: String::new(),
            }),
            calls: AtomicUsize::new(0),
        };
        let analysis = Analyzer::new(&store, Some(llm)).analyze_change(&change).await.unwrap();
        assert_eq!(analysis.recommendation, None);
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_rules() {
        let store = MemoryStore::new();
        let change = pending(&store, "feature_added");
        let llm = Scripted {
            reply: Err("rate limited".into()),
            calls: AtomicUsize::new(0),
        };
        let analyzer = Analyzer::new(&store, Some(llm));

        let analysis = analyzer.analyze_change(&change).await.unwrap();
        assert_eq!(analysis.model, "rule-based");
        assert_eq!(analysis.summary, "Competitor added new features");
        assert_eq!(analysis.recommendation.as_deref(), Some("Evaluate feature gap"));
    }

    #[tokio::test]
    async fn run_analysis_covers_each_pending_change_once() {
        let store = MemoryStore::new();
        pending(&store, "price_decrease");
        pending(&store, "messaging_change");
        pending(&store, "feature_removed");
        let llm = Scripted {
            reply: Err("offline".into()),
            calls: AtomicUsize::new(0),
        };
        let analyzer = Analyzer::new(&store, Some(llm));

        assert_eq!(analyzer.run_analysis(2).await.unwrap(), 2);
        assert_eq!(analyzer.run_analysis(DEFAULT_BATCH_SIZE).await.unwrap(), 1);
        assert_eq!(analyzer.run_analysis(DEFAULT_BATCH_SIZE).await.unwrap(), 0);

        let mut change_ids: Vec<i64> = store.analyses().iter().map(|a| a.change_id).collect();
        change_ids.sort();
        assert_eq!(change_ids, vec![1, 2, 3]);
        assert_eq!(analyzer.llm.as_ref().unwrap().calls.load(Ordering::SeqCst), 3);
    }
}
