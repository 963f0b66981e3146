use super::{Summarizer, Summary};
use crate::change::PendingChange;
use crate::{utils, DetectorError};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const SYSTEM_PROMPT: &str =
    "You are a pricing analyst helping a business understand competitor pricing changes.";
const MAX_TOKENS: u32 = 200;
const TEMPERATURE: f64 = 0.7;
const FALLBACK_SUMMARY_CHARS: usize = 100;

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    summary: Option<String>,
    recommendation: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str, base_url: &str) -> Self {
        OpenAiClient {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn request_body(&self, change: &PendingChange) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(change)},
            ],
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        })
    }
}

#[async_trait::async_trait]
impl Summarizer for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, change: &PendingChange) -> Result<Summary, DetectorError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("POST {} for change {}", url, change.change_id);

        let response: ChatResponse = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(change))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| DetectorError::LlmResponseError("no completion returned".into()))?;
        Ok(parse_completion(&content))
    }
}

fn or_na(value: Option<&str>) -> &str {
    value.unwrap_or("N/A")
}

pub(crate) fn build_prompt(change: &PendingChange) -> String {
    let percent = change
        .change_percent
        .map(|p| p.to_string())
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        r#"Analyze this competitor pricing change and provide a summary and recommendation.

Change Type: {change_type}
Page Type: {page_type}
Old Price: {old_price}
New Price: {new_price}
Change: {percent}%

Old Features: {old_features}
New Features: {new_features}

Old Text: {old_text}
New Text: {new_text}

Provide a JSON response with:
1. summary: A brief 1-2 sentence summary of what changed
2. recommendation: A simple actionable recommendation (max 100 chars)

Response format:
{{"summary": "...", "recommendation": "..."}}"#,
        change_type = change.change_type,
        page_type = change.page_type,
        old_price = or_na(change.old_price.as_deref()),
        new_price = or_na(change.new_price.as_deref()),
        old_features = or_na(change.old_features.as_deref()),
        new_features = or_na(change.new_features.as_deref()),
        old_text = or_na(change.old_text.as_deref()),
        new_text = or_na(change.new_text.as_deref()),
    )
}

/// Read `{"summary": ..., "recommendation": ...}` out of a model reply, which may
/// wrap the object in prose or code fences.
pub(crate) fn parse_completion(content: &str) -> Summary {
    let head = || utils::truncate_chars(content, FALLBACK_SUMMARY_CHARS);

    let object = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => {
            return Summary {
                summary: head(),
                recommendation: String::new(),
            }
        }
    };

    match serde_json::from_str::<Reply>(object) {
        Ok(reply) => Summary {
            summary: reply.summary.unwrap_or_else(head),
            recommendation: reply.recommendation.unwrap_or_default(),
        },
        Err(_) => Summary {
            summary: head(),
            recommendation: String::new(),
        },
    }
}
