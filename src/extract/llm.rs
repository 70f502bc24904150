use crate::extract::{
    clip_content, field_description, parse_json_object, visible_text, ExtractionStrategy,
    PageContent, MAX_AI_CONTENT_CHARS,
};
use crate::providers::LlmClient;
use crate::record::{Field, FieldSet, FieldSource};
use crate::state::{FailureKind, RunMetrics};
use async_trait::async_trait;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You extract business information from web page text. \
Respond with a single JSON object and nothing else. Use null for any value the text does not state.";

/// Free-form LLM inference for fields every other strategy missed
pub struct LlmFallbackStrategy {
    client: Option<Arc<dyn LlmClient>>,
    metrics: Arc<RunMetrics>,
    current_year: i32,
}

impl LlmFallbackStrategy {
    pub fn new(client: Option<Arc<dyn LlmClient>>, metrics: Arc<RunMetrics>, current_year: i32) -> Self {
        Self {
            client,
            metrics,
            current_year,
        }
    }
}

/// Builds the JSON-only prompt for the requested fields
pub fn build_prompt(fields: &[Field], content: &str) -> String {
    let keys: Vec<String> = fields
        .iter()
        .map(|f| format!("- \"{}\": {}", f.key(), field_description(*f)))
        .collect();

    format!(
        "Extract these keys from the page below:\n{}\n\n\
         Return only a JSON object with exactly these keys.\n\n\
         PAGE:\n{}",
        keys.join("\n"),
        content
    )
}

#[async_trait]
impl ExtractionStrategy for LlmFallbackStrategy {
    fn source(&self) -> FieldSource {
        FieldSource::Llm
    }

    fn is_available(&self) -> bool {
        self.client.is_some()
    }

    async fn extract(&self, page: &PageContent, missing: &[Field]) -> FieldSet {
        let client = match &self.client {
            Some(client) => client,
            None => return FieldSet::new(),
        };
        if missing.is_empty() {
            return FieldSet::new();
        }

        let content = clip_content(&visible_text(&page.html), MAX_AI_CONTENT_CHARS);
        let prompt = build_prompt(missing, &content);

        let raw = match client.complete_json(SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(url = %page.url, "LLM fallback failed: {}", e);
                return FieldSet::new();
            }
        };

        match parse_json_object(&raw) {
            Some(value) => FieldSet::from_json(&value, None, self.current_year).retain(missing),
            None => {
                self.metrics.record_failure(FailureKind::MalformedAiResponse);
                tracing::warn!(url = %page.url, "LLM returned non-JSON output");
                FieldSet::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderResult;
    use std::sync::Mutex;
    use url::Url;

    struct Echo {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for Echo {
        async fn complete_json(&self, _system: &str, prompt: &str) -> ProviderResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn echo(reply: &str) -> Arc<Echo> {
        Arc::new(Echo {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn page() -> PageContent {
        PageContent::new(
            Url::parse("https://www.yelp.com/biz/acme").unwrap(),
            "<h1>Acme</h1><p>Serving Austin since 2001</p>",
        )
    }

    #[tokio::test]
    async fn test_fenced_reply_is_parsed() {
        let client = echo("```json\n{\"years_in_business\": 25, \"email\": \"Hello@Acme.example\"}\n```");
        let strategy = LlmFallbackStrategy::new(Some(client.clone()), Arc::new(RunMetrics::new()), 2026);

        let fields = strategy
            .extract(&page(), &[Field::YearsInBusiness, Field::Email])
            .await;
        assert_eq!(fields.years_in_business, Some(25));
        assert_eq!(fields.email.as_deref(), Some("hello@acme.example"));

        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[0].contains("\"years_in_business\""));
        assert!(!prompts[0].contains("\"business_name\""));
        assert!(prompts[0].contains("Serving Austin since 2001"));
    }

    #[tokio::test]
    async fn test_non_json_reply_counts_as_malformed() {
        let metrics = Arc::new(RunMetrics::new());
        let strategy = LlmFallbackStrategy::new(Some(echo("no idea")), Arc::clone(&metrics), 2026);

        assert!(strategy.extract(&page(), &[Field::Phone]).await.is_empty());
        assert_eq!(metrics.failure_count(FailureKind::MalformedAiResponse), 1);
    }

    #[tokio::test]
    async fn test_negative_values_are_clamped() {
        let strategy = LlmFallbackStrategy::new(
            Some(echo(r#"{"review_count": -4, "rating": 6.5}"#)),
            Arc::new(RunMetrics::new()),
            2026,
        );
        let fields = strategy
            .extract(&page(), &[Field::ReviewCount, Field::Rating])
            .await;
        assert_eq!(fields.review_count, Some(0));
        assert_eq!(fields.rating, Some(5.0));
    }

    #[tokio::test]
    async fn test_nothing_missing_skips_call() {
        let client = echo("{}");
        let strategy = LlmFallbackStrategy::new(Some(client.clone()), Arc::new(RunMetrics::new()), 2026);
        assert!(strategy.extract(&page(), &[]).await.is_empty());
        assert!(client.prompts.lock().unwrap().is_empty());
    }
}
