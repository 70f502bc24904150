//! Layered field extraction for detail pages
//!
//! This module handles turning a fetched detail page into a `PartialRecord`:
//! - Structured markup (JSON-LD), highest trust
//! - DOM heuristics
//! - Schema-guided AI extraction, when a provider is configured
//! - Free-form LLM fallback for whatever is still missing
//!
//! Every strategy implements `ExtractionStrategy`. The chain owns the ordering and the
//! early stop; strategies never see each other's results.

mod dom;
mod json_repair;
mod llm;
mod schema_ai;
mod structured;

pub use dom::{visible_text, DomStrategy};
pub use json_repair::parse_json_object;
pub use llm::LlmFallbackStrategy;
pub use schema_ai::SchemaAiStrategy;
pub use structured::{json_ld_blocks, StructuredMarkupStrategy};

use crate::providers::{LlmClient, SchemaExtractor};
use crate::record::{Field, FieldSet, FieldSource, PartialRecord};
use crate::state::RunMetrics;
use async_trait::async_trait;
use chrono::Datelike;
use std::sync::Arc;
use url::Url;

/// Maximum characters of page text sent to an AI provider
pub const MAX_AI_CONTENT_CHARS: usize = 50_000;

/// A fetched detail page as seen by the strategies
#[derive(Debug, Clone)]
pub struct PageContent {
    /// Final URL of the page, used to resolve relative links
    pub url: Url,
    pub html: String,
}

impl PageContent {
    pub fn new(url: Url, html: impl Into<String>) -> Self {
        Self {
            url,
            html: html.into(),
        }
    }
}

/// One way of pulling record fields out of a page
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Provenance tag for the fields this strategy produces
    fn source(&self) -> FieldSource;

    /// False when a required provider is not configured; the chain then skips it
    fn is_available(&self) -> bool {
        true
    }

    /// Attempts extraction
    ///
    /// `missing` lists the fields still absent from the record. Strategies may return
    /// more; the merge rule keeps higher-priority values. An empty set is a miss.
    async fn extract(&self, page: &PageContent, missing: &[Field]) -> FieldSet;
}

/// Runs strategies in priority order and merges their results
pub struct ExtractionChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    metrics: Arc<RunMetrics>,
}

impl ExtractionChain {
    /// Creates an empty chain
    pub fn new(metrics: Arc<RunMetrics>) -> Self {
        Self {
            strategies: Vec::new(),
            metrics,
        }
    }

    /// Appends a strategy; call in priority order
    pub fn with_strategy(mut self, strategy: Box<dyn ExtractionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Builds the standard four-stage chain
    ///
    /// # Arguments
    ///
    /// * `schema_ai` - Schema extraction provider, if enabled
    /// * `llm` - LLM provider, if enabled
    /// * `metrics` - Run metrics for strategy hits and malformed responses
    pub fn standard(
        schema_ai: Option<Arc<dyn SchemaExtractor>>,
        llm: Option<Arc<dyn LlmClient>>,
        metrics: Arc<RunMetrics>,
    ) -> Self {
        let year = current_year();
        Self::new(Arc::clone(&metrics))
            .with_strategy(Box::new(StructuredMarkupStrategy::new(year)))
            .with_strategy(Box::new(DomStrategy::new(year)))
            .with_strategy(Box::new(SchemaAiStrategy::new(
                schema_ai,
                Arc::clone(&metrics),
                year,
            )))
            .with_strategy(Box::new(LlmFallbackStrategy::new(llm, metrics, year)))
    }

    /// Sources of the strategies that will actually run
    pub fn active_sources(&self) -> Vec<FieldSource> {
        self.strategies
            .iter()
            .filter(|s| s.is_available())
            .map(|s| s.source())
            .collect()
    }

    /// Extracts a partial record from a page
    ///
    /// Stops as soon as all eight fields are set.
    pub async fn run(&self, page: &PageContent) -> PartialRecord {
        let mut record = PartialRecord::new();

        for strategy in &self.strategies {
            if record.is_complete() {
                break;
            }
            if !strategy.is_available() {
                continue;
            }

            let source = strategy.source();
            let missing = record.missing_fields();
            let fields = strategy.extract(page, &missing).await;

            if fields.is_empty() {
                tracing::debug!(url = %page.url, strategy = %source, "Strategy found nothing");
                continue;
            }

            let accepted = record.merge(fields, source);
            if accepted > 0 {
                self.metrics.record_strategy_hit(source);
            }
            tracing::debug!(url = %page.url, strategy = %source, accepted, "Merged fields");
        }

        record
    }
}

/// The calendar year used to derive years in business
pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}

/// Trims page text to the AI budget, keeping the head and the tail
///
/// Contact details tend to sit at the top (header) or bottom (footer) of a page, so
/// the middle is what gets dropped.
pub fn clip_content(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let half = max_chars / 2;
    let head: String = text.chars().take(half).collect();
    let tail: String = text.chars().skip(total - half).collect();
    format!("{}\n...\n{}", head, tail)
}

/// Short description of a field for AI prompts and schemas
pub(crate) fn field_description(field: Field) -> &'static str {
    match field {
        Field::BusinessName => "The business's name",
        Field::YearsInBusiness => "Number of years the business has operated",
        Field::Rating => "Average customer rating from 0 to 5",
        Field::ReviewCount => "Total number of customer reviews",
        Field::Industry => "Category or industry of the business",
        Field::Phone => "Main phone number",
        Field::Website => "The business's own website URL, not a listing page",
        Field::Email => "Public contact email address",
    }
}

/// JSON schema type for a field
pub(crate) fn field_json_type(field: Field) -> &'static str {
    match field {
        Field::YearsInBusiness | Field::ReviewCount => "integer",
        Field::Rating => "number",
        _ => "string",
    }
}
