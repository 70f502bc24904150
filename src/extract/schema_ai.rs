use crate::extract::{
    clip_content, field_description, field_json_type, parse_json_object, visible_text,
    ExtractionStrategy, PageContent, MAX_AI_CONTENT_CHARS,
};
use crate::providers::SchemaExtractor;
use crate::record::{Field, FieldSet, FieldSource};
use crate::state::{FailureKind, RunMetrics};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Schema-guided extraction through an AI provider
///
/// Skipped entirely when no provider is configured.
pub struct SchemaAiStrategy {
    extractor: Option<Arc<dyn SchemaExtractor>>,
    metrics: Arc<RunMetrics>,
    current_year: i32,
}

impl SchemaAiStrategy {
    pub fn new(
        extractor: Option<Arc<dyn SchemaExtractor>>,
        metrics: Arc<RunMetrics>,
        current_year: i32,
    ) -> Self {
        Self {
            extractor,
            metrics,
            current_year,
        }
    }
}

/// JSON schema describing the requested fields, each nullable
pub fn record_schema(fields: &[Field]) -> Value {
    let mut properties = Map::new();
    for field in fields {
        properties.insert(
            field.key().to_string(),
            json!({
                "type": [field_json_type(*field), "null"],
                "description": field_description(*field),
            }),
        );
    }
    let required: Vec<&str> = fields.iter().map(|f| f.key()).collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

#[async_trait]
impl ExtractionStrategy for SchemaAiStrategy {
    fn source(&self) -> FieldSource {
        FieldSource::SchemaAi
    }

    fn is_available(&self) -> bool {
        self.extractor.is_some()
    }

    async fn extract(&self, page: &PageContent, missing: &[Field]) -> FieldSet {
        let extractor = match &self.extractor {
            Some(extractor) => extractor,
            None => return FieldSet::new(),
        };
        if missing.is_empty() {
            return FieldSet::new();
        }

        let content = clip_content(&visible_text(&page.html), MAX_AI_CONTENT_CHARS);
        let schema = record_schema(missing);

        let raw = match extractor.extract_with_schema(&content, &schema).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(url = %page.url, "Schema extraction failed: {}", e);
                return FieldSet::new();
            }
        };

        match parse_json_object(&raw) {
            Some(value) => FieldSet::from_json(&value, None, self.current_year).retain(missing),
            None => {
                self.metrics.record_failure(FailureKind::MalformedAiResponse);
                tracing::warn!(url = %page.url, "Schema extraction returned malformed JSON");
                FieldSet::new()
            }
        }
    }
}
