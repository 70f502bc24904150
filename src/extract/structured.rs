use crate::extract::{ExtractionStrategy, PageContent};
use crate::record::{
    clean_text, compute_years_in_business, normalize_email, normalize_phone, normalize_website,
    parse_count, parse_rating, Field, FieldSet, FieldSource,
};
use crate::url::same_site;
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

/// schema.org types treated as a business description
const BUSINESS_TYPES: &[&str] = &[
    "LocalBusiness",
    "Organization",
    "Restaurant",
    "Store",
    "FoodEstablishment",
    "ProfessionalService",
    "HomeAndConstructionBusiness",
    "HealthAndBeautyBusiness",
    "AutomotiveBusiness",
    "MedicalBusiness",
    "LegalService",
    "FinancialService",
];

/// Types too generic to serve as an industry
const GENERIC_TYPES: &[&str] = &["LocalBusiness", "Organization", "Thing", "Place"];

/// Reads schema.org JSON-LD business descriptions
pub struct StructuredMarkupStrategy {
    current_year: i32,
}

impl StructuredMarkupStrategy {
    pub fn new(current_year: i32) -> Self {
        Self { current_year }
    }
}

#[async_trait]
impl ExtractionStrategy for StructuredMarkupStrategy {
    fn source(&self) -> FieldSource {
        FieldSource::StructuredMarkup
    }

    async fn extract(&self, page: &PageContent, _missing: &[Field]) -> FieldSet {
        let mut fields = FieldSet::new();
        for block in json_ld_blocks(&page.html) {
            for node in business_nodes(&block) {
                fill_from_node(&mut fields, node, &page.url, self.current_year);
            }
        }
        fields
    }
}

/// Parses every `application/ld+json` script on a page
///
/// Blocks that are not valid JSON are skipped.
pub fn json_ld_blocks(html: &str) -> Vec<Value> {
    let document = Html::parse_document(html);
    let selector = match Selector::parse(r#"script[type="application/ld+json"]"#) {
        Ok(sel) => sel,
        Err(_) => return Vec::new(),
    };

    document
        .select(&selector)
        .filter_map(|el| {
            let raw = el.text().collect::<String>();
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::debug!("Skipping unparseable JSON-LD block: {}", e);
                    None
                }
            }
        })
        .collect()
}

/// Flattens arrays and `@graph` containers into business-typed nodes
fn business_nodes(value: &Value) -> Vec<&Value> {
    let mut out = Vec::new();
    collect_nodes(value, &mut out);
    out
}

fn collect_nodes<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_nodes(item, out)),
        Value::Object(obj) => {
            if let Some(graph) = obj.get("@graph") {
                collect_nodes(graph, out);
            }
            if is_business(value) {
                out.push(value);
            }
        }
        _ => {}
    }
}

fn types_of(node: &Value) -> Vec<&str> {
    match node.get("@type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// Known business types, or any named node carrying business-like properties
fn is_business(node: &Value) -> bool {
    let typed = types_of(node)
        .iter()
        .any(|t| BUSINESS_TYPES.contains(t) || t.ends_with("Business"));
    typed
        || (node.get("name").is_some()
            && ["aggregateRating", "telephone", "address"]
                .iter()
                .any(|key| node.get(*key).is_some()))
}

/// Reads a scalar as text, taking the first element of arrays
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean_text(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.iter().find_map(scalar_text),
        _ => None,
    }
}

/// Copies values from one business node into empty slots of `fields`
fn fill_from_node(fields: &mut FieldSet, node: &Value, page_url: &Url, current_year: i32) {
    let get = |key: &str| node.get(key).and_then(scalar_text);

    if fields.business_name.is_none() {
        fields.business_name = get("name");
    }

    if let Some(agg) = node.get("aggregateRating") {
        if fields.rating.is_none() {
            fields.rating = agg.get("ratingValue").and_then(scalar_text).and_then(|s| parse_rating(&s));
        }
        if fields.review_count.is_none() {
            fields.review_count = agg
                .get("reviewCount")
                .or_else(|| agg.get("ratingCount"))
                .and_then(scalar_text)
                .and_then(|s| parse_count(&s));
        }
    }

    if fields.phone.is_none() {
        fields.phone = get("telephone").and_then(|s| normalize_phone(&s));
    }
    if fields.email.is_none() {
        fields.email = get("email").and_then(|s| normalize_email(&s));
    }

    if fields.website.is_none() {
        // `url` usually points back at the listing page itself
        fields.website = ["url", "sameAs"]
            .iter()
            .filter_map(|key| node.get(*key))
            .flat_map(|v| match v {
                Value::Array(items) => items.iter().filter_map(Value::as_str).collect::<Vec<_>>(),
                Value::String(s) => vec![s.as_str()],
                _ => Vec::new(),
            })
            .filter_map(|s| normalize_website(s, Some(page_url)))
            .find(|s| {
                Url::parse(s)
                    .map(|u| !same_site(&u, page_url) && !is_social(&u))
                    .unwrap_or(false)
            });
    }

    if fields.years_in_business.is_none() {
        fields.years_in_business = get("foundingDate")
            .and_then(|s| compute_years_in_business(&s, current_year));
    }

    if fields.industry.is_none() {
        fields.industry = get("servesCuisine")
            .or_else(|| get("category"))
            .or_else(|| {
                types_of(node)
                    .into_iter()
                    .find(|t| !GENERIC_TYPES.contains(t))
                    .map(str::to_string)
            });
    }
}

fn is_social(url: &Url) -> bool {
    const SOCIAL: &[&str] = &[
        "facebook.com",
        "instagram.com",
        "twitter.com",
        "x.com",
        "linkedin.com",
        "youtube.com",
        "tiktok.com",
    ];
    url.host_str()
        .map(|h| SOCIAL.iter().any(|s| h == *s || h.ends_with(&format!(".{}", s))))
        .unwrap_or(false)
}
