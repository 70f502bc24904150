//! Accumulator for field values coming from several extraction strategies
//!
//! Each slot remembers which strategy set it. A value is only replaced by a strategy
//! that outranks the one that set it, so running strategies in priority order gives
//! first-non-null-wins.
use crate::record::fields::{Field, FieldSet};
use crate::record::Record;
use std::fmt;

/// The strategy that produced a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSource {
    /// JSON-LD and similar embedded metadata
    StructuredMarkup,
    /// Selector and text heuristics
    Dom,
    /// Schema-guided AI extraction
    SchemaAi,
    /// Free-form LLM fallback
    Llm,
}

impl FieldSource {
    /// Confidence rank; higher is more trusted
    pub fn rank(&self) -> u8 {
        match self {
            Self::StructuredMarkup => 4,
            Self::Dom => 3,
            Self::SchemaAi => 2,
            Self::Llm => 1,
        }
    }

    /// Returns true if values from `self` may replace values from `other`
    pub fn outranks(&self, other: FieldSource) -> bool {
        self.rank() > other.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredMarkup => "structured_markup",
            Self::Dom => "dom",
            Self::SchemaAi => "schema_ai",
            Self::Llm => "llm",
        }
    }
}

impl fmt::Display for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A value tagged with the strategy that set it
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged<T> {
    pub value: T,
    pub source: FieldSource,
}

/// Record under construction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRecord {
    business_name: Option<Tagged<String>>,
    years_in_business: Option<Tagged<u32>>,
    rating: Option<Tagged<f64>>,
    review_count: Option<Tagged<u32>>,
    industry: Option<Tagged<String>>,
    phone: Option<Tagged<String>>,
    website: Option<Tagged<String>>,
    email: Option<Tagged<String>>,
}

/// Offers a value to a slot; returns true if the slot changed
fn offer<T: PartialEq>(slot: &mut Option<Tagged<T>>, value: Option<T>, source: FieldSource) -> bool {
    let value = match value {
        Some(v) => v,
        None => return false,
    };

    let accept = match slot {
        None => true,
        Some(existing) => source.outranks(existing.source) && existing.value != value,
    };

    if accept {
        *slot = Some(Tagged { value, source });
    }
    accept
}

impl PartialRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one strategy's output
    ///
    /// # Returns
    ///
    /// The number of fields this merge set or replaced
    pub fn merge(&mut self, fields: FieldSet, source: FieldSource) -> usize {
        let FieldSet {
            business_name,
            years_in_business,
            rating,
            review_count,
            industry,
            phone,
            website,
            email,
        } = fields;

        [
            offer(&mut self.business_name, business_name, source),
            offer(&mut self.years_in_business, years_in_business, source),
            offer(&mut self.rating, rating, source),
            offer(&mut self.review_count, review_count, source),
            offer(&mut self.industry, industry, source),
            offer(&mut self.phone, phone, source),
            offer(&mut self.website, website, source),
            offer(&mut self.email, email, source),
        ]
        .into_iter()
        .filter(|changed| *changed)
        .count()
    }

    pub fn has(&self, field: Field) -> bool {
        self.source_of(field).is_some()
    }

    /// The strategy that set a field, if any
    pub fn source_of(&self, field: Field) -> Option<FieldSource> {
        match field {
            Field::BusinessName => self.business_name.as_ref().map(|t| t.source),
            Field::YearsInBusiness => self.years_in_business.as_ref().map(|t| t.source),
            Field::Rating => self.rating.as_ref().map(|t| t.source),
            Field::ReviewCount => self.review_count.as_ref().map(|t| t.source),
            Field::Industry => self.industry.as_ref().map(|t| t.source),
            Field::Phone => self.phone.as_ref().map(|t| t.source),
            Field::Website => self.website.as_ref().map(|t| t.source),
            Field::Email => self.email.as_ref().map(|t| t.source),
        }
    }

    /// Fields no strategy has set yet
    pub fn missing_fields(&self) -> Vec<Field> {
        Field::ALL.into_iter().filter(|f| !self.has(*f)).collect()
    }

    pub fn is_complete(&self) -> bool {
        Field::ALL.iter().all(|f| self.has(*f))
    }

    pub fn business_name(&self) -> Option<&str> {
        self.business_name.as_ref().map(|t| t.value.as_str())
    }

    pub fn rating(&self) -> Option<f64> {
        self.rating.as_ref().map(|t| t.value)
    }

    pub fn website(&self) -> Option<&str> {
        self.website.as_ref().map(|t| t.value.as_str())
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_ref().map(|t| t.value.as_str())
    }

    /// Replaces the website with its dereferenced form, keeping the original source
    pub fn replace_website(&mut self, website: Option<String>) {
        match website {
            Some(value) => {
                if let Some(tagged) = self.website.as_mut() {
                    tagged.value = value;
                }
            }
            None => self.website = None,
        }
    }

    /// Offers an email found outside the detail page
    pub fn offer_email(&mut self, email: String, source: FieldSource) -> bool {
        offer(&mut self.email, Some(email), source)
    }

    /// Finalizes the record
    ///
    /// Returns `None` when no usable business name was found; such pages are skipped,
    /// never emitted.
    pub fn into_record(self) -> Option<Record> {
        let business_name = self.business_name?.value.trim().to_string();
        if business_name.is_empty() {
            return None;
        }

        Some(Record {
            business_name,
            years_in_business: self.years_in_business.map(|t| t.value),
            rating: self.rating.map(|t| t.value.clamp(0.0, 5.0)),
            review_count: self.review_count.map(|t| t.value),
            industry: self.industry.map(|t| t.value),
            phone: self.phone.map(|t| t.value),
            website: self.website.map(|t| t.value),
            email: self.email.map(|t| t.value),
        })
    }
}
