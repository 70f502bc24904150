//! Field-level normalization
//!
//! Every strategy funnels raw strings through these helpers before a value enters a
//! `FieldSet`, so the record invariants (rating range, non-negative counts, cleaned
//! phone and email) hold no matter which strategy produced the value.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use url::Url;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$")
        .expect("Email regex is hardcoded and valid")
});

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)*").expect("Number regex is hardcoded and valid"));

static YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(1[89]\d{2}|2\d{3})\b").expect("Year regex is hardcoded and valid")
});

/// The eight record fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    BusinessName,
    YearsInBusiness,
    Rating,
    ReviewCount,
    Industry,
    Phone,
    Website,
    Email,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::BusinessName,
        Field::YearsInBusiness,
        Field::Rating,
        Field::ReviewCount,
        Field::Industry,
        Field::Phone,
        Field::Website,
        Field::Email,
    ];

    /// The wire key for this field
    pub fn key(&self) -> &'static str {
        match self {
            Field::BusinessName => "business_name",
            Field::YearsInBusiness => "years_in_business",
            Field::Rating => "rating",
            Field::ReviewCount => "review_count",
            Field::Industry => "industry",
            Field::Phone => "phone",
            Field::Website => "website",
            Field::Email => "email",
        }
    }
}

/// Field guesses produced by one extraction strategy
///
/// Values are already normalized. An empty set is an extraction miss.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    pub business_name: Option<String>,
    pub years_in_business: Option<u32>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub industry: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, field: Field) -> bool {
        match field {
            Field::BusinessName => self.business_name.is_some(),
            Field::YearsInBusiness => self.years_in_business.is_some(),
            Field::Rating => self.rating.is_some(),
            Field::ReviewCount => self.review_count.is_some(),
            Field::Industry => self.industry.is_some(),
            Field::Phone => self.phone.is_some(),
            Field::Website => self.website.is_some(),
            Field::Email => self.email.is_some(),
        }
    }

    /// Number of fields set
    pub fn len(&self) -> usize {
        Field::ALL.iter().filter(|f| self.has(**f)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every field not listed in `keep`
    pub fn retain(mut self, keep: &[Field]) -> Self {
        for field in Field::ALL {
            if keep.contains(&field) {
                continue;
            }
            match field {
                Field::BusinessName => self.business_name = None,
                Field::YearsInBusiness => self.years_in_business = None,
                Field::Rating => self.rating = None,
                Field::ReviewCount => self.review_count = None,
                Field::Industry => self.industry = None,
                Field::Phone => self.phone = None,
                Field::Website => self.website = None,
                Field::Email => self.email = None,
            }
        }
        self
    }

    /// Builds a field set from an AI response object keyed by wire names
    ///
    /// Values may arrive as strings or numbers; anything that does not normalize is
    /// dropped. `base` resolves relative website links.
    pub fn from_json(value: &Value, base: Option<&Url>, current_year: i32) -> Self {
        let obj = match value.as_object() {
            Some(obj) => obj,
            None => return Self::default(),
        };

        let text = |key: &str| -> Option<String> {
            match obj.get(key)? {
                Value::String(s) => clean_text(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        };

        let years_in_business = match obj.get("years_in_business") {
            Some(Value::Number(n)) => n.as_i64().map(non_negative),
            Some(Value::String(s)) => parse_count(s),
            _ => None,
        };

        let rating = match obj.get("rating") {
            Some(Value::Number(n)) => n.as_f64().and_then(normalize_rating),
            Some(Value::String(s)) => parse_rating(s),
            _ => None,
        };

        let review_count = match obj.get("review_count") {
            Some(Value::Number(n)) => n.as_i64().map(non_negative),
            Some(Value::String(s)) => parse_count(s),
            _ => None,
        };

        Self {
            business_name: text("business_name"),
            years_in_business: years_in_business.or_else(|| {
                text("founded").and_then(|s| compute_years_in_business(&s, current_year))
            }),
            rating,
            review_count,
            industry: text("industry"),
            phone: text("phone").and_then(|s| normalize_phone(&s)),
            website: text("website").and_then(|s| normalize_website(&s, base)),
            email: text("email").and_then(|s| normalize_email(&s)),
        }
    }
}

/// Collapses whitespace and drops empty strings
pub fn clean_text(raw: &str) -> Option<String> {
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(cleaned)
    }
}

/// Clamps a rating into [0, 5]; non-finite values are dropped
pub fn normalize_rating(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value.clamp(0.0, 5.0))
    } else {
        None
    }
}

/// Parses the first number in a string as a rating ("4.5 star rating" -> 4.5)
pub fn parse_rating(raw: &str) -> Option<f64> {
    let m = NUMBER_RE.find(raw)?;
    let value: f64 = m.as_str().replace(',', ".").parse().ok()?;
    normalize_rating(value)
}

/// Clamps a signed count to zero
pub fn non_negative(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

/// Parses the first integer in a string, ignoring thousands separators ("1,234 reviews")
pub fn parse_count(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.starts_with('-') {
        return Some(0);
    }
    let m = NUMBER_RE.find(trimmed)?;
    let digits: String = m
        .as_str()
        .split('.')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<i64>().ok().map(non_negative)
}

/// Cleans a phone number
///
/// # Rules
///
/// - Only digits and a leading `+` survive
/// - A leading `+` keeps the number as international
/// - 10 digits become `(XXX) XXX-XXXX`
/// - 11 digits starting with 1 become `+1XXXXXXXXXX`
/// - Anything else is returned as bare digits
pub fn normalize_phone(raw: &str) -> Option<String> {
    let raw = raw.trim().trim_start_matches("tel:");
    let international = raw.trim_start().starts_with('+');
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < 7 {
        return None;
    }

    if international {
        return Some(format!("+{}", digits));
    }

    match digits.len() {
        10 => Some(format!(
            "({}) {}-{}",
            &digits[0..3],
            &digits[3..6],
            &digits[6..10]
        )),
        11 if digits.starts_with('1') => Some(format!("+{}", digits)),
        _ => Some(digits),
    }
}

/// Validates and lowercases an email address
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("mailto:")
        .unwrap_or(trimmed)
        .split('?')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    if EMAIL_RE.is_match(&trimmed) {
        Some(trimmed)
    } else {
        None
    }
}

/// Resolves a website value into an absolute http(s) URL string
pub fn normalize_website(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(::url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(raw).ok()?,
            // Bare hostnames such as "example.com" are common in listings
            None if raw.contains('.') && !raw.contains(' ') => {
                Url::parse(&format!("https://{}", raw)).ok()?
            }
            None => return None,
        },
        Err(_) => return None,
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    parsed.host_str()?;

    Some(parsed.to_string())
}

/// Derives years in business from a founding year or date
///
/// Accepts a bare year, an ISO date or free text containing a year. The year must lie
/// in 1800..=current_year.
pub fn compute_years_in_business(raw: &str, current_year: i32) -> Option<u32> {
    let year: i32 = YEAR_RE.captures(raw)?.get(1)?.as_str().parse().ok()?;
    if (1800..=current_year).contains(&year) {
        Some((current_year - year) as u32)
    } else {
        None
    }
}
