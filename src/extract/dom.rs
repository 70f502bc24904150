use crate::extract::{ExtractionStrategy, PageContent};
use crate::record::{
    clean_text, compute_years_in_business, normalize_email, normalize_phone, normalize_website,
    parse_count, parse_rating, Field, FieldSet, FieldSource,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

static REVIEW_COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d[\d,.]*)\s*(?:reviews?|ratings?)\b")
        .expect("Review count regex is hardcoded and valid")
});

static PHONE_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)phone(?:\s+number)?\s*:?\s*(\+?[\d(][\d\s().\-]{6,}\d)")
        .expect("Phone label regex is hardcoded and valid")
});

static FOUNDED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:established|founded|since|year established)\s*(?:in)?\s*:?\s*(\d{4})")
        .expect("Founded regex is hardcoded and valid")
});

static DOMAIN_TEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?[a-z0-9\-]+(?:\.[a-z0-9\-]+)+(?:/\S*)?$")
        .expect("Domain text regex is hardcoded and valid")
});

/// Title suffixes listing sites append to page titles
const TITLE_SEPARATORS: &[&str] = &[" - ", " | ", " – "];

/// Generic DOM heuristics for detail pages
///
/// Works from page structure and accessible labels (headings, `aria-label` star
/// ratings, `tel:` and `mailto:` links, redirector links) rather than site-specific
/// class names.
pub struct DomStrategy {
    current_year: i32,
}

impl DomStrategy {
    pub fn new(current_year: i32) -> Self {
        Self { current_year }
    }
}

#[async_trait]
impl ExtractionStrategy for DomStrategy {
    fn source(&self) -> FieldSource {
        FieldSource::Dom
    }

    async fn extract(&self, page: &PageContent, _missing: &[Field]) -> FieldSet {
        // `Html` is not Send; keep it inside a synchronous call
        parse_detail(&page.html, &page.url, self.current_year)
    }
}

fn parse_detail(html: &str, page_url: &Url, current_year: i32) -> FieldSet {
    let document = Html::parse_document(html);
    let text = document_text(&document);

    FieldSet {
        business_name: business_name(&document),
        years_in_business: FOUNDED_RE
            .captures(&text)
            .and_then(|c| c.get(1))
            .and_then(|m| compute_years_in_business(m.as_str(), current_year)),
        rating: rating(&document),
        review_count: review_count(&document, &text),
        industry: industry(&document),
        phone: phone(&document, &text),
        website: website(&document, page_url),
        email: first_attr(&document, r#"a[href^="mailto:"]"#, "href")
            .and_then(|href| normalize_email(&href)),
    }
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(selector).ok()?;
    document.select(&sel).next()
}

fn element_text(el: ElementRef<'_>) -> Option<String> {
    clean_text(&el.text().collect::<String>())
}

fn first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .find_map(|el| el.value().attr(attr).map(str::to_string))
}

fn business_name(document: &Html) -> Option<String> {
    if let Some(name) = select_first(document, "h1").and_then(element_text) {
        return Some(name);
    }

    let title = first_attr(document, r#"meta[property="og:title"]"#, "content")
        .or_else(|| select_first(document, "title").and_then(element_text))?;
    let name = TITLE_SEPARATORS
        .iter()
        .fold(title.as_str(), |acc, sep| acc.split(sep).next().unwrap_or(acc));
    clean_text(name)
}

fn rating(document: &Html) -> Option<f64> {
    let sel = Selector::parse("[aria-label]").ok()?;
    let from_label = document
        .select(&sel)
        .filter_map(|el| el.value().attr("aria-label"))
        .filter(|label| label.to_ascii_lowercase().contains("star rating"))
        .find_map(parse_rating);
    if from_label.is_some() {
        return from_label;
    }

    first_attr(document, r#"[itemprop="ratingValue"]"#, "content")
        .or_else(|| select_first(document, r#"[itemprop="ratingValue"]"#).and_then(element_text))
        .and_then(|raw| parse_rating(&raw))
}

fn review_count(document: &Html, text: &str) -> Option<u32> {
    first_attr(document, r#"[itemprop="reviewCount"]"#, "content")
        .or_else(|| select_first(document, r#"[itemprop="reviewCount"]"#).and_then(element_text))
        .and_then(|raw| parse_count(&raw))
        .or_else(|| {
            REVIEW_COUNT_RE
                .captures(text)
                .and_then(|c| c.get(1))
                .and_then(|m| parse_count(m.as_str()))
        })
}

fn industry(document: &Html) -> Option<String> {
    // Category links carry a category filter in their search URL
    select_first(document, r#"a[href*="cflt="]"#)
        .and_then(element_text)
        .or_else(|| select_first(document, r#"[itemprop="servesCuisine"]"#).and_then(element_text))
}

fn phone(document: &Html, text: &str) -> Option<String> {
    first_attr(document, r#"a[href^="tel:"]"#, "href")
        .and_then(|href| normalize_phone(&href))
        .or_else(|| {
            PHONE_LABEL_RE
                .captures(text)
                .and_then(|c| c.get(1))
                .and_then(|m| normalize_phone(m.as_str()))
        })
}

fn website(document: &Html, page_url: &Url) -> Option<String> {
    // Redirector links are kept as-is; the orchestrator dereferences them
    if let Some(href) = first_attr(document, r#"a[href*="biz_redir"]"#, "href") {
        return normalize_website(&href, Some(page_url));
    }

    let sel = Selector::parse("a[href]").ok()?;
    document.select(&sel).find_map(|el| {
        let label = element_text(el)?.to_ascii_lowercase();
        if !DOMAIN_TEXT_RE.is_match(&label) {
            return None;
        }
        let href = el.value().attr("href")?;
        let website = normalize_website(href, Some(page_url))?;
        let url = Url::parse(&website).ok()?;
        (url.host_str() != page_url.host_str()).then_some(website)
    })
}

/// Text of the body, excluding scripts and styles, one text node per line
fn document_text(document: &Html) -> String {
    let mut lines = Vec::new();
    for node in document.root_element().descendants() {
        let text = match node.value().as_text() {
            Some(text) => text,
            None => continue,
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
            .map(|name| matches!(name.as_str(), "script" | "style" | "noscript" | "template"))
            .unwrap_or(false);
        if hidden {
            continue;
        }
        if let Some(line) = clean_text(text) {
            lines.push(line);
        }
    }
    lines.join("\n")
}

/// Visible text of a page, for AI prompts
pub fn visible_text(html: &str) -> String {
    document_text(&Html::parse_document(html))
}
