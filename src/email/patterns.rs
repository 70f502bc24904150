//! Email discovery in page content
//!
//! This module handles finding addresses in:
//! - JSON-LD structured data
//! - `mailto:` links
//! - Visible text, including `[at]` / `(dot)` obfuscation
//! - Inline script content
//!
//! and ranking them so a contact-style address is preferred.

use crate::extract::json_ld_blocks;
use crate::record::{normalize_email, FieldSource};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}")
        .expect("Email scan regex is hardcoded and valid")
});

static MAILTO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"mailto:([^"'\s?<>]+)"#).expect("Mailto regex is hardcoded and valid")
});

static AT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:\[at\]|\(at\)|\{at\}|\s+at\s+)\s*")
        .expect("At-sign obfuscation regex is hardcoded and valid")
});

static DOT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:\[dot\]|\(dot\)|\{dot\}|\s+dot\s+)\s*")
        .expect("Dot obfuscation regex is hardcoded and valid")
});

static SPACED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([a-zA-Z0-9._%+\-]+)\s+@\s+([a-zA-Z0-9\-]+)\s*\.\s*([a-zA-Z]{2,})")
        .expect("Spaced email regex is hardcoded and valid")
});

static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script[^>]*>(.*?)</script>").expect("Script regex is hardcoded and valid")
});

/// Local parts that never belong to a person or contact inbox
const NON_CONTACT: &[&str] = &[
    "noreply",
    "no-reply",
    "donotreply",
    "do-not-reply",
    "no_reply",
    "info",
    "admin",
    "administrator",
    "webmaster",
    "hostmaster",
    "postmaster",
    "abuse",
    "spam",
    "support",
    "help",
    "sales",
    "marketing",
    "privacy",
    "legal",
    "billing",
    "accounts",
    "example",
    "test",
    "user",
    "username",
    "email",
    "mail",
];

/// Local parts that are never worth reporting
const NO_REPLY: &[&str] = &["noreply", "no-reply", "donotreply", "do-not-reply", "no_reply"];

/// Local-part fragments that mark a contact inbox
const CONTACT_HINTS: &[&str] = &["contact", "inquiry", "hello", "info"];

/// File extensions that show a match is an asset name, e.g. `logo@2x.png`
const ASSET_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".css", ".js", ".ico", ".woff", ".woff2",
];

/// Domains used in templates and placeholders
const PLACEHOLDER_DOMAINS: &[&str] = &["example.com", "example.org", "domain.com", "sentry.io"];

/// JSON-LD properties that hold people or organizations with their own email
const NESTED_ENTITY_KEYS: &[&str] = &["author", "creator", "publisher", "provider", "employee", "founder"];

/// Where an address was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSource {
    StructuredData,
    Mailto,
    Text,
    Script,
    /// Inferred by the LLM from page text
    Llm,
}

impl EmailSource {
    /// Record provenance for an address found this way
    pub fn field_source(&self) -> FieldSource {
        match self {
            Self::StructuredData => FieldSource::StructuredMarkup,
            Self::Mailto | Self::Text | Self::Script => FieldSource::Dom,
            Self::Llm => FieldSource::Llm,
        }
    }
}

/// Rewrites `name [at] domain [dot] com` style text into plain addresses
pub fn deobfuscate(text: &str) -> String {
    let text = AT_RE.replace_all(text, "@");
    let text = DOT_RE.replace_all(&text, ".");
    SPACED_RE.replace_all(&text, "$1@$2.$3").into_owned()
}

/// Returns true for matches that are really asset names or placeholders
fn is_false_positive(address: &str) -> bool {
    let lower = address.to_ascii_lowercase();
    if ASSET_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return true;
    }
    let (local, domain) = match lower.split_once('@') {
        Some(parts) => parts,
        None => return true,
    };
    if NO_REPLY.contains(&local) {
        return true;
    }
    PLACEHOLDER_DOMAINS.contains(&domain) || domain.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Normalizes a candidate and rejects false positives
pub fn accept(raw: &str) -> Option<String> {
    let address = normalize_email(raw)?;
    (!is_false_positive(&address)).then_some(address)
}

/// Finds candidate addresses in a page, deduplicated, in discovery order
///
/// Structured data is searched first, then `mailto:` links, then visible text and
/// finally inline scripts.
pub fn extract_emails(html: &str) -> Vec<(String, EmailSource)> {
    let mut found: Vec<(String, EmailSource)> = Vec::new();
    let mut push = |raw: &str, source: EmailSource| {
        if let Some(address) = accept(raw) {
            if !found.iter().any(|(a, _)| *a == address) {
                found.push((address, source));
            }
        }
    };

    for block in json_ld_blocks(html) {
        let mut addresses = Vec::new();
        collect_json_ld_emails(&block, &mut addresses);
        addresses.iter().for_each(|a| push(a, EmailSource::StructuredData));
    }

    for cap in MAILTO_RE.captures_iter(html) {
        if let Some(m) = cap.get(1) {
            push(m.as_str(), EmailSource::Mailto);
        }
    }

    let without_scripts = SCRIPT_RE.replace_all(html, " ");
    let text = deobfuscate(&without_scripts);
    for m in EMAIL_RE.find_iter(&text) {
        push(m.as_str(), EmailSource::Text);
    }

    for cap in SCRIPT_RE.captures_iter(html) {
        if let Some(body) = cap.get(1) {
            for m in EMAIL_RE.find_iter(body.as_str()) {
                push(m.as_str(), EmailSource::Script);
            }
        }
    }

    found
}

fn collect_json_ld_emails(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_json_ld_emails(v, out)),
        Value::Object(obj) => {
            if let Some(Value::String(email)) = obj.get("email") {
                out.push(email.clone());
            }
            for key in NESTED_ENTITY_KEYS.iter().chain(["contactPoint", "@graph"].iter()) {
                if let Some(nested) = obj.get(*key) {
                    collect_json_ld_emails(nested, out);
                }
            }
        }
        _ => {}
    }
}

/// Returns true if the local part looks like a person or a real inbox
fn is_likely_contact(local: &str) -> bool {
    if NON_CONTACT.contains(&local) {
        return false;
    }
    if local.contains('.') && local.len() > 5 {
        return true;
    }
    local.len() >= 3
}

/// Ranking tier of an address; lower is better
///
/// 0. Contact-style local parts (`contact@`, `hello@`, `info@`)
/// 1. Personal-looking addresses
/// 2. Everything else
pub fn priority(address: &str) -> u8 {
    let local = address.split('@').next().unwrap_or_default();
    if CONTACT_HINTS.iter().any(|h| local.contains(h)) {
        0
    } else if is_likely_contact(local) {
        1
    } else {
        2
    }
}

/// Picks the best address, keeping discovery order within a tier
pub fn best_email(candidates: &[(String, EmailSource)]) -> Option<(String, EmailSource)> {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(i, (address, _))| (priority(address), *i))
        .map(|(_, c)| c.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(html: &str) -> Vec<String> {
        extract_emails(html).into_iter().map(|(a, _)| a).collect()
    }

    #[test]
    fn test_mailto_and_text() {
        let html = r#"<a href="mailto:Owner@Shop.example?subject=Hi">Mail</a><p>or sales@shop.example</p>"#;
        let found = extract_emails(html);
        assert_eq!(found[0], ("owner@shop.example".to_string(), EmailSource::Mailto));
        assert_eq!(found[1], ("sales@shop.example".to_string(), EmailSource::Text));
    }

    #[test]
    fn test_structured_data_first() {
        let html = r#"
            <p>jane@shop.example</p>
            <script type="application/ld+json">
              {"@type":"LocalBusiness","contactPoint":{"email":"desk@shop.example"},
               "founder":{"@type":"Person","email":"founder@shop.example"}}
            </script>"#;
        let found = addresses(html);
        assert_eq!(found[0], "founder@shop.example");
        assert!(found.contains(&"desk@shop.example".to_string()));
        assert!(found.contains(&"jane@shop.example".to_string()));
    }

    #[test]
    fn test_obfuscated_forms() {
        assert_eq!(addresses("<p>hello [at] bakery [dot] example</p>"), vec!["hello@bakery.example"]);
        assert_eq!(addresses("<p>mike (at) bakery (dot) example</p>"), vec!["mike@bakery.example"]);
        assert_eq!(addresses("<p>anna @ bakery . example</p>"), vec!["anna@bakery.example"]);
    }

    #[test]
    fn test_asset_names_and_placeholders_dropped() {
        let html = r#"<img src="logo@2x.png"><p>you@example.com noreply@shop.example</p>"#;
        assert!(addresses(html).is_empty());
    }

    #[test]
    fn test_script_emails_found_last() {
        let html = r#"<script>window.cfg = {contact: "team@shop.example"};</script><p>Welcome</p>"#;
        let found = extract_emails(html);
        assert_eq!(found, vec![("team@shop.example".to_string(), EmailSource::Script)]);
    }

    #[test]
    fn test_priority_tiers() {
        assert_eq!(priority("contact@shop.example"), 0);
        assert_eq!(priority("info@shop.example"), 0);
        assert_eq!(priority("jane.doe@shop.example"), 1);
        assert_eq!(priority("jane@shop.example"), 1);
        assert_eq!(priority("sales@shop.example"), 2);
        assert_eq!(priority("jd@shop.example"), 2);
    }

    #[test]
    fn test_best_email_prefers_contact_inbox() {
        let candidates = vec![
            ("sales@shop.example".to_string(), EmailSource::Text),
            ("jane@shop.example".to_string(), EmailSource::Text),
            ("hello@shop.example".to_string(), EmailSource::Mailto),
        ];
        assert_eq!(best_email(&candidates).unwrap().0, "hello@shop.example");
        assert!(best_email(&[]).is_none());
    }
}
