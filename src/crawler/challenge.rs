//! Block and challenge detection
//!
//! Runs on every loaded page before it is handed to extraction.

use crate::extract::visible_text;
use crate::providers::{CaptchaKind, Challenge};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

/// Phrases that indicate the site served a block page instead of content
const SOFT_BLOCK_PATTERNS: &[&str] = &[
    "unusual traffic",
    "automated requests",
    "are you a robot",
    "access denied",
    "too many requests",
    "rate limit exceeded",
    "suspicious activity",
    "verify you are a human",
];

/// Cheap substring pre-check before parsing the document
const CHALLENGE_MARKERS: &[&str] = &[
    "recaptcha",
    "hcaptcha",
    "h-captcha",
    "turnstile",
    "challenges.cloudflare.com",
];

/// Pages larger than this are real content; block pages are small
const BLOCK_PAGE_MAX_BYTES: usize = 64 * 1024;

/// Interstitials carry a line or two of text around the widget
const INTERSTITIAL_MAX_TEXT_CHARS: usize = 500;

static IFRAME_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:[?&](?:k|sitekey)=)([A-Za-z0-9_\-]+)"#)
        .expect("Iframe key regex is hardcoded and valid")
});

/// Classifies a response status as a block
///
/// Returns the block reason for 429 and 403 responses.
pub fn status_block_reason(status: u16) -> Option<String> {
    match status {
        429 => Some("HTTP 429 Too Many Requests".to_string()),
        403 => Some("HTTP 403 Forbidden".to_string()),
        _ => None,
    }
}

/// Looks for block-page phrases in a small page
pub fn detect_soft_block(body: &str) -> Option<String> {
    if body.len() > BLOCK_PAGE_MAX_BYTES {
        return None;
    }
    let lower = body.to_lowercase();
    SOFT_BLOCK_PATTERNS
        .iter()
        .find(|p| lower.contains(*p))
        .map(|p| format!("block page: \"{}\"", p))
}

/// Whether a page is a challenge interstitial rather than content
///
/// A widget on an ordinary page (a contact form, a newsletter signup) does not gate
/// anything; only block pages and near-empty pages wrapped around a widget do.
pub fn is_interstitial(body: &str) -> bool {
    if body.len() > BLOCK_PAGE_MAX_BYTES {
        return false;
    }
    if detect_soft_block(body).is_some() {
        return true;
    }
    if body.to_ascii_lowercase().contains("mailto:") {
        return false;
    }
    let text = visible_text(body);
    !text.contains('@') && text.chars().count() < INTERSTITIAL_MAX_TEXT_CHARS
}

/// Detects a CAPTCHA widget and extracts its site key
///
/// # Detection Order
///
/// 1. reCAPTCHA: `.g-recaptcha[data-sitekey]` or a `recaptcha/api2` iframe with `k=`
/// 2. hCaptcha: `.h-captcha[data-sitekey]` or an `hcaptcha.com` iframe with `sitekey=`
/// 3. Turnstile: `.cf-turnstile[data-sitekey]` or a `challenges.cloudflare.com` iframe
pub fn detect_challenge(body: &str, page_url: &str) -> Option<Challenge> {
    let lower = body.to_ascii_lowercase();
    if !CHALLENGE_MARKERS.iter().any(|m| lower.contains(m)) {
        return None;
    }

    let document = Html::parse_document(body);

    let widget = |selector: &str| -> Option<(String, Option<String>, Option<String>)> {
        let sel = Selector::parse(selector).ok()?;
        let el = document.select(&sel).next()?;
        let key = el.value().attr("data-sitekey")?.trim().to_string();
        if key.is_empty() {
            return None;
        }
        let action = el.value().attr("data-action").map(str::to_string);
        let data = el
            .value()
            .attr("data-cdata")
            .or_else(|| el.value().attr("data-s"))
            .map(str::to_string);
        Some((key, action, data))
    };

    let iframe_key = |needle: &str| -> Option<String> {
        let sel = Selector::parse("iframe[src]").ok()?;
        document
            .select(&sel)
            .filter_map(|el| el.value().attr("src"))
            .filter(|src| src.contains(needle))
            .find_map(|src| {
                IFRAME_KEY_RE
                    .captures(src)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            })
    };

    let build = |kind, site_key, action, data| Challenge {
        kind,
        site_key,
        page_url: page_url.to_string(),
        action,
        data,
    };

    if let Some((key, _, _)) = widget(".g-recaptcha[data-sitekey]") {
        return Some(build(CaptchaKind::ReCaptchaV2, key, None, None));
    }
    if let Some(key) = iframe_key("recaptcha/api2") {
        return Some(build(CaptchaKind::ReCaptchaV2, key, None, None));
    }
    if let Some((key, _, _)) = widget(".h-captcha[data-sitekey]") {
        return Some(build(CaptchaKind::HCaptcha, key, None, None));
    }
    if let Some(key) = iframe_key("hcaptcha.com") {
        return Some(build(CaptchaKind::HCaptcha, key, None, None));
    }
    if let Some((key, action, data)) = widget(".cf-turnstile[data-sitekey]") {
        return Some(build(CaptchaKind::Turnstile, key, action, data));
    }
    if let Some(key) = iframe_key("challenges.cloudflare.com") {
        return Some(build(CaptchaKind::Turnstile, key, None, None));
    }

    None
}
