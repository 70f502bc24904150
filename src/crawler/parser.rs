//! Link extraction from fetched pages
//!
//! This module handles parsing HTML content to find:
//! - Business detail links on a listing search page
//! - The listing-site link on a search-engine results page
//! - Contact-style links on a business website

use crate::url::{normalize_detail_url, same_site};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Path prefix of business detail pages on the listing site
const DETAIL_PATH_PREFIX: &str = "/biz/";

/// Sub-pages of a business that are not the detail page itself
const DETAIL_SUBPAGE_MARKERS: &[&str] = &["/review/", "/reviews/", "/photos/", "/menu/", "/questions/"];

/// Path and link-text fragments that suggest a contact page
const CONTACT_PAGE_PATTERNS: &[&str] = &[
    "contact",
    "about",
    "team",
    "support",
    "impressum",
    "imprint",
    "kontakt",
    "about-us",
    "our-team",
    "get-in-touch",
    "reach-us",
    "connect",
    "talk-to-us",
    "feedback",
    "help",
    "customer-service",
];

/// Extracts business detail links from a listing search page
///
/// # Link Rules
///
/// **Include:**
/// - `/biz/<slug>` links, relative or absolute on the listing host
///
/// **Exclude:**
/// - Sub-pages such as `/biz/<slug>/reviews/` or `/photos/`
/// - Links on other hosts
///
/// Query strings are stripped, and the result keeps page order without duplicates.
///
/// # Arguments
///
/// * `html` - The search page HTML
/// * `page_url` - The URL the page was loaded from, used to resolve relative links
pub fn extract_detail_links(html: &str, page_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let selector = match Selector::parse("a[href]") {
        Ok(sel) => sel,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        let href = match element.value().attr("href") {
            Some(href) => href.trim(),
            None => continue,
        };

        let url = match normalize_detail_url(href, page_url) {
            Some(url) => url,
            None => continue,
        };

        if !same_site(&url, page_url) {
            continue;
        }

        let path = url.path();
        if !path.starts_with(DETAIL_PATH_PREFIX) || path.len() <= DETAIL_PATH_PREFIX.len() {
            continue;
        }

        let with_slash = format!("{}/", path);
        if DETAIL_SUBPAGE_MARKERS.iter().any(|m| with_slash[DETAIL_PATH_PREFIX.len()..].contains(m)) {
            continue;
        }

        if seen.insert(url.to_string()) {
            links.push(url);
        }
    }

    links
}

/// Finds the first link to the listing site on a search-engine results page
///
/// Unwraps Google's `/url?q=` indirection.
pub fn find_listing_link(html: &str, page_url: &Url, listing: &Url) -> Option<Url> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").ok()?;

    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| resolve_link(href, page_url))
        .map(|url| unwrap_engine_redirect(&url).unwrap_or(url))
        .find(|url| same_site(url, listing))
}

/// Ranks same-site links on a business website by how contact-like they look
///
/// Links score one point per pattern found in the path and one per pattern found in
/// the link text. Zero-score links are dropped; ties keep page order.
///
/// # Returns
///
/// Distinct URLs, best first, never including `page_url` itself
pub fn rank_contact_links(html: &str, page_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let selector = match Selector::parse("a[href]") {
        Ok(sel) => sel,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    seen.insert(strip_fragment(page_url).to_string());

    let mut scored: Vec<(usize, usize, Url)> = Vec::new();

    for (position, element) in document.select(&selector).enumerate() {
        let href = match element.value().attr("href") {
            Some(href) => href,
            None => continue,
        };
        let url = match resolve_link(href, page_url) {
            Some(url) => strip_fragment(&url),
            None => continue,
        };
        if !same_site(&url, page_url) {
            continue;
        }

        let path = url.path().to_ascii_lowercase();
        let text = element.text().collect::<String>().to_ascii_lowercase();
        let score = CONTACT_PAGE_PATTERNS
            .iter()
            .map(|p| usize::from(path.contains(p)) + usize::from(text.contains(p)))
            .sum::<usize>();

        if score == 0 || !seen.insert(url.to_string()) {
            continue;
        }
        scored.push((score, position, url));
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.into_iter().map(|(_, _, url)| url).collect()
}

/// Resolves a link href to an absolute http(s) URL
///
/// Returns None for `javascript:`, `mailto:`, `tel:` and `data:` links, fragment-only
/// links and anything that does not resolve.
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| href.starts_with(scheme))
    {
        return None;
    }

    base_url
        .join(href)
        .ok()
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
}

fn unwrap_engine_redirect(url: &Url) -> Option<Url> {
    if url.path() != "/url" {
        return None;
    }
    url.query_pairs()
        .find(|(k, _)| k == "q" || k == "url")
        .and_then(|(_, v)| Url::parse(&v).ok())
}

fn strip_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_page() -> Url {
        Url::parse("https://www.yelp.com/search?find_desc=plumbers&find_loc=Austin").unwrap()
    }

    #[test]
    fn test_extracts_detail_links_in_order() {
        let html = r#"
            <a href="/biz/joes-plumbing-austin?osq=plumbers">Joe's</a>
            <a href="/biz/acme-pipes-austin">Acme</a>
            <a href="https://www.yelp.com/biz/blue-water-austin">Blue Water</a>
        "#;
        let links = extract_detail_links(html, &search_page());
        let paths: Vec<_> = links.iter().map(|u| u.path().to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "/biz/joes-plumbing-austin",
                "/biz/acme-pipes-austin",
                "/biz/blue-water-austin"
            ]
        );
        assert!(links[0].query().is_none());
    }

    #[test]
    fn test_detail_links_deduplicated() {
        let html = r#"
            <a href="/biz/joes-plumbing-austin">Joe's</a>
            <a href="/biz/joes-plumbing-austin?hrid=abc">Joe's again</a>
        "#;
        assert_eq!(extract_detail_links(html, &search_page()).len(), 1);
    }

    #[test]
    fn test_skips_sub_pages_and_other_links() {
        let html = r#"
            <a href="/biz/joes-plumbing-austin/reviews">Reviews</a>
            <a href="/biz_photos/joes-plumbing-austin">Photos</a>
            <a href="/biz/">Empty</a>
            <a href="/search?find_desc=plumbers&start=10">Next</a>
            <a href="https://example.com/biz/fake">Elsewhere</a>
        "#;
        assert!(extract_detail_links(html, &search_page()).is_empty());
    }

    #[test]
    fn test_find_listing_link_unwraps_google_redirect() {
        let engine = Url::parse("https://www.google.com/search?q=site%3Ayelp.com+plumbers").unwrap();
        let listing = Url::parse("https://www.yelp.com/").unwrap();
        let html = r#"
            <a href="https://support.google.com/">Help</a>
            <a href="/url?q=https://www.yelp.com/search%3Ffind_desc%3Dplumbers&sa=U">Yelp</a>
        "#;
        let found = find_listing_link(html, &engine, &listing).unwrap();
        assert_eq!(found.host_str(), Some("www.yelp.com"));
    }

    #[test]
    fn test_find_listing_link_absent() {
        let engine = Url::parse("https://www.bing.com/search?q=x").unwrap();
        let listing = Url::parse("https://www.yelp.com/").unwrap();
        assert!(find_listing_link("<a href='https://example.com'>x</a>", &engine, &listing).is_none());
    }

    #[test]
    fn test_rank_contact_links() {
        let home = Url::parse("https://example.com/").unwrap();
        let html = r#"
            <a href="/menu">Menu</a>
            <a href="/about">Our story</a>
            <a href="/contact-us">Contact us</a>
            <a href="https://facebook.com/contact">Facebook</a>
            <a href="mailto:hi@example.com">Email</a>
            <a href="/contact-us#form">Contact form</a>
        "#;
        let links = rank_contact_links(html, &home);
        let paths: Vec<_> = links.iter().map(|u| u.path().to_string()).collect();
        assert_eq!(paths, vec!["/contact-us", "/about"]);
    }

    #[test]
    fn test_rank_contact_links_excludes_self() {
        let page = Url::parse("https://example.com/contact").unwrap();
        let html = r#"<a href="/contact">Contact</a>"#;
        assert!(rank_contact_links(html, &page).is_empty());
    }
}
