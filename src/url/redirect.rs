//! Website redirect dereferencing
//!
//! Listing sites wrap outbound website links in their own redirector, e.g.
//! `/biz_redir?url=https%3A%2F%2Fexample.com&...`. The record must carry the real
//! destination, never the redirector.

use crate::url::same_site;
use url::Url;

/// Query parameters that carry the destination of a redirector link
const TARGET_PARAMS: &[&str] = &["url", "u", "target"];

/// Where a website link points
#[derive(Debug, Clone, PartialEq)]
pub enum WebsiteLink {
    /// A final, external website
    External(Url),

    /// A listing-site redirector whose destination must be found by following it
    Redirector(Url),
}

/// Decodes the destination embedded in a listing-site redirector URL
///
/// Returns `None` if the link is not a redirector on the listing site, or carries no
/// usable target off the listing site.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use lead_harvest::url::dereference_redirect;
///
/// let listing = Url::parse("https://www.yelp.com/").unwrap();
/// let link = Url::parse("https://www.yelp.com/biz_redir?url=https%3A%2F%2Fexample.com&s=abc").unwrap();
/// assert_eq!(dereference_redirect(&link, &listing).unwrap().as_str(), "https://example.com/");
/// ```
pub fn dereference_redirect(link: &Url, listing: &Url) -> Option<Url> {
    if !link.path().contains("redir") {
        return None;
    }
    off_site_target(link, listing)
}

/// Classifies a website link found on a detail page
///
/// Links off the listing site are taken as they are. A listing-site link either
/// embeds its destination or has to be followed.
///
/// # Arguments
///
/// * `link` - Absolute website link as extracted from the page
/// * `listing` - Base URL of the listing site
pub fn classify_website_link(link: &Url, listing: &Url) -> WebsiteLink {
    if !same_site(link, listing) {
        return WebsiteLink::External(link.clone());
    }

    match off_site_target(link, listing) {
        Some(target) => WebsiteLink::External(target),
        None => WebsiteLink::Redirector(link.clone()),
    }
}

/// Formats a resolved website for the record
///
/// A bare origin drops its trailing slash (`https://example.com`); anything with a
/// path, query or fragment keeps its canonical form.
pub fn website_string(url: &Url) -> String {
    let s = url.as_str();
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        s.trim_end_matches('/').to_string()
    } else {
        s.to_string()
    }
}

/// Target embedded in a listing-site link, unless it points back at the listing site
fn off_site_target(link: &Url, listing: &Url) -> Option<Url> {
    if !same_site(link, listing) {
        return None;
    }
    embedded_target(link).filter(|target| !same_site(target, listing))
}

fn embedded_target(link: &Url) -> Option<Url> {
    link.query_pairs()
        .find(|(k, _)| TARGET_PARAMS.contains(&k.as_ref()))
        .and_then(|(_, v)| Url::parse(v.trim()).ok())
        .filter(|u| (u.scheme() == "http" || u.scheme() == "https") && u.host_str().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Url {
        Url::parse("https://www.yelp.com/").unwrap()
    }

    #[test]
    fn test_biz_redir_is_dereferenced() {
        let link =
            Url::parse("https://www.yelp.com/biz_redir?url=https%3A%2F%2Fexample.com").unwrap();
        assert_eq!(
            classify_website_link(&link, &listing()),
            WebsiteLink::External(Url::parse("https://example.com").unwrap())
        );
    }

    #[test]
    fn test_encoded_path_and_query_survive() {
        let link = Url::parse(
            "https://www.yelp.com/biz_redir?url=https%3A%2F%2Fshop.example%2Fhome%3Fref%3Dyelp&cachebuster=1",
        )
        .unwrap();
        let target = dereference_redirect(&link, &listing()).unwrap();
        assert_eq!(target.as_str(), "https://shop.example/home?ref=yelp");
    }

    #[test]
    fn test_listing_link_without_target_needs_following() {
        let link = Url::parse("https://www.yelp.com/biz_redir?s=abc").unwrap();
        assert_eq!(
            classify_website_link(&link, &listing()),
            WebsiteLink::Redirector(link.clone())
        );
    }

    #[test]
    fn test_external_link_kept() {
        let link = Url::parse("https://bluedoor.example/?url=https://evil.test").unwrap();
        assert_eq!(
            classify_website_link(&link, &listing()),
            WebsiteLink::External(link.clone())
        );
    }

    #[test]
    fn test_website_string() {
        assert_eq!(
            website_string(&Url::parse("https://example.com/").unwrap()),
            "https://example.com"
        );
        assert_eq!(
            website_string(&Url::parse("https://shop.example/home?ref=1").unwrap()),
            "https://shop.example/home?ref=1"
        );
    }

    #[test]
    fn test_non_http_target_rejected() {
        let link = Url::parse("https://www.yelp.com/biz_redir?url=javascript%3Aalert(1)").unwrap();
        assert!(dereference_redirect(&link, &listing()).is_none());
    }

    #[test]
    fn test_redirector_on_other_host_is_not_unwrapped() {
        let link = Url::parse("https://tracker.example/redir?url=https%3A%2F%2Fshop.example").unwrap();
        assert!(dereference_redirect(&link, &listing()).is_none());
        assert_eq!(
            classify_website_link(&link, &listing()),
            WebsiteLink::External(link.clone())
        );
    }

    #[test]
    fn test_target_back_on_listing_site_is_not_external() {
        let link = Url::parse(
            "https://www.yelp.com/biz_redir?url=https%3A%2F%2Fyelp.com%2Fbiz%2Fblue-door",
        )
        .unwrap();
        assert!(dereference_redirect(&link, &listing()).is_none());
        assert_eq!(
            classify_website_link(&link, &listing()),
            WebsiteLink::Redirector(link.clone())
        );
    }
}
