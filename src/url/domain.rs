use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use lead_harvest::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Domain with any leading `www.` removed
///
/// Used as the key for per-site budgets and same-site checks.
pub fn site_key(url: &Url) -> Option<String> {
    extract_domain(url).map(|d| d.strip_prefix("www.").map(str::to_string).unwrap_or(d))
}

/// Returns true if both URLs belong to the same website
///
/// `www.example.com` and `example.com` are the same site; other subdomains are not.
/// Ports must match so that local test servers stay distinct.
pub fn same_site(a: &Url, b: &Url) -> bool {
    match (site_key(a), site_key(b)) {
        (Some(x), Some(y)) => x == y && a.port_or_known_default() == b.port_or_known_default(),
        _ => false,
    }
}
