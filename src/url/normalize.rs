use crate::UrlError;
use url::Url;

/// List of tracking query parameters to remove during normalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
    "ref",
    "osq",
    "hrid",
];

/// Normalizes a URL so equivalent links compare equal
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not http(s)
/// 2. Lowercase the host
/// 3. Normalize path:
///    - Remove dot segments (. and ..)
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 4. Remove fragment (everything after #)
/// 5. Remove tracking query parameters
/// 6. Sort remaining query parameters alphabetically
/// 7. Remove empty query string (trailing ?)
///
/// The scheme and any `www.` prefix are kept: the result must stay fetchable.
///
/// # Examples
///
/// ```
/// use lead_harvest::url::normalize_url;
///
/// let url = normalize_url("https://WWW.Example.com/biz/blue-door/?utm_source=x#map").unwrap();
/// assert_eq!(url.as_str(), "https://www.example.com/biz/blue-door");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    // The url crate already lowercases domain hosts; only reject hostless URLs here
    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(None);
            url.query_pairs_mut().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Resolves a detail-page link and strips its query
///
/// Detail pages are identified by path alone, so two links that differ only in
/// query parameters refer to the same business.
pub fn normalize_detail_url(href: &str, base: &Url) -> Option<Url> {
    let joined = base.join(href.trim()).ok()?;
    let mut url = normalize_url(joined.as_str()).ok()?;
    url.set_query(None);
    Some(url)
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", normalized_segments.join("/"))
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
