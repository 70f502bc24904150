//! URL handling module for Lead-Harvest
//!
//! This module provides URL normalization for de-duplication, domain and same-site
//! checks, and dereferencing of listing-site website redirectors.

mod domain;
mod normalize;
mod redirect;

// Re-export main functions
pub use domain::{extract_domain, same_site, site_key};
pub use normalize::{normalize_detail_url, normalize_url};
pub use redirect::{classify_website_link, dereference_redirect, website_string, WebsiteLink};
