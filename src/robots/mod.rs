//! Robots.txt gate for the listing site
//!
//! Before a run starts, the listing host's robots.txt is fetched once and the paths
//! the crawler depends on are checked for the `*` agent. A missing or unreadable
//! robots.txt allows everything.

mod parser;

pub use parser::RobotsRules;

use crate::providers::{NavRequest, Navigator, SessionId};
use crate::HarvestError;
use url::Url;

/// Paths the run needs: the home page, search results and detail pages
pub const REQUIRED_PATHS: &[&str] = &["/", "/search", "/biz"];

/// Fetches robots.txt for `base`
///
/// # Returns
///
/// The parsed rules, or allow-all when the file is missing, returns a non-200
/// status, or cannot be fetched.
pub async fn fetch_robots(navigator: &dyn Navigator, base: &Url) -> RobotsRules {
    let url = match base.join("/robots.txt") {
        Ok(url) => url,
        Err(_) => return RobotsRules::allow_all(),
    };

    let request = NavRequest {
        url: url.clone(),
        referer: None,
        session: SessionId::SHARED,
    };

    match navigator.navigate(&request).await {
        Ok(response) if response.status == 200 => RobotsRules::from_content(&response.body),
        Ok(response) => {
            tracing::debug!(url = %url, "robots.txt returned HTTP {}, allowing all", response.status);
            RobotsRules::allow_all()
        }
        Err(e) => {
            tracing::warn!(url = %url, "Failed to fetch robots.txt, allowing all: {}", e);
            RobotsRules::allow_all()
        }
    }
}

/// Aborts the run if robots.txt disallows any required path for `*`
///
/// # Returns
///
/// * `Ok(())` - Every required path is allowed
/// * `Err(HarvestError::RobotsDenied)` - The first disallowed path
pub async fn ensure_allowed(navigator: &dyn Navigator, base: &Url) -> crate::Result<()> {
    let rules = fetch_robots(navigator, base).await;

    for path in REQUIRED_PATHS {
        let url = base.join(path)?;
        if !rules.is_allowed(url.as_str(), "*") {
            tracing::error!(url = %url, "Disallowed by robots.txt");
            return Err(HarvestError::RobotsDenied {
                url: url.to_string(),
            });
        }
    }

    tracing::debug!(host = base.host_str().unwrap_or_default(), "robots.txt allows crawling");
    Ok(())
}
