//! Robots.txt rule checks
//!
//! Matching is delegated to the robotstxt crate, which implements Google's matcher.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt content for one host
#[derive(Debug, Clone)]
pub struct RobotsRules {
    /// Raw robots.txt body; empty means allow everything
    content: String,
}

impl RobotsRules {
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Rules used when robots.txt is missing or cannot be fetched
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
        }
    }

    /// Checks a URL against the rules for `user_agent`
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL to check
    /// * `user_agent` - Product token, `*` for the wildcard group
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let rules = RobotsRules::allow_all();
        assert!(rules.is_allowed("https://www.yelp.com/search", "*"));
    }

    #[test]
    fn test_disallowed_path() {
        let rules = RobotsRules::from_content("User-agent: *\nDisallow: /search\n");
        assert!(!rules.is_allowed("https://www.yelp.com/search?find_desc=x", "*"));
        assert!(rules.is_allowed("https://www.yelp.com/biz/blue-door", "*"));
    }

    #[test]
    fn test_other_agent_group_does_not_apply() {
        let rules = RobotsRules::from_content("User-agent: BadBot\nDisallow: /\n");
        assert!(rules.is_allowed("https://www.yelp.com/", "*"));
    }
}
