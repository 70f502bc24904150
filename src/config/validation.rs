use crate::config::types::{
    Config, FetchConfig, OutputConfig, ProxyConfig, RunConfig, SiteConfig, MAX_FETCH_ATTEMPTS,
    MAX_TARGET_COUNT,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_run_config(&config.run)?;
    validate_site_config(&config.site)?;
    validate_fetch_config(&config.fetch)?;
    validate_proxy_config(&config.proxy)?;
    validate_output_config(&config.output)?;
    validate_tasks(config)?;
    config.entry_flow()?;
    Ok(())
}

/// Validates run configuration
fn validate_run_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.target_count < 1 {
        return Err(ConfigError::Validation(
            "target_count must be at least 1".to_string(),
        ));
    }

    if config.target_count > MAX_TARGET_COUNT {
        tracing::warn!(
            "target_count {} exceeds the per-run ceiling, {} records will be collected",
            config.target_count,
            MAX_TARGET_COUNT
        );
    }

    if config.captcha_timeout_seconds < 1 {
        return Err(ConfigError::Validation(format!(
            "captcha_timeout_seconds must be >= 1, got {}",
            config.captcha_timeout_seconds
        )));
    }

    Ok(())
}

/// Validates listing site configuration
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    validate_http_url("base-url", &config.base_url)?;

    if config.max_search_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_search_pages must be >= 1, got {}",
            config.max_search_pages
        )));
    }

    if config.page_size < 1 {
        return Err(ConfigError::Validation(format!(
            "page_size must be >= 1, got {}",
            config.page_size
        )));
    }

    Ok(())
}

/// Validates retry configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.max_attempts > MAX_FETCH_ATTEMPTS {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be <= {}, got {}",
            MAX_FETCH_ATTEMPTS, config.max_attempts
        )));
    }

    if config.request_timeout_seconds < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_seconds must be >= 1, got {}",
            config.request_timeout_seconds
        )));
    }

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max_delay_ms ({}) must be >= base_delay_ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    Ok(())
}

/// Validates proxy configuration
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if let Some(url) = &config.url {
        validate_http_url("proxy url", url)?;
    }

    if let Some(country) = &config.country {
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Validation(format!(
                "proxy country must be a two-letter ISO code, got '{}'",
                country
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.dataset_path.is_empty() {
        return Err(ConfigError::Validation(
            "dataset_path cannot be empty".to_string(),
        ));
    }

    if config.snapshot_dir.is_empty() {
        return Err(ConfigError::Validation(
            "snapshot_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates task entries
fn validate_tasks(config: &Config) -> Result<(), ConfigError> {
    if config.tasks.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[task]] entry is required".to_string(),
        ));
    }

    config.build_tasks()?;
    Ok(())
}

/// Validates that a URL parses and uses http or https
fn validate_http_url(name: &str, raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use http or https",
            name, raw
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::TaskEntry;

    fn create_test_config() -> Config {
        Config {
            tasks: vec![TaskEntry {
                keyword: Some("plumbers".to_string()),
                location: Some("Austin, TX".to_string()),
                search_url: None,
            }],
            ..Config::default()
        }
    }

    #[test]
    fn test_valid_config() {
        let config = create_test_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_no_tasks() {
        let mut config = create_test_config();
        config.tasks.clear();
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_task_with_both_forms() {
        let mut config = create_test_config();
        config.tasks[0].search_url = Some("https://www.yelp.com/search?find_desc=x".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_task_missing_location() {
        let mut config = create_test_config();
        config.tasks[0].location = None;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_search_url_task() {
        let mut config = create_test_config();
        config.tasks = vec![TaskEntry {
            search_url: Some("https://www.yelp.com/search?find_desc=tacos".to_string()),
            ..TaskEntry::default()
        }];
        assert!(validate(&config).is_ok());

        config.tasks[0].search_url = Some("ftp://www.yelp.com/search".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_target_count() {
        let mut config = create_test_config();
        config.run.target_count = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_large_target_count_is_accepted() {
        let mut config = create_test_config();
        config.run.target_count = 10_000;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_any_concurrency_is_accepted() {
        let mut config = create_test_config();
        config.run.concurrency = 0;
        assert!(validate(&config).is_ok());
        config.run.concurrency = 64;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_attempts() {
        let mut config = create_test_config();
        config.fetch.max_attempts = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_attempts_above_ceiling() {
        let mut config = create_test_config();
        config.fetch.max_attempts = MAX_FETCH_ATTEMPTS;
        assert!(validate(&config).is_ok());
        config.fetch.max_attempts = 50;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_delay_cap_below_base() {
        let mut config = create_test_config();
        config.fetch.base_delay_ms = 5_000;
        config.fetch.max_delay_ms = 1_000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_proxy_country() {
        let mut config = create_test_config();
        config.proxy.country = Some("USA".to_string());
        assert!(validate(&config).is_err());

        config.proxy.country = Some("us".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_negative_entry_weight() {
        let mut config = create_test_config();
        config.run.entry_flow_ratios = "google:-1,direct:1".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_output_path() {
        let mut config = create_test_config();
        config.output.dataset_path = String::new();
        assert!(validate(&config).is_err());
    }
}
