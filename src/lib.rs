//! Lead-Harvest: a review-listing lead crawler
//!
//! This crate turns a set of search tasks into a bounded stream of enriched business
//! records. It paginates listing search results, extracts each business detail page
//! through a layered strategy chain, and resolves a contact email from the business
//! website.

pub mod config;
pub mod crawler;
pub mod email;
pub mod extract;
pub mod output;
pub mod providers;
pub mod record;
pub mod robots;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Lead-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Provider error: {0}")]
    Provider(#[from] providers::ProviderError),

    #[error("Listing site disallows crawling by robots.txt: {url}")]
    RobotsDenied { url: String },

    /// Carries the run summary so callers can still report the run
    #[error("All {tasks} tasks failed before any record was produced")]
    AllTasksFailed {
        tasks: usize,
        summary: Box<output::RunSummary>,
    },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a single page navigation
///
/// Only `Timeout`, `Network` and soft `Blocked` are retried by the page fetcher.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Blocked at {url} ({reason})")]
    Blocked {
        url: String,
        soft: bool,
        reason: String,
    },

    #[error("CAPTCHA unsolved at {url}: {reason}")]
    CaptchaUnsolved { url: String, reason: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },
}

impl FetchError {
    /// Returns true if the fetcher should back off and try again
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::Blocked { soft, .. } => *soft,
            FetchError::CaptchaUnsolved { .. } | FetchError::Http { .. } => false,
        }
    }

    /// Maps the error onto the run-level failure taxonomy
    pub fn failure_kind(&self) -> state::FailureKind {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } => {
                state::FailureKind::TransientNetwork
            }
            FetchError::Http { .. } => state::FailureKind::HttpStatus,
            FetchError::Blocked { .. } => state::FailureKind::Blocked,
            FetchError::CaptchaUnsolved { .. } => state::FailureKind::CaptchaUnsolved,
        }
    }

    /// The URL the failed navigation targeted
    pub fn url(&self) -> &str {
        match self {
            FetchError::Timeout { url }
            | FetchError::Blocked { url, .. }
            | FetchError::CaptchaUnsolved { url, .. }
            | FetchError::Network { url, .. }
            | FetchError::Http { url, .. } => url,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing environment variable: {0}")]
    MissingEnv(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Lead-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

/// Result type alias for page navigation
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOrchestrator, RunSettings};
pub use record::{PartialRecord, PendingDetail, Record, Task};
pub use state::{FailureKind, RunMetrics};
