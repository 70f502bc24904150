//! Configuration module for Lead-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional except `[[task]]`; missing keys take their defaults.
//!
//! # Example
//!
//! ```no_run
//! use lead_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Collecting up to {} records", config.run.target_count);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AiConfig, CaptchaConfig, Config, FetchConfig, OutputConfig, ProxyConfig, RunConfig,
    SiteConfig, TaskEntry, DEFAULT_ENTRY_FLOW_RATIOS, MAX_FETCH_ATTEMPTS, MAX_TARGET_COUNT,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
