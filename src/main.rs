//! Lead-Harvest main entry point
//!
//! This is the command-line interface for the Lead-Harvest review-listing crawler.

use anyhow::{bail, Context};
use clap::Parser;
use lead_harvest::config::{load_config_with_hash, Config, MAX_TARGET_COUNT};
use lead_harvest::crawler::{ai_capabilities, crawl, effective_concurrency, effective_target};
use lead_harvest::output::print_summary;
use lead_harvest::HarvestError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Lead-Harvest: a review-listing lead crawler
///
/// Lead-Harvest paginates listing-site search results for each task, extracts every
/// business detail page through a layered strategy chain, resolves a contact email
/// from the business website and appends the records to a JSON Lines dataset.
#[derive(Parser, Debug)]
#[command(name = "lead-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A review-listing lead crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Override the configured target record count
    #[arg(long, value_name = "N")]
    target: Option<u32>,

    /// Override the configured worker count (clamped to 3..=5)
    #[arg(long, value_name = "C")]
    concurrency: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if let Some(target) = cli.target {
        if target < 1 {
            bail!("--target must be at least 1");
        }
        if target > MAX_TARGET_COUNT {
            tracing::warn!(
                "--target {} exceeds the per-run ceiling, {} records will be collected",
                target,
                MAX_TARGET_COUNT
            );
        }
        config.run.target_count = target;
    }
    if let Some(concurrency) = cli.concurrency {
        config.run.concurrency = concurrency;
    }

    if cli.dry_run {
        handle_dry_run(&config)
    } else {
        handle_crawl(&config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("lead_harvest=info,warn"),
            1 => EnvFilter::new("lead_harvest=debug,info"),
            2 => EnvFilter::new("lead_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let tasks = config.build_tasks()?;
    let weights = config.entry_flow()?;
    let (schema_ai, llm) = ai_capabilities(config);

    println!("=== Lead-Harvest Dry Run ===\n");

    println!("Run:");
    println!(
        "  Target records: {} (ceiling {})",
        effective_target(config.run.target_count),
        MAX_TARGET_COUNT
    );
    println!(
        "  Workers: {} (requested {})",
        effective_concurrency(config.run.concurrency),
        config.run.concurrency
    );
    println!("  Per-business isolation: {}", config.run.per_business_isolation);
    println!("  Debug snapshots: {}", config.run.debug_snapshot);
    println!("  CAPTCHA timeout: {}s", config.run.captcha_timeout_seconds);
    println!("  Contact pages per website: {}", config.run.email_max_contact_pages);
    println!("  Respect robots.txt: {}", config.run.respect_robots);

    println!("\nListing Site:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Max result pages per task: {}", config.site.max_search_pages);

    println!("\nEntry Flow:");
    for (mode, probability) in weights.modes() {
        println!("  - {}: {:.1}%", mode, probability * 100.0);
    }

    println!("\nExtraction Strategies:");
    println!("  - structured markup: enabled");
    println!("  - DOM heuristics: enabled");
    println!("  - schema AI: {}", enabled(schema_ai.is_some()));
    println!("  - LLM fallback: {}", enabled(llm.is_some()));

    println!("\nOutput:");
    println!("  Dataset: {}", config.output.dataset_path);
    println!("  Snapshots: {}", config.output.snapshot_dir);

    println!("\nTasks ({}):", tasks.len());
    for task in &tasks {
        println!("  - {}", task);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start {} tasks", tasks.len());

    Ok(())
}

fn enabled(on: bool) -> &'static str {
    if on {
        "enabled"
    } else {
        "disabled"
    }
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        "Tasks: {}, target: {}, requested workers: {}",
        config.tasks.len(),
        config.run.target_count,
        config.run.concurrency
    );

    match crawl(config).await {
        Ok(summary) => {
            tracing::info!("Run completed successfully");
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            if let HarvestError::AllTasksFailed { summary, .. } = &e {
                print_summary(summary);
            }
            tracing::error!("Run failed: {}", e);
            Err(anyhow::Error::new(e).context("Run aborted"))
        }
    }
}
