//! Crawler module for search pagination and detail-page processing
//!
//! This module contains the core crawling logic, including:
//! - Page fetching with retry, backoff, block detection and CAPTCHA handling
//! - Search-result and contact-link parsing
//! - Entry-mode routing and search-engine warm-up
//! - The shared run budget and worker admission
//! - Overall run orchestration

mod backoff;
mod challenge;
mod clock;
mod coordinator;
mod entry;
mod fetcher;
mod paginator;
mod parser;
mod random;
mod scheduler;

pub use backoff::RetryPolicy;
pub use challenge::{detect_challenge, detect_soft_block, status_block_reason};
pub use clock::{RecordingSleeper, Sleeper, TokioSleeper};
pub use coordinator::{Collaborators, CrawlEvent, CrawlOrchestrator, RunSettings};
pub use entry::{EntryFlowWeights, EntryMode, EntryRouter, SearchEngine};
pub use fetcher::{FetchedPage, NavContext, PageFetcher};
pub use paginator::{PageLimits, SearchPaginator};
pub use parser::{extract_detail_links, find_listing_link, rank_contact_links};
pub use random::{FixedRandom, RandomSource, SeededRandom, ThreadRandom};
pub use scheduler::{
    effective_concurrency, effective_target, CrawlBudget, MAX_CONCURRENCY, MIN_CONCURRENCY,
};

use crate::config::Config;
use crate::output::{DirectorySnapshotSink, JsonlSink, RunSummary, SnapshotSink};
use crate::providers::{
    CaptchaSolver, HttpNavigator, LlmClient, OpenAiClient, ProxyPool, SchemaExtractor,
    TwoCaptchaSolver,
};
use std::sync::Arc;
use std::time::Duration;

/// AI capabilities enabled by the configuration and the environment
///
/// Each capability needs its own toggle and the API key. A missing key disables
/// both with a warning; it is never an error.
pub fn ai_capabilities(
    config: &Config,
) -> (Option<Arc<dyn SchemaExtractor>>, Option<Arc<dyn LlmClient>>) {
    let ai = &config.ai;
    if !ai.schema_extraction && !ai.llm_fallback {
        return (None, None);
    }

    let api_key = match ai.api_key() {
        Some(key) => key,
        None => {
            tracing::warn!(
                "{} is not set, AI extraction and LLM fallback are disabled",
                ai.api_key_env
            );
            return (None, None);
        }
    };

    let client = Arc::new(
        OpenAiClient::new(api_key)
            .with_model(&ai.model)
            .with_base_url(&ai.base_url),
    );
    let schema_ai = ai
        .schema_extraction
        .then(|| Arc::clone(&client) as Arc<dyn SchemaExtractor>);
    let llm = ai.llm_fallback.then(|| client as Arc<dyn LlmClient>);
    (schema_ai, llm)
}

/// CAPTCHA solver enabled by the environment
pub fn captcha_solver(config: &Config) -> Option<Arc<dyn CaptchaSolver>> {
    match config.captcha.api_key() {
        Some(key) => Some(Arc::new(
            TwoCaptchaSolver::new(key).with_base_url(&config.captcha.base_url),
        )),
        None => {
            tracing::warn!(
                "{} is not set, CAPTCHA challenges will fail their page",
                config.captcha.api_key_env
            );
            None
        }
    }
}

/// Runs a complete crawl with production providers
///
/// This is the main entry point for a run. It will:
/// 1. Build the HTTP navigator behind the configured proxy
/// 2. Enable the CAPTCHA solver and AI capabilities whose keys are present
/// 3. Open the dataset sink (and snapshot sink in debug mode)
/// 4. Run every task through the orchestrator
///
/// # Arguments
///
/// * `config` - The validated configuration
///
/// # Returns
///
/// * `Ok(RunSummary)` - The run finished, possibly with failed tasks
/// * `Err(HarvestError)` - Bootstrap failed, robots.txt denied the run, or every task failed
pub async fn crawl(config: &Config) -> crate::Result<RunSummary> {
    let settings = RunSettings::from_config(config)?;
    let tasks = config.build_tasks()?;

    let proxy = ProxyPool::from_config(&config.proxy)?;
    if let Some(country) = proxy.country().filter(|_| proxy.is_enabled()) {
        tracing::info!("Using proxy egress pinned to {}", country);
    }
    let navigator = Arc::new(HttpNavigator::new(
        Duration::from_secs(config.fetch.request_timeout_seconds),
        proxy,
    ));

    let (schema_ai, llm) = ai_capabilities(config);
    let sink = Arc::new(JsonlSink::open(&config.output.dataset_path).await?);
    tracing::info!("Writing records to {}", sink.path().display());

    let snapshots = config.run.debug_snapshot.then(|| {
        Arc::new(DirectorySnapshotSink::new(&config.output.snapshot_dir)) as Arc<dyn SnapshotSink>
    });

    let collaborators = Collaborators::new(navigator, sink)
        .with_solver(captcha_solver(config))
        .with_schema_ai(schema_ai)
        .with_llm(llm)
        .with_snapshots(snapshots);

    CrawlOrchestrator::new(settings, collaborators)
        .run(tasks)
        .await
}
