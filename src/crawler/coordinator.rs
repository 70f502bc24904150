//! Crawl orchestration
//!
//! This module contains the run loop that ties the pipeline together:
//! - Gating the run on robots.txt
//! - Running up to C task paginators at once, feeding one detail queue
//! - Admitting detail pages into C worker slots
//! - Driving each detail page through extraction, website resolution and email lookup
//! - Stopping cooperatively once the target count is reached
//! - Producing the terminal run summary

use crate::config::Config;
use crate::crawler::{
    CrawlBudget, EntryFlowWeights, EntryRouter, NavContext, PageFetcher, PageLimits,
    RandomSource, RetryPolicy, SearchPaginator, Sleeper, ThreadRandom, TokioSleeper,
};
use crate::email::EmailResolver;
use crate::extract::{ExtractionChain, PageContent};
use crate::output::{RecordSink, RunSummary, SnapshotSink};
use crate::providers::{CaptchaSolver, LlmClient, Navigator, SchemaExtractor, SessionId};
use crate::record::{PartialRecord, PendingDetail, Record, Task};
use crate::state::{FailureKind, RunMetrics, TaskOutcome};
use crate::url::{classify_website_link, same_site, website_string, WebsiteLink};
use crate::{ConfigError, HarvestError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Detail links buffered per worker slot between paginators and workers
const QUEUE_DEPTH_PER_WORKER: usize = 4;

/// Run parameters resolved from configuration
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Requested record count; capped by the budget
    pub target: u32,

    /// Requested worker count; clamped by the budget
    pub concurrency: u32,

    /// Give every detail page its own navigation session
    pub per_business_isolation: bool,

    /// Save every fetched page to the snapshot sink
    pub debug_snapshot: bool,

    pub entry_flow: EntryFlowWeights,
    pub captcha_timeout: Duration,
    pub email_max_contact_pages: usize,
    pub respect_robots: bool,

    /// Base URL of the listing site
    pub listing: Url,

    pub limits: PageLimits,
    pub retry: RetryPolicy,
}

impl RunSettings {
    /// Builds settings from a loaded configuration
    ///
    /// # Returns
    ///
    /// * `Ok(RunSettings)` - Settings ready for an orchestrator
    /// * `Err(ConfigError)` - The base URL or entry-flow ratios are invalid
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            target: config.run.target_count,
            concurrency: config.run.concurrency,
            per_business_isolation: config.run.per_business_isolation,
            debug_snapshot: config.run.debug_snapshot,
            entry_flow: config.entry_flow()?,
            captcha_timeout: Duration::from_secs(config.run.captcha_timeout_seconds),
            email_max_contact_pages: config.run.email_max_contact_pages as usize,
            respect_robots: config.run.respect_robots,
            listing: config.base_url()?,
            limits: PageLimits {
                max_pages: config.site.max_search_pages,
                page_size: config.site.page_size,
            },
            retry: RetryPolicy::from_config(&config.fetch),
        })
    }
}

/// Capabilities the orchestrator calls through
///
/// Only the navigator and the record sink are required; every other capability
/// degrades gracefully when absent.
#[derive(Clone)]
pub struct Collaborators {
    pub navigator: Arc<dyn Navigator>,
    pub sink: Arc<dyn RecordSink>,
    pub solver: Option<Arc<dyn CaptchaSolver>>,
    pub schema_ai: Option<Arc<dyn SchemaExtractor>>,
    pub llm: Option<Arc<dyn LlmClient>>,
    pub snapshots: Option<Arc<dyn SnapshotSink>>,
    pub rng: Arc<dyn RandomSource>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl Collaborators {
    /// Production defaults: thread-local randomness and real sleeps
    pub fn new(navigator: Arc<dyn Navigator>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            navigator,
            sink,
            solver: None,
            schema_ai: None,
            llm: None,
            snapshots: None,
            rng: Arc::new(ThreadRandom),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_solver(mut self, solver: Option<Arc<dyn CaptchaSolver>>) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_schema_ai(mut self, schema_ai: Option<Arc<dyn SchemaExtractor>>) -> Self {
        self.schema_ai = schema_ai;
        self
    }

    pub fn with_llm(mut self, llm: Option<Arc<dyn LlmClient>>) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_snapshots(mut self, snapshots: Option<Arc<dyn SnapshotSink>>) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn with_rng(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }
}

/// Progress events published while a run is in flight
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    /// A record was written to the sink
    Record(Record),

    /// A task's pagination ended
    TaskFinished {
        task: usize,
        label: String,
        outcome: TaskOutcome,
    },

    /// The run finished; always the last event
    Summary(RunSummary),
}

type EventSender = mpsc::UnboundedSender<CrawlEvent>;

fn publish(events: &Option<EventSender>, event: CrawlEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is listening
        let _ = tx.send(event);
    }
}

/// Main run orchestrator
pub struct CrawlOrchestrator {
    settings: RunSettings,
    collab: Collaborators,
    events: Option<EventSender>,
}

impl CrawlOrchestrator {
    pub fn new(settings: RunSettings, collab: Collaborators) -> Self {
        Self {
            settings,
            collab,
            events: None,
        }
    }

    /// Publishes progress events to `events`
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Runs every task until the target is reached or all tasks have ended
    ///
    /// # Arguments
    ///
    /// * `tasks` - Tasks in input order
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run finished, possibly with some failed tasks
    /// * `Err(HarvestError::RobotsDenied)` - robots.txt disallows the listing paths
    /// * `Err(HarvestError::AllTasksFailed)` - Every task failed and nothing was emitted
    pub async fn run(&self, tasks: Vec<Task>) -> crate::Result<RunSummary> {
        let started = Instant::now();
        let settings = &self.settings;

        if settings.respect_robots {
            crate::robots::ensure_allowed(self.collab.navigator.as_ref(), &settings.listing)
                .await?;
        }

        let metrics = Arc::new(RunMetrics::new());
        let budget = Arc::new(CrawlBudget::new(settings.target, settings.concurrency));
        let cancel = CancellationToken::new();

        let snapshots = if settings.debug_snapshot {
            self.collab.snapshots.clone()
        } else {
            None
        };
        let fetcher = Arc::new(
            PageFetcher::new(
                Arc::clone(&self.collab.navigator),
                settings.retry.clone(),
                Arc::clone(&self.collab.sleeper),
                Arc::clone(&self.collab.rng),
                Arc::clone(&metrics),
            )
            .with_solver(self.collab.solver.clone(), settings.captcha_timeout)
            .with_listing(settings.listing.clone())
            .with_snapshots(snapshots),
        );

        let chain = ExtractionChain::standard(
            self.collab.schema_ai.clone(),
            self.collab.llm.clone(),
            Arc::clone(&metrics),
        );
        let resolver = EmailResolver::new(
            Arc::clone(&fetcher),
            Arc::clone(&budget),
            settings.email_max_contact_pages,
        )
        .with_llm(self.collab.llm.clone());

        let worker = DetailWorker {
            fetcher: Arc::clone(&fetcher),
            chain: Arc::new(chain),
            resolver: Arc::new(resolver),
            budget: Arc::clone(&budget),
            metrics: Arc::clone(&metrics),
            sink: Arc::clone(&self.collab.sink),
            listing: settings.listing.clone(),
            isolation: settings.per_business_isolation,
            cancel: cancel.clone(),
            events: self.events.clone(),
        };

        tracing::info!(
            "Starting run: {} tasks, target {}, {} workers",
            tasks.len(),
            budget.target(),
            budget.concurrency()
        );

        let tasks_total = tasks.len();
        let router = EntryRouter::new(settings.entry_flow.clone(), Arc::clone(&self.collab.rng));
        let (tx, mut rx) = mpsc::channel(budget.concurrency() * QUEUE_DEPTH_PER_WORKER);
        let task_slots = Arc::new(Semaphore::new(budget.concurrency()));
        let mut producers: JoinSet<(usize, String, TaskOutcome)> = JoinSet::new();

        for task in tasks {
            let task = Arc::new(task);
            let entry_mode = router.choose(&task);
            let paginator = SearchPaginator::new(
                Arc::clone(&task),
                Arc::clone(&fetcher),
                Arc::clone(&budget),
                settings.listing.clone(),
                entry_mode,
                settings.limits,
            );
            let task_slots = Arc::clone(&task_slots);
            let tx = tx.clone();
            let cancel = cancel.clone();

            producers.spawn(async move {
                let label = task.label();
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return (task.id, label, TaskOutcome::Stopped),
                    permit = task_slots.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return (task.id, label, TaskOutcome::Stopped),
                    },
                };
                tracing::info!(task = task.id, mode = %entry_mode, "Starting task {}", label);
                let outcome = paginator.run(tx, cancel).await;
                (task.id, label, outcome)
            });
        }
        // Paginators hold the only senders; the queue closes when the last one ends
        drop(tx);

        let mut outcomes: Vec<(usize, String, TaskOutcome)> = Vec::with_capacity(tasks_total);
        let mut workers: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(joined) = producers.join_next(), if !producers.is_empty() => {
                    self.task_finished(joined, &mut outcomes);
                }
                next = rx.recv() => {
                    let detail = match next {
                        Some(detail) => detail,
                        None => break,
                    };
                    if budget.target_reached() {
                        budget.record_skipped();
                        continue;
                    }
                    let permit = tokio::select! {
                        _ = cancel.cancelled() => {
                            budget.record_skipped();
                            break;
                        }
                        permit = budget.acquire_slot() => match permit {
                            Some(permit) => permit,
                            None => break,
                        },
                    };
                    let worker = worker.clone();
                    workers.spawn(async move {
                        let _permit = permit;
                        worker.process(detail).await;
                    });
                }
            }
        }

        // Anything still queued was discovered but never admitted
        rx.close();
        while rx.try_recv().is_ok() {
            budget.record_skipped();
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Detail worker aborted: {}", e);
                budget.record_failed();
            }
        }
        while let Some(joined) = producers.join_next().await {
            self.task_finished(joined, &mut outcomes);
        }

        self.collab.sink.flush().await?;

        outcomes.sort_by_key(|(id, _, _)| *id);
        let tasks_failed = outcomes.iter().filter(|(_, _, o)| o.is_failure()).count();
        for (_, _, outcome) in &outcomes {
            if let TaskOutcome::Failed(kind) = outcome {
                metrics.record_failure(*kind);
            } else if *outcome == TaskOutcome::Exhausted && !budget.target_reached() {
                metrics.record_failure(FailureKind::TaskExhausted);
            }
        }

        let summary = RunSummary {
            target: budget.target(),
            concurrency: budget.concurrency(),
            emitted: budget.emitted(),
            failed: budget.failed(),
            skipped_cap: budget.skipped_cap(),
            unresolved: budget.unresolved(),
            tasks_total,
            tasks_failed,
            task_outcomes: outcomes
                .into_iter()
                .map(|(_, label, outcome)| (label, outcome))
                .collect(),
            duration: started.elapsed(),
            metrics: metrics.snapshot(),
        };

        tracing::info!(
            "Run finished: {} emitted, {} failed, {} skipped at cap, {} unresolved",
            summary.emitted,
            summary.failed,
            summary.skipped_cap,
            summary.unresolved
        );
        publish(&self.events, CrawlEvent::Summary(summary.clone()));

        if summary.all_tasks_failed() {
            tracing::error!("All {} tasks failed before any record was produced", tasks_total);
            return Err(HarvestError::AllTasksFailed {
                tasks: tasks_total,
                summary: Box::new(summary),
            });
        }

        Ok(summary)
    }

    fn task_finished(
        &self,
        joined: Result<(usize, String, TaskOutcome), JoinError>,
        outcomes: &mut Vec<(usize, String, TaskOutcome)>,
    ) {
        match joined {
            Ok((task, label, outcome)) => {
                if outcome.is_failure() {
                    tracing::warn!(task, "Task {} ended: {}", label, outcome);
                } else {
                    tracing::info!(task, "Task {} ended: {}", label, outcome);
                }
                publish(
                    &self.events,
                    CrawlEvent::TaskFinished {
                        task,
                        label: label.clone(),
                        outcome,
                    },
                );
                outcomes.push((task, label, outcome));
            }
            Err(e) => tracing::error!("Task paginator aborted: {}", e),
        }
    }
}

/// Processes one detail page end to end
#[derive(Clone)]
struct DetailWorker {
    fetcher: Arc<PageFetcher>,
    chain: Arc<ExtractionChain>,
    resolver: Arc<EmailResolver>,
    budget: Arc<CrawlBudget>,
    metrics: Arc<RunMetrics>,
    sink: Arc<dyn RecordSink>,
    listing: Url,
    isolation: bool,
    cancel: CancellationToken,
    events: Option<EventSender>,
}

impl DetailWorker {
    async fn process(&self, detail: PendingDetail) {
        if self.budget.target_reached() {
            self.budget.record_skipped();
            return;
        }

        let navigator = Arc::clone(self.fetcher.navigator());
        let session = if self.isolation {
            navigator.open_session().await
        } else {
            SessionId::SHARED
        };

        self.process_in_session(&detail, session).await;

        if self.isolation {
            navigator.close_session(session).await;
        }
    }

    async fn process_in_session(&self, detail: &PendingDetail, session: SessionId) {
        let ctx = NavContext::new(session, detail.task.label()).with_referer(detail.referer.clone());

        let page = match self.fetcher.fetch(&detail.url, &ctx).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(task = detail.task.id, url = %detail.url, "Detail page failed: {}", e);
                self.budget.record_failed();
                self.metrics.record_failure(e.failure_kind());
                return;
            }
        };

        let final_url = page.final_url.clone();
        let mut partial = self
            .chain
            .run(&PageContent::new(final_url.clone(), page.body))
            .await;

        if partial.business_name().is_none() {
            tracing::info!(task = detail.task.id, url = %final_url, "No business name, skipping page");
            self.budget.record_unresolved();
            self.metrics.record_failure(FailureKind::ExtractionMiss);
            return;
        }

        let website = self.resolve_website(&partial, &ctx).await;
        partial.replace_website(website.as_ref().map(website_string));

        if partial.email().is_none() {
            if let Some(site) = &website {
                let email_ctx = ctx.clone().with_referer(None);
                if let Some(found) = self.resolver.resolve(site, &email_ctx).await {
                    tracing::debug!(url = %found.page, "Found email {}", found.address);
                    partial.offer_email(found.address, found.source.field_source());
                }
            }
        }

        self.emit(partial, detail).await;
    }

    /// Resolves the record's website to a final external URL
    ///
    /// Redirector links without an embedded target are followed once. A link that
    /// still lands on the listing site is dropped.
    async fn resolve_website(&self, partial: &PartialRecord, ctx: &NavContext) -> Option<Url> {
        let link = Url::parse(partial.website()?).ok()?;

        match classify_website_link(&link, &self.listing) {
            WebsiteLink::External(url) => Some(url),
            WebsiteLink::Redirector(url) => match self.fetcher.fetch(&url, ctx).await {
                Ok(page) if !same_site(&page.final_url, &self.listing) => Some(page.final_url),
                Ok(_) => {
                    tracing::debug!(url = %url, "Redirector did not leave the listing site");
                    None
                }
                Err(e) => {
                    tracing::debug!(url = %url, "Could not follow website redirector: {}", e);
                    None
                }
            },
        }
    }

    async fn emit(&self, partial: PartialRecord, detail: &PendingDetail) {
        let record = match partial.into_record() {
            Some(record) => record,
            None => {
                self.budget.record_unresolved();
                return;
            }
        };

        let position = match self.budget.try_reserve_emission() {
            Some(position) => position,
            None => {
                tracing::debug!(url = %detail.url, "Target reached, dropping {}", record.business_name);
                self.budget.record_skipped();
                return;
            }
        };

        if let Err(e) = self.sink.push(&record).await {
            tracing::error!(url = %detail.url, "Failed to write record: {}", e);
            self.budget.release_emission();
            self.budget.record_failed();
            return;
        }

        self.metrics.record_email(record.email.is_some());
        tracing::debug!(task = detail.task.id, "Emitted {}", record.business_name);

        let target = self.budget.target();
        if position % 10 == 0 {
            tracing::info!("Progress: {} / {} records emitted", position, target);
        }
        publish(&self.events, CrawlEvent::Record(record));

        if position >= target {
            tracing::info!("Target of {} records reached, stopping", target);
            self.cancel.cancel();
        }
    }
}
