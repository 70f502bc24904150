//! Search-result pagination for one task
//!
//! A `SearchPaginator` walks a task's result pages in order and yields the detail
//! links each page contributes. Pagination is sequential by nature: whether the next
//! page is requested depends on the current one.

use crate::crawler::parser::{extract_detail_links, find_listing_link};
use crate::crawler::{CrawlBudget, EntryMode, NavContext, PageFetcher, SearchEngine};
use crate::providers::SessionId;
use crate::record::{PendingDetail, Task};
use crate::state::{FailureKind, TaskOutcome};
use crate::{FetchError, HarvestError};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Pagination limits taken from the site configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    /// Safety bound on result pages per task
    pub max_pages: u32,
    /// Results per page, used for offset paging
    pub page_size: u32,
}

/// Lazy, finite sequence of detail links for one task
pub struct SearchPaginator {
    task: Arc<Task>,
    fetcher: Arc<PageFetcher>,
    budget: Arc<CrawlBudget>,
    listing: Url,
    entry_mode: EntryMode,
    limits: PageLimits,
    session: SessionId,

    /// Next page to request (1-based)
    page: u32,
    referer: Option<String>,
    warmed_up: bool,

    /// Detail URLs this task has already yielded
    seen: HashSet<String>,
    outcome: Option<TaskOutcome>,
}

impl SearchPaginator {
    pub fn new(
        task: Arc<Task>,
        fetcher: Arc<PageFetcher>,
        budget: Arc<CrawlBudget>,
        listing: Url,
        entry_mode: EntryMode,
        limits: PageLimits,
    ) -> Self {
        Self {
            task,
            fetcher,
            budget,
            listing,
            entry_mode,
            limits,
            session: SessionId::SHARED,
            page: 1,
            referer: None,
            warmed_up: false,
            seen: HashSet::new(),
            outcome: None,
        }
    }

    /// Resumes pagination at `page`
    ///
    /// The search-engine warm-up only applies to page 1, so it is skipped here.
    pub fn starting_at(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self.warmed_up = self.page > 1;
        self
    }

    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = session;
        self
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    /// The page the next call will request
    pub fn current_page(&self) -> u32 {
        self.page
    }

    /// Why pagination ended, once it has
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.outcome
    }

    /// Fetches the next result page
    ///
    /// # Returns
    ///
    /// * `Ok(Some(details))` - Detail links first seen on this page; may be empty when
    ///   every new link was already claimed by another task
    /// * `Ok(None)` - Pagination has ended; see `outcome()`
    /// * `Err(HarvestError)` - The page could not be fetched after retries
    pub async fn next_page(&mut self) -> crate::Result<Option<Vec<PendingDetail>>> {
        if self.outcome.is_some() {
            return Ok(None);
        }
        if self.budget.target_reached() {
            return Ok(self.finish(TaskOutcome::Stopped));
        }
        if self.page > self.limits.max_pages {
            tracing::info!(task = self.task.id, "Reached {} result pages", self.limits.max_pages);
            return Ok(self.finish(TaskOutcome::MaxPages));
        }

        if !self.warmed_up {
            self.warmed_up = true;
            self.referer = self.warm_up().await;
        }

        let url = self
            .task
            .page_url(&self.listing, self.page, self.limits.page_size)?;
        let ctx = NavContext::new(self.session, self.task.label()).with_referer(self.referer.clone());

        tracing::debug!(task = self.task.id, page = self.page, url = %url, "Fetching result page");
        let fetched = match self.fetcher.fetch(&url, &ctx).await {
            Ok(fetched) => fetched,
            Err(FetchError::Http { status: 404 | 410, .. }) if self.page > 1 => {
                tracing::info!(
                    task = self.task.id,
                    page = self.page,
                    "Result page is gone, results exhausted"
                );
                return Ok(self.finish(TaskOutcome::Exhausted));
            }
            Err(err) => return Err(err.into()),
        };

        let links = extract_detail_links(&fetched.body, &fetched.final_url);
        let fresh: Vec<Url> = links
            .into_iter()
            .filter(|link| self.seen.insert(link.to_string()))
            .collect();

        if fresh.is_empty() {
            tracing::info!(
                task = self.task.id,
                page = self.page,
                "No new detail links, results exhausted"
            );
            return Ok(self.finish(TaskOutcome::Exhausted));
        }

        let details: Vec<PendingDetail> = fresh
            .into_iter()
            .filter(|link| self.budget.claim_detail(link.as_str()))
            .map(|link| PendingDetail {
                url: link,
                task: Arc::clone(&self.task),
                entry_mode: self.entry_mode,
                referer: Some(url.to_string()),
            })
            .collect();

        tracing::debug!(
            task = self.task.id,
            page = self.page,
            "Page yielded {} detail links",
            details.len()
        );

        self.referer = Some(url.to_string());
        self.page += 1;
        Ok(Some(details))
    }

    /// Feeds detail links into `tx` until pagination ends
    ///
    /// # Returns
    ///
    /// The task's outcome. Fetch failures end the task as `Failed` with the
    /// matching failure kind; they never propagate further.
    pub async fn run(mut self, tx: mpsc::Sender<PendingDetail>, cancel: CancellationToken) -> TaskOutcome {
        loop {
            if cancel.is_cancelled() {
                return TaskOutcome::Stopped;
            }

            let details = match self.next_page().await {
                Ok(Some(details)) => details,
                Ok(None) => return self.outcome.unwrap_or(TaskOutcome::Exhausted),
                Err(err) => {
                    let kind = match &err {
                        HarvestError::Fetch(fetch) => fetch.failure_kind(),
                        _ => FailureKind::TransientNetwork,
                    };
                    tracing::warn!(task = self.task.id, page = self.page, "Task failed: {}", err);
                    return TaskOutcome::Failed(kind);
                }
            };

            for detail in details {
                tokio::select! {
                    _ = cancel.cancelled() => return TaskOutcome::Stopped,
                    sent = tx.send(detail) => {
                        if sent.is_err() {
                            return TaskOutcome::Stopped;
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self, outcome: TaskOutcome) -> Option<Vec<PendingDetail>> {
        self.outcome = Some(outcome);
        None
    }

    /// Visits the search engine first so the listing site sees an organic referral
    ///
    /// Returns the referer for page 1; any failure falls back to direct navigation.
    async fn warm_up(&self) -> Option<String> {
        let engine: SearchEngine = match self.entry_mode {
            EntryMode::SearchEngine(engine) => engine,
            EntryMode::Direct => return None,
        };

        let host = self.listing.host_str()?;
        let search_url = engine.search_url(host, &self.task.search_terms());
        let url = match Url::parse(&search_url) {
            Ok(url) => url,
            Err(_) => return None,
        };

        let ctx = NavContext::new(self.session, self.task.label());
        match self.fetcher.fetch(&url, &ctx).await {
            Ok(page) => {
                if find_listing_link(&page.body, &page.final_url, &self.listing).is_some() {
                    tracing::debug!(task = self.task.id, engine = engine.name(), "Arriving via search engine");
                    Some(search_url)
                } else {
                    tracing::debug!(
                        task = self.task.id,
                        engine = engine.name(),
                        "No listing link on engine results, going direct"
                    );
                    None
                }
            }
            Err(err) => {
                tracing::warn!(
                    task = self.task.id,
                    engine = engine.name(),
                    "Search engine warm-up failed, going direct: {}",
                    err
                );
                None
            }
        }
    }
}
