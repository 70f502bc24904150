//! Run-wide budget shared by every worker
//!
//! This module handles:
//! - The concurrency policy (effective worker count clamped to [3, 5])
//! - Worker admission via a semaphore
//! - The emitted-record count and the strict emission reservation
//! - Per-domain contact-page visit counts for the email resolver
//! - Run-wide de-duplication of detail pages

use crate::config::MAX_TARGET_COUNT;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Lower bound on concurrent workers
pub const MIN_CONCURRENCY: usize = 3;

/// Upper bound on concurrent workers
pub const MAX_CONCURRENCY: usize = 5;

/// Clamps a requested worker count to the allowed range
///
/// The range is a fixed policy, not a setting: it protects proxy bandwidth and keeps
/// the block rate down.
///
/// # Examples
///
/// ```
/// use lead_harvest::crawler::effective_concurrency;
///
/// assert_eq!(effective_concurrency(1), 3);
/// assert_eq!(effective_concurrency(4), 4);
/// assert_eq!(effective_concurrency(20), 5);
/// ```
pub fn effective_concurrency(requested: u32) -> usize {
    (requested as usize).clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

/// Caps a requested record target at the per-run ceiling
pub fn effective_target(requested: u32) -> usize {
    requested.clamp(1, MAX_TARGET_COUNT) as usize
}

/// Shared counters for one orchestrator run
///
/// All mutation is atomic or behind short-lived locks; nothing here is held across an
/// await point.
#[derive(Debug)]
pub struct CrawlBudget {
    target: usize,
    concurrency: usize,

    /// Records reserved for emission; never exceeds `target`
    emitted: AtomicUsize,

    /// Detail pages that failed after retries
    failed: AtomicUsize,

    /// Detail pages skipped because the target was already reached
    skipped_cap: AtomicUsize,

    /// Detail pages with no resolvable business name
    unresolved: AtomicUsize,

    /// Worker slots
    slots: Arc<Semaphore>,

    /// Contact pages visited per website domain
    contact_visits: Mutex<HashMap<String, usize>>,

    /// Detail URLs already claimed by some task
    seen_details: Mutex<HashSet<String>>,
}

impl CrawlBudget {
    /// Creates a budget for one run
    ///
    /// # Arguments
    ///
    /// * `target` - Requested record count (capped at 500)
    /// * `requested_concurrency` - Requested worker count (clamped to [3, 5])
    pub fn new(target: u32, requested_concurrency: u32) -> Self {
        let concurrency = effective_concurrency(requested_concurrency);
        Self {
            target: effective_target(target),
            concurrency,
            emitted: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped_cap: AtomicUsize::new(0),
            unresolved: AtomicUsize::new(0),
            slots: Arc::new(Semaphore::new(concurrency)),
            contact_visits: Mutex::new(HashMap::new()),
            seen_details: Mutex::new(HashSet::new()),
        }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn skipped_cap(&self) -> usize {
        self.skipped_cap.load(Ordering::SeqCst)
    }

    pub fn unresolved(&self) -> usize {
        self.unresolved.load(Ordering::SeqCst)
    }

    /// Returns true once the target count has been reserved
    pub fn target_reached(&self) -> bool {
        self.emitted() >= self.target
    }

    /// Waits for a free worker slot
    ///
    /// The permit releases the slot when dropped. Returns `None` only if the semaphore
    /// was closed, which ends admission.
    pub async fn acquire_slot(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.slots).acquire_owned().await.ok()
    }

    /// Number of workers currently holding a slot
    pub fn slots_in_use(&self) -> usize {
        self.concurrency - self.slots.available_permits()
    }

    /// Atomically reserves one emission
    ///
    /// Check and increment happen in a single compare-and-swap loop, so concurrent
    /// workers can never push the count past the target.
    ///
    /// # Returns
    ///
    /// * `Some(n)` - Reserved; `n` is the 1-based position of this record
    /// * `None` - The target was already reached
    pub fn try_reserve_emission(&self) -> Option<usize> {
        let target = self.target;
        self.emitted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n < target {
                    Some(n + 1)
                } else {
                    None
                }
            })
            .ok()
            .map(|previous| previous + 1)
    }

    /// Gives back a reservation whose record could not be written
    pub fn release_emission(&self) {
        let _ = self
            .emitted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_skipped(&self) {
        self.skipped_cap.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_unresolved(&self) {
        self.unresolved.fetch_add(1, Ordering::SeqCst);
    }

    /// Claims a contact-page visit for a website domain
    ///
    /// Returns false once `limit` visits have been claimed for that domain.
    pub fn claim_contact_visit(&self, domain: &str, limit: usize) -> bool {
        let mut visits = self
            .contact_visits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = visits.entry(domain.to_string()).or_insert(0);
        if *count >= limit {
            return false;
        }
        *count += 1;
        true
    }

    /// Contact pages visited so far for a domain
    pub fn contact_visits(&self, domain: &str) -> usize {
        self.contact_visits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(domain)
            .copied()
            .unwrap_or(0)
    }

    /// Claims a detail URL for processing
    ///
    /// Returns false if another task already claimed it.
    pub fn claim_detail(&self, url: &str) -> bool {
        self.seen_details
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(url.to_string())
    }
}
