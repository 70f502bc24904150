//! Page fetching
//!
//! This module handles every navigation the crawler performs, including:
//! - Status and content classification (blocks, challenges)
//! - Retry with exponential backoff for transient failures
//! - Identity rotation after soft blocks
//! - CAPTCHA solving bounded by the run's CAPTCHA timeout
//! - Debug snapshots of fetched pages

use crate::crawler::challenge::{
    detect_challenge, detect_soft_block, is_interstitial, status_block_reason,
};
use crate::crawler::{RandomSource, RetryPolicy, Sleeper};
use crate::output::SnapshotSink;
use crate::providers::{CaptchaSolver, Challenge, NavRequest, Navigator, RawResponse, SessionId};
use crate::state::RunMetrics;
use crate::url::same_site;
use crate::{FetchError, FetchResult};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Where a navigation happens and on whose behalf
#[derive(Debug, Clone, PartialEq)]
pub struct NavContext {
    pub session: SessionId,
    pub referer: Option<String>,
    /// Task label used to key debug snapshots
    pub label: String,
}

impl NavContext {
    pub fn new(session: SessionId, label: impl Into<String>) -> Self {
        Self {
            session,
            referer: None,
            label: label.into(),
        }
    }

    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }
}

/// A successfully loaded page
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: Url,
    /// URL after redirects
    pub final_url: Url,
    pub body: String,
}

/// Performs navigations with retry, backoff and challenge handling
///
/// Shared by the paginator, the detail workers and the email resolver.
pub struct PageFetcher {
    navigator: Arc<dyn Navigator>,
    solver: Option<Arc<dyn CaptchaSolver>>,
    policy: RetryPolicy,
    captcha_timeout: Duration,
    /// Challenges are only solved on this site; `None` allows any
    listing: Option<Url>,
    sleeper: Arc<dyn Sleeper>,
    rng: Arc<dyn RandomSource>,
    metrics: Arc<RunMetrics>,
    snapshots: Option<Arc<dyn SnapshotSink>>,
}

impl PageFetcher {
    pub fn new(
        navigator: Arc<dyn Navigator>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        rng: Arc<dyn RandomSource>,
        metrics: Arc<RunMetrics>,
    ) -> Self {
        Self {
            navigator,
            solver: None,
            policy,
            captcha_timeout: Duration::from_secs(120),
            listing: None,
            sleeper,
            rng,
            metrics,
            snapshots: None,
        }
    }

    pub fn with_solver(mut self, solver: Option<Arc<dyn CaptchaSolver>>, timeout: Duration) -> Self {
        self.solver = solver;
        self.captcha_timeout = timeout;
        self
    }

    /// Restricts CAPTCHA solving to pages on the listing site
    pub fn with_listing(mut self, listing: Url) -> Self {
        self.listing = Some(listing);
        self
    }

    pub fn with_snapshots(mut self, snapshots: Option<Arc<dyn SnapshotSink>>) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches a page, retrying transient failures
    ///
    /// # Arguments
    ///
    /// * `url` - The page to load
    /// * `ctx` - Session, referer and task label
    ///
    /// # Returns
    ///
    /// * `Ok(FetchedPage)` - Page content and the final URL after redirects
    /// * `Err(FetchError)` - The last error once retries are exhausted, or the first
    ///   non-retryable one
    pub async fn fetch(&self, url: &Url, ctx: &NavContext) -> FetchResult<FetchedPage> {
        let request = NavRequest {
            url: url.clone(),
            referer: ctx.referer.clone(),
            session: ctx.session,
        };

        let mut attempt = 1;
        loop {
            match self.fetch_once(&request).await {
                Ok(response) => {
                    self.metrics.record_page();
                    self.save_snapshot(ctx, url, &response.body).await;
                    return Ok(FetchedPage {
                        url: url.clone(),
                        final_url: response.final_url,
                        body: response.body,
                    });
                }
                Err(err) if err.is_retryable() && self.policy.should_retry(attempt) => {
                    if matches!(err, FetchError::Blocked { .. }) {
                        self.metrics.record_soft_block();
                        self.navigator.rotate_identity(ctx.session).await;
                        self.metrics.record_rotation();
                    }

                    let delay = self.policy.delay_for(attempt, self.rng.as_ref());
                    tracing::debug!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after {}",
                        err
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if matches!(err, FetchError::Blocked { .. }) {
                        self.metrics.record_soft_block();
                    }
                    tracing::warn!(url = %url, attempt, "Fetch failed: {}", err);
                    return Err(err);
                }
            }
        }
    }

    /// One navigation plus classification of what came back
    async fn fetch_once(&self, request: &NavRequest) -> FetchResult<RawResponse> {
        let response = self.navigator.navigate(request).await?;
        let response = self.classify(request, response)?;

        // A widget inside a contact or signup form gates nothing.
        let challenge = match detect_challenge(&response.body, response.final_url.as_str()) {
            Some(challenge) if is_interstitial(&response.body) => Some(challenge),
            _ => None,
        };

        match challenge {
            Some(challenge) => {
                self.metrics.record_captcha();
                if !self.solves_on(&response.final_url) {
                    return Err(FetchError::CaptchaUnsolved {
                        url: request.url.to_string(),
                        reason: format!("{} challenge outside the listing site", challenge.kind),
                    });
                }
                let solved = self.solve_challenge(request, &challenge).await?;
                let solved = self.classify(request, solved)?;
                if detect_challenge(&solved.body, solved.final_url.as_str()).is_some()
                    && is_interstitial(&solved.body)
                {
                    return Err(FetchError::CaptchaUnsolved {
                        url: request.url.to_string(),
                        reason: "challenge persisted after solution".to_string(),
                    });
                }
                Ok(solved)
            }
            None => Ok(response),
        }
    }

    fn solves_on(&self, page: &Url) -> bool {
        self.listing
            .as_ref()
            .map_or(true, |listing| same_site(page, listing))
    }

    /// Maps statuses and block pages onto fetch errors
    fn classify(&self, request: &NavRequest, response: RawResponse) -> FetchResult<RawResponse> {
        let url = request.url.to_string();

        if let Some(reason) = status_block_reason(response.status) {
            return Err(FetchError::Blocked {
                url,
                soft: true,
                reason,
            });
        }
        if response.status >= 500 {
            return Err(FetchError::Network {
                url,
                message: format!("HTTP {}", response.status),
            });
        }
        if response.status >= 400 {
            return Err(FetchError::Http {
                url,
                status: response.status,
            });
        }
        if let Some(reason) = detect_soft_block(&response.body) {
            // Challenge pages also carry block phrases; let the solver try first.
            if detect_challenge(&response.body, response.final_url.as_str()).is_none() {
                return Err(FetchError::Blocked {
                    url,
                    soft: true,
                    reason,
                });
            }
        }

        Ok(response)
    }

    /// Waits for a token from the solver, bounded by the CAPTCHA timeout
    async fn solve_challenge(
        &self,
        request: &NavRequest,
        challenge: &Challenge,
    ) -> FetchResult<RawResponse> {
        let url = request.url.to_string();
        let solver = self.solver.as_ref().ok_or_else(|| FetchError::CaptchaUnsolved {
            url: url.clone(),
            reason: format!("{} challenge and no solver configured", challenge.kind),
        })?;

        tracing::info!(url = %url, kind = %challenge.kind, "Solving CAPTCHA challenge");

        let token = match tokio::time::timeout(self.captcha_timeout, solver.solve(challenge)).await
        {
            Ok(Ok(token)) => token,
            Ok(Err(err)) => {
                return Err(FetchError::CaptchaUnsolved {
                    url,
                    reason: err.to_string(),
                })
            }
            Err(_) => {
                return Err(FetchError::CaptchaUnsolved {
                    url,
                    reason: format!("timed out after {}s", self.captcha_timeout.as_secs()),
                })
            }
        };

        self.navigator
            .submit_solution(request, challenge, &token)
            .await
    }

    async fn save_snapshot(&self, ctx: &NavContext, url: &Url, body: &str) {
        if let Some(sink) = &self.snapshots {
            if let Err(e) = sink.save(&ctx.label, url.as_str(), body).await {
                tracing::warn!(url = %url, "Failed to save snapshot: {}", e);
            }
        }
    }
}
