//! reqwest-backed navigator
//!
//! This module handles:
//! - One HTTP client per navigation session, each with its own cookie jar
//! - Browser-like request headers and a rotating user agent
//! - Sticky proxy sessions that change on identity rotation
//! - Replaying solved challenge tokens as form posts
//! - Mapping transport errors onto `FetchError`
//!
//! Response classification (blocks, challenges, status codes) is left to the page
//! fetcher; the navigator only reports what came back.

use crate::crawler::{RandomSource, ThreadRandom};
use crate::providers::{Challenge, NavRequest, Navigator, ProxyPool, RawResponse, SessionId};
use crate::{FetchError, FetchResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::{redirect::Policy, Client, Response};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Desktop browser user agents rotated across identities
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 10;

/// One browsing identity: client, cookie jar, user agent and proxy session
#[derive(Clone)]
struct Identity {
    client: Client,
    generation: u64,
}

/// Navigator that talks HTTP directly
pub struct HttpNavigator {
    timeout: Duration,
    proxy: ProxyPool,
    rng: Arc<dyn RandomSource>,
    identities: Mutex<HashMap<SessionId, Identity>>,
    next_session: AtomicU64,
}

impl HttpNavigator {
    /// Creates a navigator
    ///
    /// # Arguments
    ///
    /// * `timeout` - Per-request timeout, independent of the CAPTCHA timeout
    /// * `proxy` - Egress pool; use `ProxyPool::disabled()` for direct connections
    pub fn new(timeout: Duration, proxy: ProxyPool) -> Self {
        Self {
            timeout,
            proxy,
            rng: Arc::new(ThreadRandom),
            identities: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn with_rng(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    /// Number of sessions with a live identity
    pub fn active_sessions(&self) -> usize {
        self.identities
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn build_identity(&self, session: SessionId, generation: u64) -> Result<Identity, String> {
        let user_agent = USER_AGENTS[self.rng.next_index(USER_AGENTS.len())];

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));

        let mut builder = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .cookie_store(true)
            .timeout(self.timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .gzip(true)
            .brotli(true);

        let tag = format!("{}r{}", session, generation);
        if let Some(proxy) = self.proxy.reqwest_proxy(&tag).map_err(|e| e.to_string())? {
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;

        tracing::debug!(session = %session, generation, "Built identity");
        Ok(Identity { client, generation })
    }

    /// Returns the session's client, creating the identity on first use
    fn client_for(&self, session: SessionId, url: &Url) -> FetchResult<Client> {
        let mut identities = self
            .identities
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(identity) = identities.get(&session) {
            return Ok(identity.client.clone());
        }

        let identity = self
            .build_identity(session, 0)
            .map_err(|message| FetchError::Network {
                url: url.to_string(),
                message,
            })?;
        let client = identity.client.clone();
        identities.insert(session, identity);
        Ok(client)
    }

    async fn into_raw(url: &Url, response: Response) -> FetchResult<RawResponse> {
        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let body = response.text().await.map_err(|e| map_error(url, e))?;
        Ok(RawResponse {
            status,
            final_url,
            body,
        })
    }
}

#[async_trait]
impl Navigator for HttpNavigator {
    async fn navigate(&self, request: &NavRequest) -> FetchResult<RawResponse> {
        let client = self.client_for(request.session, &request.url)?;

        let mut builder = client.get(request.url.clone());
        if let Some(referer) = &request.referer {
            builder = builder.header(REFERER, referer);
        }

        let response = builder.send().await.map_err(|e| map_error(&request.url, e))?;
        Self::into_raw(&request.url, response).await
    }

    async fn submit_solution(
        &self,
        request: &NavRequest,
        challenge: &Challenge,
        token: &str,
    ) -> FetchResult<RawResponse> {
        let client = self.client_for(request.session, &request.url)?;

        let response = client
            .post(request.url.clone())
            .header(REFERER, request.url.as_str())
            .form(&[(challenge.kind.response_field(), token)])
            .send()
            .await
            .map_err(|e| map_error(&request.url, e))?;
        Self::into_raw(&request.url, response).await
    }

    async fn rotate_identity(&self, session: SessionId) {
        let mut identities = self
            .identities
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let generation = identities.get(&session).map(|i| i.generation + 1).unwrap_or(1);
        identities.remove(&session);

        // On failure the identity is rebuilt lazily and the error resurfaces on next use
        match self.build_identity(session, generation) {
            Ok(identity) => {
                identities.insert(session, identity);
            }
            Err(e) => tracing::warn!(session = %session, "Identity rotation failed: {}", e),
        }
    }

    async fn open_session(&self) -> SessionId {
        SessionId(self.next_session.fetch_add(1, Ordering::Relaxed))
    }

    async fn close_session(&self, session: SessionId) {
        self.identities
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&session);
    }
}

fn map_error(url: &Url, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
