//! External capabilities the pipeline calls through
//!
//! The crawl core never talks to a browser, proxy pool, CAPTCHA service or model
//! provider directly. It goes through the narrow traits defined here:
//!
//! - `Navigator`: loads pages inside isolated sessions and rotates identities
//! - `CaptchaSolver`: turns challenge metadata into a solution token
//! - `SchemaExtractor`: schema-guided AI extraction
//! - `LlmClient`: free-form JSON completion
//!
//! Production implementations live in the submodules; tests substitute scripted ones.

mod http;
mod openai;
mod proxy;
mod twocaptcha;

pub use http::HttpNavigator;
pub use openai::OpenAiClient;
pub use proxy::ProxyPool;
pub use twocaptcha::TwoCaptchaSolver;

use crate::FetchResult;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Errors raised by external providers
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Request(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Provider response malformed: {0}")]
    Malformed(String),

    #[error("Challenge could not be solved: {0}")]
    Unsolvable(String),

    #[error("Provider configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Request(err.to_string())
    }
}

/// Result type for provider calls
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Handle on a navigation session
///
/// A session owns its cookies, user agent and proxy session. `SessionId::SHARED` is
/// the run-wide default session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    pub const SHARED: SessionId = SessionId(0);
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// One navigation
#[derive(Debug, Clone, PartialEq)]
pub struct NavRequest {
    pub url: Url,
    pub referer: Option<String>,
    pub session: SessionId,
}

/// A loaded page before any classification
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// URL after redirects
    pub final_url: Url,
    pub body: String,
}

/// Loads pages
///
/// Implementations report only transport-level failures (`Timeout`, `Network`); status
/// codes and page content are classified by the page fetcher.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(&self, request: &NavRequest) -> FetchResult<RawResponse>;

    /// Replays a solved challenge token to the page that issued it
    async fn submit_solution(
        &self,
        request: &NavRequest,
        challenge: &Challenge,
        token: &str,
    ) -> FetchResult<RawResponse>;

    /// Replaces the session's fingerprint and proxy exit
    async fn rotate_identity(&self, session: SessionId);

    /// Opens an isolated session
    async fn open_session(&self) -> SessionId;

    async fn close_session(&self, session: SessionId);
}

/// Supported challenge widgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptchaKind {
    ReCaptchaV2,
    HCaptcha,
    Turnstile,
}

impl CaptchaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReCaptchaV2 => "recaptcha_v2",
            Self::HCaptcha => "hcaptcha",
            Self::Turnstile => "turnstile",
        }
    }

    /// Form field the page expects the solution token in
    pub fn response_field(&self) -> &'static str {
        match self {
            Self::ReCaptchaV2 => "g-recaptcha-response",
            Self::HCaptcha => "h-captcha-response",
            Self::Turnstile => "cf-turnstile-response",
        }
    }
}

impl fmt::Display for CaptchaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata describing a detected challenge
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub kind: CaptchaKind,
    pub site_key: String,
    pub page_url: String,
    /// Turnstile `data-action`
    pub action: Option<String>,
    /// Turnstile `data-cdata` / `data-s`
    pub data: Option<String>,
}

/// Solves challenges through an external service
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, challenge: &Challenge) -> ProviderResult<String>;
}

/// Schema-guided extraction
///
/// Returns the provider's raw JSON text; the caller parses it defensively.
#[async_trait]
pub trait SchemaExtractor: Send + Sync {
    async fn extract_with_schema(
        &self,
        content: &str,
        schema: &serde_json::Value,
    ) -> ProviderResult<String>;
}

/// Free-form completion constrained to JSON by the prompt
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete_json(&self, system: &str, prompt: &str) -> ProviderResult<String>;
}
