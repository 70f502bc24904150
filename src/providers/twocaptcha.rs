//! 2Captcha solver
//!
//! Challenges are submitted to `in.php` and the result is polled from `res.php`
//! until a token arrives. The overall deadline is enforced by the caller; this client
//! only bounds the number of polls.

use crate::crawler::{Sleeper, TokioSleeper};
use crate::providers::{CaptchaKind, CaptchaSolver, Challenge, ProviderError, ProviderResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://2captcha.com";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_POLLS: u32 = 60;
const NOT_READY: &str = "CAPCHA_NOT_READY";

/// `{"status": 1, "request": "..."}` envelope used by both endpoints
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: i64,
    request: String,
}

/// 2Captcha API client
pub struct TwoCaptchaSolver {
    client: Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    max_polls: u32,
    sleeper: Arc<dyn Sleeper>,
}

impl TwoCaptchaSolver {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Set a custom base URL (for self-hosted compatible services)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls.max(1);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Form fields for the submission request
    fn submit_form(&self, challenge: &Challenge) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("key", self.api_key.clone()),
            ("json", "1".to_string()),
            ("pageurl", challenge.page_url.clone()),
        ];

        match challenge.kind {
            CaptchaKind::ReCaptchaV2 => {
                form.push(("method", "userrecaptcha".to_string()));
                form.push(("googlekey", challenge.site_key.clone()));
            }
            CaptchaKind::HCaptcha => {
                form.push(("method", "hcaptcha".to_string()));
                form.push(("sitekey", challenge.site_key.clone()));
            }
            CaptchaKind::Turnstile => {
                form.push(("method", "turnstile".to_string()));
                form.push(("sitekey", challenge.site_key.clone()));
                if let Some(action) = &challenge.action {
                    form.push(("action", action.clone()));
                }
                if let Some(data) = &challenge.data {
                    form.push(("data", data.clone()));
                }
            }
        }

        form
    }

    async fn submit(&self, challenge: &Challenge) -> ProviderResult<String> {
        let response = self
            .client
            .post(format!("{}/in.php", self.base_url))
            .form(&self.submit_form(challenge))
            .send()
            .await?;

        let envelope = read_envelope(response).await?;
        if envelope.status != 1 {
            return Err(ProviderError::Unsolvable(envelope.request));
        }
        Ok(envelope.request)
    }

    async fn poll(&self, id: &str) -> ProviderResult<Option<String>> {
        let response = self
            .client
            .get(format!("{}/res.php", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("action", "get"),
                ("id", id),
                ("json", "1"),
            ])
            .send()
            .await?;

        let envelope = read_envelope(response).await?;
        match envelope.status {
            1 => Ok(Some(envelope.request)),
            _ if envelope.request == NOT_READY => Ok(None),
            _ => Err(ProviderError::Unsolvable(envelope.request)),
        }
    }
}

async fn read_envelope(response: reqwest::Response) -> ProviderResult<ApiResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ProviderError::Malformed(format!("{}: {}", e, text)))
}

#[async_trait]
impl CaptchaSolver for TwoCaptchaSolver {
    async fn solve(&self, challenge: &Challenge) -> ProviderResult<String> {
        let id = self.submit(challenge).await?;
        tracing::debug!(kind = %challenge.kind, id = %id, "Submitted challenge to 2Captcha");

        for attempt in 1..=self.max_polls {
            self.sleeper.sleep(self.poll_interval).await;
            if let Some(token) = self.poll(&id).await? {
                tracing::debug!(id = %id, attempt, "Challenge solved");
                return Ok(token);
            }
        }

        Err(ProviderError::Unsolvable(format!(
            "not solved after {} polls",
            self.max_polls
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::RecordingSleeper;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn challenge(kind: CaptchaKind) -> Challenge {
        Challenge {
            kind,
            site_key: "site-key-1".to_string(),
            page_url: "https://www.yelp.com/search".to_string(),
            action: Some("managed".to_string()),
            data: None,
        }
    }

    fn solver(server: &MockServer, sleeper: Arc<RecordingSleeper>) -> TwoCaptchaSolver {
        TwoCaptchaSolver::new("api-key")
            .with_base_url(server.uri())
            .with_sleeper(sleeper)
            .with_max_polls(3)
    }

    #[test]
    fn test_submit_form_per_kind() {
        let s = TwoCaptchaSolver::new("k");
        let recaptcha = s.submit_form(&challenge(CaptchaKind::ReCaptchaV2));
        assert!(recaptcha.contains(&("googlekey", "site-key-1".to_string())));
        assert!(!recaptcha.iter().any(|(k, _)| *k == "action"));

        let turnstile = s.submit_form(&challenge(CaptchaKind::Turnstile));
        assert!(turnstile.contains(&("method", "turnstile".to_string())));
        assert!(turnstile.contains(&("action", "managed".to_string())));
    }

    #[tokio::test]
    async fn test_solves_after_polling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/in.php"))
            .and(body_string_contains("method=hcaptcha"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":1,"request":"42"}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/res.php"))
            .and(query_param("id", "42"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"status":0,"request":"CAPCHA_NOT_READY"}"#),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/res.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":1,"request":"token-xyz"}"#))
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::new());
        let token = solver(&server, Arc::clone(&sleeper))
            .solve(&challenge(CaptchaKind::HCaptcha))
            .await
            .unwrap();

        assert_eq!(token, "token-xyz");
        assert_eq!(sleeper.delays(), vec![DEFAULT_POLL_INTERVAL; 2]);
    }

    #[tokio::test]
    async fn test_rejected_submission() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/in.php"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"status":0,"request":"ERROR_ZERO_BALANCE"}"#),
            )
            .mount(&server)
            .await;

        let err = solver(&server, Arc::new(RecordingSleeper::new()))
            .solve(&challenge(CaptchaKind::ReCaptchaV2))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unsolvable(msg) if msg == "ERROR_ZERO_BALANCE"));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_polls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/in.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":1,"request":"7"}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/res.php"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"status":0,"request":"CAPCHA_NOT_READY"}"#),
            )
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::new());
        let err = solver(&server, Arc::clone(&sleeper))
            .solve(&challenge(CaptchaKind::Turnstile))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unsolvable(_)));
        assert_eq!(sleeper.delays().len(), 3);
    }
}
