//! Contact email resolution
//!
//! Given a business website, the resolver fetches the entry page and then a bounded
//! number of contact-like pages on the same site until an address turns up.
//! Failing to find one is a normal outcome, not an error.

mod patterns;

pub use patterns::{accept, best_email, deobfuscate, extract_emails, priority, EmailSource};

use crate::crawler::{rank_contact_links, CrawlBudget, FetchedPage, NavContext, PageFetcher};
use crate::extract::{clip_content, parse_json_object, visible_text};
use crate::providers::LlmClient;
use crate::url::site_key;
use std::sync::Arc;
use url::Url;

/// Page text budget for the LLM email fallback
const LLM_EMAIL_CONTENT_CHARS: usize = 20_000;

const LLM_EMAIL_SYSTEM: &str = "You find public contact email addresses on business websites. \
Respond with a single JSON object and nothing else.";

/// An address and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEmail {
    pub address: String,
    pub source: EmailSource,
    /// Page the address was found on
    pub page: Url,
}

/// Finds a contact email on a business website
pub struct EmailResolver {
    fetcher: Arc<PageFetcher>,
    budget: Arc<CrawlBudget>,
    max_contact_pages: usize,
    llm: Option<Arc<dyn LlmClient>>,
}

impl EmailResolver {
    /// Creates a resolver
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Shared page fetcher; every page goes through its retry handling
    /// * `budget` - Run budget holding the per-domain contact-page counts
    /// * `max_contact_pages` - Additional pages allowed per website domain
    pub fn new(fetcher: Arc<PageFetcher>, budget: Arc<CrawlBudget>, max_contact_pages: usize) -> Self {
        Self {
            fetcher,
            budget,
            max_contact_pages,
            llm: None,
        }
    }

    /// Enables the LLM fallback on the entry page
    pub fn with_llm(mut self, llm: Option<Arc<dyn LlmClient>>) -> Self {
        self.llm = llm;
        self
    }

    /// Looks for an email on `website`
    ///
    /// # Returns
    ///
    /// * `Some(ResolvedEmail)` - The best address from the first page that had one
    /// * `None` - Nothing found, or the website could not be loaded
    pub async fn resolve(&self, website: &Url, ctx: &NavContext) -> Option<ResolvedEmail> {
        let entry = match self.fetcher.fetch(website, ctx).await {
            Ok(page) => page,
            Err(e) => {
                tracing::debug!(url = %website, "Website unavailable for email lookup: {}", e);
                return None;
            }
        };

        if let Some(found) = scan(&entry) {
            return Some(found);
        }

        let domain = site_key(&entry.final_url).unwrap_or_else(|| website.to_string());
        let contact_ctx = ctx.clone().with_referer(Some(entry.final_url.to_string()));

        for link in rank_contact_links(&entry.body, &entry.final_url) {
            if !self
                .budget
                .claim_contact_visit(&domain, self.max_contact_pages)
            {
                tracing::debug!(domain = %domain, "Contact page limit reached");
                break;
            }

            match self.fetcher.fetch(&link, &contact_ctx).await {
                Ok(page) => {
                    if let Some(found) = scan(&page) {
                        return Some(found);
                    }
                }
                Err(e) => tracing::debug!(url = %link, "Contact page failed: {}", e),
            }
        }

        self.ask_llm(&entry).await
    }

    async fn ask_llm(&self, entry: &FetchedPage) -> Option<ResolvedEmail> {
        let llm = self.llm.as_ref()?;
        let text = clip_content(&visible_text(&entry.body), LLM_EMAIL_CONTENT_CHARS);
        let prompt = format!(
            "Find the business's public contact email address in the page below. \
             Return {{\"email\": \"...\"}} or {{\"email\": null}}.\n\nPAGE:\n{}",
            text
        );

        let raw = match llm.complete_json(LLM_EMAIL_SYSTEM, &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(url = %entry.url, "LLM email lookup failed: {}", e);
                return None;
            }
        };

        let address = parse_json_object(&raw)?
            .get("email")
            .and_then(|v| v.as_str())
            .and_then(accept)?;

        // The model must not invent addresses that are not on the page
        if !entry.body.to_lowercase().contains(&address) {
            tracing::debug!(url = %entry.url, "Discarding LLM email not present on page");
            return None;
        }

        Some(ResolvedEmail {
            address,
            source: EmailSource::Llm,
            page: entry.final_url.clone(),
        })
    }
}

fn scan(page: &FetchedPage) -> Option<ResolvedEmail> {
    let candidates = extract_emails(&page.body);
    best_email(&candidates).map(|(address, source)| ResolvedEmail {
        address,
        source,
        page: page.final_url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{FixedRandom, RecordingSleeper, RetryPolicy};
    use crate::providers::{
        Challenge, NavRequest, Navigator, ProviderResult, RawResponse, SessionId,
    };
    use crate::state::RunMetrics;
    use crate::{FetchError, FetchResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Site {
        pages: HashMap<String, String>,
        visited: Mutex<Vec<String>>,
    }

    impl Site {
        fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }

        fn visited(&self) -> Vec<String> {
            self.visited.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Navigator for Site {
        async fn navigate(&self, request: &NavRequest) -> FetchResult<RawResponse> {
            self.visited.lock().unwrap().push(request.url.to_string());
            match self.pages.get(request.url.as_str()) {
                Some(body) => Ok(RawResponse {
                    status: 200,
                    final_url: request.url.clone(),
                    body: body.clone(),
                }),
                None => Err(FetchError::Http {
                    url: request.url.to_string(),
                    status: 404,
                }),
            }
        }

        async fn submit_solution(
            &self,
            request: &NavRequest,
            _challenge: &Challenge,
            _token: &str,
        ) -> FetchResult<RawResponse> {
            self.navigate(request).await
        }

        async fn rotate_identity(&self, _session: SessionId) {}

        async fn open_session(&self) -> SessionId {
            SessionId(1)
        }

        async fn close_session(&self, _session: SessionId) {}
    }

    struct Canned(&'static str);

    #[async_trait]
    impl LlmClient for Canned {
        async fn complete_json(&self, _system: &str, _prompt: &str) -> ProviderResult<String> {
            Ok(self.0.to_string())
        }
    }

    fn resolver(site: Arc<Site>, budget: Arc<CrawlBudget>, max_pages: usize) -> EmailResolver {
        let fetcher = PageFetcher::new(
            site,
            RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1)),
            Arc::new(RecordingSleeper::new()),
            Arc::new(FixedRandom(0.5)),
            Arc::new(RunMetrics::new()),
        );
        EmailResolver::new(Arc::new(fetcher), budget, max_pages)
    }

    fn ctx() -> NavContext {
        NavContext::new(SessionId::SHARED, "task 0")
    }

    const HOME: &str = "https://shop.example/";

    #[tokio::test]
    async fn test_email_on_entry_page() {
        let site = Arc::new(Site::default().page(HOME, "<p>Write to hello@shop.example</p>"));
        let r = resolver(Arc::clone(&site), Arc::new(CrawlBudget::new(10, 3)), 4);

        let found = r.resolve(&Url::parse(HOME).unwrap(), &ctx()).await.unwrap();
        assert_eq!(found.address, "hello@shop.example");
        assert_eq!(site.visited().len(), 1);
    }

    #[tokio::test]
    async fn test_follows_contact_page_and_stops_early() {
        let site = Arc::new(
            Site::default()
                .page(
                    HOME,
                    r#"<a href="/contact">Contact</a><a href="/about">About</a><a href="/team">Team</a>"#,
                )
                .page("https://shop.example/contact", "<p>owner [at] shop [dot] example</p>"),
        );
        let r = resolver(Arc::clone(&site), Arc::new(CrawlBudget::new(10, 3)), 4);

        let found = r.resolve(&Url::parse(HOME).unwrap(), &ctx()).await.unwrap();
        assert_eq!(found.address, "owner@shop.example");
        assert_eq!(found.page.path(), "/contact");
        assert_eq!(site.visited().len(), 2);
    }

    #[tokio::test]
    async fn test_contact_page_limit() {
        let links: String = (0..10)
            .map(|i| format!(r#"<a href="/contact-{}">Contact {}</a>"#, i, i))
            .collect();
        let site = Arc::new(Site::default().page(HOME, &links));
        let budget = Arc::new(CrawlBudget::new(10, 3));
        let r = resolver(Arc::clone(&site), Arc::clone(&budget), 2);

        assert!(r.resolve(&Url::parse(HOME).unwrap(), &ctx()).await.is_none());
        // entry page plus two contact pages
        assert_eq!(site.visited().len(), 3);
        assert_eq!(budget.contact_visits("shop.example"), 2);
    }

    #[tokio::test]
    async fn test_email_beside_form_captcha() {
        let home = r#"<html><body>
            <h1>Shop</h1>
            <a href="mailto:info@shop.example">Email us</a>
            <form action="/subscribe">
              <input name="email">
              <div class="g-recaptcha" data-sitekey="6LcXYZ"></div>
            </form>
        </body></html>"#;
        let site = Arc::new(Site::default().page(HOME, home));
        let r = resolver(Arc::clone(&site), Arc::new(CrawlBudget::new(10, 3)), 4);

        let found = r.resolve(&Url::parse(HOME).unwrap(), &ctx()).await.unwrap();
        assert_eq!(found.address, "info@shop.example");
        assert_eq!(site.visited(), vec![HOME.to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_website_is_absent_not_error() {
        let site = Arc::new(Site::default());
        let r = resolver(site, Arc::new(CrawlBudget::new(10, 3)), 4);
        assert!(r.resolve(&Url::parse(HOME).unwrap(), &ctx()).await.is_none());
    }

    #[tokio::test]
    async fn test_llm_fallback_must_be_on_page() {
        let site = Arc::new(Site::default().page(HOME, "<p>Reach us using the form below</p>"));
        let r = resolver(Arc::clone(&site), Arc::new(CrawlBudget::new(10, 3)), 0)
            .with_llm(Some(Arc::new(Canned(r#"{"email": "invented@elsewhere.example"}"#))));
        assert!(r.resolve(&Url::parse(HOME).unwrap(), &ctx()).await.is_none());
    }
}
