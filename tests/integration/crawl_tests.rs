//! Integration tests for the harvester
//!
//! These tests use wiremock to stand up a mock listing site and mock business
//! websites, and drive full runs through the real HTTP navigator.

use lead_harvest::config::load_config;
use lead_harvest::crawler::{
    crawl, Collaborators, CrawlOrchestrator, EntryFlowWeights, FixedRandom, PageLimits,
    RecordingSleeper, RetryPolicy, RunSettings,
};
use lead_harvest::output::{JsonlSink, MemorySink};
use lead_harvest::providers::{HttpNavigator, ProxyPool};
use lead_harvest::state::TaskOutcome;
use lead_harvest::{HarvestError, Task};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RECORD_KEYS: [&str; 8] = [
    "business_name",
    "years_in_business",
    "rating",
    "review_count",
    "industry",
    "phone",
    "website",
    "email",
];

/// Creates run settings pointed at a mock listing site
fn create_test_settings(listing: &str, target: u32) -> RunSettings {
    RunSettings {
        target,
        concurrency: 3,
        per_business_isolation: false,
        debug_snapshot: false,
        entry_flow: EntryFlowWeights::parse("direct:1").unwrap(),
        captcha_timeout: Duration::from_secs(1),
        email_max_contact_pages: 2,
        respect_robots: false,
        listing: Url::parse(listing).unwrap(),
        limits: PageLimits {
            max_pages: 5,
            page_size: 10,
        },
        retry: RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1)),
    }
}

fn create_collaborators(sink: Arc<MemorySink>) -> Collaborators {
    let navigator = HttpNavigator::new(Duration::from_secs(5), ProxyPool::disabled())
        .with_rng(Arc::new(FixedRandom(0.0)));
    Collaborators::new(Arc::new(navigator), sink)
        .with_rng(Arc::new(FixedRandom(0.5)))
        .with_sleeper(Arc::new(RecordingSleeper::new()))
}

fn search_html(slugs: &[String]) -> String {
    let links: String = slugs
        .iter()
        .map(|s| format!(r#"<li><a href="/biz/{}">{}</a></li>"#, s, s))
        .collect();
    format!("<html><body><ul>{}</ul></body></html>", links)
}

/// A detail page with structured markup and a redirector link to the website
fn detail_html(name: &str, website: Option<&str>) -> String {
    let redirect = website
        .map(|w| {
            let target: String = url::form_urlencoded::byte_serialize(w.as_bytes()).collect();
            format!(r#"<a href="/biz_redir?url={}&amp;src=biz">Business website</a>"#, target)
        })
        .unwrap_or_default();
    format!(
        r#"<html><head><script type="application/ld+json">
        {{"@context":"https://schema.org","@type":"Restaurant","name":"{}",
          "telephone":"512-555-0100",
          "aggregateRating":{{"ratingValue":"4.5","reviewCount":"120"}}}}
        </script></head><body><h1>{}</h1>{}</body></html>"#,
        name, name, redirect
    )
}

/// Mounts one keyword task: its search page and a detail page per slug
async fn mount_task(server: &MockServer, keyword: &str, slugs: &[String], website: Option<&str>) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("find_desc", keyword))
        .respond_with(ResponseTemplate::new(200).set_body_string(search_html(slugs)))
        .mount(server)
        .await;

    for slug in slugs {
        Mock::given(method("GET"))
            .and(path(format!("/biz/{}", slug)))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(detail_html(&slug.replace('-', " "), website)),
            )
            .mount(server)
            .await;
    }
}

fn slugs(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}-{}", prefix, i)).collect()
}

/// Business website with its email on a contact page
async fn start_business_site() -> MockServer {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><a href="/contact">Contact us</a></body></html>"#,
        ))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/contact"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><a href="mailto:owner@bluedoor.cafe">Email the owner</a></body></html>"#,
        ))
        .mount(&site)
        .await;
    site
}

#[tokio::test]
async fn test_full_run_writes_complete_records() {
    let listing = MockServer::start().await;
    let site = start_business_site().await;
    let website = format!("{}/", site.uri());
    mount_task(&listing, "cafe", &slugs("cafe", 3), Some(&website)).await;

    let dir = tempfile::tempdir().unwrap();
    let dataset = dir.path().join("out/leads.jsonl");
    let config_path = dir.path().join("harvest.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[run]
target-count = 10
concurrency = 3
entry-flow-ratios = "direct:1"
respect-robots = false
email-max-contact-pages = 5

[site]
base-url = "{}"
max-search-pages = 3

[fetch]
max-attempts = 1
base-delay-ms = 1
max-delay-ms = 1

[ai]
schema-extraction = false
llm-fallback = false

[captcha]
api-key-env = "LEAD_HARVEST_TEST_UNSET_CAPTCHA_KEY"

[output]
dataset-path = "{}"

[[task]]
keyword = "cafe"
location = "Austin"
"#,
            listing.uri(),
            dataset.display()
        ),
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    let summary = crawl(&config).await.unwrap();

    assert_eq!(summary.emitted, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.task_outcomes[0].1, TaskOutcome::Exhausted);

    let content = std::fs::read_to_string(&dataset).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);

    for line in lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 8);
        for key in RECORD_KEYS {
            assert!(object.contains_key(key), "missing key {}", key);
        }
        assert_eq!(object["rating"], serde_json::json!(4.5));
        assert_eq!(object["review_count"], serde_json::json!(120));
        assert_eq!(object["industry"], serde_json::json!("Restaurant"));
        assert_eq!(object["phone"], serde_json::json!("(512) 555-0100"));
        assert_eq!(object["years_in_business"], serde_json::Value::Null);
        assert_eq!(object["website"], serde_json::json!(site.uri()));
        assert_eq!(object["email"], serde_json::json!("owner@bluedoor.cafe"));
    }
}

#[tokio::test]
async fn test_redirector_link_resolves_to_bare_origin() {
    let listing = MockServer::start().await;
    let site = start_business_site().await;
    mount_task(&listing, "cafe", &slugs("cafe", 1), Some(&format!("{}/", site.uri()))).await;

    let sink = Arc::new(MemorySink::new());
    let orchestrator = CrawlOrchestrator::new(
        create_test_settings(&listing.uri(), 10),
        create_collaborators(Arc::clone(&sink)),
    );
    orchestrator
        .run(vec![Task::keyword(0, "cafe", "Austin")])
        .await
        .unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let website = records[0].website.clone().unwrap();
    assert_eq!(website, site.uri());
    assert!(!website.ends_with('/'));
    assert!(!website.contains("biz_redir"));
}

#[tokio::test]
async fn test_captcha_task_fails_while_others_continue() {
    let listing = MockServer::start().await;
    mount_task(&listing, "cafe", &slugs("cafe", 3), None).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("find_desc", "plumber"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><div class="g-recaptcha" data-sitekey="site-key"></div></body></html>"#,
        ))
        .mount(&listing)
        .await;

    let sink = Arc::new(MemorySink::new());
    let orchestrator = CrawlOrchestrator::new(
        create_test_settings(&listing.uri(), 10),
        create_collaborators(Arc::clone(&sink)),
    );
    let summary = orchestrator
        .run(vec![
            Task::keyword(0, "plumber", "Austin"),
            Task::keyword(1, "cafe", "Austin"),
        ])
        .await
        .unwrap();

    assert_eq!(summary.emitted, 3);
    assert_eq!(summary.tasks_failed, 1);
    assert!(matches!(summary.task_outcomes[0].1, TaskOutcome::Failed(_)));
    assert_eq!(summary.task_outcomes[1].1, TaskOutcome::Exhausted);
    assert!(sink
        .records()
        .iter()
        .all(|r| r.business_name.starts_with("cafe")));
}

#[tokio::test]
async fn test_target_bounds_emission_across_tasks() {
    let listing = MockServer::start().await;
    mount_task(&listing, "cafe", &slugs("cafe", 5), None).await;
    mount_task(&listing, "bakery", &slugs("bakery", 5), None).await;

    let sink = Arc::new(MemorySink::new());
    let orchestrator = CrawlOrchestrator::new(
        create_test_settings(&listing.uri(), 8),
        create_collaborators(Arc::clone(&sink)),
    );
    let summary = orchestrator
        .run(vec![
            Task::keyword(0, "cafe", "Austin"),
            Task::keyword(1, "bakery", "Austin"),
        ])
        .await
        .unwrap();

    assert_eq!(summary.emitted, 8);
    assert_eq!(sink.len(), 8);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.unresolved, 0);
    // The two details past the target are dropped, not lost
    assert_eq!(summary.emitted + summary.skipped_cap, 10);
}

#[tokio::test]
async fn test_contact_page_visits_are_capped() {
    let listing = MockServer::start().await;
    let site = MockServer::start().await;
    let contact_links: String = (0..5)
        .map(|i| format!(r#"<a href="/contact-{}">Contact {}</a>"#, i, i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(format!("<html><body>{}</body></html>", contact_links)),
        )
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>No email here</body></html>"))
        .mount(&site)
        .await;
    mount_task(&listing, "cafe", &slugs("cafe", 1), Some(&format!("{}/", site.uri()))).await;

    let sink = Arc::new(MemorySink::new());
    let orchestrator = CrawlOrchestrator::new(
        create_test_settings(&listing.uri(), 10),
        create_collaborators(Arc::clone(&sink)),
    );
    orchestrator
        .run(vec![Task::keyword(0, "cafe", "Austin")])
        .await
        .unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].email, None);

    // the website entry page plus two contact pages
    let requests = site.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn test_concurrency_is_clamped() {
    let listing = MockServer::start().await;
    mount_task(&listing, "cafe", &slugs("cafe", 2), None).await;

    for (requested, effective) in [(50, 5), (1, 3)] {
        let mut settings = create_test_settings(&listing.uri(), 10);
        settings.concurrency = requested;
        let orchestrator =
            CrawlOrchestrator::new(settings, create_collaborators(Arc::new(MemorySink::new())));
        let summary = orchestrator
            .run(vec![Task::keyword(0, "cafe", "Austin")])
            .await
            .unwrap();
        assert_eq!(summary.concurrency, effective);
    }
}

#[tokio::test]
async fn test_robots_denial_aborts_before_crawling() {
    let listing = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .mount(&listing)
        .await;
    mount_task(&listing, "cafe", &slugs("cafe", 2), None).await;

    let mut settings = create_test_settings(&listing.uri(), 10);
    settings.respect_robots = true;
    let sink = Arc::new(MemorySink::new());
    let orchestrator = CrawlOrchestrator::new(settings, create_collaborators(Arc::clone(&sink)));

    let result = orchestrator
        .run(vec![Task::keyword(0, "cafe", "Austin")])
        .await;

    assert!(matches!(result, Err(HarvestError::RobotsDenied { .. })));
    assert!(sink.is_empty());
    let requests = listing.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() == "/robots.txt"));
}

#[tokio::test]
async fn test_missing_robots_allows_run() {
    let listing = MockServer::start().await;
    mount_task(&listing, "cafe", &slugs("cafe", 2), None).await;

    let mut settings = create_test_settings(&listing.uri(), 10);
    settings.respect_robots = true;
    let sink = Arc::new(MemorySink::new());
    let orchestrator = CrawlOrchestrator::new(settings, create_collaborators(Arc::clone(&sink)));

    let summary = orchestrator
        .run(vec![Task::keyword(0, "cafe", "Austin")])
        .await
        .unwrap();
    assert_eq!(summary.emitted, 2);
}

#[tokio::test]
async fn test_every_task_failing_is_an_error() {
    let listing = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><div class="h-captcha" data-sitekey="site-key"></div></body></html>"#,
        ))
        .mount(&listing)
        .await;

    let orchestrator = CrawlOrchestrator::new(
        create_test_settings(&listing.uri(), 10),
        create_collaborators(Arc::new(MemorySink::new())),
    );
    let result = orchestrator
        .run(vec![
            Task::keyword(0, "cafe", "Austin"),
            Task::keyword(1, "bakery", "Austin"),
        ])
        .await;

    match result {
        Err(HarvestError::AllTasksFailed { tasks, summary }) => {
            assert_eq!(tasks, 2);
            assert_eq!(summary.emitted, 0);
            assert_eq!(summary.tasks_failed, 2);
        }
        other => panic!("expected every task to fail, got {:?}", other.map(|s| s.emitted)),
    }
}

#[tokio::test]
async fn test_jsonl_sink_appends_across_runs() {
    let listing = MockServer::start().await;
    mount_task(&listing, "cafe", &slugs("cafe", 2), None).await;
    let dir = tempfile::tempdir().unwrap();
    let dataset = dir.path().join("leads.jsonl");

    for _ in 0..2 {
        let sink = Arc::new(JsonlSink::open(&dataset).await.unwrap());
        let navigator = HttpNavigator::new(Duration::from_secs(5), ProxyPool::disabled());
        let collaborators = Collaborators::new(Arc::new(navigator), sink)
            .with_rng(Arc::new(FixedRandom(0.5)))
            .with_sleeper(Arc::new(RecordingSleeper::new()));
        CrawlOrchestrator::new(create_test_settings(&listing.uri(), 10), collaborators)
            .run(vec![Task::keyword(0, "cafe", "Austin")])
            .await
            .unwrap();
    }

    let content = std::fs::read_to_string(&dataset).unwrap();
    assert_eq!(content.lines().count(), 4);
}
