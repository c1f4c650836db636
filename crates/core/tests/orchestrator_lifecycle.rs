//! Orchestrator lifecycle integration tests.
//!
//! These tests run whole jobs against mock surfaces:
//! open -> await_ready -> fill_metadata -> upload_media -> submit -> confirm -> done

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use multipost_core::{
    media::MediaConfig,
    orchestrator::JobEvent,
    testing::{fixtures, MockFetcher, MockReaction, MockSurface, MockSurfaceHost},
    AdapterRegistry, FailureReason, Job, Orchestrator, OrchestratorConfig, TargetRef,
};

const BLOG_URL: &str = "https://blog.example/new";
const SLOW_URL: &str = "https://slow.example/new";
const SOCIAL_URL: &str = "https://social.example/compose";

/// Test helper holding the host and the orchestrator under test.
struct TestHarness {
    host: MockSurfaceHost,
    orchestrator: Orchestrator,
}

impl TestHarness {
    fn new(settle_delay_ms: u64) -> Self {
        let host = MockSurfaceHost::new();
        let orchestrator = Orchestrator::new(
            OrchestratorConfig {
                settle_delay_ms,
                ..Default::default()
            },
            MediaConfig::default(),
            Arc::new(host.clone()),
            AdapterRegistry::new(vec![fixtures::blog_adapter(), fixtures::social_adapter()]),
            Arc::new(MockFetcher::new()),
        );
        Self { host, orchestrator }
    }

    /// A blog editor whose publish button reveals a post link.
    async fn blog(&self, url: &str) -> MockSurface {
        let surface = MockSurface::new(url);
        surface.add_element("#editor", "").await;
        surface.add_element("input.title", "").await;
        surface.add_element("div.body", "").await;
        surface.add_element("button.publish", "Publish").await;
        surface
            .on_click(
                "button.publish",
                MockReaction::AddElement {
                    selector: ".post-link".to_string(),
                    text: "View".to_string(),
                    attributes: vec![("href".to_string(), format!("{}/p/1", url))],
                    delay: Duration::from_millis(100),
                },
            )
            .await;
        self.host.prepare(url, surface.clone()).await;
        surface
    }

    /// A composer whose "Post" button navigates to the status page.
    async fn social(&self, url: &str) -> MockSurface {
        let surface = MockSurface::new(url);
        surface.add_element("textarea", "").await;
        surface.add_element("button", "Post").await;
        surface
            .on_click(
                "button",
                MockReaction::Navigate {
                    url: "https://social.example/status/7".to_string(),
                    delay: Duration::from_millis(100),
                },
            )
            .await;
        self.host.prepare(url, surface.clone()).await;
        surface
    }
}

fn blog_target(url: &str) -> TargetRef {
    fixtures::target(&fixtures::blog_adapter(), url)
}

fn social_target(url: &str) -> TargetRef {
    fixtures::target(&fixtures::social_adapter(), url)
}

/// Collect (index, finish time) for every finished target until the job ends.
async fn finish_times(
    mut events: tokio::sync::broadcast::Receiver<JobEvent>,
) -> Vec<(usize, Instant)> {
    let mut finished = Vec::new();
    while let Ok(event) = events.recv().await {
        match event {
            JobEvent::TargetFinished { index, .. } => finished.push((index, Instant::now())),
            JobEvent::JobFinished { .. } => break,
            _ => {}
        }
    }
    finished
}

#[tokio::test(start_paused = true)]
async fn test_slow_target_does_not_hold_back_others() {
    let harness = TestHarness::new(200);
    harness.blog(BLOG_URL).await;
    // Never becomes ready.
    harness.host.prepare(SLOW_URL, MockSurface::new(SLOW_URL)).await;
    harness.social(SOCIAL_URL).await;

    let job = Job::new(
        fixtures::content("Hello", "<p>World</p>"),
        vec![blog_target(BLOG_URL), blog_target(SLOW_URL), social_target(SOCIAL_URL)],
        true,
    );
    let events = harness.orchestrator.subscribe();
    let (report, finished) =
        tokio::join!(harness.orchestrator.run_job(job), finish_times(events));
    let report = report.unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.outcomes[0].target.inject_url, BLOG_URL);
    assert_eq!(report.outcomes[1].target.inject_url, SLOW_URL);
    assert_eq!(report.outcomes[2].target.inject_url, SOCIAL_URL);

    assert!(report.outcomes[0].outcome.is_success());
    assert_eq!(
        report.outcomes[1].outcome.failure_reason,
        Some(FailureReason::ReadyTimeout)
    );
    assert_eq!(report.outcomes[1].outcome.failure_code, Some(1001));
    assert!(report.outcomes[2].outcome.is_success());
    assert_eq!(
        report.outcomes[2].outcome.result_data.as_ref().unwrap()["url"],
        "https://social.example/status/7"
    );

    // Completion order is independent of target order.
    let order: Vec<usize> = finished.iter().map(|(i, _)| *i).collect();
    assert_eq!(order.last(), Some(&1));
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_settle_delay_between_activations() {
    let harness = TestHarness::new(1000);
    harness.blog("https://a.example/").await;
    harness.blog("https://b.example/").await;
    harness.blog("https://c.example/").await;

    let job = Job::new(
        fixtures::content("Hello", "body"),
        vec![
            blog_target("https://a.example/"),
            blog_target("https://b.example/"),
            blog_target("https://c.example/"),
        ],
        true,
    );

    let mut events = harness.orchestrator.subscribe();
    let collector = async move {
        let mut started = Vec::new();
        while let Ok(event) = events.recv().await {
            match event {
                JobEvent::TargetStarted { .. } => started.push(Instant::now()),
                JobEvent::JobFinished { .. } => break,
                _ => {}
            }
        }
        started
    };
    let (report, started) = tokio::join!(harness.orchestrator.run_job(job), collector);
    let report = report.unwrap();

    assert_eq!(report.succeeded(), 3);
    assert_eq!(started.len(), 3);
    for pair in started.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
    }
    assert_eq!(
        harness.host.recorded_opens().await,
        vec!["https://a.example/", "https://b.example/", "https://c.example/"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_operator_close_cancels_target() {
    let harness = TestHarness::new(0);
    let surface = MockSurface::new(SLOW_URL);
    harness.host.prepare(SLOW_URL, surface.clone()).await;

    let job = Job::new(
        fixtures::content("Hello", "body"),
        vec![blog_target(SLOW_URL)],
        true,
    );
    let job_id = job.job_id.clone();

    let mut events = harness.orchestrator.subscribe();
    let registry = harness.orchestrator.surfaces();
    let operator = async move {
        while let Ok(event) = events.recv().await {
            if let JobEvent::TargetStarted { surface_id, .. } = event {
                tokio::time::sleep(Duration::from_millis(300)).await;
                let listed = registry.surfaces(&job_id).await.unwrap();
                assert_eq!(listed.len(), 1);
                registry.close(&job_id, &surface_id).await.unwrap();
                break;
            }
        }
    };

    let start = Instant::now();
    let (report, _) = tokio::join!(harness.orchestrator.run_job(job), operator);
    let report = report.unwrap();

    let outcome = &report.outcomes[0].outcome;
    assert_eq!(outcome.failure_reason, Some(FailureReason::Cancelled));
    assert_eq!(outcome.failure_code, Some(1007));
    assert!(start.elapsed() < Duration::from_millis(fixtures::blog_adapter().ready_timeout_ms));
    assert!(surface.is_closed());
    assert_eq!(surface.active_observers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_surface_open_failure_is_reported_in_place() {
    let harness = TestHarness::new(100);
    harness.host.fail("https://down.example/", "connection refused").await;
    harness.blog(BLOG_URL).await;

    let job = Job::new(
        fixtures::content("Hello", "body"),
        vec![blog_target("https://down.example/"), blog_target(BLOG_URL)],
        true,
    );
    let report = harness.orchestrator.run_job(job).await.unwrap();

    let failed = &report.outcomes[0].outcome;
    assert_eq!(failed.failure_reason, Some(FailureReason::SurfaceOpenFailed));
    assert_eq!(failed.failure_code, Some(1004));
    assert!(failed
        .error_message
        .as_deref()
        .unwrap()
        .contains("connection refused"));
    assert!(!failed.log.is_empty());

    assert!(report.outcomes[1].outcome.is_success());
    assert_eq!(harness.host.recorded_opens().await, vec![BLOG_URL]);
}

#[tokio::test(start_paused = true)]
async fn test_draft_job_never_clicks_publish() {
    let harness = TestHarness::new(0);
    harness.blog(BLOG_URL).await;

    let job = Job::new(
        fixtures::content("Hello", "body"),
        vec![blog_target(BLOG_URL)],
        false,
    );
    let report = harness.orchestrator.run_job(job).await.unwrap();

    let data = report.outcomes[0].outcome.result_data.clone().unwrap();
    assert_eq!(data["published"], false);
    assert_eq!(data["draft"], "editor");

    let surface = &harness.host.opened_surfaces().await[0];
    assert!(surface
        .ops()
        .iter()
        .all(|op| !matches!(op, multipost_core::testing::MockOp::Click { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_report_serializes_per_target() {
    let harness = TestHarness::new(0);
    harness.blog(BLOG_URL).await;

    let job = Job::new(
        fixtures::content("Hello", "body"),
        vec![
            blog_target(BLOG_URL),
            TargetRef::new("article", "https://x.example/", "unknown"),
        ],
        true,
    );
    let report = harness.orchestrator.run_job(job).await.unwrap();
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["outcomes"][0]["status"], "success");
    assert_eq!(value["outcomes"][0]["resultData"]["value"], format!("{}/p/1", BLOG_URL));
    assert_eq!(value["outcomes"][1]["status"], "failure");
    assert_eq!(value["outcomes"][1]["failureReason"], "AdapterNotFound");
    assert_eq!(value["outcomes"][1]["failureCode"], 1008);
}
