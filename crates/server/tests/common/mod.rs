//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock dependencies injected, enabling E2E testing without a browser
//! or a WebDriver server.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use multipost_core::{
    media::MediaConfig,
    testing::{MockFetcher, MockSurfaceHost},
    trust::{AllowListPrompt, AutoDenyPrompt, OperatorPrompt, TrustPrompt},
    AdapterRegistry, Config, JsonFileTrustStore, Orchestrator, OrchestratorConfig, TrustService,
};
use multipost_server::api::{create_router, WsBroadcaster};
use multipost_server::state::AppState;

/// Re-export fixtures for test convenience
pub use multipost_core::testing::fixtures;

/// Origin trusted by default in every fixture.
pub const TRUSTED_ORIGIN: &str = "https://studio.multipost.app";

/// Test fixture for E2E testing with mock dependencies.
///
/// Provides an in-process server with:
/// - A mock surface host (prepare pages per URL)
/// - A mock file fetcher
/// - A JSON trust store in a temp dir, seeded with `*.multipost.app`
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_ping() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.message(TRUSTED_ORIGIN, "ping", json!({})).await;
///     assert_eq!(response.body["code"], 0);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock surface host - prepare editor pages
    pub host: MockSurfaceHost,
    /// Mock fetcher - configure media payloads
    pub fetcher: MockFetcher,
    /// Live progress broadcaster
    pub ws_broadcaster: WsBroadcaster,
    pub trust: Arc<TrustService>,
    /// Temporary directory holding the trust store
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store_path = temp_dir.path().join("trusted_domains.json");

        let mut config = Config::default();
        config.trust.store_path = store_path.clone();
        config.orchestrator = OrchestratorConfig {
            settle_delay_ms: 0,
            close_surfaces_on_completion: test_config.close_surfaces_on_completion,
            ..Default::default()
        };
        config.adapters = vec![fixtures::blog_adapter(), fixtures::social_adapter()];

        let store = JsonFileTrustStore::open(&store_path)
            .await
            .expect("Failed to open trust store");
        for pattern in &test_config.trusted {
            multipost_core::TrustStore::add(&store, pattern)
                .await
                .expect("Failed to seed trust store");
        }
        let prompt: Arc<dyn TrustPrompt> = match test_config.operator_prompt {
            Some(timeout) => Arc::new(OperatorPrompt::new(timeout)),
            None if test_config.auto_grant.is_empty() => Arc::new(AutoDenyPrompt::new()),
            None => Arc::new(AllowListPrompt::new(test_config.auto_grant.clone())),
        };
        let trust = Arc::new(TrustService::new(Arc::new(store), prompt));

        let host = MockSurfaceHost::new();
        let fetcher = MockFetcher::new();
        let orchestrator = Arc::new(Orchestrator::new(
            config.orchestrator.clone(),
            MediaConfig::default(),
            Arc::new(host.clone()),
            AdapterRegistry::new(config.adapters.clone()),
            Arc::new(fetcher.clone()),
        ));

        let ws_broadcaster = WsBroadcaster::default();
        ws_broadcaster.forward_job_events(orchestrator.subscribe());
        if let Some(prompts) = trust.subscribe_prompts() {
            ws_broadcaster.forward_trust_prompts(prompts);
        }

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&trust),
            orchestrator,
            ws_broadcaster.clone(),
        ));
        let router = create_router(state);

        Self {
            router,
            host,
            fetcher,
            ws_broadcaster,
            trust,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, None, Some(body.to_string())).await
    }

    /// Send a request envelope to `/api/v1/messages` from `origin`.
    pub async fn message(&self, origin: &str, action: &str, data: Value) -> TestResponse {
        let envelope = json!({
            "type": "request",
            "traceId": uuid::Uuid::new_v4().to_string(),
            "action": action,
            "data": data,
        });
        self.request(
            "POST",
            "/api/v1/messages",
            Some(origin),
            Some(envelope.to_string()),
        )
        .await
    }

    /// Send a raw body to `/api/v1/messages` (for malformed envelopes).
    pub async fn message_raw(&self, origin: Option<&str>, body: &str) -> TestResponse {
        self.request("POST", "/api/v1/messages", origin, Some(body.to_string()))
            .await
    }

    /// Send a request to the test server.
    async fn request(
        &self,
        method: &str,
        path: &str,
        origin: Option<&str>,
        body: Option<String>,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        if let Some(origin) = origin {
            request_builder = request_builder.header("Origin", origin);
        }

        let body = match body {
            Some(raw) => {
                request_builder = request_builder.header("Content-Type", "application/json");
                Body::from(raw)
            }
            None => Body::empty(),
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into_owned()))
        };

        TestResponse { status, body }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Patterns in the trust store at startup
    pub trusted: Vec<String>,
    /// Allow-list prompt patterns; the deny prompt is used when empty
    pub auto_grant: Vec<String>,
    /// Operator prompt timeout; overrides `auto_grant` when set
    pub operator_prompt: Option<Duration>,
    pub close_surfaces_on_completion: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            trusted: vec!["*.multipost.app".to_string()],
            auto_grant: Vec::new(),
            operator_prompt: None,
            close_surfaces_on_completion: true,
        }
    }
}

impl TestConfig {
    /// Keep surfaces registered after their target finishes.
    pub fn keep_surfaces() -> Self {
        Self {
            close_surfaces_on_completion: false,
            ..Default::default()
        }
    }

    /// Trust requests wait for an answer on `/trust/prompts`.
    pub fn with_operator_prompt(timeout: Duration) -> Self {
        Self {
            operator_prompt: Some(timeout),
            ..Default::default()
        }
    }

    /// Grant trust requests from hosts matching `patterns`.
    pub fn with_auto_grant(patterns: &[&str]) -> Self {
        Self {
            trusted: Vec::new(),
            auto_grant: patterns.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
