//! Media pipeline integration tests.
//!
//! These tests run jobs carrying media through the orchestrator with the real
//! fetcher, resolving `data:` and `file://` references without a network.

use std::sync::Arc;

use base64::Engine;
use tempfile::TempDir;

use multipost_core::{
    media::{FileDescriptor, HttpFileFetcher, MediaConfig},
    publish::MediaStrategy,
    testing::{fixtures, MockSurface, MockSurfaceHost},
    AdapterRegistry, FailureReason, Job, Orchestrator, OrchestratorConfig,
};

const UPLOAD_URL: &str = "https://video.example/upload";
const BLOG_URL: &str = "https://blog.example/new";

fn media_config() -> MediaConfig {
    MediaConfig {
        fetch_attempts: 2,
        fetch_retry_delay_ms: 10,
        processing_window_ms: 20,
        ..Default::default()
    }
}

fn orchestrator(host: &MockSurfaceHost, adapters: AdapterRegistry) -> Orchestrator {
    let fetcher = HttpFileFetcher::new(&media_config()).expect("Failed to create fetcher");
    Orchestrator::new(
        OrchestratorConfig {
            settle_delay_ms: 0,
            ..Default::default()
        },
        media_config(),
        Arc::new(host.clone()),
        adapters,
        Arc::new(fetcher),
    )
}

fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

async fn upload_page(host: &MockSurfaceHost) -> (MockSurface, multipost_core::surface::ElementHandle) {
    let surface = MockSurface::new(UPLOAD_URL);
    surface.add_element("#uploader", "").await;
    let input = surface.add_element("input[type=file]", "").await;
    surface.add_element("button.publish", "Publish").await;
    host.prepare(UPLOAD_URL, surface.clone()).await;
    (surface, input)
}

#[tokio::test]
async fn test_staging_resolves_data_and_file_references() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let clip_path = temp_dir.path().join("clip.mp4");
    std::fs::write(&clip_path, b"not really a video").expect("Failed to write clip");
    let clip_url = url::Url::from_file_path(&clip_path).unwrap().to_string();

    let host = MockSurfaceHost::new();
    let (surface, input) = upload_page(&host).await;
    let adapter = fixtures::file_input_adapter();
    let orch = orchestrator(&host, AdapterRegistry::new(vec![adapter.clone()]));

    let mut content = fixtures::content("Clip", "desc");
    content.media = vec![
        FileDescriptor::new("pixel.png", "image/png", &data_url("image/png", b"\x89PNG")),
        FileDescriptor::new("lost.png", "image/png", "ftp://files.example/lost.png"),
        FileDescriptor::new("clip.mp4", "video/mp4", &clip_url),
    ];

    let report = orch
        .run_job(Job::new(content, vec![fixtures::target(&adapter, UPLOAD_URL)], true))
        .await
        .unwrap();

    let outcome = &report.outcomes[0].outcome;
    assert!(outcome.is_success(), "{:?}", outcome.error_message);

    let files = surface.files(&input);
    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["pixel.png", "clip.mp4"]);
    assert_eq!(files[0].mime_type, "image/png");
    assert_eq!(files[0].bytes, b"\x89PNG");
    assert_eq!(files[1].bytes, b"not really a video");
    assert_eq!(surface.events(&input), vec!["change"]);
    assert!(outcome.log.iter().any(|e| e.message.contains("lost.png")));
}

#[tokio::test]
async fn test_all_assets_failing_fails_target() {
    let host = MockSurfaceHost::new();
    let (surface, input) = upload_page(&host).await;
    let adapter = fixtures::file_input_adapter();
    let orch = orchestrator(&host, AdapterRegistry::new(vec![adapter.clone()]));

    let mut content = fixtures::content("Clip", "desc");
    content.media = vec![FileDescriptor::new("a.png", "image/png", "ftp://x/a.png")];

    let report = orch
        .run_job(Job::new(content, vec![fixtures::target(&adapter, UPLOAD_URL)], true))
        .await
        .unwrap();

    assert_eq!(
        report.outcomes[0].outcome.failure_reason,
        Some(FailureReason::MediaUploadFailed)
    );
    assert!(surface.files(&input).is_empty());
}

#[tokio::test]
async fn test_inline_rewrite_uploads_through_page() {
    let host = MockSurfaceHost::new();
    let surface = MockSurface::new(BLOG_URL);
    surface.add_element("#editor", "").await;
    surface.add_element("input.title", "").await;
    let body = surface.add_element("div.body", "").await;
    surface.add_element("button.publish", "Publish").await;
    host.prepare(BLOG_URL, surface.clone()).await;

    let mut adapter = fixtures::blog_adapter();
    adapter.success = multipost_core::publish::SuccessSignal::Unverified;
    adapter.media = MediaStrategy::InlineRewrite {
        endpoint: "/upload".to_string(),
        form_field: "image".to_string(),
        url_pointer: "/data/url".to_string(),
        extra_fields: Default::default(),
    };
    let orch = orchestrator(&host, AdapterRegistry::new(vec![adapter.clone()]));

    let pixel = data_url("image/png", b"\x89PNG");
    let mut content = fixtures::content("Hello", "");
    content.html_body = Some(format!(r#"<p>Look</p><img src="{}">"#, pixel));
    content.media = vec![FileDescriptor::new("pixel.png", "image/png", &pixel)];

    let report = orch
        .run_job(Job::new(content, vec![fixtures::target(&adapter, BLOG_URL)], true))
        .await
        .unwrap();

    assert!(report.outcomes[0].outcome.is_success());
    let uploads = surface.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].form_field, "image");
    assert_eq!(uploads[0].file.bytes, b"\x89PNG");
    assert_eq!(
        surface.property(&body, "innerHTML"),
        Some(serde_json::json!(
            r#"<p>Look</p><img src="https://cdn.mock/pixel.png">"#
        ))
    );
}
