//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the surface, fetcher and
//! uploader traits, so the state machine and orchestrator can be exercised
//! end to end without a browser.
//!
//! # Example
//!
//! ```rust,ignore
//! use multipost_core::testing::{fixtures, MockSurface, MockSurfaceHost};
//!
//! let host = MockSurfaceHost::new();
//! let surface = MockSurface::new("https://blog.example/new");
//! surface.add_element("#editor", "").await;
//! host.prepare("https://blog.example/new", surface).await;
//!
//! let adapter = fixtures::blog_adapter();
//! ```

mod mock_fetcher;
mod mock_host;
mod mock_surface;
mod mock_uploader;

pub use mock_fetcher::MockFetcher;
pub use mock_host::MockSurfaceHost;
pub use mock_surface::{MockOp, MockReaction, MockSurface};
pub use mock_uploader::MockUploader;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::media::FileDescriptor;
    use crate::publish::{
        ActionLocator, AdapterSpec, FieldSpec, MediaStrategy, PublishContent, SuccessSignal,
        TargetRef,
    };

    /// Blog editor: title input, HTML body, publish button revealing a post link.
    pub fn blog_adapter() -> AdapterSpec {
        AdapterSpec {
            id: "blog".to_string(),
            target_kind: "article".to_string(),
            ready_selector: "#editor".to_string(),
            ready_timeout_ms: 2_000,
            title: Some(FieldSpec {
                selector: "input.title".to_string(),
                property: "value".to_string(),
                use_html: false,
            }),
            body: Some(FieldSpec {
                selector: "div.body".to_string(),
                property: "innerHTML".to_string(),
                use_html: true,
            }),
            media: MediaStrategy::None,
            publish_action: ActionLocator::Selector {
                selector: "button.publish".to_string(),
            },
            draft_action: None,
            success: SuccessSignal::Selector {
                selector: ".post-link".to_string(),
                result_attribute: Some("href".to_string()),
            },
            draft_success: None,
            confirm_timeout_ms: 5_000,
            field_timeout_ms: 1_000,
            settle_ms: 100,
            poll_interval_ms: 500,
        }
    }

    /// Short-text composer: a textarea and a "Post" button that navigates.
    pub fn social_adapter() -> AdapterSpec {
        AdapterSpec {
            id: "social".to_string(),
            target_kind: "status".to_string(),
            ready_selector: "textarea".to_string(),
            ready_timeout_ms: 2_000,
            title: None,
            body: Some(FieldSpec {
                selector: "textarea".to_string(),
                property: "value".to_string(),
                use_html: false,
            }),
            media: MediaStrategy::None,
            publish_action: ActionLocator::Text {
                selector: "button".to_string(),
                text: "Post".to_string(),
                attempts: 3,
                interval_ms: 500,
            },
            draft_action: None,
            success: SuccessSignal::Navigation {
                url_contains: "/status/".to_string(),
            },
            draft_success: None,
            confirm_timeout_ms: 5_000,
            field_timeout_ms: 1_000,
            settle_ms: 100,
            poll_interval_ms: 500,
        }
    }

    /// Upload page with a file input accepting images and video.
    pub fn file_input_adapter() -> AdapterSpec {
        AdapterSpec {
            id: "video".to_string(),
            target_kind: "video".to_string(),
            ready_selector: "#uploader".to_string(),
            ready_timeout_ms: 2_000,
            title: None,
            body: None,
            media: MediaStrategy::FileInput {
                selector: "input[type=file]".to_string(),
                accept: vec!["image/".to_string(), "video/".to_string()],
            },
            publish_action: ActionLocator::Selector {
                selector: "button.publish".to_string(),
            },
            draft_action: None,
            success: SuccessSignal::Unverified,
            draft_success: None,
            confirm_timeout_ms: 5_000,
            field_timeout_ms: 1_000,
            settle_ms: 100,
            poll_interval_ms: 500,
        }
    }

    /// Content with a title (empty means none) and a body.
    pub fn content(title: &str, body: &str) -> PublishContent {
        PublishContent {
            title: (!title.is_empty()).then(|| title.to_string()),
            body: body.to_string(),
            ..Default::default()
        }
    }

    /// Content carrying media descriptors named after their URLs.
    pub fn content_with_media(title: &str, body: &str, urls: &[&str]) -> PublishContent {
        let mut content = content(title, body);
        content.media = urls
            .iter()
            .map(|url| {
                let name = url.rsplit('/').next().unwrap_or(url);
                FileDescriptor::new(name, "image/png", url)
            })
            .collect();
        content
    }

    /// Target for an adapter at a URL.
    pub fn target(adapter: &AdapterSpec, url: &str) -> TargetRef {
        TargetRef::new(&adapter.target_kind, url, &adapter.id)
    }
}
