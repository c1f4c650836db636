use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::types::{ElementHandle, MutationObserver, NativeFile, PageUpload, SurfaceError};

/// A live, isolated instance of a foreign web UI.
///
/// Everything the publisher knows about the foreign page goes through this
/// trait. Implementations must make every pending operation fail with
/// [`SurfaceError::Closed`] once [`Surface::close`] has been called, and must
/// cancel the token returned by [`Surface::cancellation`].
#[async_trait]
pub trait Surface: Send + Sync {
    /// Stable identifier of this surface.
    fn id(&self) -> &str;

    /// Token cancelled when the surface closes.
    fn cancellation(&self) -> CancellationToken;

    /// First element matching a CSS selector, if any.
    async fn query(&self, selector: &str) -> Result<Option<ElementHandle>, SurfaceError>;

    /// All elements matching a CSS selector, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, SurfaceError>;

    /// Rendered text content of an element.
    async fn text(&self, element: &ElementHandle) -> Result<String, SurfaceError>;

    /// Attribute value of an element.
    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SurfaceError>;

    /// Subscribe to subtree mutations under the document root.
    async fn observe(&self) -> Result<MutationObserver, SurfaceError>;

    /// Assign a DOM property directly (e.g. `value`, `innerHTML`, `disabled`).
    async fn set_property(
        &self,
        element: &ElementHandle,
        name: &str,
        value: Value,
    ) -> Result<(), SurfaceError>;

    /// Dispatch a bubbling synthetic event of the given type.
    async fn dispatch_event(&self, element: &ElementHandle, event: &str)
        -> Result<(), SurfaceError>;

    /// Click an element.
    async fn click(&self, element: &ElementHandle) -> Result<(), SurfaceError>;

    /// Replace the file list of an `<input type="file">` in one assignment.
    async fn set_files(
        &self,
        element: &ElementHandle,
        files: Vec<NativeFile>,
    ) -> Result<(), SurfaceError>;

    /// Perform a multipart upload from inside the page and return the parsed JSON body.
    async fn upload(&self, request: PageUpload) -> Result<Value, SurfaceError>;

    /// Current location of the surface.
    async fn current_url(&self) -> Result<String, SurfaceError>;

    /// Bring the surface to the foreground.
    async fn activate(&self) -> Result<(), SurfaceError>;

    /// Reload the surface.
    async fn reload(&self) -> Result<(), SurfaceError>;

    /// Close the surface. Idempotent.
    async fn close(&self) -> Result<(), SurfaceError>;
}

/// Creates execution surfaces.
#[async_trait]
pub trait SurfaceHost: Send + Sync {
    /// Open a new surface navigated to `url`.
    async fn open(&self, url: &str) -> Result<Arc<dyn Surface>, SurfaceError>;

    /// Name of this host backend.
    fn name(&self) -> &'static str;
}
