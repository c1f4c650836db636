//! Core surface data types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised by an execution surface.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SurfaceError {
    /// The surface was closed (by the owner or by an operator).
    #[error("surface closed")]
    Closed,

    /// The element handle no longer refers to a live element.
    #[error("stale element: {0}")]
    StaleElement(String),

    /// The selector was rejected by the surface.
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// The host could not create the surface.
    #[error("failed to open surface: {0}")]
    OpenFailed(String),

    /// The page-side script failed.
    #[error("script error: {0}")]
    Script(String),

    /// Transport or driver failure.
    #[error("driver error: {0}")]
    Driver(String),
}

/// Opaque reference to an element living inside a surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// A file materialized from a descriptor, ready to hand to the foreign UI.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl NativeFile {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// An upload performed from inside the page, with the page's own credentials.
#[derive(Debug, Clone)]
pub struct PageUpload {
    /// Endpoint the page POSTs the multipart form to.
    pub endpoint: String,
    /// Form field carrying the file.
    pub form_field: String,
    /// The file itself.
    pub file: NativeFile,
    /// Additional static form fields.
    pub extra_fields: BTreeMap<String, String>,
}

/// Subtree mutation subscription.
///
/// Each received unit is one mutation batch. Dropping the observer tears the
/// observation down on the surface side.
pub struct MutationObserver {
    batches: mpsc::Receiver<()>,
    teardown: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl MutationObserver {
    pub fn new(batches: mpsc::Receiver<()>, teardown: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            batches,
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Wait for the next mutation batch.
    ///
    /// Returns `false` once the surface stops delivering batches (closed).
    pub async fn changed(&mut self) -> bool {
        self.batches.recv().await.is_some()
    }
}

impl Drop for MutationObserver {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl std::fmt::Debug for MutationObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationObserver")
            .field("active", &self.teardown.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_observer_teardown_runs_on_drop() {
        let (tx, rx) = mpsc::channel(1);
        let torn_down = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&torn_down);

        let mut observer = MutationObserver::new(rx, move || flag.store(true, Ordering::SeqCst));
        tx.send(()).await.unwrap();
        assert!(observer.changed().await);

        drop(observer);
        assert!(torn_down.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_observer_reports_closed_source() {
        let (tx, rx) = mpsc::channel(1);
        let mut observer = MutationObserver::new(rx, || {});
        drop(tx);
        assert!(!observer.changed().await);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(SurfaceError::Closed.to_string(), "surface closed");
        assert_eq!(
            SurfaceError::OpenFailed("popup blocked".to_string()).to_string(),
            "failed to open surface: popup blocked"
        );
    }
}
