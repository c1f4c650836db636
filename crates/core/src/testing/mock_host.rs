//! Mock surface host for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::MockSurface;
use crate::surface::{Surface, SurfaceError, SurfaceHost};

/// Mock implementation of the SurfaceHost trait.
///
/// Surfaces are prepared per URL ahead of the job. Opening a URL with no
/// prepared surface yields an empty page, which never becomes ready.
///
/// # Example
///
/// ```rust,ignore
/// use multipost_core::testing::{MockSurface, MockSurfaceHost};
///
/// let host = MockSurfaceHost::new();
/// let blog = MockSurface::new("https://blog.example/new");
/// blog.add_element("#editor", "").await;
/// host.prepare("https://blog.example/new", blog.clone()).await;
/// host.fail("https://down.example/", "connection refused").await;
/// ```
#[derive(Clone, Default)]
pub struct MockSurfaceHost {
    inner: Arc<RwLock<MockHostState>>,
}

#[derive(Default)]
struct MockHostState {
    prepared: HashMap<String, MockSurface>,
    failures: HashMap<String, String>,
    opened: Vec<(String, MockSurface)>,
}

impl MockSurfaceHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `surface` when `url` is opened.
    pub async fn prepare(&self, url: &str, surface: MockSurface) {
        self.inner
            .write()
            .await
            .prepared
            .insert(url.to_string(), surface);
    }

    /// Make opening `url` fail.
    pub async fn fail(&self, url: &str, message: &str) {
        self.inner
            .write()
            .await
            .failures
            .insert(url.to_string(), message.to_string());
    }

    /// URLs opened so far, in order.
    pub async fn recorded_opens(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .opened
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// Surfaces handed out so far, in open order.
    pub async fn opened_surfaces(&self) -> Vec<MockSurface> {
        self.inner
            .read()
            .await
            .opened
            .iter()
            .map(|(_, surface)| surface.clone())
            .collect()
    }
}

#[async_trait]
impl SurfaceHost for MockSurfaceHost {
    async fn open(&self, url: &str) -> Result<Arc<dyn Surface>, SurfaceError> {
        let mut state = self.inner.write().await;
        if let Some(message) = state.failures.get(url) {
            return Err(SurfaceError::OpenFailed(message.clone()));
        }
        let surface = state
            .prepared
            .get(url)
            .cloned()
            .unwrap_or_else(|| MockSurface::new(url));
        state.opened.push((url.to_string(), surface.clone()));
        Ok(Arc::new(surface))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
