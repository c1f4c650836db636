//! Per-surface element registry.
//!
//! Collects element handles discovered while a target runs (editor roots,
//! dynamically created upload inputs, fields). One registry exists per
//! surface, so concurrent targets never see each other's handles.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{ElementHandle, Surface, SurfaceError};

/// A handle recorded under a role.
#[derive(Debug, Clone)]
pub struct RegisteredElement {
    pub role: String,
    pub handle: ElementHandle,
    pub registered_at: DateTime<Utc>,
}

/// Registry of element handles owned by one surface.
#[derive(Debug, Clone, Default)]
pub struct ElementRegistry {
    surface_id: String,
    elements: Arc<RwLock<Vec<RegisteredElement>>>,
}

impl ElementRegistry {
    pub fn new(surface_id: impl Into<String>) -> Self {
        Self {
            surface_id: surface_id.into(),
            elements: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn surface_id(&self) -> &str {
        &self.surface_id
    }

    /// Record a handle under a role. Re-registering the same handle for the
    /// same role is a no-op.
    pub async fn register(&self, role: &str, handle: ElementHandle) {
        let mut elements = self.elements.write().await;
        if elements
            .iter()
            .any(|e| e.role == role && e.handle == handle)
        {
            return;
        }
        elements.push(RegisteredElement {
            role: role.to_string(),
            handle,
            registered_at: Utc::now(),
        });
    }

    /// Most recently registered handle for a role.
    pub async fn latest(&self, role: &str) -> Option<ElementHandle> {
        self.elements
            .read()
            .await
            .iter()
            .rev()
            .find(|e| e.role == role)
            .map(|e| e.handle.clone())
    }

    /// All handles registered under a role, oldest first.
    pub async fn all(&self, role: &str) -> Vec<ElementHandle> {
        self.elements
            .read()
            .await
            .iter()
            .filter(|e| e.role == role)
            .map(|e| e.handle.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.elements.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.elements.read().await.is_empty()
    }

    /// Register every element currently matching `selector` that was not yet
    /// known under `role`. Returns the newly discovered handles.
    pub async fn collect_new(
        &self,
        surface: &dyn Surface,
        role: &str,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, SurfaceError> {
        let found = surface.query_all(selector).await?;
        let known: HashSet<ElementHandle> = self.all(role).await.into_iter().collect();

        let mut fresh = Vec::new();
        for handle in found {
            if !known.contains(&handle) {
                self.register(role, handle.clone()).await;
                fresh.push(handle);
            }
        }
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSurface;

    #[tokio::test]
    async fn test_register_and_latest() {
        let registry = ElementRegistry::new("s-1");
        registry.register("input", ElementHandle::new("a")).await;
        registry.register("input", ElementHandle::new("b")).await;
        registry.register("editor", ElementHandle::new("c")).await;

        assert_eq!(registry.latest("input").await, Some(ElementHandle::new("b")));
        assert_eq!(registry.all("input").await.len(), 2);
        assert_eq!(registry.len().await, 3);
        assert!(registry.latest("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = ElementRegistry::new("s-1");
        registry.register("input", ElementHandle::new("a")).await;
        registry.register("input", ElementHandle::new("a")).await;
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_collect_new_only_returns_unseen() {
        let surface = MockSurface::new("https://example.com/editor");
        let first = surface.add_element("input[type=file]", "").await;

        let registry = ElementRegistry::new(surface.id());
        let fresh = registry
            .collect_new(&surface, "file_input", "input[type=file]")
            .await
            .unwrap();
        assert_eq!(fresh, vec![first]);

        let second = surface.add_element("input[type=file]", "").await;
        let fresh = registry
            .collect_new(&surface, "file_input", "input[type=file]")
            .await
            .unwrap();
        assert_eq!(fresh, vec![second]);
    }

    #[tokio::test]
    async fn test_registries_are_isolated() {
        let a = ElementRegistry::new("s-a");
        let b = ElementRegistry::new("s-b");
        a.register("input", ElementHandle::new("x")).await;
        assert!(b.is_empty().await);
    }
}
