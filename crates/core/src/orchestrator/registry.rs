//! Registry of surfaces held by running jobs.
//!
//! This is the operator's view into a job: list its surfaces, bring one to
//! the foreground, reload it, or close it. Closing cancels the surface, which
//! makes the target's state machine fail with `Cancelled`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::types::{JobSummary, SurfaceControlError, SurfaceInfo};
use crate::metrics;
use crate::publish::{PublishState, TargetRef};
use crate::surface::Surface;

/// Last state reported by a target's machine.
///
/// Written from the machine's synchronous transition callback.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<StdRwLock<PublishState>>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(StdRwLock::new(PublishState::Init)))
    }

    pub fn set(&self, state: PublishState) {
        *self.0.write().unwrap_or_else(|p| p.into_inner()) = state;
    }

    pub fn get(&self) -> PublishState {
        *self.0.read().unwrap_or_else(|p| p.into_inner())
    }
}

struct ActiveSurface {
    index: usize,
    target: TargetRef,
    surface: Arc<dyn Surface>,
    state: StateCell,
    opened_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct SurfaceRegistry {
    jobs: RwLock<HashMap<String, Vec<ActiveSurface>>>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a surface for a job. The returned cell follows the target's state.
    pub async fn register(
        &self,
        job_id: &str,
        index: usize,
        target: TargetRef,
        surface: Arc<dyn Surface>,
    ) -> StateCell {
        let state = StateCell::new();
        debug!(job_id, surface_id = surface.id(), index, "Registering surface");
        self.jobs
            .write()
            .await
            .entry(job_id.to_string())
            .or_default()
            .push(ActiveSurface {
                index,
                target,
                surface,
                state: state.clone(),
                opened_at: Utc::now(),
            });
        metrics::SURFACES_ACTIVE.inc();
        state
    }

    /// Stop tracking a surface. Returns whether it was registered.
    pub async fn unregister(&self, job_id: &str, surface_id: &str) -> bool {
        self.take(job_id, surface_id).await.is_some()
    }

    async fn take(&self, job_id: &str, surface_id: &str) -> Option<Arc<dyn Surface>> {
        let mut jobs = self.jobs.write().await;
        let surfaces = jobs.get_mut(job_id)?;
        let idx = surfaces.iter().position(|s| s.surface.id() == surface_id)?;
        let removed = surfaces.remove(idx);
        if surfaces.is_empty() {
            jobs.remove(job_id);
        }
        metrics::SURFACES_ACTIVE.dec();
        Some(removed.surface)
    }

    /// Jobs that still hold at least one surface.
    pub async fn jobs(&self) -> Vec<JobSummary> {
        let mut jobs: Vec<JobSummary> = self
            .jobs
            .read()
            .await
            .iter()
            .map(|(job_id, surfaces)| JobSummary {
                job_id: job_id.clone(),
                surfaces: surfaces.len(),
            })
            .collect();
        jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        jobs
    }

    /// Surfaces of a job, in target order.
    pub async fn surfaces(&self, job_id: &str) -> Result<Vec<SurfaceInfo>, SurfaceControlError> {
        let jobs = self.jobs.read().await;
        let surfaces = jobs
            .get(job_id)
            .ok_or_else(|| SurfaceControlError::JobNotFound(job_id.to_string()))?;
        let mut infos: Vec<SurfaceInfo> = surfaces
            .iter()
            .map(|s| SurfaceInfo {
                job_id: job_id.to_string(),
                surface_id: s.surface.id().to_string(),
                index: s.index,
                target: s.target.clone(),
                state: s.state.get(),
                opened_at: s.opened_at,
            })
            .collect();
        infos.sort_by_key(|s| s.index);
        Ok(infos)
    }

    pub async fn has_job(&self, job_id: &str) -> bool {
        self.jobs.read().await.contains_key(job_id)
    }

    pub async fn active_count(&self) -> usize {
        self.jobs.read().await.values().map(Vec::len).sum()
    }

    async fn find(
        &self,
        job_id: &str,
        surface_id: &str,
    ) -> Result<Arc<dyn Surface>, SurfaceControlError> {
        let jobs = self.jobs.read().await;
        let surfaces = jobs
            .get(job_id)
            .ok_or_else(|| SurfaceControlError::JobNotFound(job_id.to_string()))?;
        surfaces
            .iter()
            .find(|s| s.surface.id() == surface_id)
            .map(|s| Arc::clone(&s.surface))
            .ok_or_else(|| SurfaceControlError::SurfaceNotFound {
                job_id: job_id.to_string(),
                surface_id: surface_id.to_string(),
            })
    }

    pub async fn activate(&self, job_id: &str, surface_id: &str) -> Result<(), SurfaceControlError> {
        let surface = self.find(job_id, surface_id).await?;
        surface.activate().await?;
        info!(job_id, surface_id, "Surface activated by operator");
        Ok(())
    }

    pub async fn reload(&self, job_id: &str, surface_id: &str) -> Result<(), SurfaceControlError> {
        let surface = self.find(job_id, surface_id).await?;
        surface.reload().await?;
        info!(job_id, surface_id, "Surface reloaded by operator");
        Ok(())
    }

    /// Close a surface and stop tracking it.
    pub async fn close(&self, job_id: &str, surface_id: &str) -> Result<(), SurfaceControlError> {
        // Resolve first so unknown ids report the right error.
        self.find(job_id, surface_id).await?;
        if let Some(surface) = self.take(job_id, surface_id).await {
            surface.close().await?;
            info!(job_id, surface_id, "Surface closed by operator");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockOp, MockSurface};

    fn target() -> TargetRef {
        TargetRef::new("article", "https://blog.example/new", "blog")
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let registry = SurfaceRegistry::new();
        let first = MockSurface::new("https://a.example/");
        let second = MockSurface::new("https://b.example/");
        registry
            .register("job", 1, target(), Arc::new(second.clone()))
            .await;
        let cell = registry
            .register("job", 0, target(), Arc::new(first.clone()))
            .await;
        cell.set(PublishState::FillMetadata);

        let surfaces = registry.surfaces("job").await.unwrap();
        assert_eq!(surfaces.len(), 2);
        assert_eq!(surfaces[0].surface_id, first.id());
        assert_eq!(surfaces[0].state, PublishState::FillMetadata);
        assert_eq!(surfaces[1].state, PublishState::Init);

        let jobs = registry.jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].surfaces, 2);
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let registry = SurfaceRegistry::new();
        assert_eq!(
            registry.activate("nope", "s").await,
            Err(SurfaceControlError::JobNotFound("nope".to_string()))
        );

        let surface = MockSurface::new("https://a.example/");
        registry.register("job", 0, target(), Arc::new(surface)).await;
        assert!(matches!(
            registry.reload("job", "missing").await,
            Err(SurfaceControlError::SurfaceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_activate_and_reload_reach_surface() {
        let registry = SurfaceRegistry::new();
        let surface = MockSurface::new("https://a.example/");
        registry
            .register("job", 0, target(), Arc::new(surface.clone()))
            .await;

        registry.activate("job", surface.id()).await.unwrap();
        registry.reload("job", surface.id()).await.unwrap();
        assert_eq!(surface.ops(), vec![MockOp::Activate, MockOp::Reload]);
    }

    #[tokio::test]
    async fn test_close_cancels_and_unregisters() {
        let registry = SurfaceRegistry::new();
        let surface = MockSurface::new("https://a.example/");
        registry
            .register("job", 0, target(), Arc::new(surface.clone()))
            .await;

        registry.close("job", surface.id()).await.unwrap();
        assert!(surface.is_closed());
        assert!(surface.cancellation().is_cancelled());
        assert_eq!(registry.active_count().await, 0);
        assert!(registry.jobs().await.is_empty());
        assert!(!registry.unregister("job", surface.id()).await);
    }
}
