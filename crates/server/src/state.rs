use std::sync::Arc;

use multipost_core::{Config, Orchestrator, SanitizedConfig, SurfaceRegistry, TrustService};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    trust: Arc<TrustService>,
    orchestrator: Arc<Orchestrator>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(
        config: Config,
        trust: Arc<TrustService>,
        orchestrator: Arc<Orchestrator>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        Self {
            config,
            trust,
            orchestrator,
            ws_broadcaster,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn trust(&self) -> &TrustService {
        self.trust.as_ref()
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Surfaces held by running or finished-but-open jobs.
    pub fn surfaces(&self) -> Arc<SurfaceRegistry> {
        self.orchestrator.surfaces()
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
