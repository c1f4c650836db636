pub mod config;
pub mod media;
pub mod messaging;
pub mod metrics;
pub mod oplog;
pub mod orchestrator;
pub mod publish;
pub mod retry;
pub mod surface;
pub mod sync;
pub mod testing;
pub mod trust;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, PromptMode,
    SanitizedConfig,
};
pub use messaging::{Action, CorrelationTable, MessagingError, RequestEnvelope, ResponseEnvelope};
pub use orchestrator::{
    Job, JobError, JobEvent, JobReport, Orchestrator, OrchestratorConfig, SurfaceRegistry,
};
pub use publish::{
    AdapterRegistry, AdapterSpec, FailureReason, PublishContent, PublishOutcome, PublishState,
    TargetRef,
};
pub use surface::{Surface, SurfaceError, SurfaceHost, WebDriverHost};
pub use trust::{
    create_prompt, is_authorized, JsonFileTrustStore, TrustDecision, TrustError, TrustService,
    TrustStore,
};
