//! Job orchestrator.
//!
//! The orchestrator fans one job out to its targets:
//! - **Activation**: Sequential (one surface at a time, with a settle delay)
//! - **Execution**: Concurrent (one state machine task per surface)
//! - **Control**: Operators reach running surfaces through the [`SurfaceRegistry`]

mod config;
mod registry;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use registry::{StateCell, SurfaceRegistry};
pub use runner::Orchestrator;
pub use types::{
    Job, JobError, JobEvent, JobReport, JobSummary, SurfaceControlError, SurfaceInfo,
    TargetOutcome, TargetProgress,
};
