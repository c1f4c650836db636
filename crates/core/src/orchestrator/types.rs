//! Types for the job orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::MediaProgress;
use crate::publish::{FailureReason, PublishContent, PublishOutcome, PublishState, TargetRef, TargetStatus};
use crate::surface::SurfaceError;

/// Errors from the operator surface-control channel.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SurfaceControlError {
    /// No active surfaces for this job.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// The job has no surface with this id.
    #[error("surface {surface_id} not found in job {job_id}")]
    SurfaceNotFound { job_id: String, surface_id: String },

    /// The surface rejected the operation.
    #[error("surface error: {0}")]
    Surface(#[from] SurfaceError),
}

/// Errors starting a job.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JobError {
    /// Another run with this id is in flight or still holds surfaces.
    #[error("job {0} is already running or still holds surfaces")]
    DuplicateJobId(String),
}

/// One content item to publish to an ordered list of targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Generated when the caller omits it.
    #[serde(default = "new_job_id")]
    pub job_id: String,
    pub content: PublishContent,
    pub targets: Vec<TargetRef>,
    /// Publish publicly when true; save a draft otherwise.
    #[serde(default)]
    pub auto_publish: bool,
}

fn new_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Job {
    pub fn new(content: PublishContent, targets: Vec<TargetRef>, auto_publish: bool) -> Self {
        Self {
            job_id: new_job_id(),
            content,
            targets,
            auto_publish,
        }
    }
}

/// Outcome of one target inside a job report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetOutcome {
    pub target: TargetRef,
    #[serde(flatten)]
    pub outcome: PublishOutcome,
}

/// Per-target outcomes of a job, in target order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job_id: String,
    pub outcomes: Vec<TargetOutcome>,
}

impl JobReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.is_success())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Progress of a running target.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetProgress {
    /// The state machine entered a new state.
    State { state: PublishState },
    /// The media pipeline processed an asset.
    Media { media: MediaProgress },
}

/// Events broadcast while a job runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    JobStarted {
        job_id: String,
        targets: usize,
    },
    TargetStarted {
        job_id: String,
        index: usize,
        target: TargetRef,
        surface_id: String,
    },
    TargetProgress {
        job_id: String,
        index: usize,
        progress: TargetProgress,
    },
    TargetFinished {
        job_id: String,
        index: usize,
        status: TargetStatus,
        failure_reason: Option<FailureReason>,
    },
    JobFinished {
        job_id: String,
        succeeded: usize,
        failed: usize,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::JobStarted { job_id, .. }
            | JobEvent::TargetStarted { job_id, .. }
            | JobEvent::TargetProgress { job_id, .. }
            | JobEvent::TargetFinished { job_id, .. }
            | JobEvent::JobFinished { job_id, .. } => job_id,
        }
    }
}

/// A surface currently held by a job, as shown to operators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceInfo {
    pub job_id: String,
    pub surface_id: String,
    pub index: usize,
    pub target: TargetRef,
    pub state: PublishState,
    pub opened_at: DateTime<Utc>,
}

/// A job with surfaces still registered.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: String,
    pub surfaces: usize,
}
