//! Job orchestrator implementation.
//!
//! Fans one job out to its targets:
//! - Activation: sequential, one surface at a time with a settle delay
//! - Execution: concurrent, one state machine task per surface
//! - Reporting: outcomes arrive in completion order, the report is in target order

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::media::{FileFetcher, MediaConfig, MediaPipeline};
use crate::metrics;
use crate::oplog::OperationLog;
use crate::publish::{
    AdapterRegistry, AdapterSpec, FailureReason, PublishContent, PublishMachine, PublishOutcome,
    PublishState, TargetRef,
};
use crate::surface::{ElementRegistry, Surface, SurfaceHost};

use super::config::OrchestratorConfig;
use super::registry::SurfaceRegistry;
use super::types::{Job, JobError, JobEvent, JobReport, TargetOutcome, TargetProgress};

/// Everything a spawned target task needs, detached from the orchestrator.
struct TargetRun {
    job_id: String,
    index: usize,
    target: TargetRef,
    adapter: Arc<AdapterSpec>,
    surface: Arc<dyn Surface>,
    content: Arc<PublishContent>,
    auto_publish: bool,
}

/// Holds a job id in the running set until dropped.
struct JobReservation {
    running: Arc<Mutex<HashSet<String>>>,
    job_id: String,
}

impl Drop for JobReservation {
    fn drop(&mut self) {
        lock(&self.running).remove(&self.job_id);
    }
}

fn lock(running: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The job orchestrator - opens surfaces and runs one state machine per target.
pub struct Orchestrator {
    config: OrchestratorConfig,
    media_config: MediaConfig,
    host: Arc<dyn SurfaceHost>,
    adapters: Arc<AdapterRegistry>,
    fetcher: Arc<dyn FileFetcher>,
    surfaces: Arc<SurfaceRegistry>,
    events_tx: broadcast::Sender<JobEvent>,
    /// Ids of jobs currently running.
    running: Arc<Mutex<HashSet<String>>>,
}

impl Orchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        media_config: MediaConfig,
        host: Arc<dyn SurfaceHost>,
        adapters: AdapterRegistry,
        fetcher: Arc<dyn FileFetcher>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(config.event_buffer.max(1));

        Self {
            config,
            media_config,
            host,
            adapters: Arc::new(adapters),
            fetcher,
            surfaces: Arc::new(SurfaceRegistry::new()),
            events_tx,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Subscribe to job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events_tx.subscribe()
    }

    /// Operator view of the surfaces held by running jobs.
    pub fn surfaces(&self) -> Arc<SurfaceRegistry> {
        Arc::clone(&self.surfaces)
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn host_name(&self) -> &'static str {
        self.host.name()
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    /// Run a job to completion and return its report.
    ///
    /// Every target gets exactly one outcome. Targets that never got a
    /// surface fail without a state machine. A job id that is still running,
    /// or still holds surfaces, is rejected.
    pub async fn run_job(&self, job: Job) -> Result<JobReport, JobError> {
        let _reservation = self.reserve(&job.job_id).await?;
        Ok(self.execute(job).await)
    }

    /// Run a job on its own task, so it finishes even if the caller goes away.
    ///
    /// The job id is reserved before this returns.
    pub async fn spawn_job(self: &Arc<Self>, job: Job) -> Result<JoinHandle<JobReport>, JobError> {
        let reservation = self.reserve(&job.job_id).await?;
        let orchestrator = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let _reservation = reservation;
            orchestrator.execute(job).await
        }))
    }

    async fn reserve(&self, job_id: &str) -> Result<JobReservation, JobError> {
        if !lock(&self.running).insert(job_id.to_string()) {
            return Err(JobError::DuplicateJobId(job_id.to_string()));
        }
        let reservation = JobReservation {
            running: Arc::clone(&self.running),
            job_id: job_id.to_string(),
        };
        // Kept surfaces from an earlier run still live under this id.
        if self.surfaces.has_job(job_id).await {
            return Err(JobError::DuplicateJobId(job_id.to_string()));
        }
        Ok(reservation)
    }

    async fn execute(&self, job: Job) -> JobReport {
        let Job {
            job_id,
            content,
            targets,
            auto_publish,
        } = job;
        let total = targets.len();

        metrics::JOBS_STARTED.inc();
        info!(job_id = %job_id, targets = total, auto_publish, "Starting job");
        self.emit(JobEvent::JobStarted {
            job_id: job_id.clone(),
            targets: total,
        });

        let content = Arc::new(content);
        let mut outcomes: Vec<Option<PublishOutcome>> = vec![None; total];
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<(usize, PublishOutcome)>();
        let mut activated_any = false;

        for (index, target) in targets.iter().enumerate() {
            let Some(adapter) = self.adapters.get(&target.adapter_id) else {
                warn!(job_id = %job_id, target = %target, "No adapter registered");
                let outcome = self.unstarted_failure(
                    target,
                    FailureReason::AdapterNotFound,
                    format!("no adapter registered for {}", target.adapter_id),
                );
                self.finish_target(&job_id, index, &outcome);
                outcomes[index] = Some(outcome);
                continue;
            };

            if activated_any && !self.config.settle_delay().is_zero() {
                debug!(job_id = %job_id, delay_ms = self.config.settle_delay_ms, "Settling before next target");
                tokio::time::sleep(self.config.settle_delay()).await;
            }

            let surface = match self.host.open(&target.inject_url).await {
                Ok(surface) => surface,
                Err(e) => {
                    error!(job_id = %job_id, target = %target, "Failed to open surface: {}", e);
                    let outcome = self.unstarted_failure(
                        target,
                        FailureReason::SurfaceOpenFailed,
                        e.to_string(),
                    );
                    self.finish_target(&job_id, index, &outcome);
                    outcomes[index] = Some(outcome);
                    continue;
                }
            };
            activated_any = true;

            self.spawn_target(
                TargetRun {
                    job_id: job_id.clone(),
                    index,
                    target: target.clone(),
                    adapter,
                    surface,
                    content: Arc::clone(&content),
                    auto_publish,
                },
                outcome_tx.clone(),
            )
            .await;
        }
        drop(outcome_tx);

        while let Some((index, outcome)) = outcome_rx.recv().await {
            outcomes[index] = Some(outcome);
        }

        let outcomes: Vec<TargetOutcome> = targets
            .into_iter()
            .zip(outcomes)
            .map(|(target, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    error!(target = %target, "Target task ended without an outcome");
                    PublishOutcome::failure(
                        FailureReason::Cancelled,
                        "target task ended without an outcome",
                        Vec::new(),
                    )
                });
                TargetOutcome { target, outcome }
            })
            .collect();

        let report = JobReport { job_id, outcomes };
        info!(
            job_id = %report.job_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Job finished"
        );
        self.emit(JobEvent::JobFinished {
            job_id: report.job_id.clone(),
            succeeded: report.succeeded(),
            failed: report.failed(),
        });
        report
    }

    /// Failure for a target that never reached a state machine.
    fn unstarted_failure(
        &self,
        target: &TargetRef,
        reason: FailureReason,
        message: String,
    ) -> PublishOutcome {
        let mut log = OperationLog::new(target.to_string());
        log.error(format!("{}: {}", reason, message));
        metrics::TARGET_OUTCOMES
            .with_label_values(&["failure", reason.as_str()])
            .inc();
        PublishOutcome::failure(reason, message, log.into_entries())
    }

    fn finish_target(&self, job_id: &str, index: usize, outcome: &PublishOutcome) {
        self.emit(JobEvent::TargetFinished {
            job_id: job_id.to_string(),
            index,
            status: outcome.status,
            failure_reason: outcome.failure_reason,
        });
    }

    async fn spawn_target(
        &self,
        run: TargetRun,
        outcome_tx: mpsc::UnboundedSender<(usize, PublishOutcome)>,
    ) {
        let surface_id = run.surface.id().to_string();
        let state = self
            .surfaces
            .register(&run.job_id, run.index, run.target.clone(), Arc::clone(&run.surface))
            .await;

        info!(job_id = %run.job_id, index = run.index, target = %run.target, surface_id = %surface_id, "Target started");
        self.emit(JobEvent::TargetStarted {
            job_id: run.job_id.clone(),
            index: run.index,
            target: run.target.clone(),
            surface_id: surface_id.clone(),
        });

        // Media progress is forwarded as job events until the pipeline is dropped.
        let (media_tx, mut media_rx) = mpsc::unbounded_channel();
        {
            let events_tx = self.events_tx.clone();
            let job_id = run.job_id.clone();
            let index = run.index;
            tokio::spawn(async move {
                while let Some(media) = media_rx.recv().await {
                    let _ = events_tx.send(JobEvent::TargetProgress {
                        job_id: job_id.clone(),
                        index,
                        progress: TargetProgress::Media { media },
                    });
                }
            });
        }

        let pipeline = MediaPipeline::new(
            Arc::clone(&run.surface),
            Arc::clone(&self.fetcher),
            self.media_config.clone(),
            ElementRegistry::new(surface_id.clone()),
        )
        .with_progress(media_tx);

        let on_transition = {
            let events_tx = self.events_tx.clone();
            let job_id = run.job_id.clone();
            let index = run.index;
            Arc::new(move |next: PublishState| {
                state.set(next);
                let _ = events_tx.send(JobEvent::TargetProgress {
                    job_id: job_id.clone(),
                    index,
                    progress: TargetProgress::State { state: next },
                });
            })
        };

        let machine = PublishMachine::new(
            run.target.clone(),
            run.adapter,
            Arc::clone(&run.surface),
            pipeline,
        )
        .with_transition_callback(on_transition);

        let surfaces = Arc::clone(&self.surfaces);
        let events_tx = self.events_tx.clone();
        let close_on_completion = self.config.close_surfaces_on_completion;

        tokio::spawn(async move {
            let outcome = machine.run(&run.content, run.auto_publish).await;

            if close_on_completion {
                if let Err(e) = run.surface.close().await {
                    warn!(surface_id = %surface_id, "Failed to close surface: {}", e);
                }
                surfaces.unregister(&run.job_id, &surface_id).await;
            }

            match outcome.failure_reason {
                None => info!(job_id = %run.job_id, target = %run.target, "Target succeeded"),
                Some(reason) => warn!(
                    job_id = %run.job_id,
                    target = %run.target,
                    reason = %reason,
                    "Target failed: {}",
                    outcome.error_message.as_deref().unwrap_or("")
                ),
            }
            let _ = events_tx.send(JobEvent::TargetFinished {
                job_id: run.job_id.clone(),
                index: run.index,
                status: outcome.status,
                failure_reason: outcome.failure_reason,
            });
            let _ = outcome_tx.send((run.index, outcome));
        });
    }
}
