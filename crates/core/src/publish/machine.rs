//! Per-target publish state machine.
//!
//! `Init → AwaitReady → FillMetadata → UploadMedia → Submit → Confirm → Done`,
//! with `Failed` reachable from every non-terminal state. Steps are never
//! retried here: clicking a foreign submit button twice is not safe.

use std::fmt::Display;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::time::Instant;

use super::adapter::{ActionLocator, AdapterSpec, FieldSpec, MediaStrategy, SuccessSignal};
use super::types::{FailureReason, PublishContent, PublishOutcome, PublishState, TargetRef};
use crate::media::{FileDescriptor, MediaError, MediaPipeline, PageUploader};
use crate::metrics;
use crate::oplog::OperationLog;
use crate::surface::{ElementHandle, Surface, SurfaceError};
use crate::sync::{wait_for_appearance, wait_for_text_match, WaitError};

/// Invoked on every state transition.
pub type TransitionCallback = Arc<dyn Fn(PublishState) + Send + Sync>;

/// Registry role of the filled body field.
const BODY_ROLE: &str = "body";

#[derive(Debug)]
struct StepFailure {
    reason: FailureReason,
    message: String,
}

impl StepFailure {
    fn new(reason: FailureReason, message: impl Display) -> Self {
        Self {
            reason,
            message: message.to_string(),
        }
    }

    fn cancelled() -> Self {
        Self::new(FailureReason::Cancelled, "surface closed")
    }

    fn from_wait(err: WaitError, reason: FailureReason) -> Self {
        match err {
            WaitError::Cancelled => Self::cancelled(),
            other => Self::new(reason, other),
        }
    }

    fn from_surface(err: SurfaceError, reason: FailureReason) -> Self {
        match err {
            SurfaceError::Closed => Self::cancelled(),
            other => Self::new(reason, other),
        }
    }
}

/// How the Submit step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Submission {
    Published,
    DraftSaved,
    /// Draft requested but the adapter has no draft action.
    LeftInEditor,
}

/// Drives one adapter against one surface.
pub struct PublishMachine {
    target: TargetRef,
    adapter: Arc<AdapterSpec>,
    surface: Arc<dyn Surface>,
    media: MediaPipeline,
    log: OperationLog,
    state: PublishState,
    step_started: Instant,
    on_transition: Option<TransitionCallback>,
}

impl PublishMachine {
    pub fn new(
        target: TargetRef,
        adapter: Arc<AdapterSpec>,
        surface: Arc<dyn Surface>,
        media: MediaPipeline,
    ) -> Self {
        let log = OperationLog::new(target.to_string());
        Self {
            target,
            adapter,
            surface,
            media,
            log,
            state: PublishState::Init,
            step_started: Instant::now(),
            on_transition: None,
        }
    }

    pub fn with_transition_callback(mut self, callback: TransitionCallback) -> Self {
        self.on_transition = Some(callback);
        self
    }

    pub fn state(&self) -> PublishState {
        self.state
    }

    /// Run the lifecycle to a terminal state.
    pub async fn run(mut self, content: &PublishContent, auto_publish: bool) -> PublishOutcome {
        self.log.info_with(
            format!("Starting publish to {}", self.target),
            json!({
                "adapter": self.adapter.id,
                "surface": self.surface.id(),
                "autoPublish": auto_publish,
            }),
        );

        match self.execute(content, auto_publish).await {
            Ok(result) => {
                self.enter(PublishState::Done);
                self.log.info_with("Publish finished", result.clone());
                metrics::TARGET_OUTCOMES
                    .with_label_values(&["success", "none"])
                    .inc();
                PublishOutcome::success(result, self.log.into_entries())
            }
            Err(failure) => {
                let last_step = self.state;
                self.log.push(
                    crate::oplog::LogLevel::Error,
                    format!("{} during {}: {}", failure.reason, last_step, failure.message),
                    Some(json!({ "step": last_step.as_str(), "reason": failure.reason })),
                );
                self.enter(PublishState::Failed);
                metrics::TARGET_OUTCOMES
                    .with_label_values(&["failure", failure.reason.as_str()])
                    .inc();
                PublishOutcome::failure(failure.reason, failure.message, self.log.into_entries())
            }
        }
    }

    async fn execute(
        &mut self,
        content: &PublishContent,
        auto_publish: bool,
    ) -> Result<Value, StepFailure> {
        self.begin(PublishState::AwaitReady)?;
        self.await_ready().await?;

        self.begin(PublishState::FillMetadata)?;
        self.fill_metadata(content).await?;

        self.begin(PublishState::UploadMedia)?;
        self.upload_media(content).await?;

        self.begin(PublishState::Submit)?;
        let submission = self.submit(auto_publish).await?;

        self.begin(PublishState::Confirm)?;
        self.confirm(submission).await
    }

    /// Record the transition, closing the previous step's timer.
    fn enter(&mut self, next: PublishState) {
        if !self.state.is_terminal() && self.state != PublishState::Init {
            metrics::STEP_DURATION
                .with_label_values(&[self.state.as_str()])
                .observe(self.step_started.elapsed().as_secs_f64());
        }
        self.log
            .debug(format!("Transition {} -> {}", self.state, next));
        self.state = next;
        self.step_started = Instant::now();
        if let Some(ref callback) = self.on_transition {
            callback(next);
        }
    }

    /// Enter a non-terminal step, refusing when the surface is already closed.
    fn begin(&mut self, next: PublishState) -> Result<(), StepFailure> {
        if self.surface.cancellation().is_cancelled() {
            return Err(StepFailure::cancelled());
        }
        self.enter(next);
        Ok(())
    }

    async fn settle(&self) -> Result<(), StepFailure> {
        let cancel = self.surface.cancellation();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StepFailure::cancelled()),
            _ = tokio::time::sleep(self.adapter.settle()) => Ok(()),
        }
    }

    async fn await_ready(&mut self) -> Result<(), StepFailure> {
        let selector = self.adapter.ready_selector.clone();
        self.log.info(format!(
            "Waiting for editor {} ({} ms)",
            selector, self.adapter.ready_timeout_ms
        ));
        wait_for_appearance(self.surface.as_ref(), &selector, self.adapter.ready_timeout())
            .await
            .map_err(|e| StepFailure::from_wait(e, FailureReason::ReadyTimeout))?;
        self.log.info("Editor ready");
        self.settle().await
    }

    async fn fill_field(
        &mut self,
        name: &str,
        field: &FieldSpec,
        value: &str,
    ) -> Result<ElementHandle, StepFailure> {
        self.log.info(format!("Filling {} ({})", name, field.selector));
        let element = wait_for_appearance(
            self.surface.as_ref(),
            &field.selector,
            self.adapter.field_timeout(),
        )
        .await
        .map_err(|e| StepFailure::from_wait(e, FailureReason::FillFailed))?;

        self.assign(&element, field, value).await?;
        self.log.info(format!("Filled {}", name));
        Ok(element)
    }

    async fn assign(
        &self,
        element: &ElementHandle,
        field: &FieldSpec,
        value: &str,
    ) -> Result<(), StepFailure> {
        let fill = |e| StepFailure::from_surface(e, FailureReason::FillFailed);
        self.surface
            .set_property(element, &field.property, Value::String(value.to_string()))
            .await
            .map_err(fill)?;
        self.surface
            .dispatch_event(element, "input")
            .await
            .map_err(fill)?;
        self.surface
            .dispatch_event(element, "change")
            .await
            .map_err(fill)
    }

    async fn fill_metadata(&mut self, content: &PublishContent) -> Result<(), StepFailure> {
        let adapter = Arc::clone(&self.adapter);

        match (&adapter.title, &content.title) {
            (Some(field), Some(title)) => {
                self.fill_field("title", field, title).await?;
            }
            (Some(_), None) => self.log.debug("No title in content; title field left empty"),
            (None, _) => {}
        }

        if let Some(field) = &adapter.body {
            let element = self
                .fill_field("body", field, content.body_for(field.use_html))
                .await?;
            self.media.registry().register(BODY_ROLE, element).await;
        }
        Ok(())
    }

    async fn upload_media(&mut self, content: &PublishContent) -> Result<(), StepFailure> {
        let adapter = Arc::clone(&self.adapter);
        match &adapter.media {
            MediaStrategy::None => {
                if !content.media.is_empty() {
                    self.log.info(format!(
                        "Adapter takes no media; {} file(s) ignored",
                        content.media.len()
                    ));
                }
                Ok(())
            }
            MediaStrategy::FileInput { selector, accept } => {
                let files: Vec<FileDescriptor> = content
                    .media
                    .iter()
                    .filter(|d| accept.is_empty() || accept.iter().any(|a| d.mime_type.starts_with(a.as_str())))
                    .cloned()
                    .collect();
                if files.is_empty() {
                    self.log.debug("No acceptable media for upload input");
                    return Ok(());
                }

                self.log
                    .info(format!("Staging {} file(s) into {}", files.len(), selector));
                let report = self
                    .media
                    .stage_into_selector(&files, selector, adapter.field_timeout(), &mut self.log)
                    .await
                    .map_err(media_failure)?;

                if report.staged.is_empty() {
                    return Err(StepFailure::new(
                        FailureReason::MediaUploadFailed,
                        format!("none of {} file(s) could be staged", files.len()),
                    ));
                }
                self.log.info(format!(
                    "Staged {} file(s), skipped {}",
                    report.staged.len(),
                    report.skipped.len()
                ));
                Ok(())
            }
            MediaStrategy::InlineRewrite {
                endpoint,
                form_field,
                url_pointer,
                extra_fields,
            } => {
                let Some(field) = adapter.body.as_ref() else {
                    return Ok(());
                };
                let uploader = PageUploader::new(
                    Arc::clone(&self.surface),
                    endpoint.clone(),
                    form_field.clone(),
                    url_pointer.clone(),
                )
                .with_extra_fields(extra_fields.clone());

                let html = content.body_for(true);
                let report = self
                    .media
                    .rewrite_embedded_media(html, &content.media, &uploader, &mut self.log)
                    .await
                    .map_err(media_failure)?;

                if report.replaced.is_empty() {
                    if !report.failed.is_empty() {
                        return Err(StepFailure::new(
                            FailureReason::MediaUploadFailed,
                            format!("none of {} embedded asset(s) could be uploaded", report.failed.len()),
                        ));
                    }
                    return Ok(());
                }

                let element = match self.media.registry().latest(BODY_ROLE).await {
                    Some(element) => element,
                    None => wait_for_appearance(
                        self.surface.as_ref(),
                        &field.selector,
                        adapter.field_timeout(),
                    )
                    .await
                    .map_err(|e| StepFailure::from_wait(e, FailureReason::MediaUploadFailed))?,
                };
                self.assign(&element, field, &report.html)
                    .await
                    .map_err(|f| match f.reason {
                        FailureReason::Cancelled => f,
                        _ => StepFailure::new(FailureReason::MediaUploadFailed, f.message),
                    })?;
                self.log.info(format!(
                    "Body updated with {} hosted asset(s)",
                    report.replaced.len()
                ));
                Ok(())
            }
        }
    }

    async fn locate(&mut self, action: &ActionLocator) -> Result<ElementHandle, StepFailure> {
        match action {
            ActionLocator::Selector { selector } => wait_for_appearance(
                self.surface.as_ref(),
                selector,
                self.adapter.field_timeout(),
            )
            .await
            .map_err(|e| StepFailure::from_wait(e, FailureReason::SubmitFailed)),
            ActionLocator::Text {
                selector,
                text,
                attempts,
                interval_ms,
            } => wait_for_text_match(
                self.surface.as_ref(),
                selector,
                text,
                *attempts,
                std::time::Duration::from_millis(*interval_ms),
            )
            .await
            .map_err(|e| StepFailure::from_wait(e, FailureReason::SubmitFailed))?
            .ok_or_else(|| {
                StepFailure::new(
                    FailureReason::SubmitFailed,
                    format!("no {} containing \"{}\"", selector, text),
                )
            }),
        }
    }

    async fn submit(&mut self, auto_publish: bool) -> Result<Submission, StepFailure> {
        let adapter = Arc::clone(&self.adapter);
        let (action, submission) = if auto_publish {
            (Some(&adapter.publish_action), Submission::Published)
        } else {
            (adapter.draft_action.as_ref(), Submission::DraftSaved)
        };

        let Some(action) = action else {
            self.log
                .info("Draft requested and adapter has no draft action; leaving filled editor as draft");
            return Ok(Submission::LeftInEditor);
        };

        let element = self.locate(action).await?;
        self.log.info(match submission {
            Submission::Published => "Clicking publish action",
            _ => "Clicking draft action",
        });
        self.surface
            .click(&element)
            .await
            .map_err(|e| StepFailure::from_surface(e, FailureReason::SubmitFailed))?;
        self.log.info("Action clicked");
        Ok(submission)
    }

    async fn confirm(&mut self, submission: Submission) -> Result<Value, StepFailure> {
        let adapter = Arc::clone(&self.adapter);
        let signal = match submission {
            Submission::Published => Some(&adapter.success),
            Submission::DraftSaved => adapter.draft_success.as_ref(),
            Submission::LeftInEditor => {
                return Ok(json!({
                    "published": false,
                    "draft": "editor",
                    "verified": false,
                }));
            }
        };

        let mut result = match signal {
            Some(signal) => self.await_signal(signal).await?,
            None => {
                self.log.warn("Draft saved without a draft success signal; unverified");
                json!({ "verified": false })
            }
        };

        if let Value::Object(ref mut map) = result {
            map.insert(
                "published".to_string(),
                Value::Bool(submission == Submission::Published),
            );
            if submission == Submission::DraftSaved {
                map.insert("draft".to_string(), Value::String("saved".to_string()));
            }
        }
        Ok(result)
    }

    async fn await_signal(&mut self, signal: &SuccessSignal) -> Result<Value, StepFailure> {
        let timeout = self.adapter.confirm_timeout();
        match signal {
            SuccessSignal::Selector {
                selector,
                result_attribute,
            } => {
                self.log.info(format!("Waiting for success element {}", selector));
                let element = wait_for_appearance(self.surface.as_ref(), selector, timeout)
                    .await
                    .map_err(|e| StepFailure::from_wait(e, FailureReason::ConfirmTimeout))?;

                let mut result = json!({ "verified": true, "signal": "selector" });
                if let Some(attribute) = result_attribute {
                    let value = self
                        .surface
                        .attribute(&element, attribute)
                        .await
                        .map_err(|e| StepFailure::from_surface(e, FailureReason::ConfirmTimeout))?;
                    result["value"] = value.map(Value::String).unwrap_or(Value::Null);
                }
                self.log.info("Success element found");
                Ok(result)
            }
            SuccessSignal::Text { selector, text } => {
                let interval = self.adapter.poll_interval();
                let attempts = (self.adapter.confirm_timeout_ms / self.adapter.poll_interval_ms)
                    .clamp(1, u32::MAX as u64) as u32;
                self.log.info(format!(
                    "Waiting for \"{}\" in {} ({} attempts)",
                    text, selector, attempts
                ));
                let element =
                    wait_for_text_match(self.surface.as_ref(), selector, text, attempts, interval)
                        .await
                        .map_err(|e| StepFailure::from_wait(e, FailureReason::ConfirmTimeout))?
                        .ok_or_else(|| {
                            StepFailure::new(
                                FailureReason::ConfirmTimeout,
                                format!("\"{}\" never appeared in {}", text, selector),
                            )
                        })?;
                let matched = self
                    .surface
                    .text(&element)
                    .await
                    .unwrap_or_else(|_| text.clone());
                self.log.info("Success text found");
                Ok(json!({ "verified": true, "signal": "text", "text": matched }))
            }
            SuccessSignal::Navigation { url_contains } => {
                self.log
                    .info(format!("Waiting for navigation to *{}*", url_contains));
                let url = self.await_navigation(url_contains, timeout).await?;
                self.log.info(format!("Navigated to {}", url));
                Ok(json!({ "verified": true, "signal": "navigation", "url": url }))
            }
            SuccessSignal::Unverified => {
                self.log
                    .warn("Adapter declares no success signal; reporting unverified success");
                Ok(json!({ "verified": false }))
            }
        }
    }

    async fn await_navigation(
        &self,
        url_contains: &str,
        timeout: std::time::Duration,
    ) -> Result<String, StepFailure> {
        let cancel = self.surface.cancellation();
        let deadline = Instant::now() + timeout;
        loop {
            let url = self
                .surface
                .current_url()
                .await
                .map_err(|e| StepFailure::from_surface(e, FailureReason::ConfirmTimeout))?;
            if url.contains(url_contains) {
                return Ok(url);
            }
            if Instant::now() >= deadline {
                return Err(StepFailure::new(
                    FailureReason::ConfirmTimeout,
                    format!("still at {} after {} ms", url, timeout.as_millis()),
                ));
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StepFailure::cancelled()),
                _ = tokio::time::sleep(self.adapter.poll_interval()) => {}
            }
        }
    }
}

fn media_failure(err: MediaError) -> StepFailure {
    match err {
        MediaError::Surface(SurfaceError::Closed) => StepFailure::cancelled(),
        other => StepFailure::new(FailureReason::MediaUploadFailed, other),
    }
}
