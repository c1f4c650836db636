//! Media pipeline: staging files into upload inputs and rewriting embedded
//! references in rich-text bodies.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use super::config::MediaConfig;
use super::fetcher::{FetchError, FileFetcher};
use super::rewrite::{collect_media_sources, rewrite_media_source};
use super::types::{
    FileDescriptor, MediaError, MediaProgress, RewriteReport, SkippedAsset, StageReport,
};
use super::uploader::{MediaUploader, UploadError};
use crate::metrics;
use crate::oplog::OperationLog;
use crate::retry::retry;
use crate::surface::{ElementHandle, ElementRegistry, NativeFile, Surface, SurfaceError};
use crate::sync::{wait_for_appearance, WaitError};

/// Registry role under which upload inputs are recorded.
pub const FILE_INPUT_ROLE: &str = "file_input";

/// Media pipeline bound to one surface.
pub struct MediaPipeline {
    surface: Arc<dyn Surface>,
    fetcher: Arc<dyn FileFetcher>,
    config: MediaConfig,
    registry: ElementRegistry,
    progress_tx: Option<mpsc::UnboundedSender<MediaProgress>>,
}

impl MediaPipeline {
    pub fn new(
        surface: Arc<dyn Surface>,
        fetcher: Arc<dyn FileFetcher>,
        config: MediaConfig,
        registry: ElementRegistry,
    ) -> Self {
        Self {
            surface,
            fetcher,
            config,
            registry,
            progress_tx: None,
        }
    }

    /// Send a progress update after each asset.
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<MediaProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn registry(&self) -> &ElementRegistry {
        &self.registry
    }

    fn emit(&self, progress: MediaProgress) {
        if let Some(ref tx) = self.progress_tx {
            let _ = tx.send(progress);
        }
    }

    async fn fetch(&self, descriptor: &FileDescriptor) -> Result<NativeFile, FetchError> {
        retry(
            || self.fetcher.fetch(descriptor),
            self.config.fetch_attempts,
            self.config.fetch_retry_delay(),
        )
        .await
    }

    /// Locate the upload input for `selector` and stage files into it.
    ///
    /// Inputs created by the page after load are picked up through the
    /// registry: the newest unseen match wins over the first match.
    pub async fn stage_into_selector(
        &self,
        descriptors: &[FileDescriptor],
        selector: &str,
        timeout: Duration,
        log: &mut OperationLog,
    ) -> Result<StageReport, MediaError> {
        if descriptors.is_empty() {
            log.debug("No files to stage");
            return Ok(StageReport::default());
        }

        let first = match wait_for_appearance(self.surface.as_ref(), selector, timeout).await {
            Ok(handle) => handle,
            Err(WaitError::NotFound { .. }) => {
                return Err(MediaError::InputNotFound(selector.to_string()))
            }
            Err(WaitError::Cancelled) => return Err(MediaError::Surface(SurfaceError::Closed)),
            Err(WaitError::Surface(e)) => return Err(MediaError::Surface(e)),
        };

        let fresh = self
            .registry
            .collect_new(self.surface.as_ref(), FILE_INPUT_ROLE, selector)
            .await?;
        let input = fresh.last().cloned().unwrap_or(first);

        self.stage_files(descriptors, &input, log).await
    }

    /// Fetch every descriptor and assign the survivors to `input` at once.
    ///
    /// A descriptor that cannot be fetched is logged and skipped. The input
    /// is disabled for the processing window, re-enabled, and receives one
    /// `change` event. With nothing to assign the input is left untouched.
    pub async fn stage_files(
        &self,
        descriptors: &[FileDescriptor],
        input: &ElementHandle,
        log: &mut OperationLog,
    ) -> Result<StageReport, MediaError> {
        let mut report = StageReport::default();
        if descriptors.is_empty() {
            log.debug("No files to stage");
            return Ok(report);
        }

        self.registry.register(FILE_INPUT_ROLE, input.clone()).await;

        let total = descriptors.len();
        let mut files = Vec::with_capacity(total);
        for (index, descriptor) in descriptors.iter().enumerate() {
            let skipped = match self.fetch(descriptor).await {
                Ok(file) => {
                    debug!(name = %file.name, size = file.size(), "Fetched asset");
                    report.staged.push(file.name.clone());
                    files.push(file);
                    false
                }
                Err(e) => {
                    log.warn_with(
                        format!("Skipped {}: {}", descriptor.name, e),
                        json!({ "file": descriptor.name, "skipped": true, "error": e.to_string() }),
                    );
                    metrics::MEDIA_ASSETS.with_label_values(&["skipped"]).inc();
                    report.skipped.push(SkippedAsset {
                        name: descriptor.name.clone(),
                        reason: e.to_string(),
                    });
                    true
                }
            };
            self.emit(MediaProgress::Staging {
                index: index + 1,
                total,
                file_name: descriptor.name.clone(),
                skipped,
            });
        }

        if files.is_empty() {
            log.warn("No files could be fetched; upload input left untouched");
            return Ok(report);
        }

        let count = files.len();
        log.info(format!("Assigning {} file(s) to upload input", count));
        self.surface
            .set_files(input, files)
            .await
            .map_err(|e| match e {
                SurfaceError::Closed => MediaError::Surface(SurfaceError::Closed),
                SurfaceError::StaleElement(id) => MediaError::InputNotFound(id),
                other => MediaError::AssignmentRejected(other.to_string()),
            })?;
        metrics::MEDIA_ASSETS
            .with_label_values(&["staged"])
            .inc_by(count as u64);

        self.surface
            .set_property(input, "disabled", Value::Bool(true))
            .await?;
        let cancel = self.surface.cancellation();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MediaError::Surface(SurfaceError::Closed)),
            _ = tokio::time::sleep(self.config.processing_window()) => {}
        }
        self.surface
            .set_property(input, "disabled", Value::Bool(false))
            .await?;
        self.surface.dispatch_event(input, "change").await?;
        log.info_with(
            "Upload input notified",
            json!({ "staged": report.staged, "skipped": report.skipped.len() }),
        );

        Ok(report)
    }

    /// Upload every embedded media reference that matches a descriptor and
    /// rewrite it to the hosted URL.
    ///
    /// Assets are handled one at a time. Unmatched references and failed
    /// uploads leave the original reference in place.
    pub async fn rewrite_embedded_media(
        &self,
        html: &str,
        descriptors: &[FileDescriptor],
        uploader: &dyn MediaUploader,
        log: &mut OperationLog,
    ) -> Result<RewriteReport, MediaError> {
        let sources = collect_media_sources(html);
        let mut report = RewriteReport {
            html: html.to_string(),
            ..Default::default()
        };
        if sources.is_empty() {
            log.debug("No embedded media to rewrite");
            return Ok(report);
        }

        let total = sources.len();
        log.info(format!("Rewriting {} embedded media reference(s)", total));

        for (index, source) in sources.iter().enumerate() {
            let mut replaced = false;
            match descriptors.iter().find(|d| d.matches_source(source)) {
                None => {
                    log.info(format!("No descriptor for {}; left as is", source));
                    metrics::MEDIA_ASSETS.with_label_values(&["unmatched"]).inc();
                    report.unmatched.push(source.clone());
                }
                Some(descriptor) => match self.fetch(descriptor).await {
                    Err(e) => {
                        log.warn_with(
                            format!("Failed to fetch {}: {}", descriptor.name, e),
                            json!({ "source": source, "error": e.to_string() }),
                        );
                        metrics::MEDIA_ASSETS.with_label_values(&["failed"]).inc();
                        report.failed.push(SkippedAsset {
                            name: descriptor.name.clone(),
                            reason: e.to_string(),
                        });
                    }
                    Ok(file) => match uploader.upload(file).await {
                        Ok(hosted) => {
                            let (html, hits) =
                                rewrite_media_source(&report.html, source, &hosted);
                            if hits == 0 {
                                log.warn_with(
                                    format!(
                                        "Uploaded {} but found no element to rewrite",
                                        descriptor.name
                                    ),
                                    json!({ "source": source, "url": hosted }),
                                );
                                metrics::MEDIA_ASSETS.with_label_values(&["failed"]).inc();
                                report.failed.push(SkippedAsset {
                                    name: descriptor.name.clone(),
                                    reason: format!("no media element references {}", source),
                                });
                            } else {
                                report.html = html;
                                log.info_with(
                                    format!("Uploaded {}", descriptor.name),
                                    json!({ "source": source, "url": hosted, "elements": hits }),
                                );
                                metrics::MEDIA_ASSETS.with_label_values(&["uploaded"]).inc();
                                report.replaced.push((source.clone(), hosted));
                                replaced = true;
                            }
                        }
                        Err(UploadError::Surface(SurfaceError::Closed)) => {
                            return Err(MediaError::Surface(SurfaceError::Closed));
                        }
                        Err(e) => {
                            log.warn_with(
                                format!("Failed to upload {}: {}", descriptor.name, e),
                                json!({ "source": source, "error": e.to_string() }),
                            );
                            metrics::MEDIA_ASSETS.with_label_values(&["failed"]).inc();
                            report.failed.push(SkippedAsset {
                                name: descriptor.name.clone(),
                                reason: e.to_string(),
                            });
                        }
                    },
                },
            }
            self.emit(MediaProgress::Rewriting {
                index: index + 1,
                total,
                source: source.clone(),
                replaced,
            });
        }

        Ok(report)
    }
}
