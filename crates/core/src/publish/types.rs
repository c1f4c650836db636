//! Types for the publish module.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::media::FileDescriptor;
use crate::oplog::LogEntry;

/// The normalized content item published to every target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Plain-text body.
    #[serde(default)]
    pub body: String,
    /// HTML rendition of the body, used by rich-text editors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    #[serde(default)]
    pub media: Vec<FileDescriptor>,
    /// Free-form per-job options.
    #[serde(default)]
    pub options: HashMap<String, Value>,
}

impl PublishContent {
    /// Body text for a field, preferring HTML when the field takes markup.
    pub fn body_for(&self, use_html: bool) -> &str {
        if use_html {
            self.html_body.as_deref().unwrap_or(&self.body)
        } else {
            &self.body
        }
    }
}

/// One platform selected as a publish destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    /// Kind of content the platform publishes (e.g. "article", "video").
    pub target_kind: String,
    /// Editor URL the surface is opened on.
    pub inject_url: String,
    /// Adapter driving the editor.
    pub adapter_id: String,
}

impl TargetRef {
    pub fn new(target_kind: &str, inject_url: &str, adapter_id: &str) -> Self {
        Self {
            target_kind: target_kind.to_string(),
            inject_url: inject_url.to_string(),
            adapter_id: adapter_id.to_string(),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.adapter_id, self.inject_url)
    }
}

/// States of the per-target publish lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    Init,
    AwaitReady,
    FillMetadata,
    UploadMedia,
    Submit,
    Confirm,
    Done,
    Failed,
}

impl PublishState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishState::Init => "init",
            PublishState::AwaitReady => "await_ready",
            PublishState::FillMetadata => "fill_metadata",
            PublishState::UploadMedia => "upload_media",
            PublishState::Submit => "submit",
            PublishState::Confirm => "confirm",
            PublishState::Done => "done",
            PublishState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PublishState::Done | PublishState::Failed)
    }
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a target ended in `Failed`. Each reason maps to a stable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    ReadyTimeout,
    MediaUploadFailed,
    ConfirmTimeout,
    SurfaceOpenFailed,
    FillFailed,
    SubmitFailed,
    Cancelled,
    AdapterNotFound,
}

impl FailureReason {
    pub fn code(&self) -> u16 {
        match self {
            FailureReason::ReadyTimeout => 1001,
            FailureReason::MediaUploadFailed => 1002,
            FailureReason::ConfirmTimeout => 1003,
            FailureReason::SurfaceOpenFailed => 1004,
            FailureReason::FillFailed => 1005,
            FailureReason::SubmitFailed => 1006,
            FailureReason::Cancelled => 1007,
            FailureReason::AdapterNotFound => 1008,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::ReadyTimeout => "ReadyTimeout",
            FailureReason::MediaUploadFailed => "MediaUploadFailed",
            FailureReason::ConfirmTimeout => "ConfirmTimeout",
            FailureReason::SurfaceOpenFailed => "SurfaceOpenFailed",
            FailureReason::FillFailed => "FillFailed",
            FailureReason::SubmitFailed => "SubmitFailed",
            FailureReason::Cancelled => "Cancelled",
            FailureReason::AdapterNotFound => "AdapterNotFound",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Success,
    Failure,
}

/// Terminal result of one publish run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub status: TargetStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<u16>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
}

impl PublishOutcome {
    pub fn success(result_data: Value, log: Vec<LogEntry>) -> Self {
        Self {
            status: TargetStatus::Success,
            result_data: Some(result_data),
            error_message: None,
            failure_reason: None,
            failure_code: None,
            log,
        }
    }

    pub fn failure(reason: FailureReason, message: impl Into<String>, log: Vec<LogEntry>) -> Self {
        Self {
            status: TargetStatus::Failure,
            result_data: None,
            error_message: Some(message.into()),
            failure_reason: Some(reason),
            failure_code: Some(reason.code()),
            log,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TargetStatus::Success
    }
}
