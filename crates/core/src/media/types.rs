//! Types for the media module.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::surface::SurfaceError;

/// Reference to a binary asset that has not been materialized yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// File name handed to the foreign UI.
    pub name: String,
    /// MIME type (e.g. "image/png").
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// Declared size in bytes, if known.
    #[serde(default)]
    pub size: u64,
    /// Where the bytes live: `http(s)://`, `data:` or `file://` URL.
    pub content_ref: String,
}

fn default_mime_type() -> String {
    "application/octet-stream".to_string()
}

impl FileDescriptor {
    pub fn new(name: &str, mime_type: &str, content_ref: &str) -> Self {
        Self {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size: 0,
            content_ref: content_ref.to_string(),
        }
    }

    /// Whether this descriptor is the one an embedded `src` refers to.
    pub fn matches_source(&self, src: &str) -> bool {
        self.content_ref == src || self.name == src
    }
}

/// Progress update emitted while the pipeline walks its assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MediaProgress {
    /// A file destined for an upload input was fetched or skipped.
    Staging {
        index: usize,
        total: usize,
        file_name: String,
        skipped: bool,
    },
    /// An embedded reference was uploaded or left as is.
    Rewriting {
        index: usize,
        total: usize,
        source: String,
        replaced: bool,
    },
}

/// An asset the pipeline could not process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedAsset {
    pub name: String,
    pub reason: String,
}

/// Result of staging files into an upload input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    /// Names of the files assigned to the input, in order.
    pub staged: Vec<String>,
    /// Files that were skipped.
    pub skipped: Vec<SkippedAsset>,
}

/// Result of rewriting embedded media references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewriteReport {
    /// Rewritten HTML.
    pub html: String,
    /// Original source to hosted URL, in document order.
    pub replaced: Vec<(String, String)>,
    /// References left untouched because no descriptor matched.
    pub unmatched: Vec<String>,
    /// Matched references whose fetch, upload or rewrite failed.
    pub failed: Vec<SkippedAsset>,
}

/// Errors that abort the media step of a target.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MediaError {
    /// The upload input could not be found.
    #[error("upload input not found: {0}")]
    InputNotFound(String),

    /// The surface rejected the file assignment.
    #[error("file assignment rejected: {0}")]
    AssignmentRejected(String),

    /// The surface failed underneath the pipeline.
    #[error("surface error: {0}")]
    Surface(#[from] SurfaceError),
}
