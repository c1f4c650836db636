//! Media pipeline shared by adapters that push binary assets into a foreign
//! form.
//!
//! Two strategies are supported:
//! - Staging: files are fetched, assigned to an `<input type="file">` in one
//!   batch and announced with a single `change` event.
//! - Inline rewrite: `img/video/audio/source` references inside an HTML body
//!   are uploaded one by one and replaced with the hosted URL.
//!
//! Individual asset failures are logged and skipped; only surface-level
//! failures abort the step.

mod config;
mod fetcher;
mod pipeline;
mod rewrite;
mod types;
mod uploader;

pub use config::MediaConfig;
pub use fetcher::{decode_data_url, FetchError, FileFetcher, HttpFileFetcher};
pub use pipeline::{MediaPipeline, FILE_INPUT_ROLE};
pub use rewrite::{collect_media_sources, rewrite_media_source};
pub use types::{
    FileDescriptor, MediaError, MediaProgress, RewriteReport, SkippedAsset, StageReport,
};
pub use uploader::{MediaUploader, PageUploader, UploadError};
