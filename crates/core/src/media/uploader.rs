//! Hosting of assets referenced from rich-text bodies.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::surface::{NativeFile, PageUpload, Surface, SurfaceError};

/// Errors from uploading one asset.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UploadError {
    /// The response did not contain a hosted URL.
    #[error("no URL at {pointer} in upload response")]
    MissingUrl { pointer: String },

    /// The upload itself was rejected.
    #[error("upload rejected: {0}")]
    Rejected(String),

    /// The surface failed while uploading.
    #[error("surface error: {0}")]
    Surface(#[from] SurfaceError),
}

/// Uploads a file to the target platform and returns the hosted URL.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, file: NativeFile) -> Result<String, UploadError>;
}

/// Uploader that POSTs from inside the target page, reusing its session.
pub struct PageUploader {
    surface: Arc<dyn Surface>,
    endpoint: String,
    form_field: String,
    url_pointer: String,
    extra_fields: BTreeMap<String, String>,
}

impl PageUploader {
    pub fn new(
        surface: Arc<dyn Surface>,
        endpoint: impl Into<String>,
        form_field: impl Into<String>,
        url_pointer: impl Into<String>,
    ) -> Self {
        Self {
            surface,
            endpoint: endpoint.into(),
            form_field: form_field.into(),
            url_pointer: url_pointer.into(),
            extra_fields: BTreeMap::new(),
        }
    }

    pub fn with_extra_fields(mut self, fields: BTreeMap<String, String>) -> Self {
        self.extra_fields = fields;
        self
    }
}

#[async_trait]
impl MediaUploader for PageUploader {
    async fn upload(&self, file: NativeFile) -> Result<String, UploadError> {
        let response = self
            .surface
            .upload(PageUpload {
                endpoint: self.endpoint.clone(),
                form_field: self.form_field.clone(),
                file,
                extra_fields: self.extra_fields.clone(),
            })
            .await?;

        response
            .pointer(&self.url_pointer)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| UploadError::MissingUrl {
                pointer: self.url_pointer.clone(),
            })
    }
}
