//! Mock media uploader for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::media::{MediaUploader, UploadError};
use crate::surface::NativeFile;

/// Mock implementation of the MediaUploader trait.
///
/// Hosts every file at `https://cdn.test/<name>` unless a failure was
/// configured for its name.
#[derive(Debug, Clone, Default)]
pub struct MockUploader {
    failures: Arc<RwLock<HashMap<String, UploadError>>>,
    uploaded: Arc<RwLock<Vec<String>>>,
}

impl MockUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the upload of `file_name` fail with `error`.
    pub async fn fail(&self, file_name: &str, error: UploadError) {
        self.failures
            .write()
            .await
            .insert(file_name.to_string(), error);
    }

    /// Names of successfully uploaded files, in order.
    pub async fn recorded_uploads(&self) -> Vec<String> {
        self.uploaded.read().await.clone()
    }
}

#[async_trait]
impl MediaUploader for MockUploader {
    async fn upload(&self, file: NativeFile) -> Result<String, UploadError> {
        if let Some(error) = self.failures.read().await.get(&file.name) {
            return Err(error.clone());
        }
        self.uploaded.write().await.push(file.name.clone());
        Ok(format!("https://cdn.test/{}", file.name))
    }
}
