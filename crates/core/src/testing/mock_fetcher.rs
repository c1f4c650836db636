//! Mock file fetcher for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::media::{FetchError, FileDescriptor, FileFetcher};
use crate::surface::NativeFile;

/// Mock implementation of the FileFetcher trait.
///
/// Every descriptor resolves to bytes derived from its name unless a failure
/// or explicit payload was configured for its `content_ref`.
///
/// # Example
///
/// ```rust,ignore
/// use multipost_core::testing::MockFetcher;
///
/// let fetcher = MockFetcher::new();
/// fetcher.fail("https://x/broken.png").await;
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    payloads: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    failures: Arc<RwLock<HashMap<String, FetchError>>>,
    /// content_ref of every fetch attempt, in order.
    attempts: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` for `content_ref`.
    pub async fn set_payload(&self, content_ref: &str, bytes: &[u8]) {
        self.payloads
            .write()
            .await
            .insert(content_ref.to_string(), bytes.to_vec());
    }

    /// Make every fetch of `content_ref` fail.
    pub async fn fail(&self, content_ref: &str) {
        self.failures.write().await.insert(
            content_ref.to_string(),
            FetchError::Status {
                url: content_ref.to_string(),
                status: 404,
            },
        );
    }

    /// Get all recorded fetch attempts.
    pub async fn recorded_attempts(&self) -> Vec<String> {
        self.attempts.read().await.clone()
    }

    /// Number of attempts made for one reference.
    pub async fn attempt_count(&self, content_ref: &str) -> usize {
        self.attempts
            .read()
            .await
            .iter()
            .filter(|r| r.as_str() == content_ref)
            .count()
    }
}

#[async_trait]
impl FileFetcher for MockFetcher {
    async fn fetch(&self, descriptor: &FileDescriptor) -> Result<NativeFile, FetchError> {
        self.attempts
            .write()
            .await
            .push(descriptor.content_ref.clone());

        if let Some(error) = self.failures.read().await.get(&descriptor.content_ref) {
            return Err(error.clone());
        }

        let bytes = self
            .payloads
            .read()
            .await
            .get(&descriptor.content_ref)
            .cloned()
            .unwrap_or_else(|| descriptor.name.as_bytes().to_vec());

        Ok(NativeFile {
            name: descriptor.name.clone(),
            mime_type: descriptor.mime_type.clone(),
            bytes,
        })
    }
}
