//! Persistence of the trusted-domain set.
//!
//! The set is always replaced as a whole, never edited in place, so readers
//! see either the old or the new set.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::gate::validate_pattern;
use super::types::{TrustError, TrustedDomainEntry};

#[async_trait]
pub trait TrustStore: Send + Sync {
    /// Current trusted-domain set.
    async fn list(&self) -> Result<Vec<TrustedDomainEntry>, TrustError>;

    /// Replace and persist the whole set.
    async fn replace(&self, entries: Vec<TrustedDomainEntry>) -> Result<(), TrustError>;

    /// Add a pattern unless it is already present. Returns the stored entry.
    async fn add(&self, domain_pattern: &str) -> Result<TrustedDomainEntry, TrustError> {
        validate_pattern(domain_pattern)?;
        let mut entries = self.list().await?;
        if let Some(existing) = entries.iter().find(|e| e.domain_pattern == domain_pattern) {
            return Ok(existing.clone());
        }
        let entry = TrustedDomainEntry::new(domain_pattern);
        entries.push(entry.clone());
        self.replace(entries).await?;
        Ok(entry)
    }

    /// Remove an entry by id. Returns the removed entry.
    async fn remove(&self, id: &str) -> Result<TrustedDomainEntry, TrustError> {
        let mut entries = self.list().await?;
        let idx = entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| TrustError::NotFound(id.to_string()))?;
        let removed = entries.remove(idx);
        self.replace(entries).await?;
        Ok(removed)
    }
}

/// Trust store backed by a JSON file.
pub struct JsonFileTrustStore {
    path: PathBuf,
    entries: RwLock<Vec<TrustedDomainEntry>>,
}

impl JsonFileTrustStore {
    /// Open the store, loading the file when it exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TrustError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                TrustError::Storage(format!("Failed to parse {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Trust store file missing, starting empty");
                Vec::new()
            }
            Err(e) => {
                return Err(TrustError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        info!(path = %path.display(), count = entries.len(), "Trust store loaded");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &[TrustedDomainEntry]) -> Result<(), TrustError> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| TrustError::Storage(format!("Failed to serialize: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TrustError::Storage(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| TrustError::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| TrustError::Storage(format!("Failed to replace {}: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl TrustStore for JsonFileTrustStore {
    async fn list(&self) -> Result<Vec<TrustedDomainEntry>, TrustError> {
        Ok(self.entries.read().await.clone())
    }

    async fn replace(&self, entries: Vec<TrustedDomainEntry>) -> Result<(), TrustError> {
        // Hold the write lock across the write so file and memory agree.
        let mut current = self.entries.write().await;
        self.persist(&entries).await?;
        debug!(count = entries.len(), "Trust store replaced");
        *current = entries;
        Ok(())
    }
}

/// In-memory trust store for tests.
#[derive(Debug, Default)]
pub struct MemoryTrustStore {
    entries: RwLock<Vec<TrustedDomainEntry>>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patterns(patterns: &[&str]) -> Self {
        Self {
            entries: RwLock::new(patterns.iter().map(|p| TrustedDomainEntry::new(p)).collect()),
        }
    }
}

#[async_trait]
impl TrustStore for MemoryTrustStore {
    async fn list(&self) -> Result<Vec<TrustedDomainEntry>, TrustError> {
        Ok(self.entries.read().await.clone())
    }

    async fn replace(&self, entries: Vec<TrustedDomainEntry>) -> Result<(), TrustError> {
        *self.entries.write().await = entries;
        Ok(())
    }
}
