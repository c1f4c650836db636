use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use super::gate::{extract_host, is_authorized, pattern_matches};
use super::prompt::{PendingPrompt, TrustPrompt};
use super::store::TrustStore;
use super::types::{
    TrustDecision, TrustError, TrustRequestResult, TrustRequestStatus, TrustedDomainEntry,
};
use crate::metrics;

/// Trust management: the gate plus the operations that edit the trusted set.
pub struct TrustService {
    store: Arc<dyn TrustStore>,
    prompt: Arc<dyn TrustPrompt>,
    /// Serializes mutations so concurrent edits do not drop each other.
    writer: Mutex<()>,
}

impl TrustService {
    pub fn new(store: Arc<dyn TrustStore>, prompt: Arc<dyn TrustPrompt>) -> Self {
        Self {
            store,
            prompt,
            writer: Mutex::new(()),
        }
    }

    pub fn prompt_mode(&self) -> &'static str {
        self.prompt.mode_name()
    }

    /// Run the gate against the current trusted set.
    pub async fn authorize(
        &self,
        origin: Option<&str>,
        action: &str,
    ) -> Result<TrustDecision, TrustError> {
        let entries = self.store.list().await?;
        let decision = is_authorized(origin, action, &entries);
        metrics::TRUST_DECISIONS
            .with_label_values(&[decision.label()])
            .inc();
        if let TrustDecision::Denied { ref reason, .. } = decision {
            warn!(action, origin = origin.unwrap_or("-"), "Trust gate denied request: {}", reason);
        }
        Ok(decision)
    }

    pub async fn list(&self) -> Result<Vec<TrustedDomainEntry>, TrustError> {
        self.store.list().await
    }

    pub async fn delete(&self, id: &str) -> Result<TrustedDomainEntry, TrustError> {
        let _guard = self.writer.lock().await;
        let removed = self.store.remove(id).await?;
        info!(id, pattern = %removed.domain_pattern, "Trusted domain removed");
        Ok(removed)
    }

    /// Ask for `origin` to be trusted, resolving through the prompt.
    ///
    /// The writer lock is not held while the prompt waits, so an operator
    /// prompt does not block other edits.
    pub async fn request_trust(&self, origin: &str) -> Result<TrustRequestResult, TrustError> {
        let host = extract_host(origin)
            .ok_or_else(|| TrustError::InvalidPattern(format!("no host in origin {:?}", origin)))?;

        if self.is_trusted(&host).await? {
            return Ok(TrustRequestResult {
                trusted: true,
                status: TrustRequestStatus::AlreadyTrusted,
            });
        }

        if !self.prompt.confirm(&host).await {
            info!(host = %host, mode = self.prompt.mode_name(), "Trust request denied");
            return Ok(TrustRequestResult {
                trusted: false,
                status: TrustRequestStatus::Denied,
            });
        }

        let _guard = self.writer.lock().await;
        // Granted by a concurrent request while the prompt was open.
        if self.is_trusted(&host).await? {
            return Ok(TrustRequestResult {
                trusted: true,
                status: TrustRequestStatus::AlreadyTrusted,
            });
        }
        let entry = self.store.add(&host).await?;
        info!(host = %host, id = %entry.id, "Trust granted");
        Ok(TrustRequestResult {
            trusted: true,
            status: TrustRequestStatus::Granted,
        })
    }

    async fn is_trusted(&self, host: &str) -> Result<bool, TrustError> {
        let entries = self.store.list().await?;
        Ok(entries.iter().any(|e| pattern_matches(&e.domain_pattern, host)))
    }

    /// Trust requests waiting for an operator.
    pub fn pending_prompts(&self) -> Vec<PendingPrompt> {
        self.prompt.pending()
    }

    pub fn resolve_prompt(&self, id: &str, grant: bool) -> Result<PendingPrompt, TrustError> {
        self.prompt.resolve(id, grant)
    }

    pub fn subscribe_prompts(&self) -> Option<broadcast::Receiver<PendingPrompt>> {
        self.prompt.subscribe()
    }
}
