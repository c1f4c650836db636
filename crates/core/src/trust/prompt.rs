use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tracing::info;

use super::gate::pattern_matches;
use super::types::TrustError;

/// Asks whether a new origin should be trusted.
#[async_trait]
pub trait TrustPrompt: Send + Sync {
    /// Resolve a request to trust `host`.
    async fn confirm(&self, host: &str) -> bool;

    /// Name of this prompt mode
    fn mode_name(&self) -> &'static str;

    /// Requests currently waiting for a decision.
    fn pending(&self) -> Vec<PendingPrompt> {
        Vec::new()
    }

    /// Answer a waiting request.
    fn resolve(&self, id: &str, _grant: bool) -> Result<PendingPrompt, TrustError> {
        Err(TrustError::PromptNotFound(id.to_string()))
    }

    /// Stream of new requests, for prompts that involve a person.
    fn subscribe(&self) -> Option<broadcast::Receiver<PendingPrompt>> {
        None
    }
}

/// A trust request shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPrompt {
    pub id: String,
    pub host: String,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Prompt that refuses every request.
/// Domains can only be trusted by editing the store.
pub struct AutoDenyPrompt;

impl AutoDenyPrompt {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AutoDenyPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrustPrompt for AutoDenyPrompt {
    async fn confirm(&self, _host: &str) -> bool {
        false
    }

    fn mode_name(&self) -> &'static str {
        "deny"
    }
}

/// Prompt granting hosts that match a configured pattern list.
pub struct AllowListPrompt {
    patterns: Vec<String>,
}

impl AllowListPrompt {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }
}

#[async_trait]
impl TrustPrompt for AllowListPrompt {
    async fn confirm(&self, host: &str) -> bool {
        self.patterns.iter().any(|p| pattern_matches(p, host))
    }

    fn mode_name(&self) -> &'static str {
        "allow_list"
    }
}

type Slots = HashMap<String, (PendingPrompt, oneshot::Sender<bool>)>;

/// Prompt that waits for an operator to grant or deny each request.
///
/// New requests are announced on a broadcast channel. A request nobody
/// answers within the timeout is denied, and its slot is removed however
/// the wait ends.
pub struct OperatorPrompt {
    timeout: Duration,
    slots: Arc<Mutex<Slots>>,
    events: broadcast::Sender<PendingPrompt>,
}

struct SlotGuard {
    slots: Arc<Mutex<Slots>>,
    id: String,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        lock(&self.slots).remove(&self.id);
    }
}

fn lock(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl OperatorPrompt {
    pub fn new(timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            timeout,
            slots: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }
}

#[async_trait]
impl TrustPrompt for OperatorPrompt {
    async fn confirm(&self, host: &str) -> bool {
        let now = Utc::now();
        let request = PendingPrompt {
            id: uuid::Uuid::new_v4().to_string(),
            host: host.to_string(),
            requested_at: now,
            expires_at: now
                + chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::MAX),
        };
        let (tx, rx) = oneshot::channel();
        lock(&self.slots).insert(request.id.clone(), (request.clone(), tx));
        let _guard = SlotGuard {
            slots: Arc::clone(&self.slots),
            id: request.id.clone(),
        };

        info!(id = %request.id, host, "Waiting for operator trust decision");
        // No subscribers just means the request will time out.
        let _ = self.events.send(request.clone());

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(grant)) => grant,
            Ok(Err(_)) => false,
            Err(_) => {
                info!(id = %request.id, host, "Trust prompt expired");
                false
            }
        }
    }

    fn mode_name(&self) -> &'static str {
        "operator"
    }

    fn pending(&self) -> Vec<PendingPrompt> {
        let mut pending: Vec<_> = lock(&self.slots)
            .values()
            .map(|(request, _)| request.clone())
            .collect();
        pending.sort_by_key(|request| request.requested_at);
        pending
    }

    fn resolve(&self, id: &str, grant: bool) -> Result<PendingPrompt, TrustError> {
        let (request, tx) = lock(&self.slots)
            .remove(id)
            .ok_or_else(|| TrustError::PromptNotFound(id.to_string()))?;
        info!(id, host = %request.host, grant, "Operator answered trust prompt");
        tx.send(grant)
            .map_err(|_| TrustError::PromptNotFound(id.to_string()))?;
        Ok(request)
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<PendingPrompt>> {
        Some(self.events.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_auto_deny() {
        let prompt = AutoDenyPrompt::new();
        assert!(!prompt.confirm("a.example").await);
        assert_eq!(prompt.mode_name(), "deny");
    }

    #[tokio::test]
    async fn test_allow_list() {
        let prompt = AllowListPrompt::new(vec!["*.multipost.app".to_string()]);
        assert!(prompt.confirm("studio.multipost.app").await);
        assert!(!prompt.confirm("multipost.app").await);
        assert!(!prompt.confirm("evil.example").await);
    }

    #[tokio::test]
    async fn test_operator_grant() {
        let prompt = Arc::new(OperatorPrompt::new(Duration::from_secs(30)));
        let mut requests = prompt.subscribe().unwrap();

        let waiting = {
            let prompt = Arc::clone(&prompt);
            tokio::spawn(async move { prompt.confirm("studio.example.com").await })
        };

        let request = requests.recv().await.unwrap();
        assert_eq!(request.host, "studio.example.com");
        assert_eq!(prompt.pending(), vec![request.clone()]);

        let answered = prompt.resolve(&request.id, true).unwrap();
        assert_eq!(answered.id, request.id);
        assert!(waiting.await.unwrap());
        assert!(prompt.pending().is_empty());
    }

    #[tokio::test]
    async fn test_operator_deny() {
        let prompt = Arc::new(OperatorPrompt::new(Duration::from_secs(30)));
        let mut requests = prompt.subscribe().unwrap();

        let waiting = {
            let prompt = Arc::clone(&prompt);
            tokio::spawn(async move { prompt.confirm("evil.example.com").await })
        };

        let request = requests.recv().await.unwrap();
        prompt.resolve(&request.id, false).unwrap();
        assert!(!waiting.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_operator_timeout_denies_and_clears() {
        let prompt = OperatorPrompt::new(Duration::from_secs(5));

        assert!(!prompt.confirm("slow.example.com").await);
        assert!(prompt.pending().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_unknown_prompt() {
        let prompt = OperatorPrompt::new(Duration::from_secs(5));
        assert_eq!(
            prompt.resolve("nope", true),
            Err(TrustError::PromptNotFound("nope".to_string()))
        );
        assert!(AutoDenyPrompt::new().resolve("nope", true).is_err());
        assert!(AutoDenyPrompt::new().subscribe().is_none());
    }
}
