//! Trace-id keyed table of pending calls.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::envelope::{RequestEnvelope, ResponseEnvelope};
use super::MessagingError;

type Pending = HashMap<String, oneshot::Sender<ResponseEnvelope>>;

/// Matches responses to the calls that are waiting for them.
///
/// Each call registers a one-shot slot under its trace id. The slot is
/// removed on every exit path (response, timeout, send failure, or the
/// caller dropping the future), so the table never grows unbounded.
#[derive(Clone, Default)]
pub struct CorrelationTable {
    pending: Arc<Mutex<Pending>>,
}

/// Removes the pending slot when the call ends, however it ends.
struct PendingGuard {
    pending: Arc<Mutex<Pending>>,
    trace_id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.trace_id);
    }
}

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `request` and wait up to `timeout` for its response.
    pub async fn call<F, Fut>(
        &self,
        request: RequestEnvelope,
        send: F,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, MessagingError>
    where
        F: FnOnce(RequestEnvelope) -> Fut,
        Fut: Future<Output = Result<(), MessagingError>>,
    {
        let trace_id = request.trace_id.clone();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if pending.contains_key(&trace_id) {
                return Err(MessagingError::DuplicateTraceId(trace_id));
            }
            pending.insert(trace_id.clone(), tx);
        }
        let _guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            trace_id: trace_id.clone(),
        };

        debug!(trace_id = %trace_id, action = %request.action, "Sending correlated request");
        send(request).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(MessagingError::Disconnected(trace_id)),
            Err(_) => {
                warn!(trace_id = %trace_id, "Correlated request timed out");
                Err(MessagingError::Timeout {
                    trace_id,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Deliver a response to its pending call.
    ///
    /// Returns `false` if no call is waiting on that trace id, which covers
    /// unknown ids, late responses and duplicates.
    pub fn resolve(&self, response: ResponseEnvelope) -> bool {
        let slot = lock(&self.pending).remove(&response.trace_id);
        match slot {
            Some(tx) => tx.send(response).is_ok(),
            None => {
                debug!(trace_id = %response.trace_id, "Dropping uncorrelated response");
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn forwarder(
        tx: mpsc::UnboundedSender<RequestEnvelope>,
    ) -> impl FnOnce(RequestEnvelope) -> futures::future::Ready<Result<(), MessagingError>> {
        move |request| {
            futures::future::ready(
                tx.send(request)
                    .map_err(|e| MessagingError::Disconnected(e.0.trace_id)),
            )
        }
    }

    #[tokio::test]
    async fn test_call_resolves_once() {
        let table = CorrelationTable::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let caller = {
            let table = table.clone();
            tokio::spawn(async move {
                table
                    .call(
                        RequestEnvelope::new("ping", json!({})),
                        forwarder(tx),
                        Duration::from_secs(5),
                    )
                    .await
            })
        };

        let request = rx.recv().await.unwrap();
        assert_eq!(table.pending_count(), 1);

        let response = ResponseEnvelope::ok(&request, json!({"pong": true}));
        assert!(table.resolve(response.clone()));
        // A second delivery of the same trace id is ignored.
        assert!(!table.resolve(response.clone()));

        let received = caller.await.unwrap().unwrap();
        assert_eq!(received, response);
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_call_pends_until_resolved() {
        let table = CorrelationTable::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut call = tokio_test::task::spawn(table.call(
            RequestEnvelope::new("ping", json!({})).with_trace_id("t-7"),
            forwarder(tx),
            Duration::from_secs(5),
        ));
        tokio_test::assert_pending!(call.poll());

        let request = rx.try_recv().unwrap();
        assert!(table.resolve(ResponseEnvelope::ok(&request, json!({}))));
        assert!(call.is_woken());

        let response = tokio_test::assert_ready_ok!(call.poll());
        assert_eq!(response.trace_id, "t-7");
        drop(call);
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_trace_id_is_ignored() {
        let table = CorrelationTable::new();
        let request = RequestEnvelope::new("ping", json!({}));
        assert!(!table.resolve(ResponseEnvelope::ok(&request, json!({}))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry() {
        let table = CorrelationTable::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = table
            .call(
                RequestEnvelope::new("ping", json!({})).with_trace_id("slow"),
                forwarder(tx),
                Duration::from_millis(250),
            )
            .await;

        assert_eq!(
            result,
            Err(MessagingError::Timeout {
                trace_id: "slow".to_string(),
                timeout_ms: 250
            })
        );
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_removes_entry() {
        let table = CorrelationTable::new();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let result = table
            .call(
                RequestEnvelope::new("ping", json!({})),
                forwarder(tx),
                Duration::from_secs(1),
            )
            .await;

        assert!(matches!(result, Err(MessagingError::Disconnected(_))));
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_call_removes_entry() {
        let table = CorrelationTable::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let caller = {
            let table = table.clone();
            tokio::spawn(async move {
                table
                    .call(
                        RequestEnvelope::new("ping", json!({})),
                        forwarder(tx),
                        Duration::from_secs(60),
                    )
                    .await
            })
        };
        let request = rx.recv().await.unwrap();
        assert_eq!(table.pending_count(), 1);

        caller.abort();
        let _ = caller.await;
        assert_eq!(table.pending_count(), 0);
        assert!(!table.resolve(ResponseEnvelope::ok(&request, json!({}))));
    }

    #[tokio::test]
    async fn test_duplicate_pending_trace_id_rejected() {
        let table = CorrelationTable::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = {
            let table = table.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                table
                    .call(
                        RequestEnvelope::new("ping", json!({})).with_trace_id("same"),
                        forwarder(tx),
                        Duration::from_secs(5),
                    )
                    .await
            })
        };
        let request = rx.recv().await.unwrap();

        let second = table
            .call(
                RequestEnvelope::new("ping", json!({})).with_trace_id("same"),
                forwarder(tx),
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(
            second,
            Err(MessagingError::DuplicateTraceId("same".to_string()))
        );

        assert!(table.resolve(ResponseEnvelope::ok(&request, json!({}))));
        assert!(first.await.unwrap().is_ok());
    }
}
