use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::surface::{ElementHandle, Surface, SurfaceError};

/// Errors returned by the waiting primitives.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WaitError {
    /// The selector did not match before the timeout.
    #[error("element not found: {selector} (waited {timeout_ms} ms)")]
    NotFound { selector: String, timeout_ms: u64 },

    /// The surface was closed while waiting.
    #[error("wait cancelled: surface closed")]
    Cancelled,

    /// The surface failed while being inspected.
    #[error("surface error: {0}")]
    Surface(SurfaceError),
}

impl From<SurfaceError> for WaitError {
    fn from(err: SurfaceError) -> Self {
        match err {
            SurfaceError::Closed => WaitError::Cancelled,
            other => WaitError::Surface(other),
        }
    }
}

/// Wait until an element matching `selector` exists.
///
/// Resolves immediately when the element is already present. Otherwise a
/// subtree observer is registered and the selector is re-evaluated after
/// every mutation batch. The observer is dropped on every exit path.
pub async fn wait_for_appearance(
    surface: &dyn Surface,
    selector: &str,
    timeout: Duration,
) -> Result<ElementHandle, WaitError> {
    let cancel = surface.cancellation();
    if cancel.is_cancelled() {
        return Err(WaitError::Cancelled);
    }
    let deadline = Instant::now() + timeout;

    if let Some(element) = surface.query(selector).await? {
        return Ok(element);
    }

    let mut observer = surface.observe().await?;

    // The element may have appeared between the first query and observer
    // registration.
    if let Some(element) = surface.query(selector).await? {
        return Ok(element);
    }

    debug!(selector, timeout_ms = timeout.as_millis() as u64, "Waiting for element");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                return Err(WaitError::NotFound {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            changed = observer.changed() => {
                if !changed {
                    return Err(WaitError::Cancelled);
                }
                if let Some(element) = surface.query(selector).await? {
                    return Ok(element);
                }
            }
        }
    }
}

/// Poll up to `max_attempts` times for an element matching `selector` whose
/// text contains `substring` (case-sensitive).
///
/// Returns `Ok(None)` when every attempt missed; that is not an error.
pub async fn wait_for_text_match(
    surface: &dyn Surface,
    selector: &str,
    substring: &str,
    max_attempts: u32,
    interval: Duration,
) -> Result<Option<ElementHandle>, WaitError> {
    let cancel = surface.cancellation();

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled);
        }

        for element in surface.query_all(selector).await? {
            match surface.text(&element).await {
                Ok(text) if text.contains(substring) => return Ok(Some(element)),
                Ok(_) => {}
                // The node went away between listing and reading; treat as a miss.
                Err(SurfaceError::StaleElement(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        debug!(
            selector,
            substring, attempt, max_attempts, "Text not found yet"
        );

        if attempt < max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WaitError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSurface;

    #[tokio::test(start_paused = true)]
    async fn test_appearance_resolves_immediately_when_present() {
        let surface = MockSurface::new("https://example.com");
        let handle = surface.add_element("#editor", "").await;

        let start = Instant::now();
        let found = wait_for_appearance(&surface, "#editor", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(found, handle);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(surface.active_observers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_appearance_resolves_on_mutation() {
        let surface = MockSurface::new("https://example.com");
        surface
            .add_element_after(Duration::from_millis(300), "#editor", "")
            .await;

        let start = Instant::now();
        let found = wait_for_appearance(&surface, "#editor", Duration::from_secs(5)).await;

        assert!(found.is_ok());
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(surface.active_observers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_appearance_times_out_and_tears_down() {
        let surface = MockSurface::new("https://example.com");
        // Unrelated mutations must not satisfy the wait.
        surface
            .add_element_after(Duration::from_millis(100), ".noise", "")
            .await;

        let start = Instant::now();
        let result = wait_for_appearance(&surface, "#never", Duration::from_millis(1000)).await;

        assert_eq!(
            result,
            Err(WaitError::NotFound {
                selector: "#never".to_string(),
                timeout_ms: 1000,
            })
        );
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1050));
        assert_eq!(surface.active_observers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_appearance_rejects_immediately_on_close() {
        let surface = MockSurface::new("https://example.com");
        let closer = surface.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            closer.close().await.unwrap();
        });

        let start = Instant::now();
        let result = wait_for_appearance(&surface, "#never", Duration::from_secs(60)).await;

        assert_eq!(result, Err(WaitError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(surface.active_observers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waits_are_independent() {
        let surface = MockSurface::new("https://example.com");
        surface
            .add_element_after(Duration::from_millis(100), "#a", "")
            .await;
        surface
            .add_element_after(Duration::from_millis(200), "#b", "")
            .await;

        let (a, b) = tokio::join!(
            wait_for_appearance(&surface, "#a", Duration::from_secs(1)),
            wait_for_appearance(&surface, "#b", Duration::from_secs(1)),
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(surface.active_observers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_match_exhausts_attempts() {
        let surface = MockSurface::new("https://example.com");
        surface.add_element("button", "Save draft").await;

        let result = wait_for_text_match(
            &surface,
            "button",
            "Publish",
            3,
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(result, Ok(None));
        assert_eq!(surface.query_all_count("button"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_match_finds_streamed_text() {
        let surface = MockSurface::new("https://example.com");
        let status = surface.add_element(".status", "Uploading...").await;

        let updater = surface.clone();
        let target = status.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            updater.set_text(&target, "Upload complete").await;
        });

        let found = wait_for_text_match(
            &surface,
            ".status",
            "complete",
            10,
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        assert_eq!(found, Some(status));
        assert!(surface.query_all_count(".status") <= 4);
    }

    #[tokio::test]
    async fn test_text_match_is_case_sensitive() {
        let surface = MockSurface::new("https://example.com");
        surface.add_element("button", "PUBLISH").await;

        let result =
            wait_for_text_match(&surface, "button", "Publish", 1, Duration::from_millis(1)).await;
        assert_eq!(result, Ok(None));
    }

    #[tokio::test]
    async fn test_text_match_picks_first_matching_element() {
        let surface = MockSurface::new("https://example.com");
        surface.add_element("button", "Cancel").await;
        let publish = surface.add_element("button", "Publish now").await;
        surface.add_element("button", "Publish later").await;

        let found = wait_for_text_match(&surface, "button", "Publish", 1, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(found, Some(publish));
    }
}
