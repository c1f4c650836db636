//! Bounded retry for idempotent steps.
//!
//! Only wrap operations that are safe to repeat (fetching an asset, reading
//! state). Never wrap a foreign UI action such as clicking a submit button.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Run `operation` up to `max_attempts` times with a fixed `delay` between
/// attempts, returning the first success or the last error.
///
/// `max_attempts` of zero is treated as one attempt.
pub async fn retry<T, E, F, Fut>(mut operation: F, max_attempts: u32, delay: Duration) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => {
                warn!("Attempt {}/{} failed: {}", attempt, max_attempts, e);
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}
