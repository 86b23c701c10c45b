//! Cancellation-aware waiting

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// The wait was interrupted by its cancellation token
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Sleep for `delay` unless `token` fires first.
///
/// Returns immediately if the token is already cancelled, so a cancelled
/// caller never waits out a pending backoff.
pub async fn sleep_or_cancel(delay: Duration, token: &CancellationToken) -> Result<(), Cancelled> {
    if token.is_cancelled() {
        return Err(Cancelled);
    }

    tokio::select! {
        () = tokio::time::sleep(delay) => Ok(()),
        () = token.cancelled() => {
            tracing::debug!(remaining_ms = delay.as_millis() as u64, "Sleep interrupted by cancellation");
            Err(Cancelled)
        }
    }
}
