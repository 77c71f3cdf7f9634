//! Bounded and cancellable quiescence waits.
//!
//! [`Control::wait`] itself resolves only at quiescence and stalls forever on
//! a validator that never resolves; these wrappers bound that wait with a
//! timeout or an external cancellation token.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::control::Control;
use crate::error::WaitError;

/// Wait for quiescence, giving up after `timeout`.
pub async fn wait_with_timeout(control: &dyn Control, timeout: Duration) -> Result<(), WaitError> {
    tokio::select! {
        biased;

        () = control.wait() => Ok(()),
        () = tokio::time::sleep(timeout) => {
            tracing::debug!(?timeout, "quiescence wait timed out");
            Err(WaitError::Timeout { timeout })
        }
    }
}

/// Wait for quiescence, giving up when `cancel` fires.
pub async fn wait_cancellable(
    control: &dyn Control,
    cancel: &CancellationToken,
) -> Result<(), WaitError> {
    tokio::select! {
        biased;

        () = control.wait() => Ok(()),
        () = cancel.cancelled() => {
            tracing::debug!("quiescence wait cancelled");
            Err(WaitError::Cancelled)
        }
    }
}
