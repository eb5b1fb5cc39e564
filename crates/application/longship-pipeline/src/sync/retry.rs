use std::time::Duration;

use longship_core::ScanStatus;
use tokio_util::sync::CancellationToken;

use crate::sync::SyncError;

/// How long to keep asking a server that is still scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusDecision {
    Proceed,
    RetryAfter(Duration),
    Abort(SyncError),
}

impl RetryPolicy {
    /// What to do with a manifest carrying `status`, fetched on `attempt` (1-based).
    pub fn decide(&self, status: ScanStatus, attempt: u32) -> StatusDecision {
        match status {
            ScanStatus::Completed => StatusDecision::Proceed,
            ScanStatus::Scanning if attempt < self.max_attempts.max(1) => {
                StatusDecision::RetryAfter(self.backoff)
            }
            ScanStatus::Scanning => StatusDecision::Abort(SyncError::ServerBusy { attempts: attempt }),
            ScanStatus::Waiting | ScanStatus::Failed => {
                StatusDecision::Abort(SyncError::ManifestUnavailable(status))
            }
        }
    }
}

/// Sleep for `delay` unless `cancel` fires first.
pub(crate) async fn wait_backoff(
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<(), SyncError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanning_retries_until_attempts_run_out() {
        let p = RetryPolicy::default();
        assert_eq!(
            p.decide(ScanStatus::Scanning, 1),
            StatusDecision::RetryAfter(Duration::from_secs(3))
        );
        assert_eq!(
            p.decide(ScanStatus::Scanning, 2),
            StatusDecision::RetryAfter(Duration::from_secs(3))
        );
        assert_eq!(
            p.decide(ScanStatus::Scanning, 3),
            StatusDecision::Abort(SyncError::ServerBusy { attempts: 3 })
        );
    }

    #[test]
    fn waiting_and_failed_abort_immediately() {
        let p = RetryPolicy::default();
        for status in [ScanStatus::Waiting, ScanStatus::Failed] {
            assert_eq!(
                p.decide(status, 1),
                StatusDecision::Abort(SyncError::ManifestUnavailable(status))
            );
        }
        assert_eq!(p.decide(ScanStatus::Completed, 3), StatusDecision::Proceed);
    }

    #[tokio::test]
    async fn backoff_is_cut_short_by_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = wait_backoff(Duration::from_secs(60), &cancel).await;
        assert_eq!(res, Err(SyncError::Cancelled));
    }
}
