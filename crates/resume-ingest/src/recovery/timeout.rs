//! Deadline guard for a single decode attempt.

use crate::error::{ParserError, Result};
use std::future::Future;
use std::time::Duration;

/// Race `operation` against `limit`.
///
/// On expiry the in-flight future is dropped and a `Timeout` error is returned.
/// Retrying is left to the caller.
pub async fn with_timeout<T, F>(limit: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "Decode attempt timed out");
            Err(ParserError::deadline_exceeded(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let result: Result<()> = with_timeout(Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.context().elapsed_ms, Some(100));
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_through_result_and_error() {
        let ok = with_timeout(Duration::from_secs(1), async { Ok(7) }).await.unwrap();
        assert_eq!(ok, 7);

        let err = with_timeout::<(), _>(Duration::from_secs(1), async { Err(ParserError::corrupted("bad")) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandons_inner_future() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let _ = with_timeout(Duration::from_millis(10), async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }
}
