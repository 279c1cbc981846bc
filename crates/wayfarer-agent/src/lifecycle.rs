use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use wayfarer_core::error::Result;
use wayfarer_core::traits::AutomationSession;

/// How a release attempt ended. Release never fails; this is for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    Failed,
    TimedOut,
}

/// Close every sub-session, giving up after `timeout`. Errors are logged and swallowed.
pub async fn release_session(session: &dyn AutomationSession, timeout: Duration) -> CloseOutcome {
    debug!(timeout_secs = timeout.as_secs_f64(), "Closing automation session");
    match tokio::time::timeout(timeout, session.close_all()).await {
        Ok(Ok(())) => {
            info!("Automation session closed");
            CloseOutcome::Closed
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Automation session close failed");
            CloseOutcome::Failed
        }
        Err(_) => {
            warn!(
                timeout_secs = timeout.as_secs_f64(),
                "Automation session close timed out"
            );
            CloseOutcome::TimedOut
        }
    }
}

/// Owns an acquired session until [`release`](Self::release) consumes it.
///
/// Because `release` takes `self`, a handle can be released at most once.
/// Dropping an unreleased handle logs a warning.
pub struct SessionLifecycle<S: AutomationSession> {
    session: Arc<S>,
    close_timeout: Duration,
    released: bool,
}

impl<S: AutomationSession> SessionLifecycle<S> {
    /// Await `open` and take ownership of the session it yields.
    /// An open error propagates unchanged; nothing needs releasing then.
    pub async fn acquire<F>(open: F, close_timeout: Duration) -> Result<Self>
    where
        F: Future<Output = Result<S>>,
    {
        let session = open.await?;
        info!("Automation session acquired");
        Ok(Self {
            session: Arc::new(session),
            close_timeout,
            released: false,
        })
    }

    /// Shared handle for collaborators bound to this session.
    pub fn session(&self) -> Arc<S> {
        Arc::clone(&self.session)
    }

    pub async fn release(mut self) -> CloseOutcome {
        self.released = true;
        release_session(self.session.as_ref(), self.close_timeout).await
    }
}

impl<S: AutomationSession> Drop for SessionLifecycle<S> {
    fn drop(&mut self) {
        if !self.released {
            warn!("Automation session dropped without release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_core::error::WayfarerError;
    use wayfarer_test_utils::{CloseBehavior, MockSession};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_acquire_and_release() {
        let mock = MockSession::new(CloseBehavior::Ok);
        let closes = mock.closes();

        let lifecycle = SessionLifecycle::acquire(async { Ok(mock) }, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(closes.get(), 0);
        assert_eq!(lifecycle.release().await, CloseOutcome::Closed);
        assert_eq!(closes.get(), 1);
    }

    #[tokio::test]
    async fn test_acquire_error_propagates() {
        let result = SessionLifecycle::<MockSession>::acquire(
            async { Err(WayfarerError::ConfigNotFound("browser_mcp.json".into())) },
            TIMEOUT,
        )
        .await;
        assert!(matches!(result, Err(WayfarerError::ConfigNotFound(_))));
    }

    #[tokio::test]
    async fn test_release_swallows_close_error() {
        let mock = MockSession::new(CloseBehavior::Fail);
        let closes = mock.closes();
        let outcome = release_session(&mock, TIMEOUT).await;
        assert_eq!(outcome, CloseOutcome::Failed);
        assert_eq!(closes.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_bounded_by_timeout() {
        let mock = MockSession::new(CloseBehavior::Hang);
        let lifecycle = SessionLifecycle::acquire(async { Ok(mock) }, TIMEOUT)
            .await
            .unwrap();

        let start = tokio::time::Instant::now();
        assert_eq!(lifecycle.release().await, CloseOutcome::TimedOut);
        let elapsed = start.elapsed();
        assert!(elapsed >= TIMEOUT && elapsed < TIMEOUT + Duration::from_secs(1));
    }
}
