//! Per-request deadline and cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use pantry_core::{ServiceError, ServiceResult};

/// Caller-supplied deadline and cancellation token.
///
/// Every store and collaborator call made on behalf of a request goes through
/// [`RequestContext::run`], so a fired token or an expired deadline surfaces
/// as `ErrorKind::Timeout` instead of a generic internal failure. Clones share
/// the same token.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl RequestContext {
    /// No deadline, never cancelled unless [`RequestContext::cancel`] is called.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_at(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self::background().deadline_at(deadline)
    }

    /// Tie this context to an externally owned token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Fail fast if the request is already cancelled or past its deadline.
    pub fn check(&self) -> ServiceResult<()> {
        if self.token.is_cancelled() {
            return Err(ServiceError::timeout("request cancelled"));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ServiceError::timeout("request deadline exceeded"));
            }
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the token fires or the deadline passes
    /// first. `op` names the call in the timeout detail.
    pub async fn run<T, E, F>(&self, op: &'static str, fut: F) -> ServiceResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ServiceError>,
    {
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                warn!(op, "request cancelled");
                Err(ServiceError::timeout(format!("{op}: request cancelled")))
            }
            _ = expired => {
                warn!(op, "request deadline exceeded");
                Err(ServiceError::timeout(format!("{op}: request deadline exceeded")))
            }
            result = fut => result.map_err(Into::into),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_core::ErrorKind;

    #[tokio::test]
    async fn completes_when_nothing_fires() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        let value = ctx
            .run("noop", async { Ok::<_, ServiceError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_into_timeout() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        let err = ctx
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, ServiceError>(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.detail().starts_with("slow"));
    }

    #[tokio::test]
    async fn cancelled_token_turns_into_timeout() {
        let token = CancellationToken::new();
        let ctx = RequestContext::background().with_cancellation(token.clone());
        token.cancel();

        assert_eq!(ctx.check().unwrap_err().kind(), ErrorKind::Timeout);
        let err = ctx
            .run("store", async { Ok::<_, ServiceError>(()) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn inner_errors_pass_through() {
        let ctx = RequestContext::background();
        let err = ctx
            .run("lookup", async { Err::<(), _>(ServiceError::not_found("menu item")) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
