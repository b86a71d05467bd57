//! Call Contexts
//!
//! A [`Context`] lets a caller stop waiting for a call, either explicitly or
//! once a deadline passes. Cancelling only releases the local waiter: the
//! remote handler keeps running and its late response is dropped.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::protocol::error::RpcError;

const CANCELED: &str = "context canceled";
const DEADLINE_EXCEEDED: &str = "context deadline exceeded";

/// Cancellation signal plus optional deadline, shared by clones.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tinyrpc_common::Context;
///
/// let parent = Context::with_timeout(Duration::from_secs(2));
/// let child = parent.child();
///
/// child.cancel();
/// assert!(child.err().is_some());
/// assert!(parent.err().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled unless [`cancel`](Self::cancel) is called.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A context cancelled together with `self`, which can also be cancelled alone.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The cancellation error if the context is already done.
    pub fn err(&self) -> Option<RpcError> {
        if self.token.is_cancelled() {
            return Some(RpcError::Cancelled(CANCELED.to_string()));
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(RpcError::Cancelled(DEADLINE_EXCEEDED.to_string()))
            }
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> RpcError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => RpcError::Cancelled(CANCELED.to_string()),
                _ = tokio::time::sleep_until(deadline) => RpcError::Cancelled(DEADLINE_EXCEEDED.to_string()),
            },
            None => {
                self.token.cancelled().await;
                RpcError::Cancelled(CANCELED.to_string())
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_not_done() {
        let ctx = Context::background();
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test]
    async fn test_cancel_resolves_done() {
        let ctx = Context::background();
        ctx.cancel();
        assert_eq!(ctx.done().await, RpcError::Cancelled(CANCELED.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_resolves_done() {
        let ctx = Context::with_timeout(Duration::from_millis(50));
        assert!(ctx.err().is_none());
        assert_eq!(ctx.child().deadline(), ctx.deadline());

        assert_eq!(ctx.done().await, RpcError::Cancelled(DEADLINE_EXCEEDED.to_string()));
        assert!(ctx.err().is_some());
    }

    #[test]
    fn test_parent_cancel_reaches_child() {
        let parent = Context::background();
        let child = parent.child();
        parent.cancel();
        assert!(child.err().is_some());
    }
}
