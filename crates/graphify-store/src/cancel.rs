//! Cooperative cancellation for store interactions.
//!
//! Every access-layer call takes a [`Cancel`]. Cancelling it makes
//! in-flight and future calls return [`Cancelled`] instead of waiting on
//! the store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// The operation was cancelled before it completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Operation cancelled")]
pub struct Cancelled;

/// A shareable cancellation signal. Clones observe the same signal.
#[derive(Debug, Clone)]
pub struct Cancel {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Cancel {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// A signal that cancels itself once `timeout` elapses.
    /// Must be called from within a tokio runtime.
    pub fn with_timeout(timeout: Duration) -> Self {
        let cancel = Self::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if !trigger.is_cancelled() {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Deadline reached, cancelling");
                trigger.cancel();
            }
        });
        cancel
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the signal is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as `self`, so `changed` cannot fail here.
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Drive `fut` to completion unless cancelled first. The future is
    /// dropped on cancellation, releasing anything it holds.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled),
            out = fut => Ok(out),
        }
    }
}

impl Default for Cancel {
    fn default() -> Self {
        Self::new()
    }
}
