//! A cheap cancellation handle every public operation accepts (spec §5).
//! Cancelling aborts the current attempt and stops the escalation walk;
//! it never unwinds through a panic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called. Intended for use in a
    /// `tokio::select!` alongside the future being cancelled.
    ///
    /// `notify_waiters` (called by `cancel`) only wakes `Notified` futures
    /// that already exist at the time it runs; it stores no permit for a
    /// `notified()` constructed afterwards. Constructing `notified` before
    /// checking the flag closes that gap: if `cancel` runs concurrently, it
    /// either flips the flag before our check (caught below) or fires after
    /// our `Notified` already exists (caught by the wakeup).
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_after_cancel_is_called() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });

        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }
}
