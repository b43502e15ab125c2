//! Stop latch shared by the two halves of a service.

use std::sync::Arc;
use tokio::sync::watch;

/// One-shot stop flag.
///
/// `stop()` implementations fire the latch; the matching `start()` awaits it.
/// Built on a watch channel so a waiter that subscribes after the latch fired
/// still observes it.
#[derive(Debug, Clone)]
pub struct StopLatch {
    tx: Arc<watch::Sender<bool>>,
}

impl StopLatch {
    /// Create an unfired latch.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the latch. Returns `true` only for the call that fired it.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// Whether the latch has fired.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the latch fires.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once fired.
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// Owned variant of [`wait`](Self::wait) for `'static` contexts such as
    /// `axum::serve(..).with_graceful_shutdown(..)`.
    pub fn wait_owned(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let latch = self.clone();
        async move { latch.wait().await }
    }
}

impl Default for StopLatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn trigger_is_one_shot() {
        let latch = StopLatch::new();
        assert!(!latch.is_triggered());
        assert!(latch.trigger());
        assert!(!latch.trigger());
        assert!(latch.is_triggered());
    }

    #[tokio::test]
    async fn late_waiter_sees_fired_latch() {
        let latch = StopLatch::new();
        latch.trigger();
        tokio::time::timeout(Duration::from_millis(100), latch.wait())
            .await
            .expect("wait should complete immediately");
    }

    #[tokio::test]
    async fn waiter_wakes_on_trigger() {
        let latch = StopLatch::new();
        let waiter = tokio::spawn(latch.wait_owned());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        latch.clone().trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
