//! Timer scheduling
//!
//! Reconnect delays go through a [`Scheduler`] so tests can control time.
//! [`TokioScheduler`] is the runtime implementation.

use std::time::Duration;

/// Callback run when a timer fires
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// Cancels a pending timer
///
/// Dropping the handle does not cancel the timer; call [`TimerHandle::cancel`].
pub struct TimerHandle {
    cancel: Box<dyn FnOnce() + Send>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Box::new(cancel),
        }
    }

    pub fn cancel(self) {
        (self.cancel)()
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle").finish_non_exhaustive()
    }
}

/// Schedules one-shot timers
pub trait Scheduler: Send + Sync + 'static {
    /// Run `on_fire` once after `delay`
    fn set_timer(&self, delay: Duration, on_fire: TimerCallback) -> TimerHandle;
}

/// Scheduler backed by `tokio::time::sleep`
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn set_timer(&self, delay: Duration, on_fire: TimerCallback) -> TimerHandle {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        });

        TimerHandle::new(move || task.abort())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let _handle = TokioScheduler.set_timer(
            Duration::from_millis(500),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_cancel() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let handle = TokioScheduler.set_timer(
            Duration::from_millis(100),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );
        handle.cancel();

        tokio::time::sleep(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
