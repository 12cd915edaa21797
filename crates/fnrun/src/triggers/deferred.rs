//! Coalescing, rate-limited background task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use super::scope::ActivationScope;

/// Runs a job in the background whenever scheduled.
///
/// Schedules arriving while the job is waiting or running collapse into a
/// single follow-up run. Each run is preceded by `delay`, which both
/// debounces bursts and bounds the run frequency.
#[derive(Clone)]
pub(crate) struct DeferredTask {
    notify: Arc<Notify>,
}

impl DeferredTask {
    pub(crate) fn spawn<F, Fut>(scope: &mut ActivationScope, delay: Duration, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let notify = Arc::new(Notify::new());
        let wakeups = Arc::clone(&notify);
        scope.spawn(async move {
            loop {
                wakeups.notified().await;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                job().await;
            }
        });
        Self { notify }
    }

    pub(crate) fn schedule(&self) {
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_bursts_coalesce() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scope = ActivationScope::new();
        let counter = Arc::clone(&runs);
        let task = DeferredTask::spawn(&mut scope, Duration::from_millis(30), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        for _ in 0..10 {
            task.schedule();
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        task.schedule();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
