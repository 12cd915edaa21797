//! Cron timer mount.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::errors::TriggerError;
use crate::traits::TriggerCallback;
use crate::triggers::deferred::DeferredTask;
use crate::triggers::schedule::{next_occurrence, parse_cron};
use crate::triggers::scope::{ActivationScope, MountStatus};
use crate::types::{TimerSpec, Trigger, TriggerEvent};

pub(super) async fn mount(
    scope: &mut ActivationScope,
    trigger: &Trigger,
    spec: &TimerSpec,
    callback: Arc<dyn TriggerCallback>,
) -> Result<(), TriggerError> {
    let schedule = parse_cron(&spec.cron)?;

    let task = DeferredTask::spawn(scope, Duration::ZERO, move || {
        let callback = Arc::clone(&callback);
        async move {
            let tick = Utc::now().timestamp_millis();
            callback.fire(TriggerEvent::Timer { tick }).await;
        }
    });

    let trigger_id = trigger.id.clone();
    let mut shutdown = scope.shutdown_signal();
    scope.spawn(async move {
        let mut last_tick: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let Some(next) = next_occurrence(&schedule, now) else {
                tracing::warn!(trigger_id = %trigger_id, "cron schedule has no upcoming occurrences");
                return;
            };
            let delay = (next - now).to_std().unwrap_or(Duration::from_millis(100));

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let tick = Utc::now();
                    let delta_ms = last_tick.map(|prev| (tick - prev).num_milliseconds());
                    tracing::debug!(trigger_id = %trigger_id, ?delta_ms, "timer tick");
                    last_tick = Some(tick);
                    task.schedule();
                }
                _ = shutdown.recv() => return,
            }
        }
    });

    tracing::debug!(trigger_id = %trigger.id, cron = %spec.cron, "timer mounted");
    scope.set_status(MountStatus::Ready);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::triggers::callback_fn;
    use crate::types::TriggerSpec;

    fn counting_callback() -> (Arc<AtomicUsize>, Arc<dyn TriggerCallback>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let callback = callback_fn(move |event| {
            let counter = Arc::clone(&counter);
            async move {
                assert!(matches!(event, TriggerEvent::Timer { .. }));
                counter.fetch_add(1, Ordering::SeqCst);
                None
            }
        });
        (count, Arc::new(callback))
    }

    #[tokio::test]
    async fn test_timer_fires_every_second() {
        let trigger = Trigger::new(TriggerSpec::timer("* * * * * *"));
        let TriggerSpec::Timer(spec) = &trigger.spec else {
            panic!("expected timer spec");
        };
        let (count, callback) = counting_callback();
        let mut scope = ActivationScope::new();
        mount(&mut scope, &trigger, spec, callback)
            .await
            .expect("mount");
        assert_eq!(*scope.status().borrow(), MountStatus::Ready);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 1, "fired {fired} times");

        scope.dispose();
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert_eq!(count.load(Ordering::SeqCst), fired);
    }

    #[tokio::test]
    async fn test_invalid_cron_fails_mount() {
        let trigger = Trigger::new(TriggerSpec::timer("every tuesday"));
        let TriggerSpec::Timer(spec) = &trigger.spec else {
            panic!("expected timer spec");
        };
        let (count, callback) = counting_callback();
        let mut scope = ActivationScope::new();
        match mount(&mut scope, &trigger, spec, callback).await {
            Err(TriggerError::Config { .. }) => {}
            other => panic!("expected Config, got: {other:?}"),
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
