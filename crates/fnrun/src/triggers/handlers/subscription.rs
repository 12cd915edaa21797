//! Database subscription mount.
//!
//! Changed object ids are accumulated and delivered in batches by a
//! debounced [`DeferredTask`]. In deep mode the objects referenced from the
//! matches are watched too, and a change to one of them re-fires its
//! parents.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::TriggerContext;
use crate::errors::{DatabaseError, TriggerError};
use crate::runtime::SubscriptionConfig;
use crate::traits::{Database, TriggerCallback};
use crate::triggers::deferred::DeferredTask;
use crate::triggers::scope::{ActivationScope, MountStatus};
use crate::types::{DbObject, Filter, ObjectRef, SubscriptionSpec, Trigger, TriggerEvent};

type Pending = Arc<Mutex<BTreeSet<String>>>;

fn batch_task(
    scope: &mut ActivationScope,
    delay: Duration,
    pending: &Pending,
    callback: &Arc<dyn TriggerCallback>,
) -> DeferredTask {
    let pending = Arc::clone(pending);
    let callback = Arc::clone(callback);
    DeferredTask::spawn(scope, delay, move || {
        let objects: Vec<String> = std::mem::take(&mut *pending.lock()).into_iter().collect();
        let callback = Arc::clone(&callback);
        async move {
            if objects.is_empty() {
                return;
            }
            callback.fire(TriggerEvent::ObjectsChanged { objects }).await;
        }
    })
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Watches the objects referenced from the current matches.
struct DeepWatch {
    database: Arc<dyn Database>,
    /// Referenced id to the ids of the matches referencing it.
    parents: BTreeMap<String, BTreeSet<String>>,
    forwarder: Option<AbortOnDrop>,
    tx: mpsc::Sender<Vec<String>>,
}

impl DeepWatch {
    async fn update(&mut self, objects: &[DbObject]) -> Result<(), DatabaseError> {
        let mut parents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for object in objects {
            for reference in ObjectRef::collect(&object.data) {
                parents
                    .entry(reference.id)
                    .or_default()
                    .insert(object.id.clone());
            }
        }

        let keys_changed = !parents.keys().eq(self.parents.keys());
        self.parents = parents;
        if !keys_changed {
            return Ok(());
        }

        self.forwarder = None;
        if self.parents.is_empty() {
            return Ok(());
        }
        let mut live = self
            .database
            .subscribe(&Filter::ids(self.parents.keys().cloned()))
            .await?;
        let tx = self.tx.clone();
        self.forwarder = Some(AbortOnDrop(tokio::spawn(async move {
            while let Some(snapshot) = live.rx.recv().await {
                if snapshot.changed.is_empty() {
                    continue;
                }
                if tx.send(snapshot.changed).await.is_err() {
                    break;
                }
            }
        })));
        Ok(())
    }

    fn parents_of(&self, changed: &[String]) -> BTreeSet<String> {
        changed
            .iter()
            .filter_map(|id| self.parents.get(id))
            .flatten()
            .cloned()
            .collect()
    }
}

pub(super) async fn mount(
    scope: &mut ActivationScope,
    ctx: &TriggerContext,
    trigger: &Trigger,
    spec: &SubscriptionSpec,
    callback: Arc<dyn TriggerCallback>,
    config: &SubscriptionConfig,
) -> Result<(), TriggerError> {
    let mut live = ctx.database.subscribe(&spec.query).await?;
    let initial = live.rx.recv().await.ok_or_else(|| TriggerError::Runtime {
        message: format!("live query for trigger {} closed before its first snapshot", trigger.id),
    })?;

    let pending: Pending = Arc::default();
    let delay = spec
        .options
        .delay
        .map(Duration::from_millis)
        .unwrap_or(config.delay);
    let task = batch_task(scope, delay, &pending, &callback);

    let (deep_tx, mut deep_rx) = mpsc::channel::<Vec<String>>(64);
    let (mut deep, deep_task) = if spec.options.deep {
        let mut watch = DeepWatch {
            database: Arc::clone(&ctx.database),
            parents: BTreeMap::new(),
            forwarder: None,
            tx: deep_tx,
        };
        watch.update(&initial.objects).await?;
        let deep_task = batch_task(scope, config.deep_delay, &pending, &callback);
        (Some(watch), Some(deep_task))
    } else {
        drop(deep_tx);
        (None, None)
    };

    let trigger_id = trigger.id.clone();
    scope.spawn(async move {
        loop {
            tokio::select! {
                snapshot = live.rx.recv() => {
                    let Some(snapshot) = snapshot else {
                        tracing::warn!(trigger_id = %trigger_id, "subscription live query closed");
                        return;
                    };
                    if !snapshot.changed.is_empty() {
                        pending.lock().extend(snapshot.changed.iter().cloned());
                        task.schedule();
                    }
                    if let Some(deep) = deep.as_mut() {
                        if let Err(e) = deep.update(&snapshot.objects).await {
                            tracing::warn!(trigger_id = %trigger_id, error = %e, "failed to watch referenced objects");
                        }
                    }
                }
                Some(changed) = deep_rx.recv() => {
                    let parents = deep
                        .as_ref()
                        .map(|deep| deep.parents_of(&changed))
                        .unwrap_or_default();
                    if parents.is_empty() {
                        continue;
                    }
                    tracing::trace!(trigger_id = %trigger_id, count = parents.len(), "referenced objects changed");
                    pending.lock().extend(parents);
                    if let Some(deep_task) = &deep_task {
                        deep_task.schedule();
                    }
                }
            }
        }
    });

    tracing::debug!(
        trigger_id = %trigger.id,
        deep = spec.options.deep,
        matches = initial.objects.len(),
        "subscription mounted"
    );
    scope.set_status(MountStatus::Ready);
    Ok(())
}
