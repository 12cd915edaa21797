//! Trigger registry: the known triggers of each open space and their live
//! activations.
//!
//! A space is observed through a live query over its trigger objects. Each
//! snapshot is diffed by id against the known set; new triggers are recorded
//! without an activation and announced, removed ones have their activation
//! disposed before the removal is announced. An edit to the spec of a live
//! trigger disposes its activation and announces it as updated, leaving it
//! inactive until it is activated again.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::handlers::{mount_trigger, HandlerConfig, TriggerContext};
use super::scope::{ActivationScope, MountStatus};
use crate::errors::TriggerError;
use crate::traits::{Database, TriggerCallback};
use crate::types::{
    DbObject, Filter, ObjectRef, SerializedFunction, SpaceKey, Trigger, TriggerSpec,
    TRIGGER_TYPENAME,
};

/// Announcements about the known trigger set of a space.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Registered { space: SpaceKey, triggers: Vec<Trigger> },
    Removed { space: SpaceKey, triggers: Vec<Trigger> },
    /// The spec of these live triggers changed; their activations were
    /// disposed.
    Updated { space: SpaceKey, triggers: Vec<Trigger> },
}

/// Functions and triggers to store in a space.
#[derive(Debug, Clone, Default)]
pub struct RegistryManifest {
    pub functions: Vec<SerializedFunction>,
    pub triggers: Vec<Trigger>,
}

enum Activation {
    Inactive,
    /// A mount is in progress; blocks concurrent activations.
    Activating,
    Active(ActivationScope),
}

struct Record {
    trigger: Trigger,
    activation: Activation,
}

type Records = Arc<Mutex<HashMap<SpaceKey, BTreeMap<String, Record>>>>;

struct OpenSpace {
    database: Arc<dyn Database>,
    task: JoinHandle<()>,
}

pub struct TriggerRegistry {
    records: Records,
    spaces: Mutex<HashMap<SpaceKey, OpenSpace>>,
    events: broadcast::Sender<RegistryEvent>,
    config: HandlerConfig,
}

const EVENT_CAPACITY: usize = 256;

impl TriggerRegistry {
    pub fn new(config: HandlerConfig) -> Self {
        Self {
            records: Arc::default(),
            spaces: Mutex::new(HashMap::new()),
            events: broadcast::channel(EVENT_CAPACITY).0,
            config,
        }
    }

    /// Starts observing the triggers stored in `database` for `space`.
    ///
    /// The first snapshot is applied before returning. Opening an already
    /// open space is a no-op.
    pub async fn open_space(
        &self,
        space: SpaceKey,
        database: Arc<dyn Database>,
    ) -> Result<(), TriggerError> {
        if self.spaces.lock().contains_key(&space) {
            return Ok(());
        }

        let mut live = database
            .subscribe(&Filter::of_type(TRIGGER_TYPENAME))
            .await?;
        if let Some(snapshot) = live.rx.recv().await {
            apply_snapshot(&self.records, &self.events, &space, &snapshot.objects);
        }

        let records = Arc::clone(&self.records);
        let events = self.events.clone();
        let task_space = space.clone();
        let task = tokio::spawn(async move {
            while let Some(snapshot) = live.rx.recv().await {
                apply_snapshot(&records, &events, &task_space, &snapshot.objects);
            }
            tracing::debug!(space = %task_space, "trigger query closed");
        });

        let mut spaces = self.spaces.lock();
        if spaces.contains_key(&space) {
            // Lost a race with a concurrent open.
            task.abort();
            return Ok(());
        }
        tracing::info!(space = %space, "space opened");
        spaces.insert(space, OpenSpace { database, task });
        Ok(())
    }

    fn database(&self, space: &SpaceKey) -> Result<Arc<dyn Database>, TriggerError> {
        self.spaces
            .lock()
            .get(space)
            .map(|open| Arc::clone(&open.database))
            .ok_or_else(|| TriggerError::SpaceNotOpen {
                space: space.to_string(),
            })
    }

    /// Stores the manifest's functions and triggers, skipping any already
    /// present. Safe to call repeatedly.
    pub async fn register(
        &self,
        space: &SpaceKey,
        manifest: RegistryManifest,
    ) -> Result<(), TriggerError> {
        let database = self.database(space)?;

        let mut seen = BTreeSet::new();
        for function in manifest.functions {
            if !seen.insert(function.key.clone()) {
                continue;
            }
            if database.load(&ObjectRef::new(function.key.clone())).await?.is_some() {
                continue;
            }
            database.add(function.to_object()?).await?;
        }

        let mut seen = BTreeSet::new();
        let mut added = 0usize;
        for trigger in manifest.triggers {
            if !seen.insert(trigger.id.clone()) {
                continue;
            }
            if database.load(&ObjectRef::new(trigger.id.clone())).await?.is_some() {
                continue;
            }
            database.add(trigger.to_object()?).await?;
            added += 1;
        }
        tracing::debug!(space = %space, added, "manifest registered");
        Ok(())
    }

    /// Known triggers of `space` without a live activation.
    pub fn get_inactive_triggers(&self, space: &SpaceKey) -> Vec<Trigger> {
        self.records
            .lock()
            .get(space)
            .map(|records| {
                records
                    .values()
                    .filter(|record| matches!(record.activation, Activation::Inactive))
                    .map(|record| record.trigger.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All known triggers of `space`.
    pub fn triggers(&self, space: &SpaceKey) -> Vec<Trigger> {
        self.records
            .lock()
            .get(space)
            .map(|records| records.values().map(|r| r.trigger.clone()).collect())
            .unwrap_or_default()
    }

    /// Mounts a registered trigger, routing its events into `callback`.
    ///
    /// The mount runs against the registry's latest copy of the trigger.
    /// A failed mount leaves the trigger inactive.
    pub async fn activate(
        &self,
        ctx: &TriggerContext,
        trigger: &Trigger,
        callback: Arc<dyn TriggerCallback>,
    ) -> Result<(), TriggerError> {
        let current = {
            let mut records = self.records.lock();
            let Some(record) = records
                .get_mut(&ctx.space)
                .and_then(|records| records.get_mut(&trigger.id))
            else {
                tracing::error!(space = %ctx.space, trigger_id = %trigger.id, "cannot activate unregistered trigger");
                return Err(TriggerError::NotRegistered {
                    space: ctx.space.to_string(),
                    trigger_id: trigger.id.clone(),
                });
            };
            if !matches!(record.activation, Activation::Inactive) {
                return Err(TriggerError::AlreadyActive {
                    trigger_id: trigger.id.clone(),
                });
            }
            record.activation = Activation::Activating;
            record.trigger.clone()
        };

        let mut scope = ActivationScope::new();
        let result = mount_trigger(&mut scope, ctx, &current, callback, &self.config).await;

        let mut records = self.records.lock();
        let record = records
            .get_mut(&ctx.space)
            .and_then(|records| records.get_mut(&trigger.id));
        match (result, record) {
            (Ok(()), Some(record)) => {
                record.activation = Activation::Active(scope);
                drop(records);
                tracing::info!(space = %ctx.space, trigger_id = %trigger.id, kind = %current.kind(), "trigger activated");
                Ok(())
            }
            (Ok(()), None) => {
                drop(records);
                scope.dispose();
                tracing::debug!(trigger_id = %trigger.id, "trigger removed while mounting");
                Err(TriggerError::NotRegistered {
                    space: ctx.space.to_string(),
                    trigger_id: trigger.id.clone(),
                })
            }
            (Err(e), record) => {
                if let Some(record) = record {
                    record.activation = Activation::Inactive;
                }
                drop(records);
                scope.dispose();
                tracing::warn!(space = %ctx.space, trigger_id = %trigger.id, error = %e, "trigger activation failed");
                Err(e)
            }
        }
    }

    /// Disposes the activation of a trigger. Returns whether one existed.
    pub fn deactivate(&self, space: &SpaceKey, trigger_id: &str) -> bool {
        let scope = {
            let mut records = self.records.lock();
            let Some(record) = records
                .get_mut(space)
                .and_then(|records| records.get_mut(trigger_id))
            else {
                return false;
            };
            match std::mem::replace(&mut record.activation, Activation::Inactive) {
                Activation::Active(scope) => scope,
                other => {
                    record.activation = other;
                    return false;
                }
            }
        };
        scope.dispose();
        true
    }

    pub fn is_active(&self, space: &SpaceKey, trigger_id: &str) -> bool {
        self.records
            .lock()
            .get(space)
            .and_then(|records| records.get(trigger_id))
            .is_some_and(|record| matches!(record.activation, Activation::Active(_)))
    }

    /// Observable status of a live mount.
    pub fn activation_status(
        &self,
        space: &SpaceKey,
        trigger_id: &str,
    ) -> Option<watch::Receiver<MountStatus>> {
        let records = self.records.lock();
        match &records.get(space)?.get(trigger_id)?.activation {
            Activation::Active(scope) => Some(scope.status()),
            _ => None,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Disposes every activation and stops observing all spaces.
    pub async fn close(&self) {
        let spaces: Vec<(SpaceKey, OpenSpace)> = self.spaces.lock().drain().collect();
        for (_, open) in &spaces {
            open.task.abort();
        }
        for (space, open) in spaces {
            let _ = open.task.await;
            tracing::debug!(space = %space, "space closed");
        }

        let records: Vec<_> = self.records.lock().drain().collect();
        // Scopes dispose on drop, outside the lock.
        drop(records);
    }
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new(HandlerConfig::default())
    }
}

impl Drop for TriggerRegistry {
    fn drop(&mut self) {
        for (_, open) in self.spaces.get_mut().drain() {
            open.task.abort();
        }
    }
}

fn apply_snapshot(
    records: &Records,
    events: &broadcast::Sender<RegistryEvent>,
    space: &SpaceKey,
    objects: &[DbObject],
) {
    let mut current = BTreeMap::new();
    for object in objects {
        match Trigger::from_object(object) {
            Ok(trigger) => {
                current.insert(trigger.id.clone(), trigger);
            }
            Err(e) => {
                tracing::warn!(space = %space, object_id = %object.id, error = %e, "skipping undecodable trigger");
            }
        }
    }

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut updated = Vec::new();
    let mut stale = Vec::new();
    {
        let mut all = records.lock();
        let known = all.entry(space.clone()).or_default();

        let gone: Vec<String> = known
            .keys()
            .filter(|id| !current.contains_key(*id))
            .cloned()
            .collect();
        for id in gone {
            if let Some(record) = known.remove(&id) {
                removed.push(record);
            }
        }

        for (id, trigger) in current {
            match known.get_mut(&id) {
                Some(record) => {
                    let remount = requires_remount(&record.trigger.spec, &trigger.spec)
                        && matches!(record.activation, Activation::Active(_));
                    if remount {
                        if let Activation::Active(scope) =
                            std::mem::replace(&mut record.activation, Activation::Inactive)
                        {
                            stale.push(scope);
                        }
                        updated.push(trigger.clone());
                    }
                    record.trigger = trigger;
                }
                None => {
                    added.push(trigger.clone());
                    known.insert(
                        id,
                        Record {
                            trigger,
                            activation: Activation::Inactive,
                        },
                    );
                }
            }
        }
    }

    if !removed.is_empty() {
        // Dropping a record disposes its scope.
        let triggers: Vec<Trigger> = removed.into_iter().map(|record| record.trigger).collect();
        tracing::info!(space = %space, count = triggers.len(), "triggers removed");
        let _ = events.send(RegistryEvent::Removed {
            space: space.clone(),
            triggers,
        });
    }
    for scope in stale {
        scope.dispose();
    }
    if !updated.is_empty() {
        tracing::info!(space = %space, count = updated.len(), "live triggers changed, activations disposed");
        let _ = events.send(RegistryEvent::Updated {
            space: space.clone(),
            triggers: updated,
        });
    }
    if !added.is_empty() {
        tracing::info!(space = %space, count = added.len(), "triggers registered");
        let _ = events.send(RegistryEvent::Registered {
            space: space.clone(),
            triggers: added,
        });
    }
}

/// Whether a spec edit invalidates a live mount. A webhook gaining the port
/// it was bound to is its own write-back, not an edit.
fn requires_remount(old: &TriggerSpec, new: &TriggerSpec) -> bool {
    match (old, new) {
        (TriggerSpec::Webhook(old), TriggerSpec::Webhook(new)) => {
            old.method != new.method || (old.port.is_some() && old.port != new.port)
        }
        _ => old != new,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::defaults::InMemoryDatabase;
    use crate::triggers::callback_fn;

    fn noop_callback() -> Arc<dyn TriggerCallback> {
        Arc::new(callback_fn(|_| async { None }))
    }

    fn counting_callback() -> (Arc<dyn TriggerCallback>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let callback = callback_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { None }
        });
        (Arc::new(callback), calls)
    }

    async fn next_event(rx: &mut broadcast::Receiver<RegistryEvent>) -> RegistryEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event in time")
            .expect("channel open")
    }

    async fn open(
        registry: &TriggerRegistry,
    ) -> (SpaceKey, Arc<InMemoryDatabase>, TriggerContext) {
        let space = SpaceKey::new("space-1");
        let db = Arc::new(InMemoryDatabase::new());
        registry
            .open_space(space.clone(), db.clone())
            .await
            .expect("open space");
        let ctx = TriggerContext::new(space.clone(), db.clone());
        (space, db, ctx)
    }

    fn yearly(id: &str) -> Trigger {
        Trigger::new(TriggerSpec::timer("0 0 1 1 *")).with_id(id)
    }

    #[tokio::test]
    async fn test_register_announces_triggers_once() {
        let registry = TriggerRegistry::default();
        let mut events = registry.subscribe_events();
        let (space, db, _ctx) = open(&registry).await;

        let function = SerializedFunction {
            key: "example.echo".into(),
            name: "echo".into(),
            description: None,
            input_schema: None,
            output_schema: None,
            services: Default::default(),
            deployment_id: None,
        };
        let manifest = RegistryManifest {
            functions: vec![function.clone(), function],
            triggers: vec![yearly("t1"), yearly("t1"), yearly("t2")],
        };
        registry
            .register(&space, manifest.clone())
            .await
            .expect("register");

        let mut announced = BTreeSet::new();
        while announced.len() < 2 {
            match next_event(&mut events).await {
                RegistryEvent::Registered { triggers, .. } => {
                    announced.extend(triggers.into_iter().map(|t| t.id));
                }
                other => panic!("expected Registered, got: {other:?}"),
            }
        }
        assert_eq!(db.len(), 3);

        registry.register(&space, manifest).await.expect("register again");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(db.len(), 3);
        assert!(events.try_recv().is_err(), "no duplicate announcements");
        assert_eq!(registry.get_inactive_triggers(&space).len(), 2);
    }

    #[tokio::test]
    async fn test_register_requires_open_space() {
        let registry = TriggerRegistry::default();
        match registry
            .register(&SpaceKey::new("closed"), RegistryManifest::default())
            .await
        {
            Err(TriggerError::SpaceNotOpen { space }) => assert_eq!(space, "closed"),
            other => panic!("expected SpaceNotOpen, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_existing_triggers_known_after_open() {
        let registry = TriggerRegistry::default();
        let space = SpaceKey::new("space-1");
        let db = Arc::new(InMemoryDatabase::new());
        db.add(yearly("pre").to_object().expect("object"))
            .await
            .expect("add");
        registry
            .open_space(space.clone(), db.clone())
            .await
            .expect("open");
        let ids: Vec<String> = registry.triggers(&space).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["pre".to_string()]);
    }

    #[tokio::test]
    async fn test_activate_unregistered_trigger() {
        let registry = TriggerRegistry::default();
        let (_space, _db, ctx) = open(&registry).await;
        match registry.activate(&ctx, &yearly("ghost"), noop_callback()).await {
            Err(TriggerError::NotRegistered { trigger_id, .. }) => assert_eq!(trigger_id, "ghost"),
            other => panic!("expected NotRegistered, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_activate_once() {
        let registry = TriggerRegistry::default();
        let (space, db, ctx) = open(&registry).await;
        let trigger = yearly("t1");
        db.add(trigger.to_object().expect("object")).await.expect("add");
        tokio::time::sleep(Duration::from_millis(50)).await;

        registry
            .activate(&ctx, &trigger, noop_callback())
            .await
            .expect("activate");
        assert!(registry.is_active(&space, "t1"));
        assert!(registry.get_inactive_triggers(&space).is_empty());
        let status = registry
            .activation_status(&space, "t1")
            .expect("live mount");
        assert_eq!(*status.borrow(), MountStatus::Ready);

        match registry.activate(&ctx, &trigger, noop_callback()).await {
            Err(TriggerError::AlreadyActive { trigger_id }) => assert_eq!(trigger_id, "t1"),
            other => panic!("expected AlreadyActive, got: {other:?}"),
        }

        assert!(registry.deactivate(&space, "t1"));
        assert!(!registry.deactivate(&space, "t1"));
        assert_eq!(registry.get_inactive_triggers(&space).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_mount_stays_inactive() {
        let registry = TriggerRegistry::default();
        let (space, db, ctx) = open(&registry).await;
        let trigger = Trigger::new(TriggerSpec::queue("jobs")).with_id("q1");
        db.add(trigger.to_object().expect("object")).await.expect("add");
        tokio::time::sleep(Duration::from_millis(50)).await;

        match registry.activate(&ctx, &trigger, noop_callback()).await {
            Err(TriggerError::Unsupported { .. }) => {}
            other => panic!("expected Unsupported, got: {other:?}"),
        }
        assert!(!registry.is_active(&space, "q1"));
        assert_eq!(registry.get_inactive_triggers(&space).len(), 1);
    }

    #[tokio::test]
    async fn test_removal_disposes_activation() {
        let registry = TriggerRegistry::default();
        let (space, db, ctx) = open(&registry).await;
        let trigger = yearly("t1");
        db.add(trigger.to_object().expect("object")).await.expect("add");
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry
            .activate(&ctx, &trigger, noop_callback())
            .await
            .expect("activate");
        let mut status = registry.activation_status(&space, "t1").expect("live");
        let mut events = registry.subscribe_events();

        assert!(db.remove("t1").await.expect("remove"));
        match next_event(&mut events).await {
            RegistryEvent::Removed { triggers, .. } => assert_eq!(triggers[0].id, "t1"),
            other => panic!("expected Removed, got: {other:?}"),
        }
        status.changed().await.expect("status update");
        assert_eq!(*status.borrow(), MountStatus::Closed);
        assert!(registry.triggers(&space).is_empty());
    }

    #[tokio::test]
    async fn test_removed_subscription_stops_firing() {
        let registry = TriggerRegistry::default();
        let (space, db, ctx) = open(&registry).await;
        let trigger = Trigger::new(TriggerSpec::subscription(Filter::of_type("example.task")))
            .with_id("s1");
        db.add(trigger.to_object().expect("object")).await.expect("add");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (callback, calls) = counting_callback();
        registry
            .activate(&ctx, &trigger, callback)
            .await
            .expect("activate");

        db.add(DbObject::new("example.task", json!({"n": 1})))
            .await
            .expect("add task");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let mut events = registry.subscribe_events();
        assert!(db.remove("s1").await.expect("remove"));
        match next_event(&mut events).await {
            RegistryEvent::Removed { triggers, .. } => assert_eq!(triggers[0].id, "s1"),
            other => panic!("expected Removed, got: {other:?}"),
        }
        assert!(!registry.is_active(&space, "s1"));

        db.add(DbObject::new("example.task", json!({"n": 2})))
            .await
            .expect("add task");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spec_edit_disposes_live_mount() {
        let registry = TriggerRegistry::default();
        let (space, db, ctx) = open(&registry).await;
        let trigger = yearly("t1");
        db.add(trigger.to_object().expect("object")).await.expect("add");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (callback, calls) = counting_callback();
        registry
            .activate(&ctx, &trigger, Arc::clone(&callback))
            .await
            .expect("activate");
        let mut status = registry.activation_status(&space, "t1").expect("live");
        let mut events = registry.subscribe_events();

        let every_second = Trigger::new(TriggerSpec::timer("* * * * * *")).with_id("t1");
        db.add(every_second.to_object().expect("object"))
            .await
            .expect("edit");
        match next_event(&mut events).await {
            RegistryEvent::Updated { triggers, .. } => {
                assert_eq!(triggers[0].spec, TriggerSpec::timer("* * * * * *"));
            }
            other => panic!("expected Updated, got: {other:?}"),
        }
        status.changed().await.expect("status update");
        assert_eq!(*status.borrow(), MountStatus::Closed);
        assert!(!registry.is_active(&space, "t1"));

        let inactive = registry.get_inactive_triggers(&space);
        assert_eq!(inactive.len(), 1);
        registry
            .activate(&ctx, &inactive[0], callback)
            .await
            .expect("reactivate");
        tokio::time::timeout(Duration::from_secs(3), async {
            while calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("edited schedule fires");
    }

    #[tokio::test]
    async fn test_non_spec_edit_keeps_live_mount() {
        let registry = TriggerRegistry::default();
        let (space, db, ctx) = open(&registry).await;
        let trigger = yearly("t1");
        db.add(trigger.to_object().expect("object")).await.expect("add");
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry
            .activate(&ctx, &trigger, noop_callback())
            .await
            .expect("activate");

        let relabelled = yearly("t1").with_input(json!({"x": 1}));
        db.add(relabelled.to_object().expect("object"))
            .await
            .expect("edit");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.is_active(&space, "t1"));
        assert_eq!(registry.triggers(&space)[0].input, Some(json!({"x": 1})));
    }

    #[test]
    fn test_webhook_port_write_back_is_not_an_edit() {
        let unbound = TriggerSpec::webhook("POST");
        let mut bound = TriggerSpec::webhook("POST");
        if let TriggerSpec::Webhook(spec) = &mut bound {
            spec.port = Some(4100);
        }
        let mut moved = bound.clone();
        if let TriggerSpec::Webhook(spec) = &mut moved {
            spec.port = Some(4200);
        }
        assert!(!requires_remount(&unbound, &bound));
        assert!(requires_remount(&bound, &moved));
        assert!(requires_remount(&unbound, &TriggerSpec::webhook("GET")));
        assert!(requires_remount(
            &TriggerSpec::timer("0 0 1 1 *"),
            &TriggerSpec::timer("* * * * * *")
        ));
    }

    #[tokio::test]
    async fn test_updates_refresh_trigger_data() {
        let registry = TriggerRegistry::default();
        let (space, db, _ctx) = open(&registry).await;
        db.add(yearly("t1").to_object().expect("object")).await.expect("add");
        tokio::time::sleep(Duration::from_millis(50)).await;

        let disabled = yearly("t1").with_enabled(false).with_input(json!({"x": 1}));
        db.add(disabled.to_object().expect("object")).await.expect("add");
        tokio::time::sleep(Duration::from_millis(50)).await;

        let known = registry.triggers(&space);
        assert_eq!(known.len(), 1);
        assert!(!known[0].enabled);
        assert_eq!(known[0].input, Some(json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_close_disposes_everything() {
        let registry = TriggerRegistry::default();
        let (space, db, ctx) = open(&registry).await;
        let trigger = yearly("t1");
        db.add(trigger.to_object().expect("object")).await.expect("add");
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry
            .activate(&ctx, &trigger, noop_callback())
            .await
            .expect("activate");
        let status = registry.activation_status(&space, "t1").expect("live");

        registry.close().await;
        assert_eq!(*status.borrow(), MountStatus::Closed);
        assert!(registry.triggers(&space).is_empty());
        match registry.register(&space, RegistryManifest::default()).await {
            Err(TriggerError::SpaceNotOpen { .. }) => {}
            other => panic!("expected SpaceNotOpen, got: {other:?}"),
        }
    }
}
