//! Database-backed trigger dispatcher.
//!
//! Polls the persisted triggers of one space and invokes the ones that are
//! due: timers by cron schedule, queue triggers per unconsumed item and
//! subscription triggers per new object version. Time is either the wall
//! clock or a manually advanced clock for deterministic tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::input::effective_input;
use super::schedule::{next_occurrence, parse_cron};
use super::tracer::LogInvocationTracer;
use crate::defaults::{InMemoryTriggerState, QueueTracingSink};
use crate::errors::DispatchError;
use crate::executor::FunctionInvocationService;
use crate::runtime::{DispatcherConfig, TimeControl};
use crate::services::InvocationContext;
use crate::traits::{Database, InvocationTracer, QueueService, TriggerStateStore};
use crate::types::{
    ChangeType, Filter, InvocationTrace, ObjectRef, SerializedFunction, SpaceKey, TraceStart,
    Trigger, TriggerEvent, TriggerKind, TriggerProgress, TriggerSpec, TriggerState,
    TRIGGER_TYPENAME,
};

/// A timer trigger in the dispatcher's schedule table.
#[derive(Debug, Clone)]
pub struct ScheduledTrigger {
    pub trigger: Trigger,
    /// Source expression; a change forces a recompute.
    pub cron: String,
    pub next_execution: DateTime<Utc>,
    schedule: Schedule,
}

/// Arguments for [`TriggerDispatcher::invoke_trigger`].
#[derive(Debug, Clone)]
pub struct InvokeTriggerOptions {
    pub trigger: Trigger,
    pub event: Option<TriggerEvent>,
    /// Explicit input; bypasses the trigger's input template.
    pub data: Option<Value>,
}

impl InvokeTriggerOptions {
    pub fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            event: None,
            data: None,
        }
    }

    pub fn event(mut self, event: TriggerEvent) -> Self {
        self.event = Some(event);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug)]
pub struct TriggerExecutionResult {
    pub trigger_id: String,
    /// Name of the invoked function, once it was loaded.
    pub function_name: Option<String>,
    pub result: Result<Value, DispatchError>,
}

struct Running {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

pub struct TriggerDispatcher {
    database: Arc<dyn Database>,
    space: Option<SpaceKey>,
    invocation: Arc<FunctionInvocationService>,
    tracer: Arc<dyn InvocationTracer>,
    state: Arc<dyn TriggerStateStore>,
    queues: Option<Arc<dyn QueueService>>,
    config: DispatcherConfig,
    clock: Mutex<DateTime<Utc>>,
    schedule: Mutex<BTreeMap<String, ScheduledTrigger>>,
    /// Serializes queue and subscription polls, whose progress is a
    /// read-modify-write of the state store.
    poll_lock: tokio::sync::Mutex<()>,
    running: Mutex<Option<Running>>,
}

/// Fluent builder for [`TriggerDispatcher`].
pub struct TriggerDispatcherBuilder {
    database: Arc<dyn Database>,
    invocation: Arc<FunctionInvocationService>,
    space: Option<SpaceKey>,
    tracer: Option<Arc<dyn InvocationTracer>>,
    state: Option<Arc<dyn TriggerStateStore>>,
    queues: Option<Arc<dyn QueueService>>,
    config: DispatcherConfig,
}

impl TriggerDispatcherBuilder {
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn space(mut self, space: SpaceKey) -> Self {
        self.space = Some(space);
        self
    }

    pub fn tracer(mut self, tracer: Arc<dyn InvocationTracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn state_store(mut self, state: Arc<dyn TriggerStateStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// Queue backend for queue triggers and per-invocation trace queues.
    pub fn queues(mut self, queues: Arc<dyn QueueService>) -> Self {
        self.queues = Some(queues);
        self
    }

    pub fn build(self) -> Arc<TriggerDispatcher> {
        let starting_time = self.config.starting_time.unwrap_or_else(Utc::now);
        Arc::new(TriggerDispatcher {
            database: self.database,
            space: self.space,
            invocation: self.invocation,
            tracer: self
                .tracer
                .unwrap_or_else(|| Arc::new(LogInvocationTracer)),
            state: self
                .state
                .unwrap_or_else(|| Arc::new(InMemoryTriggerState::new())),
            queues: self.queues,
            config: self.config,
            clock: Mutex::new(starting_time),
            schedule: Mutex::new(BTreeMap::new()),
            poll_lock: tokio::sync::Mutex::new(()),
            running: Mutex::new(None),
        })
    }
}

impl TriggerDispatcher {
    pub fn builder(
        database: Arc<dyn Database>,
        invocation: Arc<FunctionInvocationService>,
    ) -> TriggerDispatcherBuilder {
        TriggerDispatcherBuilder {
            database,
            invocation,
            space: None,
            tracer: None,
            state: None,
            queues: None,
            config: DispatcherConfig::default(),
        }
    }

    pub fn time_control(&self) -> TimeControl {
        self.config.time_control
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Spawns the polling loop. Natural time only; idempotent while running.
    pub fn start(self: &Arc<Self>) -> Result<(), DispatchError> {
        if self.config.time_control == TimeControl::Manual {
            return Err(DispatchError::defect(
                "cannot start a dispatcher with manual time control",
            ));
        }
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let dispatcher: Weak<Self> = Arc::downgrade(self);
        let period = self.config.live_poll_interval;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(dispatcher) = dispatcher.upgrade() else {
                            return;
                        };
                        dispatcher.poll_once().await;
                    }
                    _ = shutdown_rx.recv() => return,
                }
            }
        });
        tracing::info!(interval_ms = period.as_millis() as u64, "trigger dispatcher started");
        *running = Some(Running { shutdown_tx, task });
        Ok(())
    }

    /// Interrupts the polling loop and clears the schedule table. Persisted
    /// triggers are untouched.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(running) = running {
            // Receivers may already be gone.
            let _ = running.shutdown_tx.send(());
            running.task.abort();
            let _ = running.task.await;
            tracing::info!("trigger dispatcher stopped");
        }
        self.schedule.lock().clear();
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    async fn poll_once(&self) {
        match self.invoke_scheduled_triggers().await {
            Ok(results) => {
                if !results.is_empty() {
                    let failed = results.iter().filter(|r| r.result.is_err()).count();
                    tracing::debug!(invoked = results.len(), failed, "dispatcher poll complete");
                }
            }
            Err(e) => tracing::error!(error = %e, "dispatcher poll failed"),
        }
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    pub fn get_current_time(&self) -> DateTime<Utc> {
        match self.config.time_control {
            TimeControl::Natural => Utc::now(),
            TimeControl::Manual => *self.clock.lock(),
        }
    }

    /// Moves the manual clock forward. Never invokes anything by itself.
    pub fn advance_time(&self, duration: Duration) -> Result<DateTime<Utc>, DispatchError> {
        if self.config.time_control == TimeControl::Natural {
            return Err(DispatchError::defect(
                "advance_time requires manual time control",
            ));
        }
        let delta = chrono::Duration::from_std(duration)
            .map_err(|e| DispatchError::defect(format!("duration out of range: {e}")))?;
        let mut clock = self.clock.lock();
        *clock += delta;
        tracing::trace!(now = %*clock, "manual clock advanced");
        Ok(*clock)
    }

    // -----------------------------------------------------------------------
    // Invocation
    // -----------------------------------------------------------------------

    pub async fn load_trigger(&self, reference: &ObjectRef) -> Result<Option<Trigger>, DispatchError> {
        match self.database.load(reference).await? {
            Some(object) => Ok(Some(Trigger::from_object(&object)?)),
            None => Ok(None),
        }
    }

    async fn load_function(&self, trigger: &Trigger) -> Result<SerializedFunction, DispatchError> {
        if !trigger.enabled {
            return Err(DispatchError::defect(format!(
                "trigger {} is disabled",
                trigger.id
            )));
        }
        let Some(reference) = &trigger.function else {
            return Err(DispatchError::defect(format!(
                "trigger {} has no function",
                trigger.id
            )));
        };
        let object = self
            .database
            .load(reference)
            .await?
            .ok_or_else(|| DispatchError::FunctionNotFound {
                reference: reference.id.clone(),
            })?;
        Ok(SerializedFunction::from_object(&object)?)
    }

    /// Invokes the trigger's function once. Failures, including refusals
    /// for disabled triggers or missing functions, are traced and reported
    /// in the result, never returned.
    pub async fn invoke_trigger(&self, options: InvokeTriggerOptions) -> TriggerExecutionResult {
        let trigger = &options.trigger;
        let input = effective_input(trigger, options.event.as_ref(), options.data.clone());
        let trace = self
            .tracer
            .trace_start(TraceStart {
                input: input.clone(),
                target: trigger.function.clone(),
                trigger: Some(ObjectRef::new(trigger.id.clone())),
            })
            .await;

        let (function_name, result) = match self.load_function(trigger).await {
            Ok(function) => {
                let result = self.execute(&options, &function, input, &trace).await;
                (Some(function.name), result)
            }
            Err(e) => {
                if e.is_defect() {
                    tracing::error!(trigger_id = %trigger.id, invocation_id = %trace.invocation_id, error = %e, "refusing to invoke trigger");
                } else {
                    tracing::warn!(trigger_id = %trigger.id, invocation_id = %trace.invocation_id, error = %e, "cannot invoke trigger");
                }
                (None, Err(e))
            }
        };

        self.tracer
            .trace_end(&trace, result.as_ref().err().map(ToString::to_string))
            .await;
        TriggerExecutionResult {
            trigger_id: trigger.id.clone(),
            function_name,
            result,
        }
    }

    async fn execute(
        &self,
        options: &InvokeTriggerOptions,
        function: &SerializedFunction,
        input: Value,
        trace: &InvocationTrace,
    ) -> Result<Value, DispatchError> {
        let trigger = &options.trigger;
        let mut ctx = match &self.space {
            Some(space) => InvocationContext::new().with_space(space.clone(), Arc::clone(&self.database)),
            None => InvocationContext::new().with_database(Arc::clone(&self.database)),
        }
        .with_trigger(trigger.id.clone());
        if let Some(TriggerEvent::Subscription { subject, .. }) = &options.event {
            ctx = ctx.with_subject(subject.id.clone());
        }
        if let (Some(queue), Some(queues)) = (&trace.trace_queue, &self.queues) {
            ctx = ctx.with_tracing(Arc::new(QueueTracingSink::new(Arc::clone(queues), queue.clone())));
        }

        let result = self
            .invocation
            .invoke_function(function, input, function.deployment_id.as_deref(), &ctx)
            .await
            .map_err(DispatchError::from);

        match &result {
            Ok(_) => tracing::info!(
                trigger_id = %trigger.id,
                function = %function.name,
                invocation_id = %trace.invocation_id,
                "trigger invocation succeeded"
            ),
            Err(e) => tracing::warn!(
                trigger_id = %trigger.id,
                function = %function.name,
                invocation_id = %trace.invocation_id,
                error = %e,
                "trigger invocation failed"
            ),
        }
        result
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    async fn stored_triggers(&self) -> Result<Vec<Trigger>, DispatchError> {
        let objects = self
            .database
            .query(&Filter::of_type(TRIGGER_TYPENAME))
            .await?;
        Ok(objects
            .iter()
            .filter_map(|object| match Trigger::from_object(object) {
                Ok(trigger) => Some(trigger),
                Err(e) => {
                    tracing::warn!(object_id = %object.id, error = %e, "skipping undecodable trigger");
                    None
                }
            })
            .collect())
    }

    /// Rebuilds the schedule table from the persisted triggers.
    ///
    /// Entries whose cron expression is unchanged keep their next
    /// execution. Disabled, removed and invalid triggers are dropped.
    pub async fn refresh_triggers(&self) -> Result<(), DispatchError> {
        let triggers = self.stored_triggers().await?;
        let now = self.get_current_time();

        let mut schedule = self.schedule.lock();
        let mut refreshed = BTreeMap::new();
        for trigger in triggers {
            if !trigger.enabled {
                continue;
            }
            let TriggerSpec::Timer(spec) = &trigger.spec else {
                continue;
            };
            let cron = spec.cron.clone();

            if let Some(existing) = schedule.remove(&trigger.id) {
                if existing.cron == cron {
                    refreshed.insert(
                        trigger.id.clone(),
                        ScheduledTrigger {
                            trigger,
                            ..existing
                        },
                    );
                    continue;
                }
            }

            let parsed = match parse_cron(&cron) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(trigger_id = %trigger.id, error = %e, "excluding trigger from schedule");
                    continue;
                }
            };
            let Some(next_execution) = next_occurrence(&parsed, now) else {
                tracing::warn!(trigger_id = %trigger.id, cron = %cron, "cron schedule has no upcoming occurrences");
                continue;
            };
            tracing::debug!(trigger_id = %trigger.id, next = %next_execution, "trigger scheduled");
            refreshed.insert(
                trigger.id.clone(),
                ScheduledTrigger {
                    trigger,
                    cron,
                    next_execution,
                    schedule: parsed,
                },
            );
        }
        *schedule = refreshed;
        Ok(())
    }

    /// Snapshot of the schedule table.
    pub fn scheduled_triggers(&self) -> Vec<ScheduledTrigger> {
        self.schedule.lock().values().cloned().collect()
    }

    /// Invokes everything due across the polled kinds (timer, queue and
    /// subscription triggers by default).
    pub async fn invoke_scheduled_triggers(
        &self,
    ) -> Result<Vec<TriggerExecutionResult>, DispatchError> {
        self.invoke_scheduled_triggers_of(&self.config.polled_kinds)
            .await
    }

    /// Whether this dispatcher drives triggers of `kind`.
    pub fn polls(&self, kind: TriggerKind) -> bool {
        self.config.polls(kind)
    }

    pub async fn invoke_scheduled_triggers_of(
        &self,
        kinds: &[TriggerKind],
    ) -> Result<Vec<TriggerExecutionResult>, DispatchError> {
        let mut results = Vec::new();
        for kind in kinds {
            match kind {
                TriggerKind::Timer => results.extend(self.invoke_due_timers().await?),
                TriggerKind::Queue => results.extend(self.poll_queue_triggers().await?),
                TriggerKind::Subscription => {
                    results.extend(self.poll_subscription_triggers().await?)
                }
                TriggerKind::Webhook | TriggerKind::Websocket => {
                    tracing::warn!(kind = %kind, "trigger kind is not dispatched by polling");
                }
            }
        }
        Ok(results)
    }

    async fn invoke_due_timers(&self) -> Result<Vec<TriggerExecutionResult>, DispatchError> {
        self.refresh_triggers().await?;
        let now = self.get_current_time();

        // Selecting and advancing under one lock keeps concurrent polls from
        // picking the same occurrence.
        let due: Vec<Trigger> = {
            let mut schedule = self.schedule.lock();
            let mut due = Vec::new();
            let mut exhausted = Vec::new();
            for (id, entry) in schedule.iter_mut() {
                if entry.next_execution > now {
                    continue;
                }
                due.push(entry.trigger.clone());
                match next_occurrence(&entry.schedule, now) {
                    Some(next) => entry.next_execution = next,
                    None => exhausted.push(id.clone()),
                }
            }
            for id in exhausted {
                schedule.remove(&id);
            }
            due
        };

        if due.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(count = due.len(), now = %now, "invoking due timer triggers");
        let tick = now.timestamp_millis();
        Ok(join_all(due.into_iter().map(|trigger| {
            self.invoke_trigger(InvokeTriggerOptions::new(trigger).event(TriggerEvent::Timer { tick }))
        }))
        .await)
    }

    async fn enabled_of_kind(&self, kind: TriggerKind) -> Result<Vec<Trigger>, DispatchError> {
        Ok(self
            .stored_triggers()
            .await?
            .into_iter()
            .filter(|trigger| trigger.enabled && trigger.kind() == kind)
            .collect())
    }

    /// One item per queue trigger per call, in position order.
    async fn poll_queue_triggers(&self) -> Result<Vec<TriggerExecutionResult>, DispatchError> {
        let triggers = self.enabled_of_kind(TriggerKind::Queue).await?;
        if triggers.is_empty() {
            return Ok(Vec::new());
        }
        let Some(queues) = &self.queues else {
            tracing::warn!(count = triggers.len(), "queue triggers present but no queue service configured");
            return Ok(Vec::new());
        };

        let _guard = self.poll_lock.lock().await;
        let mut results = Vec::new();
        for trigger in triggers {
            let TriggerSpec::Queue(spec) = &trigger.spec else {
                continue;
            };
            let cursor = match self.state.get_state(&trigger.id).await {
                Ok(Some(TriggerState {
                    progress: TriggerProgress::Queue { cursor },
                    ..
                })) => Some(cursor),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(trigger_id = %trigger.id, error = %e, "failed to read queue cursor");
                    continue;
                }
            };
            let item = match queues.query(&spec.queue, cursor, Some(1)).await {
                Ok(mut items) if !items.is_empty() => items.remove(0),
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(trigger_id = %trigger.id, queue = %spec.queue, error = %e, "failed to read queue");
                    continue;
                }
            };

            let event = TriggerEvent::Queue {
                queue: spec.queue.clone(),
                item: item.object,
                cursor: item.position,
            };
            let trigger_id = trigger.id.clone();
            results.push(
                self.invoke_trigger(InvokeTriggerOptions::new(trigger).event(event))
                    .await,
            );
            if let Err(e) = self
                .state
                .save_state(TriggerState::queue(trigger_id.clone(), item.position))
                .await
            {
                tracing::warn!(trigger_id = %trigger_id, error = %e, "failed to save queue cursor");
            }
        }
        Ok(results)
    }

    /// One invocation per object whose version has not been processed.
    async fn poll_subscription_triggers(
        &self,
    ) -> Result<Vec<TriggerExecutionResult>, DispatchError> {
        let triggers = self.enabled_of_kind(TriggerKind::Subscription).await?;
        if triggers.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.poll_lock.lock().await;
        let mut results = Vec::new();
        for trigger in triggers {
            let TriggerSpec::Subscription(spec) = &trigger.spec else {
                continue;
            };
            let processed = match self.state.get_state(&trigger.id).await {
                Ok(Some(TriggerState {
                    progress: TriggerProgress::Subscription { processed_versions },
                    ..
                })) => processed_versions,
                Ok(_) => BTreeMap::new(),
                Err(e) => {
                    tracing::warn!(trigger_id = %trigger.id, error = %e, "failed to read subscription state");
                    continue;
                }
            };
            let objects = match self.database.query(&spec.query).await {
                Ok(objects) => objects,
                Err(e) => {
                    tracing::warn!(trigger_id = %trigger.id, error = %e, "subscription query failed");
                    continue;
                }
            };

            let mut versions = BTreeMap::new();
            let mut changes = Vec::new();
            for object in &objects {
                versions.insert(object.id.clone(), object.version);
                let change = match processed.get(&object.id) {
                    None => ChangeType::Created,
                    Some(version) if *version != object.version => ChangeType::Updated,
                    Some(_) => continue,
                };
                changes.push(TriggerEvent::Subscription {
                    change,
                    changed_object_id: object.id.clone(),
                    subject: object.reference(),
                });
            }
            if changes.is_empty() && versions == processed {
                continue;
            }

            let invocations = changes.into_iter().map(|event| {
                self.invoke_trigger(InvokeTriggerOptions::new(trigger.clone()).event(event))
            });
            results.extend(join_all(invocations).await);

            if let Err(e) = self
                .state
                .save_state(TriggerState::subscription(trigger.id.clone(), versions))
                .await
            {
                tracing::warn!(trigger_id = %trigger.id, error = %e, "failed to save subscription state");
            }
        }
        Ok(results)
    }
}

impl Drop for TriggerDispatcher {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.task.abort();
        }
    }
}
