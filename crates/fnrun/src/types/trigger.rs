//! Trigger types: how function invocations are initiated.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{DbObject, Filter, ObjectRef};
use crate::errors::DatabaseError;

/// Typename of stored trigger objects.
pub const TRIGGER_TYPENAME: &str = "fnrun.trigger";

/// A persisted rule binding a function to a firing condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<ObjectRef>,
    #[serde(default)]
    pub enabled: bool,
    pub spec: TriggerSpec,
    /// Input template. String leaves may be `{{trigger.*}}` or `{{event.*}}`
    /// placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

impl Trigger {
    /// New enabled trigger with a random id.
    pub fn new(spec: TriggerSpec) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            function: None,
            enabled: true,
            spec,
            input: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_function(mut self, function: ObjectRef) -> Self {
        self.function = Some(function);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn kind(&self) -> TriggerKind {
        self.spec.kind()
    }

    pub fn to_object(&self) -> Result<DbObject, DatabaseError> {
        let data = serde_json::to_value(self).map_err(|e| DatabaseError::Decode {
            id: self.id.clone(),
            message: e.to_string(),
        })?;
        Ok(DbObject::with_id(self.id.clone(), TRIGGER_TYPENAME, data))
    }

    /// Decode a stored trigger. The object id wins over any id in the data.
    pub fn from_object(object: &DbObject) -> Result<Self, DatabaseError> {
        if object.typename != TRIGGER_TYPENAME {
            return Err(DatabaseError::Decode {
                id: object.id.clone(),
                message: format!("expected {TRIGGER_TYPENAME}, found {}", object.typename),
            });
        }
        let mut data = object.data.clone();
        if let Value::Object(map) = &mut data {
            map.insert("id".into(), Value::String(object.id.clone()));
        }
        serde_json::from_value(data).map_err(|e| DatabaseError::Decode {
            id: object.id.clone(),
            message: e.to_string(),
        })
    }
}

/// Kind discriminant of a [`TriggerSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Timer,
    Webhook,
    Websocket,
    Subscription,
    Queue,
}

impl TriggerKind {
    /// Kinds the dispatcher polls.
    pub const SCHEDULED: [TriggerKind; 3] =
        [TriggerKind::Timer, TriggerKind::Queue, TriggerKind::Subscription];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Webhook => "webhook",
            Self::Websocket => "websocket",
            Self::Subscription => "subscription",
            Self::Queue => "queue",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind trigger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSpec {
    Timer(TimerSpec),
    Webhook(WebhookSpec),
    Websocket(WebsocketSpec),
    Subscription(SubscriptionSpec),
    Queue(QueueSpec),
}

impl TriggerSpec {
    pub fn timer(cron: impl Into<String>) -> Self {
        Self::Timer(TimerSpec { cron: cron.into() })
    }

    pub fn webhook(method: impl Into<String>) -> Self {
        Self::Webhook(WebhookSpec {
            method: method.into(),
            port: None,
        })
    }

    pub fn websocket(url: impl Into<String>) -> Self {
        Self::Websocket(WebsocketSpec {
            url: url.into(),
            init: None,
        })
    }

    pub fn subscription(query: Filter) -> Self {
        Self::Subscription(SubscriptionSpec {
            query,
            options: SubscriptionOptions::default(),
        })
    }

    pub fn queue(queue: impl Into<String>) -> Self {
        Self::Queue(QueueSpec {
            queue: queue.into(),
        })
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Timer(_) => TriggerKind::Timer,
            Self::Webhook(_) => TriggerKind::Webhook,
            Self::Websocket(_) => TriggerKind::Websocket,
            Self::Subscription(_) => TriggerKind::Subscription,
            Self::Queue(_) => TriggerKind::Queue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSpec {
    /// 5, 6 or 7 field cron expression.
    pub cron: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSpec {
    pub method: String,
    /// Listener port. Filled in with the bound port once mounted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsocketSpec {
    pub url: String,
    /// Sent as JSON once the connection opens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    #[serde(alias = "filter")]
    pub query: Filter,
    #[serde(default)]
    pub options: SubscriptionOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    /// Also fire when objects referenced by the matches change.
    #[serde(default)]
    pub deep: bool,
    /// Debounce delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSpec {
    pub queue: String,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Kind of change reported by a subscription event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
}

/// Payload delivered with a trigger invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerEvent {
    Timer {
        /// Epoch millis of the tick.
        tick: i64,
    },
    Webhook {
        method: String,
        #[serde(default)]
        body: Value,
    },
    Websocket {
        data: Value,
    },
    /// One object seen by the dispatcher's subscription poll.
    Subscription {
        #[serde(rename = "type")]
        change: ChangeType,
        changed_object_id: String,
        subject: ObjectRef,
    },
    /// Batch of changed object ids from a live subscription mount.
    ObjectsChanged {
        objects: Vec<String>,
    },
    Queue {
        queue: String,
        item: Value,
        cursor: u64,
    },
    Manual {
        #[serde(default)]
        data: Value,
    },
}

impl TriggerEvent {
    /// The event's fields without the `kind` tag.
    pub fn payload(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => {
                map.remove("kind");
                Value::Object(map)
            }
            _ => Value::Object(Map::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Persisted progress of a polled trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerState {
    pub trigger_id: String,
    pub progress: TriggerProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerProgress {
    Queue {
        /// Position of the last consumed item.
        cursor: u64,
    },
    Subscription {
        /// Object id to last processed version.
        processed_versions: BTreeMap<String, u64>,
    },
}

impl TriggerState {
    pub fn queue(trigger_id: impl Into<String>, cursor: u64) -> Self {
        Self {
            trigger_id: trigger_id.into(),
            progress: TriggerProgress::Queue { cursor },
        }
    }

    pub fn subscription(trigger_id: impl Into<String>, versions: BTreeMap<String, u64>) -> Self {
        Self {
            trigger_id: trigger_id.into(),
            progress: TriggerProgress::Subscription {
                processed_versions: versions,
            },
        }
    }
}

/// Context exposed to input templates.
pub(crate) fn template_scope(trigger: &Trigger, event: Option<&TriggerEvent>) -> Value {
    json!({
        "trigger": {
            "id": trigger.id,
            "kind": trigger.kind(),
            "function": trigger.function,
        },
        "event": event.map(TriggerEvent::payload).unwrap_or_else(|| json!({})),
    })
}
