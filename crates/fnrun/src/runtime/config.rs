//! Configuration for the runtime's components.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::TriggerKind;

/// How the dispatcher's clock advances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeControl {
    /// Wall clock; `start()` runs the polling loop.
    #[default]
    Natural,
    /// Time only moves through `advance_time`. For deterministic tests.
    Manual,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub time_control: TimeControl,
    /// Initial clock in manual mode. Defaults to the wall clock at build time.
    pub starting_time: Option<DateTime<Utc>>,
    /// Period of the natural-mode polling loop.
    pub live_poll_interval: Duration,
    /// Kinds the dispatcher drives. The runtime only live-mounts the
    /// remaining kinds, so each kind has exactly one driver.
    pub polled_kinds: Vec<TriggerKind>,
}

impl DispatcherConfig {
    pub fn manual(starting_time: DateTime<Utc>) -> Self {
        Self {
            time_control: TimeControl::Manual,
            starting_time: Some(starting_time),
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.live_poll_interval = interval;
        self
    }

    /// Restricts polling to `kinds`; other kinds are left to live mounts.
    pub fn with_polled_kinds(mut self, kinds: impl IntoIterator<Item = TriggerKind>) -> Self {
        self.polled_kinds = kinds.into_iter().collect();
        self
    }

    pub fn polls(&self, kind: TriggerKind) -> bool {
        self.polled_kinds.contains(&kind)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            time_control: TimeControl::Natural,
            starting_time: None,
            live_poll_interval: Duration::from_secs(1),
            polled_kinds: TriggerKind::SCHEDULED.to_vec(),
        }
    }
}

/// Connection policy for websocket triggers.
#[derive(Debug, Clone)]
pub struct WebsocketConfig {
    /// Connection attempts per (re)connect cycle.
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `n² × retry_delay`.
    pub retry_delay: Duration,
}

impl Default for WebsocketConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Batching for subscription triggers.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Debounce before delivering changed objects, unless the trigger sets
    /// its own `delay`.
    pub delay: Duration,
    /// Debounce for parents re-fired by referenced object changes.
    pub deep_delay: Duration,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
            deep_delay: Duration::from_millis(250),
        }
    }
}

/// Endpoint of the deployed-function service.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl RemoteConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Reads `FNRUN_REMOTE_ENDPOINT`, if set.
    pub fn from_env() -> Option<Self> {
        std::env::var("FNRUN_REMOTE_ENDPOINT").ok().map(Self::new)
    }
}
