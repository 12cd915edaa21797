//! Activation scopes: the owned resources of one live trigger mount.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Observable state of a live mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountStatus {
    Mounting,
    /// Timers, webhooks and subscriptions once their resources exist.
    Ready,
    Connecting { attempt: u32 },
    Connected,
    Reconnecting { attempt: u32 },
    Failed { message: String },
    Closed,
}

/// Owns the tasks of one trigger activation.
///
/// Dropping (or [`dispose`](Self::dispose)-ing) the scope signals shutdown and
/// aborts every task synchronously, so no callback fires after disposal
/// returns.
pub struct ActivationScope {
    shutdown_tx: broadcast::Sender<()>,
    status_tx: watch::Sender<MountStatus>,
    disposed: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ActivationScope {
    pub fn new() -> Self {
        Self {
            shutdown_tx: broadcast::channel(1).0,
            status_tx: watch::channel(MountStatus::Mounting).0,
            disposed: Arc::new(AtomicBool::new(false)),
            tasks: Vec::new(),
        }
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(tokio::spawn(task));
    }

    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<MountStatus> {
        self.status_tx.subscribe()
    }

    pub(crate) fn status_sender(&self) -> watch::Sender<MountStatus> {
        self.status_tx.clone()
    }

    pub(crate) fn set_status(&self, status: MountStatus) {
        self.status_tx.send_replace(status);
    }

    pub(crate) fn disposed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.disposed)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn dispose(self) {
        drop(self);
    }
}

impl Default for ActivationScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ActivationScope {
    fn drop(&mut self) {
        self.disposed.store(true, Ordering::SeqCst);
        // No receivers is fine.
        let _ = self.shutdown_tx.send(());
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.status_tx.send_replace(MountStatus::Closed);
    }
}
