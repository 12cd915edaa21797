//! In-memory object store with live queries over tokio broadcast channels.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};

use crate::errors::DatabaseError;
use crate::traits::{Database, LiveQuery};
use crate::types::{DbObject, Filter, ObjectRef, QuerySnapshot};

const BROADCAST_CAPACITY: usize = 1000;
const SNAPSHOT_CAPACITY: usize = 64;

type Objects = Arc<RwLock<BTreeMap<String, DbObject>>>;

#[derive(Clone)]
struct Change {
    object: DbObject,
    removed: bool,
}

/// In-memory [`Database`] for one space.
///
/// Every write is broadcast; each live query bridges the broadcast into its
/// own mpsc channel and re-evaluates its filter on relevant changes.
pub struct InMemoryDatabase {
    objects: Objects,
    changes: broadcast::Sender<Change>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            changes: broadcast::channel(BROADCAST_CAPACITY).0,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

fn matching(objects: &Objects, filter: &Filter) -> Vec<DbObject> {
    objects
        .read()
        .values()
        .filter(|object| filter.matches(object))
        .cloned()
        .collect()
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn query(&self, filter: &Filter) -> Result<Vec<DbObject>, DatabaseError> {
        Ok(matching(&self.objects, filter))
    }

    async fn load(&self, reference: &ObjectRef) -> Result<Option<DbObject>, DatabaseError> {
        Ok(self.objects.read().get(&reference.id).cloned())
    }

    async fn add(&self, mut object: DbObject) -> Result<DbObject, DatabaseError> {
        {
            let mut objects = self.objects.write();
            let previous = objects.get(&object.id).map(|o| o.version).unwrap_or(0);
            object.version = previous.max(object.version) + 1;
            objects.insert(object.id.clone(), object.clone());
        }
        // No live queries is not an error.
        let _ = self.changes.send(Change {
            object: object.clone(),
            removed: false,
        });
        Ok(object)
    }

    async fn remove(&self, id: &str) -> Result<bool, DatabaseError> {
        let removed = self.objects.write().remove(id);
        match removed {
            Some(object) => {
                let _ = self.changes.send(Change {
                    object,
                    removed: true,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn subscribe(&self, filter: &Filter) -> Result<LiveQuery, DatabaseError> {
        let (tx, rx) = mpsc::channel(SNAPSHOT_CAPACITY);
        // Subscribe before the initial read so no write falls in between.
        let mut changes = self.changes.subscribe();
        let initial = QuerySnapshot {
            objects: matching(&self.objects, filter),
            changed: Vec::new(),
        };
        tx.try_send(initial).map_err(|e| DatabaseError::Store {
            message: format!("failed to deliver initial snapshot: {e}"),
        })?;

        let objects = Arc::clone(&self.objects);
        let filter = filter.clone();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        if !filter.matches(&change.object) {
                            continue;
                        }
                        let changed = if change.removed {
                            Vec::new()
                        } else {
                            vec![change.object.id.clone()]
                        };
                        let snapshot = QuerySnapshot {
                            objects: matching(&objects, &filter),
                            changed,
                        };
                        if tx.send(snapshot).await.is_err() {
                            break; // live query dropped
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "live query lagged behind database writes");
                        continue;
                    }
                }
            }
        });

        Ok(LiveQuery { rx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_add_bumps_version() {
        let db = InMemoryDatabase::new();
        let first = db
            .add(DbObject::with_id("o1", "example.task", json!({"n": 1})))
            .await
            .expect("add");
        assert_eq!(first.version, 1);

        let second = db
            .add(DbObject::with_id("o1", "example.task", json!({"n": 2})))
            .await
            .expect("add");
        assert_eq!(second.version, 2);

        let loaded = db
            .load(&ObjectRef::new("o1"))
            .await
            .expect("load")
            .expect("present");
        assert_eq!(loaded.data, json!({"n": 2}));
        assert_eq!(db.len(), 1);
    }

    #[tokio::test]
    async fn test_live_query_reports_changes() {
        let db = InMemoryDatabase::new();
        db.add(DbObject::with_id("a", "example.task", json!({})))
            .await
            .expect("add");

        let mut live = db
            .subscribe(&Filter::of_type("example.task"))
            .await
            .expect("subscribe");

        let initial = live.rx.recv().await.expect("initial snapshot");
        assert_eq!(initial.objects.len(), 1);
        assert!(initial.changed.is_empty());

        db.add(DbObject::with_id("other", "example.other", json!({})))
            .await
            .expect("add");
        db.add(DbObject::with_id("b", "example.task", json!({})))
            .await
            .expect("add");

        let update = live.rx.recv().await.expect("update");
        assert_eq!(update.changed, vec!["b".to_string()]);
        assert_eq!(update.objects.len(), 2);

        assert!(db.remove("a").await.expect("remove"));
        let removal = live.rx.recv().await.expect("removal");
        assert!(removal.changed.is_empty());
        assert_eq!(removal.objects.len(), 1);
        assert!(!db.remove("a").await.expect("remove"));
    }
}
