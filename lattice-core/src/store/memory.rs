//! Ordered in-memory store backend.
//!
//! Used by the test suites and by embedded deployments that do not need
//! durability. Version indexes are unix seconds bumped to stay strictly
//! monotonic per namespace, so tests observe advancing versions without
//! sleeping across second boundaries.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use lattice_proto::types::Version;

use crate::error::{LatticeError, Result};
use crate::resource::{content_hash, StoredResource};

use super::{EventCursor, EventRow, EventStatus, StoreBackend};

#[derive(Debug, Clone)]
struct CacheRow {
    name: String,
    spec: Option<prost_types::Any>,
    version_index: i64,
    sha256_hash: String,
}

#[derive(Debug, Clone)]
struct StoredEvent {
    id: Uuid,
    status: EventStatus,
    version_index: i64,
    before_index: Option<i64>,
}

#[derive(Debug, Default)]
struct NamespaceState {
    cache: BTreeMap<Uuid, CacheRow>,
    events: Vec<StoredEvent>,
    last_index: i64,
}

impl NamespaceState {
    fn next_index(&mut self) -> i64 {
        let index = Utc::now().timestamp().max(self.last_index + 1);
        self.last_index = index;
        index
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: Mutex<HashMap<String, NamespaceState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_namespace<R>(&self, namespace: &str, f: impl FnOnce(&mut NamespaceState) -> R) -> R {
        let mut namespaces = self.namespaces.lock().expect("memory store lock poisoned");
        f(namespaces.entry(namespace.to_string()).or_default())
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn put(
        &self,
        namespace: &str,
        id: Uuid,
        name: &str,
        spec: Option<prost_types::Any>,
    ) -> Result<Version> {
        let sha256_hash = content_hash(namespace, &id.to_string(), name, spec.as_ref());

        self.with_namespace(namespace, |state| {
            if let Some(row) = state.cache.get(&id) {
                if row.sha256_hash == sha256_hash {
                    return Ok(Version {
                        sha256_hash,
                        index: row.version_index,
                        timestamp: Some(prost_types::Timestamp {
                            seconds: row.version_index,
                            nanos: 0,
                        }),
                    });
                }
            }

            let version_index = state.next_index();
            state.cache.insert(
                id,
                CacheRow {
                    name: name.to_string(),
                    spec,
                    version_index,
                    sha256_hash: sha256_hash.clone(),
                },
            );
            state.events.push(StoredEvent {
                id,
                status: EventStatus::Active,
                version_index,
                before_index: None,
            });

            Ok(Version {
                sha256_hash,
                index: version_index,
                timestamp: Some(prost_types::Timestamp {
                    seconds: version_index,
                    nanos: 0,
                }),
            })
        })
    }

    async fn get(&self, namespace: &str, id: Uuid) -> Result<StoredResource> {
        self.with_namespace(namespace, |state| {
            state
                .cache
                .get(&id)
                .map(|row| StoredResource {
                    namespace: namespace.to_string(),
                    id,
                    name: row.name.clone(),
                    spec: row.spec.clone(),
                    version_index: row.version_index,
                    sha256_hash: row.sha256_hash.clone(),
                })
                .ok_or_else(|| {
                    LatticeError::NotFound(format!("resource {id} in namespace {namespace}"))
                })
        })
    }

    async fn drop_resources(&self, namespace: &str, ids: &[Uuid]) -> Result<()> {
        self.with_namespace(namespace, |state| {
            for id in ids {
                let version_index = state.next_index();
                state.events.push(StoredEvent {
                    id: *id,
                    status: EventStatus::Dropped,
                    version_index,
                    before_index: None,
                });
                state.cache.remove(id);
            }
            Ok(())
        })
    }

    async fn drop_before(&self, namespace: &str, before_index: i64) -> Result<i64> {
        self.with_namespace(namespace, |state| {
            let covered: Vec<Uuid> = state
                .cache
                .iter()
                .filter(|(_, row)| row.version_index < before_index)
                .map(|(id, _)| *id)
                .collect();

            let version_index = state.next_index();
            state.events.push(StoredEvent {
                id: Uuid::nil(),
                status: EventStatus::DropBefore,
                version_index,
                before_index: Some(before_index),
            });

            for id in &covered {
                state.cache.remove(id);
            }

            Ok(covered.len() as i64)
        })
    }

    async fn snapshot_page(
        &self,
        namespace: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<StoredResource>> {
        self.with_namespace(namespace, |state| {
            let mut rows: Vec<StoredResource> = state
                .cache
                .iter()
                .map(|(id, row)| StoredResource {
                    namespace: namespace.to_string(),
                    id: *id,
                    name: row.name.clone(),
                    spec: row.spec.clone(),
                    version_index: row.version_index,
                    sha256_hash: row.sha256_hash.clone(),
                })
                .collect();
            rows.sort_by(|a, b| {
                (a.version_index, a.id).cmp(&(b.version_index, b.id))
            });

            Ok(rows
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect())
        })
    }

    async fn latest_cursor(&self, namespace: &str) -> Result<Option<EventCursor>> {
        self.with_namespace(namespace, |state| {
            Ok(state
                .events
                .iter()
                .map(|event| EventCursor {
                    version_index: event.version_index,
                    id: event.id,
                })
                .max())
        })
    }

    async fn events_page(
        &self,
        namespace: &str,
        after: EventCursor,
        limit: i64,
    ) -> Result<Vec<EventRow>> {
        self.with_namespace(namespace, |state| {
            let mut rows: Vec<EventRow> = state
                .events
                .iter()
                .enumerate()
                .filter(|(_, event)| {
                    (event.version_index, event.id) > (after.version_index, after.id)
                })
                .map(|(seq, event)| {
                    let cached = state.cache.get(&event.id);
                    EventRow {
                        seq: seq as i64,
                        id: event.id,
                        status: event.status,
                        version_index: event.version_index,
                        before_index: event.before_index,
                        name: cached.map(|row| row.name.clone()).unwrap_or_default(),
                        spec: cached.and_then(|row| row.spec.clone()),
                        sha256_hash: cached
                            .map(|row| row.sha256_hash.clone())
                            .unwrap_or_default(),
                    }
                })
                .collect();

            rows.sort_by(|a, b| {
                (a.version_index, a.id, a.seq).cmp(&(b.version_index, b.id, b.seq))
            });
            rows.truncate(limit as usize);
            Ok(rows)
        })
    }

    async fn drop_before_covered(&self, namespace: &str, marker: &EventRow) -> Result<Vec<Uuid>> {
        let before_index = marker.before_index.ok_or_else(|| {
            LatticeError::Internal("drop-before marker without before_index".to_string())
        })?;

        self.with_namespace(namespace, |state| {
            let mut latest: BTreeMap<Uuid, &StoredEvent> = BTreeMap::new();
            for event in state.events.iter().take(marker.seq as usize) {
                if event.status != EventStatus::DropBefore {
                    latest.insert(event.id, event);
                }
            }

            Ok(latest
                .into_iter()
                .filter(|(_, event)| {
                    event.status == EventStatus::Active && event.version_index < before_index
                })
                .map(|(id, _)| id)
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn any(value: &[u8]) -> prost_types::Any {
        prost_types::Any {
            type_url: "type.googleapis.com/T".to_string(),
            value: value.to_vec(),
        }
    }

    #[tokio::test]
    async fn put_is_idempotent_on_identical_content() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        let first = store.put("a", id, "x", Some(any(b"\x01"))).await.unwrap();
        let second = store.put("a", id, "x", Some(any(b"\x01"))).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            store.latest_cursor("a").await.unwrap().unwrap().version_index,
            first.index,
        );

        // Exactly one ACTIVE event was appended.
        let events = store
            .events_page("a", EventCursor { version_index: 0, id: Uuid::nil() }, 50)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::Active);
    }

    #[tokio::test]
    async fn content_change_supersedes_and_advances_index() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        let first = store.put("a", id, "x", Some(any(b"\x01"))).await.unwrap();
        let second = store.put("a", id, "y", Some(any(b"\x01"))).await.unwrap();

        assert!(second.index > first.index);
        assert_ne!(first.sha256_hash, second.sha256_hash);
        assert_eq!(store.get("a", id).await.unwrap().name, "y");
    }

    #[tokio::test]
    async fn drop_is_idempotent_for_the_cache() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        store.put("a", id, "x", None).await.unwrap();
        store.drop_resources("a", &[id]).await.unwrap();
        store.drop_resources("a", &[id]).await.unwrap();

        assert!(matches!(
            store.get("a", id).await,
            Err(LatticeError::NotFound(_))
        ));

        // One DROPPED event per call, observable in order.
        let events = store
            .events_page("a", EventCursor { version_index: 0, id: Uuid::nil() }, 50)
            .await
            .unwrap();
        let dropped: Vec<_> = events
            .iter()
            .filter(|event| event.status == EventStatus::Dropped)
            .collect();
        assert_eq!(dropped.len(), 2);
    }

    #[tokio::test]
    async fn events_stream_in_index_id_order() {
        let store = MemoryStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        store.put("a", first, "x", None).await.unwrap();
        store.put("a", second, "y", None).await.unwrap();
        store.drop_resources("a", &[first]).await.unwrap();

        let events = store
            .events_page("a", EventCursor { version_index: 0, id: Uuid::nil() }, 50)
            .await
            .unwrap();

        let cursors: Vec<_> = events.iter().map(|event| event.cursor()).collect();
        let mut sorted = cursors.clone();
        sorted.sort();
        assert_eq!(cursors, sorted);
    }

    #[tokio::test]
    async fn drop_before_covers_older_active_rows() {
        let store = MemoryStore::new();
        let old = Uuid::new_v4();
        let fresh = Uuid::new_v4();

        let old_version = store.put("a", old, "old", None).await.unwrap();
        let fresh_version = store.put("a", fresh, "fresh", None).await.unwrap();

        let dropped = store
            .drop_before("a", fresh_version.index)
            .await
            .unwrap();
        assert_eq!(dropped, 1);

        assert!(store.get("a", old).await.is_err());
        assert!(store.get("a", fresh).await.is_ok());

        // The marker replays as a DROPPED event for the covered row.
        let events = store
            .events_page(
                "a",
                EventCursor { version_index: old_version.index, id: old },
                50,
            )
            .await
            .unwrap();
        let marker = events
            .iter()
            .find(|event| event.status == EventStatus::DropBefore)
            .expect("marker present");
        let covered = store.drop_before_covered("a", marker).await.unwrap();
        assert_eq!(covered, vec![old]);
    }
}
