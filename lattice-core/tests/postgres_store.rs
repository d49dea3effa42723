//! Conformance checks for the PostgreSQL backend against the same semantics
//! the in-memory backend pins in its unit tests.
//!
//! These run only when `DATABASE_URL` points at a disposable database; each
//! test works in its own random namespace so reruns do not interfere.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tonic::Request;
use uuid::Uuid;

use lattice_core::store::postgres::PostgresStore;
use lattice_core::store::service::StoreService;
use lattice_core::store::{EventCursor, EventStatus, StoreBackend};
use lattice_proto::services::resource_store_server::ResourceStore;
use lattice_proto::services::{GetResourceRequest, PutResourceRequest};
use lattice_proto::types::Resource;

async fn connect() -> Option<PostgresStore> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping postgres conformance tests");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("connect to postgres");

    let store = PostgresStore::new(pool);
    store.migrate().await.expect("apply migrations");
    Some(store)
}

fn namespace() -> String {
    format!("test-{}", Uuid::new_v4())
}

fn any(value: &[u8]) -> prost_types::Any {
    prost_types::Any {
        type_url: "type.googleapis.com/T".to_string(),
        value: value.to_vec(),
    }
}

#[tokio::test]
async fn put_hash_short_circuits() {
    let Some(store) = connect().await else { return };
    let namespace = namespace();
    let id = Uuid::new_v4();

    let first = store
        .put(&namespace, id, "x", Some(any(b"\x01")))
        .await
        .unwrap();
    let second = store
        .put(&namespace, id, "x", Some(any(b"\x01")))
        .await
        .unwrap();
    assert_eq!(first, second);

    let events = store
        .events_page(
            &namespace,
            EventCursor {
                version_index: 0,
                id: Uuid::nil(),
            },
            50,
        )
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, EventStatus::Active);

    let renamed = store
        .put(&namespace, id, "y", Some(any(b"\x01")))
        .await
        .unwrap();
    assert_ne!(renamed.sha256_hash, first.sha256_hash);
    assert_eq!(store.get(&namespace, id).await.unwrap().name, "y");
}

#[tokio::test]
async fn drop_removes_cache_and_appends_events() {
    let Some(store) = connect().await else { return };
    let namespace = namespace();
    let id = Uuid::new_v4();

    store.put(&namespace, id, "x", None).await.unwrap();
    store.drop_resources(&namespace, &[id]).await.unwrap();
    store.drop_resources(&namespace, &[id]).await.unwrap();

    assert!(store.get(&namespace, id).await.is_err());

    let events = store
        .events_page(
            &namespace,
            EventCursor {
                version_index: 0,
                id: Uuid::nil(),
            },
            50,
        )
        .await
        .unwrap();
    let dropped = events
        .iter()
        .filter(|event| event.status == EventStatus::Dropped)
        .count();
    assert_eq!(dropped, 2);
}

#[tokio::test]
async fn drop_before_counts_and_marks() {
    let Some(store) = connect().await else { return };
    let namespace = namespace();
    let keep = Uuid::new_v4();
    let discard = Uuid::new_v4();

    let first = store.put(&namespace, discard, "old", None).await.unwrap();
    store.put(&namespace, keep, "fresh", None).await.unwrap();

    // Everything strictly before the first index stays.
    let dropped = store.drop_before(&namespace, first.index).await.unwrap();
    assert_eq!(dropped, 0);

    let dropped = store.drop_before(&namespace, i64::MAX).await.unwrap();
    assert_eq!(dropped, 2);
    assert!(store.get(&namespace, keep).await.is_err());
    assert!(store.get(&namespace, discard).await.is_err());
}

#[tokio::test]
async fn put_get_round_trip_through_the_service() {
    let Some(store) = connect().await else { return };
    let namespace = namespace();
    let id = Uuid::new_v4();

    let service = StoreService::new(Arc::new(store), Duration::from_millis(50));

    service
        .put(Request::new(PutResourceRequest {
            resource: Some(Resource {
                namespace: namespace.clone(),
                id: id.to_string(),
                name: "x".to_string(),
                spec: Some(any(b"\x01")),
                version: None,
            }),
        }))
        .await
        .unwrap();

    let fetched = service
        .get(Request::new(GetResourceRequest {
            namespace: namespace.clone(),
            resource_id: id.to_string(),
        }))
        .await
        .unwrap()
        .into_inner()
        .resource
        .unwrap();
    assert_eq!(fetched.name, "x");
    assert_eq!(fetched.spec.unwrap().value, vec![1]);
}
