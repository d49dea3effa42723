//! Resource store backends.
//!
//! The watch protocol is implemented once, above the [`StoreBackend`] trait
//! (see [`service`]); backends only supply transactional mutations and ordered
//! page reads. Two implementations exist: PostgreSQL (the normative one) and
//! an ordered in-memory store used by tests and embedded deployments.

pub mod client;
pub mod memory;
pub mod postgres;
pub mod service;

use async_trait::async_trait;
use uuid::Uuid;

use lattice_proto::types::Version;

use crate::error::Result;
use crate::resource::StoredResource;

/// Status column of an event row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Active,
    Dropped,
    /// A drop-before marker; materialized on replay as one DROPPED event per
    /// cache row it covered.
    DropBefore,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Active => "ACTIVE",
            EventStatus::Dropped => "DROPPED",
            EventStatus::DropBefore => "DROP_BEFORE",
        }
    }
}

/// Position in a namespace's event log. `(version_index, id)` is the total
/// order key; two events may share an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventCursor {
    pub version_index: i64,
    pub id: Uuid,
}

/// One event-log row, joined against the current cache content where a row
/// still exists (dropped resources replay with empty name and spec).
#[derive(Debug, Clone)]
pub struct EventRow {
    /// Append order; only used to resolve drop-before coverage.
    pub seq: i64,
    pub id: Uuid,
    pub status: EventStatus,
    pub version_index: i64,
    pub before_index: Option<i64>,
    pub name: String,
    pub spec: Option<prost_types::Any>,
    pub sha256_hash: String,
}

impl EventRow {
    pub fn cursor(&self) -> EventCursor {
        EventCursor {
            version_index: self.version_index,
            id: self.id,
        }
    }
}

/// Storage operations behind the resource store RPC surface. Mutations are
/// transactional: they either fully commit or leave no visible change.
#[async_trait]
pub trait StoreBackend: Send + Sync + 'static {
    /// Upserts the cache row and appends an ACTIVE event unless the content
    /// hash is unchanged, in which case the stored version is returned as-is.
    async fn put(
        &self,
        namespace: &str,
        id: Uuid,
        name: &str,
        spec: Option<prost_types::Any>,
    ) -> Result<Version>;

    /// Reads the cache row; `NotFound` when the cache holds no row.
    async fn get(&self, namespace: &str, id: Uuid) -> Result<StoredResource>;

    /// Appends a DROPPED event and deletes the cache row for each id.
    /// Dropping an unknown id still appends the event.
    async fn drop_resources(&self, namespace: &str, ids: &[Uuid]) -> Result<()>;

    /// Appends a drop-before marker and deletes all cache rows with
    /// `version_index < before_index`. Returns the number of rows dropped.
    async fn drop_before(&self, namespace: &str, before_index: i64) -> Result<i64>;

    /// One snapshot page of the cache in `(version_index, id)` order.
    async fn snapshot_page(
        &self,
        namespace: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<StoredResource>>;

    /// The latest `(version_index, id)` in the event log, if any.
    async fn latest_cursor(&self, namespace: &str) -> Result<Option<EventCursor>>;

    /// Event rows strictly after `after`, in `(version_index, id)` order.
    async fn events_page(
        &self,
        namespace: &str,
        after: EventCursor,
        limit: i64,
    ) -> Result<Vec<EventRow>>;

    /// Ids covered by a drop-before marker: resources whose latest event
    /// preceding the marker is ACTIVE with `version_index < before_index`.
    async fn drop_before_covered(&self, namespace: &str, marker: &EventRow) -> Result<Vec<Uuid>>;
}
