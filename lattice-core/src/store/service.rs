//! The resource store RPC service: unary mutations plus the streaming watch
//! protocol (snapshot pages, then event pages on a poll interval, each batch
//! delimited by an `end_of_list` marker).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, warn};
use uuid::Uuid;

use lattice_proto::services::resource_store_server::ResourceStore;
use lattice_proto::services::{
    DropBeforeResourcesRequest, DropBeforeResourcesResponse, DropResourcesRequest,
    DropResourcesResponse, GetResourceRequest, GetResourceResponse, PutResourceRequest,
    PutResourceResponse, WatchResourcesRequest, WatchResourcesResponse,
};
use lattice_proto::types::{Resource, Version};

use crate::error::LatticeError;
use crate::resource::parse_id;

use super::{EventCursor, EventRow, EventStatus, StoreBackend};

/// Rows per watch page.
pub const WATCH_PAGE_SIZE: i64 = 50;

pub struct StoreService<B> {
    backend: Arc<B>,
    watch_interval: Duration,
}

impl<B: StoreBackend> StoreService<B> {
    pub fn new(backend: Arc<B>, watch_interval: Duration) -> Self {
        Self {
            backend,
            watch_interval,
        }
    }

    pub fn backend(&self) -> Arc<B> {
        Arc::clone(&self.backend)
    }
}

fn dropped_resource(namespace: &str, row: &EventRow, id: Uuid) -> Resource {
    Resource {
        namespace: namespace.to_string(),
        id: id.to_string(),
        name: row.name.clone(),
        spec: None,
        version: Some(Version {
            sha256_hash: row.sha256_hash.clone(),
            index: row.version_index,
            timestamp: Some(prost_types::Timestamp {
                seconds: row.version_index,
                nanos: 0,
            }),
        }),
    }
}

fn updated_resource(namespace: &str, row: &EventRow) -> Resource {
    Resource {
        namespace: namespace.to_string(),
        id: row.id.to_string(),
        name: row.name.clone(),
        spec: row.spec.clone(),
        version: Some(Version {
            sha256_hash: row.sha256_hash.clone(),
            index: row.version_index,
            timestamp: Some(prost_types::Timestamp {
                seconds: row.version_index,
                nanos: 0,
            }),
        }),
    }
}

/// Sends one response; returns `false` when the subscriber is gone.
async fn send_page(
    tx: &mpsc::Sender<Result<WatchResourcesResponse, Status>>,
    page: WatchResourcesResponse,
) -> bool {
    tx.send(Ok(page)).await.is_ok()
}

async fn snapshot_phase<B: StoreBackend>(
    backend: &B,
    namespace: &str,
    tx: &mpsc::Sender<Result<WatchResourcesResponse, Status>>,
) -> Result<Option<EventCursor>, LatticeError> {
    for page_index in 0.. {
        let rows = backend
            .snapshot_page(namespace, page_index * WATCH_PAGE_SIZE, WATCH_PAGE_SIZE)
            .await?;
        let row_count = rows.len() as i64;

        if row_count > 0 {
            let page = WatchResourcesResponse {
                updated_resources: rows.iter().map(|row| row.to_proto()).collect(),
                dropped_resources: Vec::new(),
                end_of_list: false,
            };
            if !send_page(tx, page).await {
                return Ok(None);
            }
        }

        if row_count < WATCH_PAGE_SIZE {
            break;
        }
    }

    backend.latest_cursor(namespace).await
}

async fn tail_phase<B: StoreBackend>(
    backend: &B,
    namespace: &str,
    cursor: &mut EventCursor,
    tx: &mpsc::Sender<Result<WatchResourcesResponse, Status>>,
) -> Result<bool, LatticeError> {
    loop {
        let rows = backend
            .events_page(namespace, *cursor, WATCH_PAGE_SIZE)
            .await?;
        let row_count = rows.len() as i64;

        let mut page = WatchResourcesResponse::default();

        for row in &rows {
            *cursor = row.cursor();

            match row.status {
                EventStatus::Active => {
                    page.updated_resources.push(updated_resource(namespace, row));
                }
                EventStatus::Dropped => {
                    page.dropped_resources
                        .push(dropped_resource(namespace, row, row.id));
                }
                EventStatus::DropBefore => {
                    for id in backend.drop_before_covered(namespace, row).await? {
                        page.dropped_resources
                            .push(dropped_resource(namespace, row, id));
                    }
                }
            }
        }

        if row_count > 0 && !send_page(tx, page).await {
            return Ok(false);
        }

        if row_count < WATCH_PAGE_SIZE {
            return Ok(true);
        }
    }
}

async fn run_watch<B: StoreBackend>(
    backend: Arc<B>,
    namespace: String,
    interval: Duration,
    tx: mpsc::Sender<Result<WatchResourcesResponse, Status>>,
) -> Result<(), LatticeError> {
    let mut cursor: Option<EventCursor> = None;

    for round in 0u64.. {
        if round > 0 {
            tokio::select! {
                _ = tx.closed() => return Ok(()),
                _ = tokio::time::sleep(interval) => {}
            }
        }

        match cursor {
            None => {
                cursor = snapshot_phase(backend.as_ref(), &namespace, &tx).await?;
                if tx.is_closed() {
                    return Ok(());
                }
            }
            Some(ref mut position) => {
                if !tail_phase(backend.as_ref(), &namespace, position, &tx).await? {
                    return Ok(());
                }
            }
        }

        let end = WatchResourcesResponse {
            end_of_list: true,
            ..Default::default()
        };
        if !send_page(&tx, end).await {
            return Ok(());
        }
    }

    Ok(())
}

#[tonic::async_trait]
impl<B: StoreBackend> ResourceStore for StoreService<B> {
    async fn put(
        &self,
        request: Request<PutResourceRequest>,
    ) -> Result<Response<PutResourceResponse>, Status> {
        let resource = request
            .into_inner()
            .resource
            .ok_or_else(|| Status::invalid_argument("missing resource"))?;

        let id = parse_id(&resource.id).map_err(Status::from)?;

        debug!(namespace = %resource.namespace, id = %resource.id, "put resource");

        let version = self
            .backend
            .put(&resource.namespace, id, &resource.name, resource.spec)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(PutResourceResponse {
            version: Some(version),
        }))
    }

    async fn get(
        &self,
        request: Request<GetResourceRequest>,
    ) -> Result<Response<GetResourceResponse>, Status> {
        let request = request.into_inner();
        let id = parse_id(&request.resource_id).map_err(Status::from)?;

        let stored = self
            .backend
            .get(&request.namespace, id)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(GetResourceResponse {
            resource: Some(stored.to_proto()),
        }))
    }

    async fn drop(
        &self,
        request: Request<DropResourcesRequest>,
    ) -> Result<Response<DropResourcesResponse>, Status> {
        let request = request.into_inner();

        let mut ids = Vec::with_capacity(request.resource_ids.len());
        for (index, raw) in request.resource_ids.iter().enumerate() {
            let id = Uuid::parse_str(raw).map_err(|_| {
                Status::invalid_argument(format!(
                    "invalid resource ID, must be in UUID format (index {index} value {raw})"
                ))
            })?;
            ids.push(id);
        }

        self.backend
            .drop_resources(&request.namespace, &ids)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(DropResourcesResponse {}))
    }

    async fn drop_before(
        &self,
        request: Request<DropBeforeResourcesRequest>,
    ) -> Result<Response<DropBeforeResourcesResponse>, Status> {
        let request = request.into_inner();

        let dropped_count = self
            .backend
            .drop_before(&request.namespace, request.before)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(DropBeforeResourcesResponse { dropped_count }))
    }

    type WatchStream = ReceiverStream<Result<WatchResourcesResponse, Status>>;

    async fn watch(
        &self,
        request: Request<WatchResourcesRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let namespace = request.into_inner().namespace;
        if namespace.is_empty() {
            return Err(Status::invalid_argument("namespace must not be empty"));
        }

        let (tx, rx) = mpsc::channel(16);
        let backend = Arc::clone(&self.backend);
        let interval = self.watch_interval;

        tokio::spawn(async move {
            if let Err(err) = run_watch(backend, namespace.clone(), interval, tx.clone()).await {
                warn!(%namespace, error = %err, "watch stream ended with error");
                let _ = tx.send(Err(Status::from(err))).await;
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use tokio_stream::StreamExt;

    fn any(value: &[u8]) -> prost_types::Any {
        prost_types::Any {
            type_url: "type.googleapis.com/T".to_string(),
            value: value.to_vec(),
        }
    }

    fn service() -> StoreService<MemoryStore> {
        StoreService::new(Arc::new(MemoryStore::new()), Duration::from_millis(20))
    }

    async fn open_watch(
        service: &StoreService<MemoryStore>,
        namespace: &str,
    ) -> ReceiverStream<Result<WatchResourcesResponse, Status>> {
        service
            .watch(Request::new(WatchResourcesRequest {
                namespace: namespace.to_string(),
            }))
            .await
            .expect("watch stream")
            .into_inner()
    }

    /// Skips the empty end-of-list markers idle poll rounds emit.
    async fn next_content(
        stream: &mut ReceiverStream<Result<WatchResourcesResponse, Status>>,
    ) -> WatchResourcesResponse {
        loop {
            let message = stream.next().await.unwrap().unwrap();
            if !message.updated_resources.is_empty() || !message.dropped_resources.is_empty() {
                return message;
            }
        }
    }

    #[tokio::test]
    async fn put_then_watch_delivers_snapshot_and_marker() {
        let service = service();
        let id = Uuid::new_v4();

        service
            .put(Request::new(PutResourceRequest {
                resource: Some(Resource {
                    namespace: "a".to_string(),
                    id: id.to_string(),
                    name: "x".to_string(),
                    spec: Some(any(b"\x01")),
                    version: None,
                }),
            }))
            .await
            .expect("put");

        let mut stream = open_watch(&service, "a").await;

        let first = stream.next().await.unwrap().unwrap();
        assert!(!first.end_of_list);
        assert_eq!(first.updated_resources.len(), 1);
        assert_eq!(first.updated_resources[0].id, id.to_string());
        assert_eq!(first.updated_resources[0].name, "x");
        assert!(first.dropped_resources.is_empty());

        let second = stream.next().await.unwrap().unwrap();
        assert!(second.end_of_list);
        assert!(second.updated_resources.is_empty());
        assert!(second.dropped_resources.is_empty());
    }

    #[tokio::test]
    async fn tail_delivers_update_and_new_version() {
        let service = service();
        let id = Uuid::new_v4();

        let put = |name: &str| PutResourceRequest {
            resource: Some(Resource {
                namespace: "a".to_string(),
                id: id.to_string(),
                name: name.to_string(),
                spec: Some(any(b"\x01")),
                version: None,
            }),
        };

        let first_version = service
            .put(Request::new(put("x")))
            .await
            .unwrap()
            .into_inner()
            .version
            .unwrap();

        let mut stream = open_watch(&service, "a").await;
        // Drain the snapshot batch.
        let _snapshot = stream.next().await.unwrap().unwrap();
        let marker = stream.next().await.unwrap().unwrap();
        assert!(marker.end_of_list);

        let second_version = service
            .put(Request::new(put("y")))
            .await
            .unwrap()
            .into_inner()
            .version
            .unwrap();
        assert!(second_version.index > first_version.index);

        let tail = next_content(&mut stream).await;
        assert_eq!(tail.updated_resources.len(), 1);
        assert_eq!(tail.updated_resources[0].name, "y");
        let marker = stream.next().await.unwrap().unwrap();
        assert!(marker.end_of_list);

        let fetched = service
            .get(Request::new(GetResourceRequest {
                namespace: "a".to_string(),
                resource_id: id.to_string(),
            }))
            .await
            .unwrap()
            .into_inner()
            .resource
            .unwrap();
        assert_eq!(fetched.name, "y");
    }

    #[tokio::test]
    async fn dropped_resources_reach_the_tail() {
        let service = service();
        let id = Uuid::new_v4();

        service
            .put(Request::new(PutResourceRequest {
                resource: Some(Resource {
                    namespace: "a".to_string(),
                    id: id.to_string(),
                    name: "x".to_string(),
                    spec: None,
                    version: None,
                }),
            }))
            .await
            .unwrap();

        let mut stream = open_watch(&service, "a").await;
        let _snapshot = stream.next().await.unwrap().unwrap();
        let _marker = stream.next().await.unwrap().unwrap();

        service
            .drop(Request::new(DropResourcesRequest {
                namespace: "a".to_string(),
                resource_ids: vec![id.to_string()],
            }))
            .await
            .unwrap();

        let tail = next_content(&mut stream).await;
        assert!(tail.updated_resources.is_empty());
        assert_eq!(tail.dropped_resources.len(), 1);
        assert_eq!(tail.dropped_resources[0].id, id.to_string());
    }

    #[tokio::test]
    async fn invalid_ids_are_rejected() {
        let service = service();

        let err = service
            .put(Request::new(PutResourceRequest {
                resource: Some(Resource {
                    namespace: "a".to_string(),
                    id: "nope".to_string(),
                    name: String::new(),
                    spec: None,
                    version: None,
                }),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);

        let err = service
            .drop(Request::new(DropResourcesRequest {
                namespace: "a".to_string(),
                resource_ids: vec!["nope".to_string()],
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);

        let err = service
            .get(Request::new(GetResourceRequest {
                namespace: "a".to_string(),
                resource_id: Uuid::new_v4().to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn drop_before_materializes_dropped_events() {
        let service = service();
        let old = Uuid::new_v4();

        service
            .put(Request::new(PutResourceRequest {
                resource: Some(Resource {
                    namespace: "a".to_string(),
                    id: old.to_string(),
                    name: "old".to_string(),
                    spec: None,
                    version: None,
                }),
            }))
            .await
            .unwrap();

        let mut stream = open_watch(&service, "a").await;
        let _snapshot = stream.next().await.unwrap().unwrap();
        let _marker = stream.next().await.unwrap().unwrap();

        let dropped = service
            .drop_before(Request::new(DropBeforeResourcesRequest {
                namespace: "a".to_string(),
                before: i64::MAX,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(dropped.dropped_count, 1);

        let tail = next_content(&mut stream).await;
        assert_eq!(tail.dropped_resources.len(), 1);
        assert_eq!(tail.dropped_resources[0].id, old.to_string());
    }
}
