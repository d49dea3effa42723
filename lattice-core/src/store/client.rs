//! Authoring helpers over the resource store client.
//!
//! Thin wrappers used by control-plane automation to publish and retire
//! networking resources: ids are derived from the payload when the author
//! does not assign one, and unary calls retry on UNAVAILABLE per the
//! connector policy.

use tonic::transport::Channel;
use tracing::info;

use lattice_proto::services::resource_store_client::ResourceStoreClient;
use lattice_proto::services::{
    DropBeforeResourcesRequest, DropResourcesRequest, PutResourceRequest,
};
use lattice_proto::types::{NetworkingNode, Resource, Version};
use lattice_proto::AnyPayload;

use crate::connector::with_unavailable_retry;
use crate::error::{LatticeError, Result};
use crate::resource::derive_node_id;

#[derive(Clone)]
pub struct StoreWriter {
    client: ResourceStoreClient<Channel>,
    namespace: String,
}

impl StoreWriter {
    pub fn new(client: ResourceStoreClient<Channel>, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Publishes a networking node. An absent id is derived from the node's
    /// identifying fields, so converging authors write to a stable key.
    pub async fn put_node(
        &self,
        id: Option<String>,
        name: &str,
        node: &NetworkingNode,
    ) -> Result<Version> {
        let id = match id {
            Some(id) => id,
            None => derive_node_id(node)
                .ok_or_else(|| {
                    LatticeError::InvalidArgument("networking node without a variant".to_string())
                })?
                .to_string(),
        };

        let request = PutResourceRequest {
            resource: Some(Resource {
                namespace: self.namespace.clone(),
                id: id.clone(),
                name: name.to_string(),
                spec: Some(node.to_any()),
                version: None,
            }),
        };

        let response = with_unavailable_retry(|| {
            let mut client = self.client.clone();
            let request = request.clone();
            async move { client.put(request).await }
        })
        .await?;

        let version = response
            .into_inner()
            .version
            .ok_or_else(|| LatticeError::Internal("put response without version".to_string()))?;

        info!(%id, name, index = version.index, "published networking resource");
        Ok(version)
    }

    /// Drops the given resources by id.
    pub async fn drop_resources(&self, resource_ids: Vec<String>) -> Result<()> {
        let request = DropResourcesRequest {
            namespace: self.namespace.clone(),
            resource_ids,
        };

        with_unavailable_retry(|| {
            let mut client = self.client.clone();
            let request = request.clone();
            async move { client.drop(request).await }
        })
        .await?;

        Ok(())
    }

    /// Drops every active resource older than `before_index`; returns the
    /// number of resources dropped.
    pub async fn drop_before(&self, before_index: i64) -> Result<i64> {
        let request = DropBeforeResourcesRequest {
            namespace: self.namespace.clone(),
            before: before_index,
        };

        let response = with_unavailable_retry(|| {
            let mut client = self.client.clone();
            let request = request.clone();
            async move { client.drop_before(request).await }
        })
        .await?;

        let dropped = response.into_inner().dropped_count;
        info!(before_index, dropped, "dropped resources before index");
        Ok(dropped)
    }
}
