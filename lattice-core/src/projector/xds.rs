//! xDS projector: translates networking resources into typed payloads and
//! publishes them to the embedded discovery cache at batch boundaries.
//!
//! Five keyed caches exist, one per xDS type URL. A per-type `id → name` map
//! lets drops locate the payloads an earlier update produced; the map is
//! owned by the projector task, so no locking is involved. Virtual hosts are
//! rebuilt from all live routing policies and diffed by content hash, so
//! only changed hosts are republished.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use prost::Message;
use sha2::{Digest, Sha256};
use tracing::warn;

use lattice_proto::types::{networking_node, NetworkingNode, Resource, RoutingPolicy};
use lattice_proto::xds;
use lattice_proto::AnyPayload;

use crate::error::Result;
use crate::sync::EventHandler;

use super::translate::{
    cluster_load_id, from_http_ingress, from_service, kebab_case, ClustersEndpoints,
};

pub const LISTENER_TYPE_URL: &str = <xds::Listener as AnyPayload>::TYPE_URL;
pub const ROUTE_TYPE_URL: &str = <xds::RouteConfiguration as AnyPayload>::TYPE_URL;
pub const CLUSTER_TYPE_URL: &str = <xds::Cluster as AnyPayload>::TYPE_URL;
pub const ENDPOINT_TYPE_URL: &str = <xds::ClusterLoadAssignment as AnyPayload>::TYPE_URL;
pub const VIRTUAL_HOST_TYPE_URL: &str = <xds::VirtualHost as AnyPayload>::TYPE_URL;

const ALL_TYPE_URLS: [&str; 5] = [
    LISTENER_TYPE_URL,
    ROUTE_TYPE_URL,
    CLUSTER_TYPE_URL,
    ENDPOINT_TYPE_URL,
    VIRTUAL_HOST_TYPE_URL,
];

/// The embedded xDS server's cache surface: named resources per type URL,
/// updated and deleted as a set.
#[async_trait]
pub trait XdsCache: Send + Sync {
    async fn update_resources(
        &self,
        type_url: &str,
        to_update: Vec<(String, prost_types::Any)>,
        to_delete: Vec<String>,
    ) -> Result<()>;
}

/// In-process cache of the current named payloads; the default wiring and
/// the test double for the projector.
#[derive(Debug, Default)]
pub struct MemoryXdsCache {
    resources: DashMap<String, BTreeMap<String, prost_types::Any>>,
}

impl MemoryXdsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self, type_url: &str) -> Vec<String> {
        self.resources
            .get(type_url)
            .map(|entry| entry.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, type_url: &str, name: &str) -> Option<prost_types::Any> {
        self.resources.get(type_url)?.get(name).cloned()
    }
}

#[async_trait]
impl XdsCache for MemoryXdsCache {
    async fn update_resources(
        &self,
        type_url: &str,
        to_update: Vec<(String, prost_types::Any)>,
        to_delete: Vec<String>,
    ) -> Result<()> {
        let mut entry = self.resources.entry(type_url.to_string()).or_default();
        for name in to_delete {
            entry.remove(&name);
        }
        for (name, payload) in to_update {
            entry.insert(name, payload);
        }
        Ok(())
    }
}

#[derive(Default)]
struct TxOperation {
    to_update: BTreeMap<String, prost_types::Any>,
    to_delete: Vec<String>,
}

struct Transaction {
    operations: HashMap<&'static str, TxOperation>,
    endpoints: ClustersEndpoints,
}

impl Transaction {
    fn new() -> Self {
        let mut operations = HashMap::new();
        for type_url in ALL_TYPE_URLS {
            operations.insert(type_url, TxOperation::default());
        }
        Self {
            operations,
            endpoints: ClustersEndpoints::new(),
        }
    }

    fn op(&mut self, type_url: &'static str) -> &mut TxOperation {
        self.operations.get_mut(type_url).expect("known type url")
    }
}

fn hash_route(route: &lattice_proto::types::routing_policy::Route, ingress: &str, domain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(route.encode_to_vec());
    hasher.update(ingress.as_bytes());
    hasher.update(domain.as_bytes());
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

struct VirtualHostExt {
    vhost: xds::VirtualHost,
    sha256sum: String,
}

/// Rebuilds virtual hosts from the live routing policies and yields the
/// update/delete sets relative to the previous rebuild.
#[derive(Default)]
struct Routing {
    // resource id -> policy; ordered so rebuilds are deterministic
    resources: BTreeMap<String, RoutingPolicy>,
    virtual_hosts: HashMap<String, VirtualHostExt>,
    updated: BTreeMap<String, xds::VirtualHost>,
    dropped: BTreeSet<String>,
}

impl Routing {
    fn put_policy(&mut self, resource_id: &str, policy: RoutingPolicy) {
        self.resources.insert(resource_id.to_string(), policy);
    }

    fn drop_policy(&mut self, resource_id: &str) {
        self.resources.remove(resource_id);
    }

    fn process_changes(&mut self) {
        let mut rebuilt: HashMap<String, (xds::VirtualHost, BTreeSet<String>)> = HashMap::new();

        for policy in self.resources.values() {
            let name = format!("{}/{}", policy.ingress_name, kebab_case(&policy.domain));

            let (vhost, route_names) = rebuilt.entry(name.clone()).or_insert_with(|| {
                (
                    xds::VirtualHost {
                        name: name.clone(),
                        domains: vec![policy.domain.clone()],
                        routes: Vec::new(),
                    },
                    BTreeSet::new(),
                )
            });

            for route in &policy.routes {
                let route_name = hash_route(route, &policy.ingress_name, &policy.domain);
                if !route_names.insert(route_name.clone()) {
                    continue;
                }
                vhost.routes.push(xds::Route {
                    name: route_name,
                    match_prefix: route.match_prefix.clone(),
                    target_cluster: route.target_service.clone(),
                    prefix_rewrite: route.prefix_rewrite.clone(),
                    timeout: route.timeout,
                });
            }
        }

        let mut next: HashMap<String, VirtualHostExt> = HashMap::new();
        for (name, (vhost, _)) in rebuilt {
            let mut hasher = Sha256::new();
            hasher.update(vhost.encode_to_vec());
            next.insert(
                name,
                VirtualHostExt {
                    vhost,
                    sha256sum: hex_digest(hasher),
                },
            );
        }

        for (name, previous) in &self.virtual_hosts {
            match next.get(name) {
                Some(current) if current.sha256sum == previous.sha256sum => {}
                Some(current) => {
                    self.updated.insert(name.clone(), current.vhost.clone());
                }
                None => {
                    self.dropped.insert(name.clone());
                }
            }
        }

        for (name, current) in &next {
            if !self.virtual_hosts.contains_key(name) {
                self.updated.insert(name.clone(), current.vhost.clone());
            }
        }

        self.virtual_hosts = next;
    }

    fn take(&mut self) -> (BTreeMap<String, xds::VirtualHost>, Vec<String>) {
        let updated = std::mem::take(&mut self.updated);
        let dropped = std::mem::take(&mut self.dropped).into_iter().collect();
        (updated, dropped)
    }
}

pub struct XdsProjector {
    cache: Arc<dyn XdsCache>,
    // type url -> resource id -> downstream name
    id_name: HashMap<&'static str, HashMap<String, String>>,
    // instance-set resource id -> cluster names it contributed to
    endpoint_clusters: HashMap<String, BTreeSet<String>>,
    routing: Routing,
    tx: Option<Transaction>,
}

impl XdsProjector {
    pub fn new(cache: Arc<dyn XdsCache>) -> Self {
        let mut id_name = HashMap::new();
        for type_url in ALL_TYPE_URLS {
            id_name.insert(type_url, HashMap::new());
        }
        Self {
            cache,
            id_name,
            endpoint_clusters: HashMap::new(),
            routing: Routing::default(),
            tx: None,
        }
    }

    fn tx(&mut self) -> &mut Transaction {
        self.tx.get_or_insert_with(Transaction::new)
    }

    fn record_name(&mut self, type_url: &'static str, resource_id: &str, name: &str) {
        self.id_name
            .get_mut(type_url)
            .expect("known type url")
            .insert(resource_id.to_string(), name.to_string());
    }

    fn apply_node(&mut self, resource_id: &str, node: networking_node::Node) {
        match node {
            networking_node::Node::HttpIngress(ingress) => {
                let (listener, route) = from_http_ingress(&ingress);
                let name = listener.name.clone();

                let listener_any = listener.to_any();
                let route_any = route.to_any();
                let tx = self.tx();
                tx.op(LISTENER_TYPE_URL)
                    .to_update
                    .insert(name.clone(), listener_any);
                tx.op(ROUTE_TYPE_URL).to_update.insert(name.clone(), route_any);

                self.record_name(LISTENER_TYPE_URL, resource_id, &name);
                self.record_name(ROUTE_TYPE_URL, resource_id, &name);
            }
            networking_node::Node::Service(service) => {
                let cluster = from_service(&service);
                let name = cluster.name.clone();

                let cluster_any = cluster.to_any();
                self.tx()
                    .op(CLUSTER_TYPE_URL)
                    .to_update
                    .insert(name.clone(), cluster_any);
                self.record_name(CLUSTER_TYPE_URL, resource_id, &name);
            }
            networking_node::Node::InstanceSet(set) => {
                for cluster_name in &set.match_service_names {
                    let tx = self.tx();
                    tx.endpoints.add(cluster_name, &set.instances);

                    let key = cluster_load_id(cluster_name, resource_id);
                    let assignment = tx.endpoints.to_load_assignment(cluster_name);
                    tx.op(ENDPOINT_TYPE_URL)
                        .to_update
                        .insert(key, assignment.to_any());

                    self.endpoint_clusters
                        .entry(resource_id.to_string())
                        .or_default()
                        .insert(cluster_name.clone());
                }
            }
            networking_node::Node::RoutingPolicy(policy) => {
                self.routing.put_policy(resource_id, policy);
            }
            // Lambda methods are data-plane routes; the xDS caches carry
            // nothing for them.
            networking_node::Node::AwsLambdaGrpc(_) => {}
        }
    }
}

#[async_trait]
impl EventHandler for XdsProjector {
    async fn before_batch(&mut self) -> Result<()> {
        self.tx = Some(Transaction::new());
        Ok(())
    }

    async fn on_updated(&mut self, resource: Resource) -> Result<()> {
        let Some(spec) = resource.spec.as_ref() else {
            return Ok(());
        };

        let node = match NetworkingNode::from_any(spec) {
            Ok(node) => node,
            Err(err) => {
                warn!(
                    id = %resource.id,
                    type_url = %spec.type_url,
                    error = %err,
                    "skipping spec the xDS projector cannot decode"
                );
                return Ok(());
            }
        };

        if let Some(node) = node.node {
            self.apply_node(&resource.id, node);
        }
        Ok(())
    }

    async fn on_dropped(&mut self, resource: Resource) -> Result<()> {
        let resource_id = resource.id;

        if let Some(clusters) = self.endpoint_clusters.remove(&resource_id) {
            for cluster_name in clusters {
                let key = cluster_load_id(&cluster_name, &resource_id);
                self.tx().op(ENDPOINT_TYPE_URL).to_delete.push(key);
            }
        }

        self.routing.drop_policy(&resource_id);

        for type_url in [LISTENER_TYPE_URL, ROUTE_TYPE_URL, CLUSTER_TYPE_URL] {
            let removed = self
                .id_name
                .get_mut(type_url)
                .expect("known type url")
                .remove(&resource_id);
            if let Some(name) = removed {
                self.tx().op(type_url).to_delete.push(name);
            }
        }

        Ok(())
    }

    async fn after_batch(&mut self) -> Result<()> {
        self.routing.process_changes();
        let (updated_vhs, dropped_vhs) = self.routing.take();

        let mut tx = self.tx.take().unwrap_or_else(Transaction::new);
        {
            let vh = tx.op(VIRTUAL_HOST_TYPE_URL);
            vh.to_update = updated_vhs
                .into_iter()
                .map(|(name, vhost)| (name, vhost.to_any()))
                .collect();
            vh.to_delete = dropped_vhs;
        }

        for type_url in ALL_TYPE_URLS {
            let op = tx.operations.remove(type_url).expect("known type url");
            if op.to_update.is_empty() && op.to_delete.is_empty() {
                continue;
            }
            self.cache
                .update_resources(
                    type_url,
                    op.to_update.into_iter().collect(),
                    op.to_delete,
                )
                .await?;
        }

        Ok(())
    }
}
