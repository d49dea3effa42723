//! Domain view of stored resources and their content-addressed versions.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use prost::Message;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use lattice_proto::types::{networking_node, NetworkingNode, Resource, Version};

use crate::error::{LatticeError, Result};

/// Fixed namespace for deterministic (v5) workflow id derivation.
pub const WORKFLOW_ID_NAMESPACE: Uuid = Uuid::from_u128(0x3d8e41b4_f7d9_11ed_b67e_0242ac120002);

/// A resource as held by the store cache.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResource {
    pub namespace: String,
    pub id: Uuid,
    pub name: String,
    pub spec: Option<prost_types::Any>,
    pub version_index: i64,
    pub sha256_hash: String,
}

impl StoredResource {
    pub fn version(&self) -> Version {
        Version {
            sha256_hash: self.sha256_hash.clone(),
            index: self.version_index,
            timestamp: Some(prost_types::Timestamp {
                seconds: self.version_index,
                nanos: 0,
            }),
        }
    }

    pub fn to_proto(&self) -> Resource {
        Resource {
            namespace: self.namespace.clone(),
            id: self.id.to_string(),
            name: self.name.clone(),
            spec: self.spec.clone(),
            version: Some(self.version()),
        }
    }
}

/// Content hash of `(namespace, id, name, spec)`: SHA-256 over the canonical
/// (proto) encoding, URL-safe unpadded base64. A `Put` whose hash equals the
/// stored one is a no-op.
pub fn content_hash(namespace: &str, id: &str, name: &str, spec: Option<&prost_types::Any>) -> String {
    let canonical = Resource {
        namespace: namespace.to_string(),
        id: id.to_string(),
        name: name.to_string(),
        spec: spec.cloned(),
        version: None,
    };

    let mut hasher = Sha256::new();
    hasher.update(canonical.encode_to_vec());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Parses a resource id, failing with `InvalidArgument` on anything that is
/// not a well-formed UUID.
pub fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| {
        LatticeError::InvalidArgument(format!(
            "invalid resource ID, must be in UUID format (value {id})"
        ))
    })
}

/// Derives a stable resource id from a networking node's identifying fields,
/// for authors that do not assign ids themselves. The id is a v5 UUID so it
/// passes store-side validation.
pub fn derive_node_id(node: &NetworkingNode) -> Option<Uuid> {
    let identity = match node.node.as_ref()? {
        networking_node::Node::HttpIngress(ingress) => {
            format!("http-ingress:{}:{}", ingress.xds_cluster_name, ingress.ingress_name)
        }
        networking_node::Node::Service(service) => format!("service:{}", service.service_name),
        networking_node::Node::InstanceSet(set) => {
            format!("instance-set:{}", set.match_service_names.join(","))
        }
        networking_node::Node::RoutingPolicy(policy) => {
            format!("routing-policy:{}:{}", policy.ingress_name, policy.domain)
        }
        networking_node::Node::AwsLambdaGrpc(lambda) => {
            format!("aws-lambda-grpc:{}", lambda.full_method_name)
        }
    };

    Some(Uuid::new_v5(&Uuid::NAMESPACE_URL, identity.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn any(type_url: &str, value: &[u8]) -> prost_types::Any {
        prost_types::Any {
            type_url: type_url.to_string(),
            value: value.to_vec(),
        }
    }

    #[test]
    fn workflow_namespace_matches_fixed_value() {
        assert_eq!(
            WORKFLOW_ID_NAMESPACE.to_string(),
            "3d8e41b4-f7d9-11ed-b67e-0242ac120002"
        );
    }

    #[test]
    fn content_hash_is_stable_and_sensitive() {
        let spec = any("type.googleapis.com/T", b"\x01");

        let first = content_hash("a", "u-1", "x", Some(&spec));
        let second = content_hash("a", "u-1", "x", Some(&spec));
        assert_eq!(first, second);

        // Renaming the resource changes the hash, re-encoding does not.
        let renamed = content_hash("a", "u-1", "y", Some(&spec));
        assert_ne!(first, renamed);

        // The hash is URL-safe unpadded base64 of a 32-byte digest.
        assert_eq!(first.len(), 43);
        assert!(!first.contains('='));
    }

    #[test]
    fn parse_id_rejects_non_uuid() {
        assert!(parse_id("9e7f9f6e-90f2-4f51-9a2a-0e2c61bb7a55").is_ok());
        let err = parse_id("not-a-uuid").unwrap_err();
        assert!(matches!(err, LatticeError::InvalidArgument(_)));
    }

    #[test]
    fn derived_node_ids_are_deterministic() {
        let node = NetworkingNode {
            node: Some(networking_node::Node::Service(
                lattice_proto::types::Service {
                    service_name: "billing".to_string(),
                    ..Default::default()
                },
            )),
        };

        let first = derive_node_id(&node).expect("id");
        let second = derive_node_id(&node).expect("id");
        assert_eq!(first, second);
        assert_eq!(first.get_version_num(), 5);
    }
}
