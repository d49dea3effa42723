//! Translations from networking resources to xDS payloads.

use std::collections::BTreeMap;

use lattice_proto::types::{http_filter, instance_set, service, HttpIngress, Service};
use lattice_proto::xds;
use lattice_proto::AnyPayload;

/// Lowercases and joins word boundaries with dashes; separator characters
/// (`.`, `_`, spaces) are folded into dashes as well.
pub fn kebab_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut previous_dash = true;

    for ch in input.chars() {
        if matches!(ch, '.' | '_' | ' ' | '-') {
            if !previous_dash {
                out.push('-');
                previous_dash = true;
            }
            continue;
        }
        if ch.is_ascii_uppercase() && !previous_dash {
            out.push('-');
        }
        out.push(ch.to_ascii_lowercase());
        previous_dash = false;
    }

    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Cache key for one instance-set contribution to a cluster, so multiple
/// instance-set resources can feed the same cluster concurrently.
pub fn cluster_load_id(cluster_name: &str, resource_id: &str) -> String {
    format!("{cluster_name}-{resource_id}")
}

/// Builds the listener and its route configuration for an HTTP ingress. The
/// declared filters are applied in order; the router filter is always
/// appended last.
pub fn from_http_ingress(node: &HttpIngress) -> (xds::Listener, xds::RouteConfiguration) {
    let mut filters = Vec::new();

    for filter in &node.http_filters {
        let Some(kind) = filter.filter.as_ref() else {
            continue;
        };

        let suffix = match kind {
            http_filter::Filter::JwtAuthn(_) => "jwtAuthn",
            http_filter::Filter::HealthCheck(_) => "healthCheck",
            http_filter::Filter::GrpcWeb(grpc_web) => {
                if !grpc_web.enable {
                    continue;
                }
                "grpcWeb"
            }
            http_filter::Filter::Cors(cors) => {
                if !cors.enable {
                    continue;
                }
                "cors"
            }
        };

        filters.push(xds::NamedFilter {
            name: format!("{}-{}", node.ingress_name, suffix),
            config: Some(filter.to_any()),
        });
    }

    filters.push(xds::NamedFilter {
        name: format!("{}-httpRouter", node.ingress_name),
        config: None,
    });

    let listener = xds::Listener {
        name: node.ingress_name.clone(),
        address: "0.0.0.0".to_string(),
        port: node.listen_port as u32,
        http_connection_manager: Some(xds::HttpConnectionManager {
            stat_prefix: node.ingress_name.clone(),
            route_config_name: node.ingress_name.clone(),
            xds_cluster_name: node.xds_cluster_name.clone(),
            http_filters: filters,
        }),
    };

    let route = xds::RouteConfiguration {
        name: node.ingress_name.clone(),
        xds_cluster_name: node.xds_cluster_name.clone(),
        ignore_port_in_host_matching: true,
    };

    (listener, route)
}

/// Builds an EDS cluster for a service, carrying its protocol options.
pub fn from_service(node: &Service) -> xds::Cluster {
    let protocol_options = match &node.instance_application_protocol_options {
        Some(service::InstanceApplicationProtocolOptions::InstanceHttp1Options(_)) => {
            Some(xds::cluster::ProtocolOptions::Http1(
                xds::cluster::Http1ProtocolOptions {},
            ))
        }
        Some(service::InstanceApplicationProtocolOptions::InstanceHttp2Options(options)) => {
            Some(xds::cluster::ProtocolOptions::Http2(
                xds::cluster::Http2ProtocolOptions {
                    max_concurrent_streams: options.max_concurrent_streams as u32,
                },
            ))
        }
        None => None,
    };

    xds::Cluster {
        name: node.service_name.clone(),
        eds_service_name: node.service_name.clone(),
        xds_cluster_name: node.xds_cluster_name.clone(),
        connect_timeout: node.connect_timeout,
        protocol_options,
    }
}

/// Endpoints accumulated per batch, grouped by `(cluster, region, zone)`.
#[derive(Debug, Default)]
pub struct ClustersEndpoints {
    clusters: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<xds::Endpoint>>>>,
}

impl ClustersEndpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, cluster_name: &str, instances: &[instance_set::Instance]) {
        let cluster = self.clusters.entry(cluster_name.to_string()).or_default();

        for instance in instances {
            cluster
                .entry(instance.region.clone())
                .or_default()
                .entry(instance.zone.clone())
                .or_default()
                .push(xds::Endpoint {
                    hostname: instance.hostname.clone(),
                    address: instance.address.clone(),
                    port: instance.port as u32,
                    transport_protocol: instance.transport_protocol,
                });
        }
    }

    pub fn to_load_assignment(&self, cluster_name: &str) -> xds::ClusterLoadAssignment {
        let mut assignment = xds::ClusterLoadAssignment {
            cluster_name: cluster_name.to_string(),
            endpoints: Vec::new(),
        };

        let Some(cluster) = self.clusters.get(cluster_name) else {
            return assignment;
        };

        for (region, zones) in cluster {
            for (zone, endpoints) in zones {
                let locality = if region.is_empty() {
                    None
                } else {
                    Some(xds::Locality {
                        region: region.clone(),
                        zone: zone.clone(),
                    })
                };

                assignment.endpoints.push(xds::LocalityEndpoints {
                    locality,
                    endpoints: endpoints.clone(),
                });
            }
        }

        assignment
    }
}
