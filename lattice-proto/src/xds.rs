//! `lattice.xds.v1` — payloads published to the embedded xDS cache.
//!
//! These are deliberately narrow renditions of the downstream proxy's
//! discovery types: only the fields the projector translations populate are
//! modeled. The embedded xDS server consumes them as opaque `Any` payloads
//! keyed by type URL and resource name.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Listener {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub address: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub port: u32,
    #[prost(message, optional, tag = "4")]
    pub http_connection_manager: ::core::option::Option<HttpConnectionManager>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpConnectionManager {
    #[prost(string, tag = "1")]
    pub stat_prefix: ::prost::alloc::string::String,
    /// Route configuration pulled by name from the route cache.
    #[prost(string, tag = "2")]
    pub route_config_name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub xds_cluster_name: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "4")]
    pub http_filters: ::prost::alloc::vec::Vec<NamedFilter>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NamedFilter {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub config: ::core::option::Option<::prost_types::Any>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RouteConfiguration {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub xds_cluster_name: ::prost::alloc::string::String,
    #[prost(bool, tag = "3")]
    pub ignore_port_in_host_matching: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Cluster {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub eds_service_name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub xds_cluster_name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "4")]
    pub connect_timeout: ::core::option::Option<::prost_types::Duration>,
    #[prost(oneof = "cluster::ProtocolOptions", tags = "5, 6")]
    pub protocol_options: ::core::option::Option<cluster::ProtocolOptions>,
}
/// Nested message and enum types in `Cluster`.
pub mod cluster {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Http1ProtocolOptions {}
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Http2ProtocolOptions {
        #[prost(uint32, tag = "1")]
        pub max_concurrent_streams: u32,
    }
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum ProtocolOptions {
        #[prost(message, tag = "5")]
        Http1(Http1ProtocolOptions),
        #[prost(message, tag = "6")]
        Http2(Http2ProtocolOptions),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClusterLoadAssignment {
    #[prost(string, tag = "1")]
    pub cluster_name: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub endpoints: ::prost::alloc::vec::Vec<LocalityEndpoints>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LocalityEndpoints {
    #[prost(message, optional, tag = "1")]
    pub locality: ::core::option::Option<Locality>,
    #[prost(message, repeated, tag = "2")]
    pub endpoints: ::prost::alloc::vec::Vec<Endpoint>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Locality {
    #[prost(string, tag = "1")]
    pub region: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub zone: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Endpoint {
    #[prost(string, tag = "1")]
    pub hostname: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub address: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub port: u32,
    #[prost(enumeration = "super::types::TransportProtocol", tag = "4")]
    pub transport_protocol: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VirtualHost {
    /// `ingress_name + "/" + kebab(domain)`.
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "2")]
    pub domains: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(message, repeated, tag = "3")]
    pub routes: ::prost::alloc::vec::Vec<Route>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Route {
    /// Content hash of the route within its virtual host; used for dedup.
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub match_prefix: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub target_cluster: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub prefix_rewrite: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "5")]
    pub timeout: ::core::option::Option<::prost_types::Duration>,
}
