//! `lattice.types.v1` — resource envelope and spec payload types.

/// A versioned record stored by the resource store. The `spec` payload is
/// opaque at this level; its concrete type is declared by the `Any` type URL.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Resource {
    /// Tenant / partition key. All watch and drop operations are scoped to it.
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    /// Stable identity within the namespace (UUID in the normative backend).
    #[prost(string, tag = "2")]
    pub id: ::prost::alloc::string::String,
    /// Human label, no uniqueness requirement.
    #[prost(string, tag = "3")]
    pub name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "4")]
    pub spec: ::core::option::Option<::prost_types::Any>,
    /// Assigned by the store; ignored on `Put`.
    #[prost(message, optional, tag = "5")]
    pub version: ::core::option::Option<Version>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Version {
    /// Content hash of `(namespace, id, name, spec)`.
    #[prost(string, tag = "1")]
    pub sha256_hash: ::prost::alloc::string::String,
    /// Monotonic per namespace; unix seconds in the normative backend.
    #[prost(int64, tag = "2")]
    pub index: i64,
    #[prost(message, optional, tag = "3")]
    pub timestamp: ::core::option::Option<::prost_types::Timestamp>,
}

/// Union of the networking resources projected into the xDS caches.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NetworkingNode {
    #[prost(oneof = "networking_node::Node", tags = "1, 2, 3, 4, 5")]
    pub node: ::core::option::Option<networking_node::Node>,
}
/// Nested message and enum types in `NetworkingNode`.
pub mod networking_node {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Node {
        #[prost(message, tag = "1")]
        HttpIngress(super::HttpIngress),
        #[prost(message, tag = "2")]
        Service(super::Service),
        #[prost(message, tag = "3")]
        InstanceSet(super::InstanceSet),
        #[prost(message, tag = "4")]
        RoutingPolicy(super::RoutingPolicy),
        #[prost(message, tag = "5")]
        AwsLambdaGrpc(super::AwsLambdaGrpc),
    }
}

/// An HTTP listener plus the route configuration it pulls from the xDS server.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpIngress {
    #[prost(string, tag = "1")]
    pub ingress_name: ::prost::alloc::string::String,
    /// Cluster the downstream proxy uses to reach this control plane.
    #[prost(string, tag = "2")]
    pub xds_cluster_name: ::prost::alloc::string::String,
    #[prost(int32, tag = "3")]
    pub listen_port: i32,
    /// Applied in declared order; the router filter is always appended last.
    #[prost(message, repeated, tag = "4")]
    pub http_filters: ::prost::alloc::vec::Vec<HttpFilter>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpFilter {
    #[prost(oneof = "http_filter::Filter", tags = "1, 2, 3, 4")]
    pub filter: ::core::option::Option<http_filter::Filter>,
}
/// Nested message and enum types in `HttpFilter`.
pub mod http_filter {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct JwtAuthn {
        #[prost(message, repeated, tag = "1")]
        pub providers: ::prost::alloc::vec::Vec<jwt_authn::Provider>,
        #[prost(message, repeated, tag = "2")]
        pub rules: ::prost::alloc::vec::Vec<jwt_authn::Rule>,
    }
    /// Nested message and enum types in `JwtAuthn`.
    pub mod jwt_authn {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Provider {
            #[prost(string, tag = "1")]
            pub provider_name: ::prost::alloc::string::String,
            #[prost(string, tag = "2")]
            pub issuer: ::prost::alloc::string::String,
            #[prost(string, repeated, tag = "3")]
            pub audiences: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
            /// Forward the token to the upstream after verification.
            #[prost(bool, tag = "4")]
            pub forward: bool,
            #[prost(message, optional, tag = "5")]
            pub remote_jwks: ::core::option::Option<RemoteJwks>,
            #[prost(message, repeated, tag = "6")]
            pub claim_to_headers: ::prost::alloc::vec::Vec<ClaimToHeader>,
            #[prost(message, repeated, tag = "7")]
            pub from_headers: ::prost::alloc::vec::Vec<FromHeader>,
        }
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct RemoteJwks {
            #[prost(string, tag = "1")]
            pub http_uri: ::prost::alloc::string::String,
            #[prost(string, tag = "2")]
            pub cluster_name: ::prost::alloc::string::String,
            #[prost(message, optional, tag = "3")]
            pub timeout: ::core::option::Option<::prost_types::Duration>,
        }
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ClaimToHeader {
            #[prost(string, tag = "1")]
            pub header_name: ::prost::alloc::string::String,
            #[prost(string, tag = "2")]
            pub claim_name: ::prost::alloc::string::String,
        }
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct FromHeader {
            #[prost(string, tag = "1")]
            pub header_name: ::prost::alloc::string::String,
            #[prost(string, tag = "2")]
            pub value_prefix: ::prost::alloc::string::String,
        }
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Rule {
            #[prost(string, tag = "1")]
            pub match_prefix: ::prost::alloc::string::String,
            #[prost(string, repeated, tag = "2")]
            pub required_providers_names:
                ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
        }
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct HealthCheck {
        #[prost(string, tag = "1")]
        pub path: ::prost::alloc::string::String,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GrpcWeb {
        #[prost(bool, tag = "1")]
        pub enable: bool,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Cors {
        #[prost(bool, tag = "1")]
        pub enable: bool,
    }
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Filter {
        #[prost(message, tag = "1")]
        JwtAuthn(JwtAuthn),
        #[prost(message, tag = "2")]
        HealthCheck(HealthCheck),
        #[prost(message, tag = "3")]
        GrpcWeb(GrpcWeb),
        #[prost(message, tag = "4")]
        Cors(Cors),
    }
}

/// A load-balanced upstream; projected to an EDS cluster.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Service {
    #[prost(string, tag = "1")]
    pub service_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub xds_cluster_name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "3")]
    pub connect_timeout: ::core::option::Option<::prost_types::Duration>,
    #[prost(oneof = "service::InstanceApplicationProtocolOptions", tags = "4, 5")]
    pub instance_application_protocol_options:
        ::core::option::Option<service::InstanceApplicationProtocolOptions>,
}
/// Nested message and enum types in `Service`.
pub mod service {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Http1Options {}
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Http2Options {
        #[prost(int32, tag = "1")]
        pub max_concurrent_streams: i32,
    }
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum InstanceApplicationProtocolOptions {
        #[prost(message, tag = "4")]
        InstanceHttp1Options(Http1Options),
        #[prost(message, tag = "5")]
        InstanceHttp2Options(Http2Options),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TransportProtocol {
    Undefined = 0,
    Tcp = 1,
    Udp = 2,
}

/// Concrete endpoints contributing to one or more service clusters.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstanceSet {
    #[prost(string, repeated, tag = "1")]
    pub match_service_names: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(message, repeated, tag = "2")]
    pub instances: ::prost::alloc::vec::Vec<instance_set::Instance>,
}
/// Nested message and enum types in `InstanceSet`.
pub mod instance_set {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Instance {
        #[prost(string, tag = "1")]
        pub hostname: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub address: ::prost::alloc::string::String,
        #[prost(int32, tag = "3")]
        pub port: i32,
        #[prost(string, tag = "4")]
        pub region: ::prost::alloc::string::String,
        #[prost(string, tag = "5")]
        pub zone: ::prost::alloc::string::String,
        #[prost(enumeration = "super::TransportProtocol", tag = "6")]
        pub transport_protocol: i32,
    }
}

/// Routes contributed to the virtual host of `(ingress_name, domain)`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RoutingPolicy {
    #[prost(string, tag = "1")]
    pub ingress_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub domain: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "3")]
    pub routes: ::prost::alloc::vec::Vec<routing_policy::Route>,
}
/// Nested message and enum types in `RoutingPolicy`.
pub mod routing_policy {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Route {
        #[prost(string, tag = "1")]
        pub match_prefix: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub target_service: ::prost::alloc::string::String,
        #[prost(string, tag = "3")]
        pub prefix_rewrite: ::prost::alloc::string::String,
        #[prost(message, optional, tag = "4")]
        pub timeout: ::core::option::Option<::prost_types::Duration>,
    }
}

/// A gRPC method served by a function-as-a-service backend.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AwsLambdaGrpc {
    #[prost(string, tag = "1")]
    pub full_method_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub function_name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub qualifier: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum HttpMethod {
    Undefined = 0,
    Get = 1,
    Head = 2,
    Post = 3,
    Put = 4,
    Delete = 5,
    Options = 6,
    Patch = 7,
}

impl HttpMethod {
    /// Maps an HTTP method token to the wire enum; unknown methods map to
    /// `Undefined`, which acts as a wildcard in the gateway matcher.
    pub fn from_token(method: &str) -> Self {
        match method {
            "GET" => HttpMethod::Get,
            "HEAD" => HttpMethod::Head,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "DELETE" => HttpMethod::Delete,
            "OPTIONS" => HttpMethod::Options,
            "PATCH" => HttpMethod::Patch,
            _ => HttpMethod::Undefined,
        }
    }
}

/// Routing record mapping an exact or prefix key to an ordered handler list.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GatewayPolicy {
    #[prost(message, repeated, tag = "3")]
    pub handlers: ::prost::alloc::vec::Vec<gateway_policy::Handler>,
    #[prost(oneof = "gateway_policy::Source", tags = "1, 2")]
    pub source: ::core::option::Option<gateway_policy::Source>,
}
/// Nested message and enum types in `GatewayPolicy`.
pub mod gateway_policy {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GrpcSource {
        /// Full method name, e.g. `/package.Service/Method`.
        #[prost(string, tag = "1")]
        pub method_name: ::prost::alloc::string::String,
        #[prost(bool, tag = "2")]
        pub exact_method_name_match: bool,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct HttpSource {
        #[prost(string, tag = "1")]
        pub path: ::prost::alloc::string::String,
        #[prost(enumeration = "super::HttpMethod", tag = "2")]
        pub method: i32,
        #[prost(bool, tag = "3")]
        pub exact_path_match: bool,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct LambdaFunction {
        #[prost(string, tag = "1")]
        pub function_name: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub qualifier: ::prost::alloc::string::String,
        /// When set, server-stream continuations additionally listen on the
        /// pub/sub topic derived from this incoming header's value.
        #[prost(string, tag = "3")]
        pub lambda_stream_signal_header_key: ::prost::alloc::string::String,
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AwsHandler {
        #[prost(oneof = "aws_handler::Handler", tags = "1")]
        pub handler: ::core::option::Option<aws_handler::Handler>,
    }
    /// Nested message and enum types in `AwsHandler`.
    pub mod aws_handler {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Handler {
            #[prost(message, tag = "1")]
            Lambda(super::LambdaFunction),
        }
    }
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Handler {
        #[prost(oneof = "handler::Handler", tags = "1")]
        pub handler: ::core::option::Option<handler::Handler>,
    }
    /// Nested message and enum types in `Handler`.
    pub mod handler {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Handler {
            #[prost(message, tag = "1")]
            Aws(super::AwsHandler),
        }
    }
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Source {
        #[prost(message, tag = "1")]
        Grpc(GrpcSource),
        #[prost(message, tag = "2")]
        Http(HttpSource),
    }
}

/// Causes a workflow instance to be started with a derived id, reuse policy,
/// timeouts and retry policy.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Trigger {
    /// Workflow name registered on the engine.
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub task_queue: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub id_prefix: ::prost::alloc::string::String,
    #[prost(string, tag = "7")]
    pub cron_schedule: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "8")]
    pub execution_timeout: ::core::option::Option<::prost_types::Duration>,
    #[prost(message, optional, tag = "9")]
    pub run_timeout: ::core::option::Option<::prost_types::Duration>,
    #[prost(message, optional, tag = "10")]
    pub task_timeout: ::core::option::Option<::prost_types::Duration>,
    #[prost(message, optional, tag = "11")]
    pub arguments: ::core::option::Option<::prost_types::ListValue>,
    #[prost(message, optional, tag = "12")]
    pub retry_policy: ::core::option::Option<trigger::RetryPolicy>,
    #[prost(oneof = "trigger::IdSuffix", tags = "4, 5")]
    pub id_suffix: ::core::option::Option<trigger::IdSuffix>,
    #[prost(oneof = "trigger::IfRunning", tags = "6")]
    pub if_running: ::core::option::Option<trigger::IfRunning>,
    #[prost(oneof = "trigger::OnDrop", tags = "13")]
    pub on_drop: ::core::option::Option<trigger::OnDrop>,
}
/// Nested message and enum types in `Trigger`.
pub mod trigger {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RetryPolicy {
        #[prost(message, optional, tag = "1")]
        pub initial_interval: ::core::option::Option<::prost_types::Duration>,
        #[prost(message, optional, tag = "2")]
        pub maximum_backoff: ::core::option::Option<::prost_types::Duration>,
        #[prost(int32, tag = "3")]
        pub maximum_attempts: i32,
        #[prost(string, repeated, tag = "4")]
        pub non_retryable_errors: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum IdBuilder {
        Undefined = 0,
        Random = 1,
        Unique = 2,
        OnlyPrefix = 3,
    }
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum IfRunningAction {
        Undefined = 0,
        Abort = 1,
        Overlap = 2,
    }
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum OnDropAction {
        Undefined = 0,
        DoNothing = 1,
        Cancel = 2,
        Terminate = 3,
    }
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum IdSuffix {
        #[prost(string, tag = "4")]
        ExactIdSuffix(::prost::alloc::string::String),
        #[prost(enumeration = "IdBuilder", tag = "5")]
        IdSuffixBuilder(i32),
    }
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum IfRunning {
        #[prost(enumeration = "IfRunningAction", tag = "6")]
        IfRunningAction(i32),
    }
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum OnDrop {
        #[prost(enumeration = "OnDropAction", tag = "13")]
        OnDropAction(i32),
    }
}

/// A process definition; currently a named wrapper around a trigger.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Process {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub trigger: ::core::option::Option<Trigger>,
}
