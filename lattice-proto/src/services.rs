//! `lattice.services.v1` — the resource store RPC surface.
//!
//! The client and server stubs below are maintained in the prost/tonic
//! generated style and checked in so the crate builds without `protoc`.

use crate::types::{Resource, Version};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PutResourceRequest {
    #[prost(message, optional, tag = "1")]
    pub resource: ::core::option::Option<Resource>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PutResourceResponse {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetResourceRequest {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub resource_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetResourceResponse {
    #[prost(message, optional, tag = "1")]
    pub resource: ::core::option::Option<Resource>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DropResourcesRequest {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "2")]
    pub resource_ids: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DropResourcesResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DropBeforeResourcesRequest {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    /// Active cache rows with `version_index` strictly below this are dropped.
    #[prost(int64, tag = "2")]
    pub before: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DropBeforeResourcesResponse {
    #[prost(int64, tag = "1")]
    pub dropped_count: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WatchResourcesRequest {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
}

/// One page of a watch stream. `end_of_list` delimits a batch: the union of
/// the preceding pages is an atomic apply point for subscribers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WatchResourcesResponse {
    #[prost(message, repeated, tag = "1")]
    pub updated_resources: ::prost::alloc::vec::Vec<Resource>,
    #[prost(message, repeated, tag = "2")]
    pub dropped_resources: ::prost::alloc::vec::Vec<Resource>,
    #[prost(bool, tag = "3")]
    pub end_of_list: bool,
}

/// Generated client implementations.
pub mod resource_store_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::wildcard_imports)]
    use tonic::codegen::*;

    /// Client for the versioned resource store.
    #[derive(Debug, Clone)]
    pub struct ResourceStoreClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl ResourceStoreClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> ResourceStoreClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_interceptor<F>(
            inner: T,
            interceptor: F,
        ) -> ResourceStoreClient<InterceptedService<T, F>>
        where
            F: tonic::service::Interceptor,
            T::ResponseBody: Default,
            T: tonic::codegen::Service<
                http::Request<tonic::body::BoxBody>,
                Response = http::Response<
                    <T as tonic::client::GrpcService<tonic::body::BoxBody>>::ResponseBody,
                >,
            >,
            <T as tonic::codegen::Service<http::Request<tonic::body::BoxBody>>>::Error:
                Into<StdError> + std::marker::Send + std::marker::Sync,
        {
            ResourceStoreClient::new(InterceptedService::new(inner, interceptor))
        }
        pub async fn put(
            &mut self,
            request: impl tonic::IntoRequest<super::PutResourceRequest>,
        ) -> std::result::Result<tonic::Response<super::PutResourceResponse>, tonic::Status>
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/lattice.services.v1.ResourceStore/Put");
            self.inner.unary(request.into_request(), path, codec).await
        }
        pub async fn get(
            &mut self,
            request: impl tonic::IntoRequest<super::GetResourceRequest>,
        ) -> std::result::Result<tonic::Response<super::GetResourceResponse>, tonic::Status>
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/lattice.services.v1.ResourceStore/Get");
            self.inner.unary(request.into_request(), path, codec).await
        }
        pub async fn drop(
            &mut self,
            request: impl tonic::IntoRequest<super::DropResourcesRequest>,
        ) -> std::result::Result<tonic::Response<super::DropResourcesResponse>, tonic::Status>
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/lattice.services.v1.ResourceStore/Drop");
            self.inner.unary(request.into_request(), path, codec).await
        }
        pub async fn drop_before(
            &mut self,
            request: impl tonic::IntoRequest<super::DropBeforeResourcesRequest>,
        ) -> std::result::Result<
            tonic::Response<super::DropBeforeResourcesResponse>,
            tonic::Status,
        > {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/lattice.services.v1.ResourceStore/DropBefore",
            );
            self.inner.unary(request.into_request(), path, codec).await
        }
        pub async fn watch(
            &mut self,
            request: impl tonic::IntoRequest<super::WatchResourcesRequest>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::WatchResourcesResponse>>,
            tonic::Status,
        > {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/lattice.services.v1.ResourceStore/Watch");
            self.inner
                .server_streaming(request.into_request(), path, codec)
                .await
        }
    }
}

/// Generated server implementations.
pub mod resource_store_server {
    #![allow(unused_variables, dead_code, missing_docs, clippy::wildcard_imports)]
    use tonic::codegen::*;

    /// Generated trait containing gRPC methods that should be implemented for
    /// use with ResourceStoreServer.
    #[async_trait]
    pub trait ResourceStore: std::marker::Send + std::marker::Sync + 'static {
        async fn put(
            &self,
            request: tonic::Request<super::PutResourceRequest>,
        ) -> std::result::Result<tonic::Response<super::PutResourceResponse>, tonic::Status>;
        async fn get(
            &self,
            request: tonic::Request<super::GetResourceRequest>,
        ) -> std::result::Result<tonic::Response<super::GetResourceResponse>, tonic::Status>;
        async fn drop(
            &self,
            request: tonic::Request<super::DropResourcesRequest>,
        ) -> std::result::Result<tonic::Response<super::DropResourcesResponse>, tonic::Status>;
        async fn drop_before(
            &self,
            request: tonic::Request<super::DropBeforeResourcesRequest>,
        ) -> std::result::Result<
            tonic::Response<super::DropBeforeResourcesResponse>,
            tonic::Status,
        >;
        /// Server streaming response type for the Watch method.
        type WatchStream: tonic::codegen::tokio_stream::Stream<
                Item = std::result::Result<super::WatchResourcesResponse, tonic::Status>,
            > + std::marker::Send
            + 'static;
        async fn watch(
            &self,
            request: tonic::Request<super::WatchResourcesRequest>,
        ) -> std::result::Result<tonic::Response<Self::WatchStream>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct ResourceStoreServer<T> {
        inner: Arc<T>,
    }
    impl<T> ResourceStoreServer<T> {
        pub fn new(inner: T) -> Self {
            Self::from_arc(Arc::new(inner))
        }
        pub fn from_arc(inner: Arc<T>) -> Self {
            Self { inner }
        }
        pub fn with_interceptor<F>(inner: T, interceptor: F) -> InterceptedService<Self, F>
        where
            F: tonic::service::Interceptor,
        {
            InterceptedService::new(Self::new(inner), interceptor)
        }
    }
    impl<T, B> tonic::codegen::Service<http::Request<B>> for ResourceStoreServer<T>
    where
        T: ResourceStore,
        B: Body + std::marker::Send + 'static,
        B::Error: Into<StdError> + std::marker::Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;
        fn poll_ready(
            &mut self,
            _cx: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            match req.uri().path() {
                "/lattice.services.v1.ResourceStore/Put" => {
                    #[allow(non_camel_case_types)]
                    struct PutSvc<T: ResourceStore>(pub Arc<T>);
                    impl<T: ResourceStore>
                        tonic::server::UnaryService<super::PutResourceRequest> for PutSvc<T>
                    {
                        type Response = super::PutResourceResponse;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::PutResourceRequest>,
                        ) -> Self::Future {
                            let inner = Arc::clone(&self.0);
                            let fut =
                                async move { <T as ResourceStore>::put(&inner, request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let method = PutSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/lattice.services.v1.ResourceStore/Get" => {
                    #[allow(non_camel_case_types)]
                    struct GetSvc<T: ResourceStore>(pub Arc<T>);
                    impl<T: ResourceStore>
                        tonic::server::UnaryService<super::GetResourceRequest> for GetSvc<T>
                    {
                        type Response = super::GetResourceResponse;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::GetResourceRequest>,
                        ) -> Self::Future {
                            let inner = Arc::clone(&self.0);
                            let fut =
                                async move { <T as ResourceStore>::get(&inner, request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let method = GetSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/lattice.services.v1.ResourceStore/Drop" => {
                    #[allow(non_camel_case_types)]
                    struct DropSvc<T: ResourceStore>(pub Arc<T>);
                    impl<T: ResourceStore>
                        tonic::server::UnaryService<super::DropResourcesRequest> for DropSvc<T>
                    {
                        type Response = super::DropResourcesResponse;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::DropResourcesRequest>,
                        ) -> Self::Future {
                            let inner = Arc::clone(&self.0);
                            let fut =
                                async move { <T as ResourceStore>::drop(&inner, request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let method = DropSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/lattice.services.v1.ResourceStore/DropBefore" => {
                    #[allow(non_camel_case_types)]
                    struct DropBeforeSvc<T: ResourceStore>(pub Arc<T>);
                    impl<T: ResourceStore>
                        tonic::server::UnaryService<super::DropBeforeResourcesRequest>
                        for DropBeforeSvc<T>
                    {
                        type Response = super::DropBeforeResourcesResponse;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::DropBeforeResourcesRequest>,
                        ) -> Self::Future {
                            let inner = Arc::clone(&self.0);
                            let fut = async move {
                                <T as ResourceStore>::drop_before(&inner, request).await
                            };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let method = DropBeforeSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/lattice.services.v1.ResourceStore/Watch" => {
                    #[allow(non_camel_case_types)]
                    struct WatchSvc<T: ResourceStore>(pub Arc<T>);
                    impl<T: ResourceStore>
                        tonic::server::ServerStreamingService<super::WatchResourcesRequest>
                        for WatchSvc<T>
                    {
                        type Response = super::WatchResourcesResponse;
                        type ResponseStream = T::WatchStream;
                        type Future =
                            BoxFuture<tonic::Response<Self::ResponseStream>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::WatchResourcesRequest>,
                        ) -> Self::Future {
                            let inner = Arc::clone(&self.0);
                            let fut =
                                async move { <T as ResourceStore>::watch(&inner, request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let method = WatchSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        let res = grpc.server_streaming(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", tonic::Code::Unimplemented as i32)
                        .header("content-type", "application/grpc")
                        .body(empty_body())
                        .unwrap())
                }),
            }
        }
    }
    impl<T> Clone for ResourceStoreServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }
    /// Generated gRPC service name
    pub const SERVICE_NAME: &str = "lattice.services.v1.ResourceStore";
    impl<T> tonic::server::NamedService for ResourceStoreServer<T> {
        const NAME: &'static str = SERVICE_NAME;
    }
}
