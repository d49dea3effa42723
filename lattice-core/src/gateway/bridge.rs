//! Data-plane bridge.
//!
//! One server surface handles both protocols: requests whose content type
//! begins with `application/grpc` are routed into the raw-bytes gRPC proxy
//! (any method name, no registered service required), everything else goes
//! through the HTTP gateway. The proxy frames messages with an identity
//! codec, so request payloads are never decoded here.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::{Buf, BufMut, Bytes};
use futures::Stream;
use tokio::sync::mpsc;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, KeyAndValueRef, MetadataMap};
use tonic::{Status, Streaming};
use tracing::{debug, warn};
use uuid::Uuid;

use lattice_config::GatewayOptions;

use super::{
    grpc_handlers_for_policy, http_handlers_for_policy, CallFlow, Gateway, GrpcCallContext,
    GrpcCallHandler, HttpCallContext,
};

/// Identity codec: gRPC frames pass through as raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

#[derive(Debug, Clone, Copy, Default)]
pub struct RawEncoder;

#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl Codec for RawCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = RawEncoder;
    type Decoder = RawDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        RawEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawDecoder
    }
}

impl Encoder for RawEncoder {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Bytes, dst: &mut EncodeBuf<'_>) -> Result<(), Status> {
        dst.put(item);
        Ok(())
    }
}

impl Decoder for RawDecoder {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Bytes>, Status> {
        let remaining = src.remaining();
        Ok(Some(src.copy_to_bytes(remaining)))
    }
}

/// Shared state of the data-plane router.
pub struct BridgeState {
    pub gateway: Arc<Gateway>,
    pub options: GatewayOptions,
}

/// Builds the data-plane router: a single fallback that dispatches on the
/// request content type.
pub fn router(state: Arc<BridgeState>) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

async fn dispatch(
    State(state): State<Arc<BridgeState>>,
    request: axum::extract::Request,
) -> Response {
    let content_type = request
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with("application/grpc") {
        serve_grpc(state, request).await
    } else {
        serve_http(state, request).await
    }
}

fn metadata_to_map(metadata: &MetadataMap) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for entry in metadata.iter() {
        if let KeyAndValueRef::Ascii(key, value) = entry {
            if let Ok(value) = value.to_str() {
                map.entry(key.as_str().to_string())
                    .or_default()
                    .push(value.to_string());
            }
        }
    }
    map
}

fn map_to_metadata(map: HashMap<String, Vec<String>>) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for (key, values) in map {
        let Ok(key) = key.parse::<AsciiMetadataKey>() else {
            continue;
        };
        for value in values {
            if let Ok(value) = value.parse::<AsciiMetadataValue>() {
                metadata.append(key.clone(), value);
            }
        }
    }
    metadata
}

/// Ensures the configured nounce header is present, minting one when the
/// caller did not supply it.
fn ensure_nounce(map: &mut HashMap<String, Vec<String>>, header: &str) {
    let present = map.keys().any(|key| key.eq_ignore_ascii_case(header));
    if !present {
        map.insert(header.to_string(), vec![Uuid::new_v4().to_string()]);
    }
}

type ProxyStream = Pin<Box<dyn Stream<Item = Result<Bytes, Status>> + Send>>;

struct ProxyCall {
    gateway: Arc<Gateway>,
    options: GatewayOptions,
    path: String,
}

impl tonic::server::StreamingService<Bytes> for ProxyCall {
    type Response = Bytes;
    type ResponseStream = ProxyStream;
    type Future =
        Pin<Box<dyn std::future::Future<Output = Result<tonic::Response<ProxyStream>, Status>> + Send>>;

    fn call(&mut self, request: tonic::Request<Streaming<Bytes>>) -> Self::Future {
        let gateway = Arc::clone(&self.gateway);
        let options = self.options.clone();
        let path = self.path.clone();

        Box::pin(async move {
            let policy = gateway
                .matcher()
                .match_grpc(&path)
                .ok_or_else(|| Status::unimplemented(format!("{path} has no handler")))?;

            let mut metadata = metadata_to_map(request.metadata());
            ensure_nounce(&mut metadata, &options.nounce_header);

            let call = GrpcCallContext {
                full_method_name: path.clone(),
                metadata,
            };
            let handlers =
                grpc_handlers_for_policy(&gateway, &policy, &call).map_err(Status::from)?;
            if handlers.is_empty() {
                return Err(Status::unimplemented(format!("{path} has no handler")));
            }

            let mut inbound = request.into_inner();

            // The first request frame is fed to every handler before the
            // response is produced, so its outgoing metadata can become the
            // response header.
            let first = inbound.message().await?;
            let mut open = Vec::with_capacity(handlers.len());
            if let Some(frame) = &first {
                for handler in &handlers {
                    let flow = handler.call(frame.clone()).await.map_err(Status::from)?;
                    open.push(flow == CallFlow::Accepted);
                }
            } else {
                open.resize(handlers.len(), false);
            }

            let header_map = handlers
                .first()
                .map(|handler| handler.outgoing_metadata())
                .unwrap_or_default();

            // Receive loop: forward any further request frames to handlers
            // that still accept them. Its first terminal error wins over the
            // send loop's.
            let (err_tx, mut err_rx) = mpsc::channel::<Status>(1);
            let recv_handlers: Vec<Arc<dyn GrpcCallHandler>> = handlers.clone();
            tokio::spawn(async move {
                let mut open = open;
                loop {
                    match inbound.message().await {
                        Ok(Some(frame)) => {
                            for (handler, accepting) in recv_handlers.iter().zip(open.iter_mut()) {
                                if !*accepting {
                                    continue;
                                }
                                match handler.call(frame.clone()).await {
                                    Ok(CallFlow::Accepted) => {}
                                    Ok(CallFlow::Closed) => *accepting = false,
                                    Err(err) => {
                                        let _ = err_tx.send(Status::from(err)).await;
                                        return;
                                    }
                                }
                            }
                        }
                        Ok(None) => return,
                        Err(status) => {
                            let _ = err_tx.send(status).await;
                            return;
                        }
                    }
                }
            });

            let send_handlers = handlers;
            let outbound = async_stream::try_stream! {
                for handler in send_handlers {
                    loop {
                        let next = tokio::select! {
                            biased;
                            Some(status) = err_rx.recv() => Err(status),
                            result = handler.result() => result.map_err(Status::from),
                        };
                        match next? {
                            Some(payload) => yield payload,
                            None => break,
                        }
                    }
                }
            };

            let mut response = tonic::Response::new(Box::pin(outbound) as ProxyStream);
            *response.metadata_mut() = map_to_metadata(header_map);
            Ok(response)
        })
    }
}

async fn serve_grpc(state: Arc<BridgeState>, request: axum::extract::Request) -> Response {
    let path = request.uri().path().to_string();
    debug!(%path, "bridging gRPC call");

    let service = ProxyCall {
        gateway: Arc::clone(&state.gateway),
        options: state.options.clone(),
        path,
    };

    let mut grpc = tonic::server::Grpc::new(RawCodec);
    let response = grpc.streaming(service, request).await;
    response.map(axum::body::Body::new).into_response()
}

async fn serve_http(state: Arc<BridgeState>, request: axum::extract::Request) -> Response {
    let (parts, body) = request.into_parts();

    let method = parts.method.as_str().to_string();
    let path = parts.uri.path().to_string();

    let Some(policy) = state.gateway.matcher().match_http(&path, &method) else {
        return (http::StatusCode::NOT_FOUND, "no route matched").into_response();
    };

    let mut headers: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            headers
                .entry(key.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }
    ensure_nounce(&mut headers, &state.options.nounce_header);

    let mut query: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(raw) = parts.uri.query() {
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            query.entry(key.into_owned()).or_default().push(value.into_owned());
        }
    }

    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(err) => {
            warn!(error = %err, "failed to read gateway request body");
            return (http::StatusCode::INTERNAL_SERVER_ERROR, "unreadable body").into_response();
        }
    };

    let call = HttpCallContext {
        method,
        path,
        headers,
        query,
        body,
    };

    let handlers = match http_handlers_for_policy(&state.gateway, &policy, &call) {
        Ok(handlers) => handlers,
        Err(err) => {
            warn!(error = %err, "gateway handler construction failed");
            return (http::StatusCode::INTERNAL_SERVER_ERROR, "matcher error").into_response();
        }
    };

    for handler in handlers {
        match handler.call().await {
            Ok(reply) => {
                let status = http::StatusCode::from_u16(reply.status)
                    .unwrap_or(http::StatusCode::BAD_GATEWAY);
                let mut response = Response::builder().status(status);
                if let Some(header_map) = response.headers_mut() {
                    for (key, values) in reply.headers {
                        let Ok(name) = http::HeaderName::try_from(key.as_str()) else {
                            continue;
                        };
                        for value in values {
                            if let Ok(value) = http::HeaderValue::try_from(value.as_str()) {
                                header_map.append(name.clone(), value);
                            }
                        }
                    }
                }
                return response
                    .body(axum::body::Body::from(reply.body))
                    .unwrap_or_else(|_| {
                        http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
                    });
            }
            Err(err) => {
                warn!(error = %err, "gateway handler failed");
                return (http::StatusCode::BAD_GATEWAY, "handler error").into_response();
            }
        }
    }

    warn!("matched policy carries no usable handler");
    (http::StatusCode::BAD_GATEWAY, "no handler produced a response").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faas::{FunctionInvoker, FunctionRequest, FunctionResponse, LambdaGatewayHandler};
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use http_body_util::BodyExt;
    use lattice_proto::types::gateway_policy::{
        aws_handler, handler, AwsHandler, GrpcSource, Handler, HttpSource, LambdaFunction, Source,
    };
    use lattice_proto::types::{GatewayPolicy, HttpMethod};
    use tower::ServiceExt;

    struct EchoInvoker;

    #[async_trait]
    impl FunctionInvoker for EchoInvoker {
        async fn invoke(
            &self,
            _function_name: &str,
            _qualifier: &str,
            request: FunctionRequest,
        ) -> crate::error::Result<FunctionResponse> {
            Ok(FunctionResponse {
                status_code: 200,
                headers: HashMap::from([("x-path".to_string(), request.path.clone())]),
                body: BASE64.encode(b"hi"),
                is_base64_encoded: true,
                ..Default::default()
            })
        }
    }

    fn lambda_handler_entry() -> Handler {
        Handler {
            handler: Some(handler::Handler::Aws(AwsHandler {
                handler: Some(aws_handler::Handler::Lambda(LambdaFunction {
                    function_name: "echo".to_string(),
                    ..Default::default()
                })),
            })),
        }
    }

    fn bridge_state() -> Arc<BridgeState> {
        let gateway = Arc::new(Gateway::new(vec![Arc::new(LambdaGatewayHandler::new(
            Arc::new(EchoInvoker),
            GatewayOptions::default(),
            None,
        ))]));

        gateway.matcher().insert(Arc::new(GatewayPolicy {
            source: Some(Source::Grpc(GrpcSource {
                method_name: "/p.S/Echo".to_string(),
                exact_method_name_match: true,
            })),
            handlers: vec![lambda_handler_entry()],
        }));
        gateway.matcher().insert(Arc::new(GatewayPolicy {
            source: Some(Source::Http(HttpSource {
                path: "/api/".to_string(),
                method: HttpMethod::Undefined as i32,
                exact_path_match: false,
            })),
            handlers: vec![lambda_handler_entry()],
        }));

        Arc::new(BridgeState {
            gateway,
            options: GatewayOptions::default(),
        })
    }

    fn grpc_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(payload.len() + 5);
        frame.push(0);
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    #[tokio::test]
    async fn http_requests_reach_the_function_backend() {
        let app = router(bridge_state());

        let response = app
            .oneshot(
                http::Request::builder()
                    .method("POST")
                    .uri("/api/items?page=2")
                    .body(axum::body::Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.headers()["x-path"], "/api/items");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hi");
    }

    #[tokio::test]
    async fn unmatched_http_paths_map_to_404() {
        let app = router(bridge_state());

        let response = app
            .oneshot(
                http::Request::builder()
                    .method("GET")
                    .uri("/elsewhere")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn grpc_calls_proxy_through_the_raw_codec() {
        let app = router(bridge_state());

        let response = app
            .oneshot(
                http::Request::builder()
                    .method("POST")
                    .uri("/p.S/Echo")
                    .header("content-type", "application/grpc")
                    .header("te", "trailers")
                    .body(axum::body::Body::from(grpc_frame(b"ping")))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::OK);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("application/grpc"));

        let collected = response.into_body().collect().await.unwrap();
        let trailers_ok = collected
            .trailers()
            .map(|trailers| trailers.get("grpc-status").map(|v| v == "0").unwrap_or(false))
            .unwrap_or(false);
        assert!(trailers_ok, "expected grpc-status 0 in trailers");

        let body = collected.to_bytes();
        assert_eq!(&body[..5], &grpc_frame(b"hi")[..5]);
        assert_eq!(&body[5..], b"hi");
    }

    #[tokio::test]
    async fn unknown_grpc_methods_are_unimplemented() {
        let app = router(bridge_state());

        let response = app
            .oneshot(
                http::Request::builder()
                    .method("POST")
                    .uri("/p.S/Missing")
                    .header("content-type", "application/grpc")
                    .body(axum::body::Body::from(grpc_frame(b"ping")))
                    .unwrap(),
            )
            .await
            .unwrap();

        // Unimplemented surfaces as grpc-status 12, in headers for
        // trailers-only responses or in trailers otherwise.
        let header_status = response
            .headers()
            .get("grpc-status")
            .map(|value| value.to_str().unwrap().to_string());
        let collected = response.into_body().collect().await.unwrap();
        let trailer_status = collected
            .trailers()
            .and_then(|trailers| trailers.get("grpc-status"))
            .map(|value| value.to_str().unwrap().to_string());

        assert_eq!(
            header_status.or(trailer_status).as_deref(),
            Some("12"),
            "expected grpc-status 12"
        );
    }
}
