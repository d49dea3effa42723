//! Function-as-a-service bridging: request/response envelopes, the
//! HTTP-to-gRPC status mapping, and the per-call handlers that proxy gRPC
//! and HTTP traffic to a function backend.

pub mod grpc;
pub mod http;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lattice_config::GatewayOptions;
use lattice_proto::types::gateway_policy::LambdaFunction;
use lattice_proto::types::GatewayPolicy;

use crate::error::Result;
use crate::gateway::{
    GatewayHandler, GrpcCallContext, GrpcCallHandler, HandlerType, HttpCallContext,
    HttpCallHandler,
};

/// HTTP-style request envelope handed to the function backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FunctionRequest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub http_method: String,
    pub path: String,
    pub multi_value_headers: HashMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub multi_value_query_string_parameters: HashMap<String, Vec<String>>,
    pub body: String,
    pub is_base64_encoded: bool,
}

/// HTTP-style response envelope returned by the function backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FunctionResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub multi_value_headers: HashMap<String, Vec<String>>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl FunctionResponse {
    /// Union of the single-value and multi-value header maps.
    pub fn merged_headers(&self) -> HashMap<String, Vec<String>> {
        let mut merged: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in &self.headers {
            merged.entry(key.clone()).or_default().push(value.clone());
        }
        for (key, values) in &self.multi_value_headers {
            merged.entry(key.clone()).or_default().extend(values.iter().cloned());
        }
        merged
    }
}

/// Invokes one function synchronously; one invocation per request message.
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    async fn invoke(
        &self,
        function_name: &str,
        qualifier: &str,
        request: FunctionRequest,
    ) -> Result<FunctionResponse>;
}

/// The registered gateway handler for function-backed policies. Policies
/// need no eager processing here: per-call handlers resolve everything from
/// the policy's parameters at match time.
pub struct LambdaGatewayHandler {
    invoker: Arc<dyn FunctionInvoker>,
    options: GatewayOptions,
    hub: Option<Arc<grpc::SignalHub>>,
}

impl LambdaGatewayHandler {
    pub fn new(
        invoker: Arc<dyn FunctionInvoker>,
        options: GatewayOptions,
        hub: Option<Arc<grpc::SignalHub>>,
    ) -> Self {
        Self {
            invoker,
            options,
            hub,
        }
    }
}

#[async_trait]
impl GatewayHandler for LambdaGatewayHandler {
    fn handler_type(&self) -> HandlerType {
        HandlerType::AwsLambda
    }

    async fn process_policies(
        &self,
        _updated: &[Arc<GatewayPolicy>],
        _dropped: &[Arc<GatewayPolicy>],
    ) -> Result<()> {
        Ok(())
    }

    fn grpc_handler(
        &self,
        params: &LambdaFunction,
        call: GrpcCallContext,
    ) -> Result<Arc<dyn GrpcCallHandler>> {
        Ok(Arc::new(grpc::LambdaGrpcHandler::new(
            Arc::clone(&self.invoker),
            params,
            call,
            &self.options,
            self.hub.clone(),
        )))
    }

    fn http_handler(
        &self,
        params: &LambdaFunction,
        call: HttpCallContext,
    ) -> Result<Arc<dyn HttpCallHandler>> {
        Ok(Arc::new(http::LambdaHttpHandler::new(
            Arc::clone(&self.invoker),
            params,
            call,
        )))
    }
}

/// Status code signalling a server-stream continuation: more results follow.
pub const STATUS_PROCESSING: u16 = 102;

/// Maps a function response status to a terminal gRPC error code. `None`
/// means the response is not an error (2xx terminal or 102 continuation).
pub fn grpc_code_for_status(status: u16) -> Option<tonic::Code> {
    match status {
        410 => Some(tonic::Code::Aborted),
        400 => Some(tonic::Code::InvalidArgument),
        412 => Some(tonic::Code::FailedPrecondition),
        404 => Some(tonic::Code::NotFound),
        501 => Some(tonic::Code::Unimplemented),
        500 => Some(tonic::Code::Internal),
        504 => Some(tonic::Code::DeadlineExceeded),
        204 => Some(tonic::Code::OutOfRange),
        429 => Some(tonic::Code::ResourceExhausted),
        503 => Some(tonic::Code::Unavailable),
        409 => Some(tonic::Code::AlreadyExists),
        403 => Some(tonic::Code::Unauthenticated),
        507 => Some(tonic::Code::DataLoss),
        401 => Some(tonic::Code::PermissionDenied),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_map_is_total_over_the_defined_table() {
        let table = [
            (410, tonic::Code::Aborted),
            (400, tonic::Code::InvalidArgument),
            (412, tonic::Code::FailedPrecondition),
            (404, tonic::Code::NotFound),
            (501, tonic::Code::Unimplemented),
            (500, tonic::Code::Internal),
            (504, tonic::Code::DeadlineExceeded),
            (204, tonic::Code::OutOfRange),
            (429, tonic::Code::ResourceExhausted),
            (503, tonic::Code::Unavailable),
            (409, tonic::Code::AlreadyExists),
            (403, tonic::Code::Unauthenticated),
            (507, tonic::Code::DataLoss),
            (401, tonic::Code::PermissionDenied),
        ];

        for (status, code) in table {
            assert_eq!(grpc_code_for_status(status), Some(code), "status {status}");
        }

        // 200 and 102 are not errors; unknown codes fall through to the
        // OK-with-body path.
        assert_eq!(grpc_code_for_status(200), None);
        assert_eq!(grpc_code_for_status(STATUS_PROCESSING), None);
        assert_eq!(grpc_code_for_status(299), None);
    }

    #[test]
    fn merged_headers_unions_both_maps() {
        let response = FunctionResponse {
            headers: HashMap::from([("x-a".to_string(), "1".to_string())]),
            multi_value_headers: HashMap::from([
                ("x-a".to_string(), vec!["2".to_string()]),
                ("x-b".to_string(), vec!["3".to_string()]),
            ]),
            ..Default::default()
        };

        let merged = response.merged_headers();
        assert_eq!(merged["x-a"], vec!["1", "2"]);
        assert_eq!(merged["x-b"], vec!["3"]);
    }

    #[test]
    fn envelope_uses_api_gateway_field_names() {
        let request = FunctionRequest {
            path: "/p.S/Echo".to_string(),
            body: "aGk=".to_string(),
            is_base64_encoded: true,
            ..Default::default()
        };

        let encoded = serde_json::to_value(&request).expect("encode");
        assert_eq!(encoded["path"], "/p.S/Echo");
        assert_eq!(encoded["isBase64Encoded"], true);
        assert!(encoded.get("multiValueHeaders").is_some());
    }
}
