//! Per-call HTTP handler backed by a function-as-a-service invocation.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use lattice_proto::types::gateway_policy::LambdaFunction;

use crate::error::{LatticeError, Result};
use crate::gateway::{HttpCallContext, HttpCallHandler, HttpHandlerResponse};

use super::{FunctionInvoker, FunctionRequest};

pub struct LambdaHttpHandler {
    invoker: Arc<dyn FunctionInvoker>,
    function_name: String,
    qualifier: String,
    call: HttpCallContext,
}

impl LambdaHttpHandler {
    pub fn new(
        invoker: Arc<dyn FunctionInvoker>,
        params: &LambdaFunction,
        call: HttpCallContext,
    ) -> Self {
        Self {
            invoker,
            function_name: params.function_name.clone(),
            qualifier: params.qualifier.clone(),
            call,
        }
    }
}

#[async_trait]
impl HttpCallHandler for LambdaHttpHandler {
    async fn call(&self) -> Result<HttpHandlerResponse> {
        let request = FunctionRequest {
            http_method: self.call.method.clone(),
            path: self.call.path.clone(),
            multi_value_headers: self.call.headers.clone(),
            multi_value_query_string_parameters: self.call.query.clone(),
            body: BASE64.encode(&self.call.body),
            is_base64_encoded: true,
        };

        let response = self
            .invoker
            .invoke(&self.function_name, &self.qualifier, request)
            .await?;

        let body = if response.is_base64_encoded {
            BASE64.decode(&response.body).map_err(|err| {
                LatticeError::Internal(format!("malformed function body: {err}"))
            })?
        } else {
            response.body.clone().into_bytes()
        };

        Ok(HttpHandlerResponse {
            status: response.status_code,
            headers: response.merged_headers(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faas::FunctionResponse;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct OneShotInvoker {
        response: FunctionResponse,
        seen: Mutex<Option<FunctionRequest>>,
    }

    #[async_trait]
    impl FunctionInvoker for OneShotInvoker {
        async fn invoke(
            &self,
            _function_name: &str,
            _qualifier: &str,
            request: FunctionRequest,
        ) -> Result<FunctionResponse> {
            *self.seen.lock().unwrap() = Some(request);
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn builds_envelope_and_decodes_response() {
        let invoker = Arc::new(OneShotInvoker {
            response: FunctionResponse {
                status_code: 201,
                headers: HashMap::from([("x-one".to_string(), "1".to_string())]),
                multi_value_headers: HashMap::from([(
                    "x-many".to_string(),
                    vec!["a".to_string(), "b".to_string()],
                )]),
                body: BASE64.encode(b"created"),
                is_base64_encoded: true,
            },
            seen: Mutex::new(None),
        });

        let handler = LambdaHttpHandler::new(
            Arc::clone(&invoker) as Arc<dyn FunctionInvoker>,
            &LambdaFunction::default(),
            HttpCallContext {
                method: "POST".to_string(),
                path: "/api/items".to_string(),
                headers: HashMap::from([("accept".to_string(), vec!["*/*".to_string()])]),
                query: HashMap::from([("page".to_string(), vec!["2".to_string()])]),
                body: Bytes::from_static(b"{}"),
            },
        );

        let response = handler.call().await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.body, b"created");
        assert_eq!(response.headers["x-one"], vec!["1".to_string()]);
        assert_eq!(
            response.headers["x-many"],
            vec!["a".to_string(), "b".to_string()]
        );

        let seen = invoker.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.http_method, "POST");
        assert_eq!(seen.path, "/api/items");
        assert_eq!(seen.multi_value_query_string_parameters["page"], vec!["2"]);
        assert_eq!(seen.body, BASE64.encode(b"{}"));
    }
}
