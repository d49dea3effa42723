//! HTTP-based function invoker.
//!
//! Posts the request envelope as JSON to `{endpoint}/{function_name}` and
//! expects the response envelope back, the way function URLs behave. The
//! qualifier travels as a query parameter.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use lattice_core::error::{LatticeError, Result};
use lattice_core::faas::{FunctionInvoker, FunctionRequest, FunctionResponse};

pub struct HttpFunctionInvoker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpFunctionInvoker {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FunctionInvoker for HttpFunctionInvoker {
    async fn invoke(
        &self,
        function_name: &str,
        qualifier: &str,
        request: FunctionRequest,
    ) -> Result<FunctionResponse> {
        let url = format!("{}/{}", self.endpoint, function_name);
        debug!(%url, qualifier, "invoking function");

        let mut builder = self.client.post(&url).json(&request);
        if !qualifier.is_empty() {
            builder = builder.query(&[("qualifier", qualifier)]);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| LatticeError::Transport(format!("function invocation: {err}")))?;

        if response.status() != StatusCode::OK {
            return Err(LatticeError::Internal(format!(
                "function endpoint answered {} for {function_name}",
                response.status()
            )));
        }

        response
            .json::<FunctionResponse>()
            .await
            .map_err(|err| LatticeError::Decode(format!("function response envelope: {err}")))
    }
}
