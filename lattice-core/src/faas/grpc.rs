//! Per-call gRPC handler backed by a function-as-a-service invocation.
//!
//! One request message maps to one function invocation. A `102 Processing`
//! response opens a server-stream continuation: the handler saves the
//! original envelope and reinvokes the function each time the continuation
//! timer fires or a pub/sub signal arrives, emitting each response body as
//! one additional gRPC message. Only the first `call` closes the upstream
//! receive loop; continuations are driven solely by the send loop.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use tokio::sync::{Mutex, Notify};
use tonic::Status;
use tracing::debug;

use lattice_config::GatewayOptions;
use lattice_proto::types::gateway_policy::LambdaFunction;

use crate::error::{LatticeError, Result};
use crate::gateway::{CallFlow, GrpcCallContext, GrpcCallHandler};
use crate::pubsub::{PubSub, Subscriber};

use super::{grpc_code_for_status, FunctionInvoker, FunctionRequest, FunctionResponse,
    STATUS_PROCESSING};

/// Hub carrying continuation signals; payloads are opaque.
pub type SignalHub = PubSub<Vec<u8>>;

enum Phase {
    /// Before the first invocation completed.
    Waiting,
    /// Server-stream continuation: reinvoke `request` on timer or signal.
    Streaming {
        request: FunctionRequest,
        timeout: Duration,
    },
    Finished,
}

struct CallState {
    phase: Phase,
    pending: VecDeque<Bytes>,
    signal_rx: Option<Subscriber<Vec<u8>>>,
}

struct SignalBinding {
    hub: Arc<SignalHub>,
    subscriber_id: u64,
}

pub struct LambdaGrpcHandler {
    invoker: Arc<dyn FunctionInvoker>,
    function_name: String,
    qualifier: String,
    full_method_name: String,
    incoming: HashMap<String, Vec<String>>,
    stream_timeout_header: String,
    signal: Option<SignalBinding>,
    state: Mutex<CallState>,
    first_call: Notify,
    outgoing: std::sync::Mutex<HashMap<String, Vec<String>>>,
}

fn header_value<'a>(headers: &'a HashMap<String, Vec<String>>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}

fn decode_body(response: &FunctionResponse) -> Result<Bytes> {
    if response.is_base64_encoded {
        BASE64
            .decode(&response.body)
            .map(Bytes::from)
            .map_err(|err| LatticeError::Internal(format!("malformed function body: {err}")))
    } else {
        Ok(Bytes::from(response.body.clone().into_bytes()))
    }
}

impl LambdaGrpcHandler {
    pub fn new(
        invoker: Arc<dyn FunctionInvoker>,
        params: &LambdaFunction,
        call: GrpcCallContext,
        options: &GatewayOptions,
        hub: Option<Arc<SignalHub>>,
    ) -> Self {
        let mut signal = None;
        let mut signal_rx = None;

        if !params.lambda_stream_signal_header_key.is_empty() {
            if let (Some(hub), Some(value)) = (
                hub,
                header_value(&call.metadata, &params.lambda_stream_signal_header_key),
            ) {
                let topic = format!("{}{}", options.stream_topic_prefix, value);
                debug!(%topic, "subscribing for server-stream signals");
                let subscriber = hub.subscribe(&[topic]);
                signal = Some(SignalBinding {
                    hub,
                    subscriber_id: subscriber.id(),
                });
                signal_rx = Some(subscriber);
            }
        }

        Self {
            invoker,
            function_name: params.function_name.clone(),
            qualifier: params.qualifier.clone(),
            full_method_name: call.full_method_name,
            incoming: call.metadata,
            stream_timeout_header: options.stream_timeout_header.clone(),
            signal,
            state: Mutex::new(CallState {
                phase: Phase::Waiting,
                pending: VecDeque::new(),
                signal_rx,
            }),
            first_call: Notify::new(),
            outgoing: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn close(&self, state: &mut CallState) {
        state.phase = Phase::Finished;
        state.signal_rx = None;
        if let Some(binding) = &self.signal {
            binding.hub.unsubscribe(binding.subscriber_id);
        }
    }

    /// Applies one function response: records outgoing metadata, maps error
    /// statuses, queues the body and advances the continuation phase.
    fn absorb_response(
        &self,
        state: &mut CallState,
        request: FunctionRequest,
        response: FunctionResponse,
    ) -> Result<()> {
        let merged = response.merged_headers();
        *self.outgoing.lock().expect("metadata lock poisoned") = merged.clone();

        if let Some(code) = grpc_code_for_status(response.status_code) {
            return Err(LatticeError::Downstream(Status::new(code, response.body)));
        }

        let body = decode_body(&response)?;

        if response.status_code == STATUS_PROCESSING {
            let raw = header_value(&merged, &self.stream_timeout_header).ok_or_else(|| {
                LatticeError::Internal(format!(
                    "server-stream continuation without {} header",
                    self.stream_timeout_header
                ))
            })?;
            let timeout = humantime::parse_duration(raw).map_err(|err| {
                LatticeError::Internal(format!(
                    "invalid {} value {raw:?}: {err}",
                    self.stream_timeout_header
                ))
            })?;

            state.pending.push_back(body);
            state.phase = Phase::Streaming { request, timeout };
        } else {
            state.pending.push_back(body);
            state.phase = Phase::Finished;
        }

        Ok(())
    }

    async fn reinvoke(&self, request: FunctionRequest) -> Result<()> {
        let response = self
            .invoker
            .invoke(&self.function_name, &self.qualifier, request.clone())
            .await;

        let mut state = self.state.lock().await;
        match response {
            Ok(response) => {
                if let Err(err) = self.absorb_response(&mut state, request, response) {
                    self.close(&mut state);
                    return Err(err);
                }
                Ok(())
            }
            Err(err) => {
                self.close(&mut state);
                Err(err)
            }
        }
    }
}

impl Drop for LambdaGrpcHandler {
    fn drop(&mut self) {
        if let Some(binding) = &self.signal {
            binding.hub.unsubscribe(binding.subscriber_id);
        }
    }
}

#[async_trait]
impl GrpcCallHandler for LambdaGrpcHandler {
    async fn call(&self, payload: Bytes) -> Result<CallFlow> {
        let request = FunctionRequest {
            path: self.full_method_name.clone(),
            multi_value_headers: self.incoming.clone(),
            body: BASE64.encode(&payload),
            is_base64_encoded: true,
            ..Default::default()
        };

        let response = self
            .invoker
            .invoke(&self.function_name, &self.qualifier, request.clone())
            .await;

        let mut state = self.state.lock().await;
        let result = match response {
            Ok(response) => self.absorb_response(&mut state, request, response),
            Err(err) => Err(err),
        };
        if result.is_err() {
            self.close(&mut state);
        }
        drop(state);
        self.first_call.notify_waiters();

        result.map(|_| CallFlow::Closed)
    }

    async fn result(&self) -> Result<Option<Bytes>> {
        enum Step {
            Done,
            WaitFirstCall,
            Continue(FunctionRequest, Duration),
        }

        loop {
            let step;
            let mut signal_rx = None;
            {
                let mut state = self.state.lock().await;

                if let Some(body) = state.pending.pop_front() {
                    return Ok(Some(body));
                }

                step = match &state.phase {
                    Phase::Finished => Step::Done,
                    Phase::Waiting => Step::WaitFirstCall,
                    Phase::Streaming { request, timeout } => {
                        Step::Continue(request.clone(), *timeout)
                    }
                };

                match step {
                    Step::Done => {
                        self.close(&mut state);
                        return Ok(None);
                    }
                    Step::Continue(..) => signal_rx = state.signal_rx.take(),
                    Step::WaitFirstCall => {}
                }
            }

            match step {
                Step::Done => unreachable!("handled under the state lock"),
                Step::WaitFirstCall => {
                    // Register before re-checking so a notification between
                    // the lock release and the await is not lost.
                    let notified = self.first_call.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    let waiting = {
                        let state = self.state.lock().await;
                        state.pending.is_empty() && matches!(state.phase, Phase::Waiting)
                    };
                    if waiting {
                        notified.await;
                    }
                }
                Step::Continue(request, timeout) => {
                    let hub_gone = match signal_rx.as_mut() {
                        Some(rx) => {
                            tokio::select! {
                                _ = tokio::time::sleep(timeout) => false,
                                message = rx.recv() => message.is_none(),
                            }
                        }
                        None => {
                            tokio::time::sleep(timeout).await;
                            false
                        }
                    };

                    if hub_gone {
                        signal_rx = None;
                    }
                    self.state.lock().await.signal_rx = signal_rx;

                    if hub_gone {
                        continue;
                    }

                    self.reinvoke(request).await?;
                }
            }
        }
    }

    fn outgoing_metadata(&self) -> HashMap<String, Vec<String>> {
        self.outgoing
            .lock()
            .expect("metadata lock poisoned")
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Instant;

    struct ScriptedInvoker {
        responses: StdMutex<VecDeque<FunctionResponse>>,
        requests: StdMutex<Vec<FunctionRequest>>,
    }

    impl ScriptedInvoker {
        fn new(responses: Vec<FunctionResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses.into()),
                requests: StdMutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl FunctionInvoker for ScriptedInvoker {
        async fn invoke(
            &self,
            _function_name: &str,
            _qualifier: &str,
            request: FunctionRequest,
        ) -> Result<FunctionResponse> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LatticeError::Internal("no scripted response".to_string()))
        }
    }

    fn ok_response(body: &[u8]) -> FunctionResponse {
        FunctionResponse {
            status_code: 200,
            body: BASE64.encode(body),
            is_base64_encoded: true,
            ..Default::default()
        }
    }

    fn processing_response(body: &[u8], timeout: &str) -> FunctionResponse {
        FunctionResponse {
            status_code: STATUS_PROCESSING,
            headers: HashMap::from([(
                "x-server-stream-timeout".to_string(),
                timeout.to_string(),
            )]),
            body: BASE64.encode(body),
            is_base64_encoded: true,
            ..Default::default()
        }
    }

    fn handler(
        invoker: Arc<ScriptedInvoker>,
        params: LambdaFunction,
        metadata: HashMap<String, Vec<String>>,
        hub: Option<Arc<SignalHub>>,
    ) -> LambdaGrpcHandler {
        LambdaGrpcHandler::new(
            invoker,
            &params,
            GrpcCallContext {
                full_method_name: "/p.S/Echo".to_string(),
                metadata,
            },
            &GatewayOptions::default(),
            hub,
        )
    }

    #[tokio::test]
    async fn unary_happy_path() {
        let invoker = ScriptedInvoker::new(vec![FunctionResponse {
            headers: HashMap::from([("x-trace".to_string(), "t-1".to_string())]),
            ..ok_response(b"hi")
        }]);
        let metadata = HashMap::from([("authorization".to_string(), vec!["b".to_string()])]);
        let handler = handler(invoker.clone(), LambdaFunction::default(), metadata, None);

        let flow = handler.call(Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(flow, CallFlow::Closed);

        assert_eq!(handler.result().await.unwrap(), Some(Bytes::from_static(b"hi")));
        assert_eq!(handler.result().await.unwrap(), None);

        let requests = invoker.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/p.S/Echo");
        assert_eq!(requests[0].body, BASE64.encode(b"ping"));
        assert!(requests[0].is_base64_encoded);
        assert_eq!(
            requests[0].multi_value_headers["authorization"],
            vec!["b".to_string()]
        );

        assert_eq!(
            handler.outgoing_metadata()["x-trace"],
            vec!["t-1".to_string()]
        );
    }

    #[tokio::test]
    async fn error_statuses_map_to_grpc_codes() {
        let invoker = ScriptedInvoker::new(vec![FunctionResponse {
            status_code: 404,
            body: "missing".to_string(),
            ..Default::default()
        }]);
        let handler = handler(invoker, LambdaFunction::default(), HashMap::new(), None);

        let err = handler.call(Bytes::new()).await.unwrap_err();
        match err {
            LatticeError::Downstream(status) => {
                assert_eq!(status.code(), tonic::Code::NotFound);
                assert_eq!(status.message(), "missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn server_stream_continuation_replays_the_saved_payload() {
        let invoker = ScriptedInvoker::new(vec![
            processing_response(b"a", "50ms"),
            processing_response(b"b", "50ms"),
            ok_response(b"c"),
        ]);
        let handler = handler(
            invoker.clone(),
            LambdaFunction::default(),
            HashMap::new(),
            None,
        );

        handler.call(Bytes::from_static(b"req")).await.unwrap();

        let started = Instant::now();
        assert_eq!(handler.result().await.unwrap(), Some(Bytes::from_static(b"a")));
        assert_eq!(handler.result().await.unwrap(), Some(Bytes::from_static(b"b")));
        assert_eq!(handler.result().await.unwrap(), Some(Bytes::from_static(b"c")));
        assert_eq!(handler.result().await.unwrap(), None);
        assert!(started.elapsed() >= Duration::from_millis(100));

        let requests = invoker.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        // Continuations reuse the originally saved envelope.
        assert_eq!(requests[0], requests[1]);
        assert_eq!(requests[1], requests[2]);
    }

    #[tokio::test]
    async fn invalid_continuation_timeout_is_internal() {
        let invoker = ScriptedInvoker::new(vec![processing_response(b"a", "soon")]);
        let handler = handler(invoker, LambdaFunction::default(), HashMap::new(), None);

        let err = handler.call(Bytes::new()).await.unwrap_err();
        assert!(matches!(err, LatticeError::Internal(_)));
    }

    #[tokio::test]
    async fn signal_unblocks_the_continuation_before_the_timer() {
        let hub: Arc<SignalHub> = Arc::new(PubSub::new());
        let invoker = ScriptedInvoker::new(vec![
            processing_response(b"first", "10s"),
            ok_response(b"done"),
        ]);
        let params = LambdaFunction {
            lambda_stream_signal_header_key: "x-call-id".to_string(),
            ..Default::default()
        };
        let metadata = HashMap::from([("x-call-id".to_string(), vec!["k1".to_string()])]);
        let handler = Arc::new(handler(
            invoker.clone(),
            params,
            metadata,
            Some(Arc::clone(&hub)),
        ));

        handler.call(Bytes::from_static(b"req")).await.unwrap();
        assert_eq!(
            handler.result().await.unwrap(),
            Some(Bytes::from_static(b"first"))
        );

        let publisher = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                hub.publish(
                    false,
                    vec![crate::pubsub::Message {
                        topic: "lambda.server.stream:k1".to_string(),
                        payload: Vec::new(),
                    }],
                )
                .await
            })
        };

        let started = Instant::now();
        assert_eq!(
            handler.result().await.unwrap(),
            Some(Bytes::from_static(b"done"))
        );
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(publisher.await.unwrap(), 1);

        assert_eq!(handler.result().await.unwrap(), None);
        assert_eq!(invoker.request_count(), 2);

        // The handler unsubscribed on close.
        let addressed = hub
            .publish(
                false,
                vec![crate::pubsub::Message {
                    topic: "lambda.server.stream:k1".to_string(),
                    payload: Vec::new(),
                }],
            )
            .await;
        assert_eq!(addressed, 0);
    }
}
