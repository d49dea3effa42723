//! Edge gateway: policy projector, route matcher and per-call handler
//! contracts shared with the data-plane bridge.

pub mod bridge;
pub mod matcher;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use lattice_proto::types::gateway_policy::{aws_handler, handler};
use lattice_proto::types::{gateway_policy, GatewayPolicy, Resource};
use lattice_proto::AnyPayload;

use crate::error::{LatticeError, Result};
use crate::sync::EventHandler;

pub use matcher::PolicyMatcher;

/// Kind tag for registered gateway handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerType {
    AwsLambda,
}

/// Resolves the handler kind and lambda parameters of one policy handler
/// entry, if its oneof chain is populated.
pub fn handler_kind(
    entry: &gateway_policy::Handler,
) -> Option<(HandlerType, &gateway_policy::LambdaFunction)> {
    match entry.handler.as_ref()? {
        handler::Handler::Aws(aws) => match aws.handler.as_ref()? {
            aws_handler::Handler::Lambda(lambda) => Some((HandlerType::AwsLambda, lambda)),
        },
    }
}

/// Whether a per-call handler accepts further request messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallFlow {
    Accepted,
    /// The handler is done receiving; remaining traffic is driven by the
    /// send loop only.
    Closed,
}

/// Per-call handler for a proxied gRPC stream. `call` feeds one raw request
/// frame; `result` yields raw response frames until it returns `None`.
#[async_trait]
pub trait GrpcCallHandler: Send + Sync {
    async fn call(&self, payload: Bytes) -> Result<CallFlow>;
    async fn result(&self) -> Result<Option<Bytes>>;
    fn outgoing_metadata(&self) -> HashMap<String, Vec<String>>;
}

/// Per-call handler result for a proxied HTTP request.
#[derive(Debug, Clone, Default)]
pub struct HttpHandlerResponse {
    pub status: u16,
    pub headers: HashMap<String, Vec<String>>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait HttpCallHandler: Send + Sync {
    async fn call(&self) -> Result<HttpHandlerResponse>;
}

/// Inputs available when constructing a per-call gRPC handler.
#[derive(Debug, Clone)]
pub struct GrpcCallContext {
    pub full_method_name: String,
    pub metadata: HashMap<String, Vec<String>>,
}

/// Inputs available when constructing a per-call HTTP handler.
#[derive(Debug, Clone)]
pub struct HttpCallContext {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, Vec<String>>,
    pub query: HashMap<String, Vec<String>>,
    pub body: Bytes,
}

/// A registered handler kind: sees policy batches and constructs per-call
/// handlers for matched traffic.
#[async_trait]
pub trait GatewayHandler: Send + Sync {
    fn handler_type(&self) -> HandlerType;

    /// Called once per batch with the updated and dropped policies that carry
    /// this handler kind. Stateless handlers may no-op.
    async fn process_policies(
        &self,
        updated: &[Arc<GatewayPolicy>],
        dropped: &[Arc<GatewayPolicy>],
    ) -> Result<()>;

    fn grpc_handler(
        &self,
        params: &gateway_policy::LambdaFunction,
        call: GrpcCallContext,
    ) -> Result<Arc<dyn GrpcCallHandler>>;

    fn http_handler(
        &self,
        params: &gateway_policy::LambdaFunction,
        call: HttpCallContext,
    ) -> Result<Arc<dyn HttpCallHandler>>;
}

/// Shared gateway state: the route matcher plus the handler registry. The
/// projector is the single writer; the data-plane bridge reads.
pub struct Gateway {
    matcher: PolicyMatcher,
    handlers: HashMap<HandlerType, Arc<dyn GatewayHandler>>,
}

impl Gateway {
    pub fn new(handlers: Vec<Arc<dyn GatewayHandler>>) -> Self {
        let handlers = handlers
            .into_iter()
            .map(|handler| (handler.handler_type(), handler))
            .collect();
        Self {
            matcher: PolicyMatcher::new(),
            handlers,
        }
    }

    pub fn matcher(&self) -> &PolicyMatcher {
        &self.matcher
    }

    pub fn handler(&self, kind: HandlerType) -> Option<Arc<dyn GatewayHandler>> {
        self.handlers.get(&kind).cloned()
    }

    fn registered(&self) -> impl Iterator<Item = &Arc<dyn GatewayHandler>> {
        self.handlers.values()
    }
}

/// Event-handler projector that keeps the matcher and the registered
/// handlers in sync with gateway policy resources.
pub struct GatewayProjector {
    gateway: Arc<Gateway>,
    active: HashMap<String, Arc<GatewayPolicy>>,
    updated: Vec<(String, Arc<GatewayPolicy>)>,
    dropped_ids: Vec<String>,
}

impl GatewayProjector {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            active: HashMap::new(),
            updated: Vec::new(),
            dropped_ids: Vec::new(),
        }
    }

    pub fn active_policies(&self) -> usize {
        self.active.len()
    }
}

#[async_trait]
impl EventHandler for GatewayProjector {
    async fn before_batch(&mut self) -> Result<()> {
        self.updated.clear();
        self.dropped_ids.clear();
        Ok(())
    }

    async fn on_updated(&mut self, resource: Resource) -> Result<()> {
        let Some(spec) = resource.spec.as_ref() else {
            return Ok(());
        };

        match GatewayPolicy::from_any(spec) {
            Ok(policy) => {
                self.updated.push((resource.id, Arc::new(policy)));
            }
            Err(err) => {
                warn!(id = %resource.id, error = %err, "skipping undecodable gateway policy");
            }
        }
        Ok(())
    }

    async fn on_dropped(&mut self, resource: Resource) -> Result<()> {
        self.dropped_ids.push(resource.id);
        Ok(())
    }

    async fn after_batch(&mut self) -> Result<()> {
        let mut dropped_policies = Vec::new();
        for id in self.dropped_ids.drain(..) {
            if let Some(policy) = self.active.remove(&id) {
                self.gateway.matcher.remove(&policy);
                dropped_policies.push(policy);
            }
        }

        let mut updated_policies = Vec::new();
        for (id, policy) in self.updated.drain(..) {
            self.gateway.matcher.insert(Arc::clone(&policy));
            self.active.insert(id, Arc::clone(&policy));
            updated_policies.push(policy);
        }

        for handler in self.gateway.registered() {
            handler
                .process_policies(&updated_policies, &dropped_policies)
                .await?;
        }

        Ok(())
    }
}

/// Looks up the registered handler for each entry in the policy's handler
/// list and constructs the per-call gRPC handlers, in declared order.
pub fn grpc_handlers_for_policy(
    gateway: &Gateway,
    policy: &GatewayPolicy,
    call: &GrpcCallContext,
) -> Result<Vec<Arc<dyn GrpcCallHandler>>> {
    let mut handlers = Vec::new();

    for entry in &policy.handlers {
        let Some((kind, params)) = handler_kind(entry) else {
            continue;
        };
        let registered = gateway.handler(kind).ok_or_else(|| {
            LatticeError::Internal(format!("no gateway handler registered for {kind:?}"))
        })?;
        handlers.push(registered.grpc_handler(params, call.clone())?);
    }

    Ok(handlers)
}

/// HTTP counterpart of [`grpc_handlers_for_policy`].
pub fn http_handlers_for_policy(
    gateway: &Gateway,
    policy: &GatewayPolicy,
    call: &HttpCallContext,
) -> Result<Vec<Arc<dyn HttpCallHandler>>> {
    let mut handlers = Vec::new();

    for entry in &policy.handlers {
        let Some((kind, params)) = handler_kind(entry) else {
            continue;
        };
        let registered = gateway.handler(kind).ok_or_else(|| {
            LatticeError::Internal(format!("no gateway handler registered for {kind:?}"))
        })?;
        handlers.push(registered.http_handler(params, call.clone())?);
    }

    Ok(handlers)
}
