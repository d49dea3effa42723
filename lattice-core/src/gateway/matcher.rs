//! Concurrent route matcher for gateway policies.
//!
//! Two tables per source kind: exact and prefix. Leaves hold either a policy
//! (gRPC) or a method-keyed map with an undefined-method wildcard slot (HTTP).
//! A read-write lock separates matching from mutation; matching never blocks
//! other matchers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use lattice_proto::types::gateway_policy::Source;
use lattice_proto::types::{GatewayPolicy, HttpMethod};

#[derive(Default)]
struct PathNode {
    /// gRPC leaf policy, or the HTTP wildcard (`HTTP_METHOD_UNDEFINED`).
    policy: Option<Arc<GatewayPolicy>>,
    by_method: HashMap<HttpMethod, Arc<GatewayPolicy>>,
}

impl PathNode {
    fn is_empty(&self) -> bool {
        self.policy.is_none() && self.by_method.is_empty()
    }

    fn resolve(&self, method: Option<HttpMethod>) -> Option<Arc<GatewayPolicy>> {
        match method {
            None => self.policy.clone(),
            Some(method) => self
                .by_method
                .get(&method)
                .cloned()
                .or_else(|| self.policy.clone()),
        }
    }
}

#[derive(Default)]
struct Table {
    exact: BTreeMap<String, PathNode>,
    prefix: BTreeMap<String, PathNode>,
}

impl Table {
    /// Exact match wins; among prefix matches the longest shared prefix wins.
    fn lookup(&self, key: &str, method: Option<HttpMethod>) -> Option<Arc<GatewayPolicy>> {
        if let Some(node) = self.exact.get(key) {
            if let Some(policy) = node.resolve(method) {
                return Some(policy);
            }
        }

        for end in (0..=key.len()).rev() {
            if !key.is_char_boundary(end) {
                continue;
            }
            if let Some(node) = self.prefix.get(&key[..end]) {
                return node.resolve(method);
            }
        }

        None
    }

    fn tree(&mut self, exact: bool) -> &mut BTreeMap<String, PathNode> {
        if exact {
            &mut self.exact
        } else {
            &mut self.prefix
        }
    }
}

/// Matcher shared between the gateway projector (writer) and the data-plane
/// bridge (readers).
#[derive(Default)]
pub struct PolicyMatcher {
    inner: RwLock<Table>,
}

impl PolicyMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, policy: Arc<GatewayPolicy>) {
        let Some(source) = policy.source.clone() else {
            return;
        };
        let mut table = self.inner.write().expect("matcher lock poisoned");

        match source {
            Source::Grpc(grpc) => {
                let node = table
                    .tree(grpc.exact_method_name_match)
                    .entry(grpc.method_name)
                    .or_default();
                node.policy = Some(policy);
            }
            Source::Http(http) => {
                let node = table
                    .tree(http.exact_path_match)
                    .entry(http.path)
                    .or_default();
                match HttpMethod::try_from(http.method).unwrap_or(HttpMethod::Undefined) {
                    HttpMethod::Undefined => node.policy = Some(policy),
                    method => {
                        node.by_method.insert(method, policy);
                    }
                }
            }
        }
    }

    pub fn remove(&self, policy: &GatewayPolicy) {
        let Some(source) = policy.source.clone() else {
            return;
        };
        let mut table = self.inner.write().expect("matcher lock poisoned");

        match source {
            Source::Grpc(grpc) => {
                let tree = table.tree(grpc.exact_method_name_match);
                let mut empty = false;
                if let Some(node) = tree.get_mut(&grpc.method_name) {
                    node.policy = None;
                    empty = node.is_empty();
                }
                if empty {
                    tree.remove(&grpc.method_name);
                }
            }
            Source::Http(http) => {
                let tree = table.tree(http.exact_path_match);
                let mut empty = false;
                if let Some(node) = tree.get_mut(&http.path) {
                    match HttpMethod::try_from(http.method).unwrap_or(HttpMethod::Undefined) {
                        HttpMethod::Undefined => node.policy = None,
                        method => {
                            node.by_method.remove(&method);
                        }
                    }
                    empty = node.is_empty();
                }
                if empty {
                    tree.remove(&http.path);
                }
            }
        }
    }

    /// Matches a gRPC call by its full method name.
    pub fn match_grpc(&self, full_method_name: &str) -> Option<Arc<GatewayPolicy>> {
        let table = self.inner.read().expect("matcher lock poisoned");
        table.lookup(full_method_name, None)
    }

    /// Matches an HTTP call by path, then by method within the path node.
    pub fn match_http(&self, path: &str, method: &str) -> Option<Arc<GatewayPolicy>> {
        let table = self.inner.read().expect("matcher lock poisoned");
        table.lookup(path, Some(HttpMethod::from_token(method)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_proto::types::gateway_policy::{GrpcSource, HttpSource};

    fn grpc_policy(method_name: &str, exact: bool) -> Arc<GatewayPolicy> {
        Arc::new(GatewayPolicy {
            source: Some(Source::Grpc(GrpcSource {
                method_name: method_name.to_string(),
                exact_method_name_match: exact,
            })),
            handlers: Vec::new(),
        })
    }

    fn http_policy(path: &str, method: HttpMethod, exact: bool) -> Arc<GatewayPolicy> {
        Arc::new(GatewayPolicy {
            source: Some(Source::Http(HttpSource {
                path: path.to_string(),
                method: method as i32,
                exact_path_match: exact,
            })),
            handlers: Vec::new(),
        })
    }

    #[test]
    fn exact_wins_over_prefix() {
        let matcher = PolicyMatcher::new();
        let exact = grpc_policy("/svc.M", true);
        let prefix = grpc_policy("/svc.", false);

        matcher.insert(exact.clone());
        matcher.insert(prefix.clone());

        assert!(Arc::ptr_eq(&matcher.match_grpc("/svc.M").unwrap(), &exact));
        assert!(Arc::ptr_eq(
            &matcher.match_grpc("/svc.Other").unwrap(),
            &prefix
        ));
        assert!(matcher.match_grpc("/svc2.M").is_none());
    }

    #[test]
    fn longest_prefix_wins() {
        let matcher = PolicyMatcher::new();
        let short = grpc_policy("/a", false);
        let long = grpc_policy("/a/b", false);

        matcher.insert(short.clone());
        matcher.insert(long.clone());

        assert!(Arc::ptr_eq(&matcher.match_grpc("/a/b/c").unwrap(), &long));
        assert!(Arc::ptr_eq(&matcher.match_grpc("/a/x").unwrap(), &short));
    }

    #[test]
    fn http_method_dispatch_with_wildcard() {
        let matcher = PolicyMatcher::new();
        let get = http_policy("/api/items", HttpMethod::Get, true);
        let wildcard = http_policy("/api/items", HttpMethod::Undefined, true);

        matcher.insert(get.clone());
        matcher.insert(wildcard.clone());

        assert!(Arc::ptr_eq(
            &matcher.match_http("/api/items", "GET").unwrap(),
            &get
        ));
        // Undefined-method policies act as wildcards for the path node.
        assert!(Arc::ptr_eq(
            &matcher.match_http("/api/items", "POST").unwrap(),
            &wildcard
        ));
    }

    #[test]
    fn http_prefix_paths_match_descendants() {
        let matcher = PolicyMatcher::new();
        let api = http_policy("/api/", HttpMethod::Post, false);
        matcher.insert(api.clone());

        assert!(Arc::ptr_eq(
            &matcher.match_http("/api/items/42", "POST").unwrap(),
            &api
        ));
        assert!(matcher.match_http("/api/items/42", "DELETE").is_none());
        assert!(matcher.match_http("/other", "POST").is_none());
    }

    #[test]
    fn remove_clears_only_the_target_entry() {
        let matcher = PolicyMatcher::new();
        let exact = grpc_policy("/svc.M", true);
        let prefix = grpc_policy("/svc.", false);

        matcher.insert(exact.clone());
        matcher.insert(prefix.clone());
        matcher.remove(&exact);

        assert!(Arc::ptr_eq(
            &matcher.match_grpc("/svc.M").unwrap(),
            &prefix
        ));

        matcher.remove(&prefix);
        assert!(matcher.match_grpc("/svc.M").is_none());
    }
}
