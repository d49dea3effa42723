//! # Lattice Core
//!
//! Core of the Lattice service mesh: an authoritative, versioned resource
//! store with a streaming watch protocol, client-side synchronizer state
//! machines, projectors (xDS, gateway matcher, workflow triggers), and the
//! edge data-plane bridge that proxies gRPC and HTTP calls to
//! function-as-a-service backends.
//!
//! ## Architecture
//!
//! - `store` — content-addressed resource store (PostgreSQL or in-memory)
//!   behind the `ResourceStore` RPC surface, including the watch protocol.
//! - `sync` — the synchronizer driving `EventHandler` callbacks from a watch
//!   stream, one per projector.
//! - `projector` — the xDS projector and its translations.
//! - `gateway` — policy matcher, gateway projector, and the data-plane
//!   bridge dispatching gRPC/HTTP traffic to per-call handlers.
//! - `faas` — function envelopes, status mapping and the lambda handlers.
//! - `worker` — workflow trigger manager.
//! - `pubsub` — in-process topic hub for continuation signals.

pub mod connector;
pub mod error;
pub mod faas;
pub mod gateway;
pub mod projector;
pub mod pubsub;
pub mod resource;
pub mod store;
pub mod sync;
pub mod worker;

pub use error::{LatticeError, Result};
