//! Projectors: event handlers that turn watch batches into downstream side
//! effects. The xDS projector lives here; the gateway and worker projectors
//! live with their subsystems.

pub mod translate;
pub mod xds;

pub use xds::{MemoryXdsCache, XdsCache, XdsProjector};
