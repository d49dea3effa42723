//! Wire types for the Lattice control plane and data plane.
//!
//! Message definitions are maintained by hand in the prost-generated style so
//! the workspace builds without `protoc`. The `services` module additionally
//! carries checked-in client/server stubs for the `ResourceStore` RPC surface,
//! following the same convention as other repos that commit their codegen
//! output next to the hand-written code.

pub mod services;
pub mod types;
pub mod xds;

use prost::Message;

/// Error returned when unpacking an [`prost_types::Any`] into a concrete
/// payload type.
#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    #[error("type url mismatch: expected {expected}, got {actual}")]
    TypeUrl { expected: &'static str, actual: String },

    #[error("payload decode: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Messages that can be packed into / unpacked from an [`prost_types::Any`]
/// with a fixed type URL.
pub trait AnyPayload: Message + Default + Sized {
    const TYPE_URL: &'static str;

    fn to_any(&self) -> prost_types::Any {
        prost_types::Any {
            type_url: Self::TYPE_URL.to_string(),
            value: self.encode_to_vec(),
        }
    }

    fn from_any(any: &prost_types::Any) -> Result<Self, UnpackError> {
        if any.type_url != Self::TYPE_URL {
            return Err(UnpackError::TypeUrl {
                expected: Self::TYPE_URL,
                actual: any.type_url.clone(),
            });
        }
        Ok(Self::decode(any.value.as_slice())?)
    }
}

macro_rules! any_payload {
    ($ty:ty, $url:literal) => {
        impl AnyPayload for $ty {
            const TYPE_URL: &'static str = $url;
        }
    };
}

any_payload!(types::NetworkingNode, "type.googleapis.com/lattice.types.v1.NetworkingNode");
any_payload!(types::HttpFilter, "type.googleapis.com/lattice.types.v1.HttpFilter");
any_payload!(types::GatewayPolicy, "type.googleapis.com/lattice.types.v1.GatewayPolicy");
any_payload!(types::Trigger, "type.googleapis.com/lattice.types.v1.Trigger");
any_payload!(types::Process, "type.googleapis.com/lattice.types.v1.Process");

any_payload!(xds::Listener, "type.googleapis.com/lattice.xds.v1.Listener");
any_payload!(xds::RouteConfiguration, "type.googleapis.com/lattice.xds.v1.RouteConfiguration");
any_payload!(xds::Cluster, "type.googleapis.com/lattice.xds.v1.Cluster");
any_payload!(xds::ClusterLoadAssignment, "type.googleapis.com/lattice.xds.v1.ClusterLoadAssignment");
any_payload!(xds::VirtualHost, "type.googleapis.com/lattice.xds.v1.VirtualHost");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Trigger;

    #[test]
    fn any_round_trip_checks_type_url() {
        let trigger = Trigger {
            name: "sync".to_string(),
            id_prefix: "sync/".to_string(),
            ..Default::default()
        };

        let any = trigger.to_any();
        assert_eq!(any.type_url, Trigger::TYPE_URL);

        let back = Trigger::from_any(&any).expect("unpack");
        assert_eq!(back, trigger);

        let err = types::GatewayPolicy::from_any(&any).unwrap_err();
        assert!(matches!(err, UnpackError::TypeUrl { .. }));
    }
}
