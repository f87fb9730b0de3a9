//! Core Protocol Identifiers
//!
//! Node identifiers and IPN endpoint addressing shared by every layer.
//! A node is addressed on the wire as `ipn:<node>.<service>` where the
//! service number selects the application on that node.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// IPN service number carrying DTNEX gossip payloads.
pub const DTNEX_SERVICE: u32 = 12160;

/// IPN service number reserved for the echo responder (external collaborator).
pub const ECHO_SERVICE: u32 = 12161;

/// A DTN node number.
///
/// Wide enough for 64-bit IPN identifiers. Zero is never a valid node id;
/// the router adapter reports a non-zero id once connected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Create a node id from its raw number.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw node number.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Whether this is the unassigned (zero) id.
    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// An IPN endpoint: a service on a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Destination node.
    pub node: NodeId,
    /// Service number on that node.
    pub service: u32,
}

impl Endpoint {
    /// Create an endpoint from node and service.
    pub fn new(node: NodeId, service: u32) -> Self {
        Self { node, service }
    }

    /// The DTNEX gossip endpoint on a node.
    pub fn dtnex(node: NodeId) -> Self {
        Self::new(node, DTNEX_SERVICE)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipn:{}.{}", self.node, self.service)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("ipn:")
            .ok_or_else(|| EndpointParseError(s.to_string()))?;
        let (node, service) = rest
            .split_once('.')
            .ok_or_else(|| EndpointParseError(s.to_string()))?;
        let node: u64 = node.parse().map_err(|_| EndpointParseError(s.to_string()))?;
        let service: u32 = service
            .parse()
            .map_err(|_| EndpointParseError(s.to_string()))?;
        Ok(Endpoint::new(NodeId::new(node), service))
    }
}

/// Error for malformed `ipn:<node>.<service>` strings.
#[derive(Debug, thiserror::Error)]
#[error("invalid ipn endpoint: {0:?}")]
pub struct EndpointParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_display() {
        let ep = Endpoint::dtnex(NodeId::new(268484800));
        assert_eq!(ep.to_string(), "ipn:268484800.12160");
    }

    #[test]
    fn test_endpoint_parse_roundtrip() {
        let ep: Endpoint = "ipn:42.12161".parse().unwrap();
        assert_eq!(ep.node, NodeId::new(42));
        assert_eq!(ep.service, ECHO_SERVICE);
        assert_eq!(ep.to_string().parse::<Endpoint>().unwrap(), ep);
    }

    #[test]
    fn test_endpoint_parse_rejects_garbage() {
        assert!("dtn://node".parse::<Endpoint>().is_err());
        assert!("ipn:12160".parse::<Endpoint>().is_err());
        assert!("ipn:a.b".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_node_id_unset() {
        assert!(NodeId::new(0).is_unset());
        assert!(!NodeId::new(1).is_unset());
    }
}
