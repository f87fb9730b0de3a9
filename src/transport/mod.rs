//! Bundle Transport Layer
//!
//! Moves opaque envelope payloads between `ipn:<node>.<service>` endpoints.
//! Outbound sends are best-effort; inbound bundles arrive on an mpsc
//! channel fed by each transport's receive loop, which gives the engine an
//! interruptible blocking receive. Concurrent send and receive on the same
//! transport is supported.

pub mod mem;
pub mod udp;

pub use mem::{MemHub, MemTransport};
pub use udp::UdpTransport;

use crate::types::{Endpoint, NodeId};
use std::time::Duration;
use thiserror::Error;

/// Largest payload a transport will carry in one bundle.
pub const MAX_BUNDLE_SIZE: usize = 1024;

/// Errors related to transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport not started")]
    NotStarted,

    #[error("transport already started")]
    AlreadyStarted,

    #[error("transport failed to start: {0}")]
    StartFailed(String),

    #[error("no route to node {0}")]
    UnknownDestination(NodeId),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("bundle of {size} bytes exceeds limit {MAX_BUNDLE_SIZE}")]
    BundleTooLarge { size: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bundle delivered by a transport.
#[derive(Clone, Debug)]
pub struct InboundBundle {
    /// Sending endpoint when the transport can identify it.
    pub source: Option<Endpoint>,
    /// Payload bytes.
    pub data: Vec<u8>,
}

/// Channel sender for inbound bundles.
pub type BundleTx = tokio::sync::mpsc::Sender<InboundBundle>;

/// Channel receiver for inbound bundles.
pub type BundleRx = tokio::sync::mpsc::Receiver<InboundBundle>;

/// Create a bundle channel with the given buffer size.
pub fn bundle_channel(buffer: usize) -> (BundleTx, BundleRx) {
    tokio::sync::mpsc::channel(buffer)
}

/// A concrete transport instance. The variant set is closed; dispatch is
/// by match, not trait objects.
pub enum TransportHandle {
    /// UDP datagrams with a static peer table.
    Udp(UdpTransport),
    /// In-process loopback hub, for standalone simulation and tests.
    Mem(MemTransport),
}

impl TransportHandle {
    /// Start the transport (bind sockets, spawn receive loops).
    pub async fn start(&mut self) -> Result<(), TransportError> {
        match self {
            TransportHandle::Udp(t) => t.start().await,
            TransportHandle::Mem(t) => t.start(),
        }
    }

    /// Stop the transport and release its resources.
    pub async fn stop(&mut self) -> Result<(), TransportError> {
        match self {
            TransportHandle::Udp(t) => t.stop().await,
            TransportHandle::Mem(t) => t.stop(),
        }
    }

    /// Send one bundle. `ttl` bounds queue residency on transports that
    /// have a notion of it; datagram transports deliver or drop at once.
    pub async fn send(
        &self,
        dest: Endpoint,
        data: &[u8],
        ttl: Duration,
    ) -> Result<(), TransportError> {
        if data.len() > MAX_BUNDLE_SIZE {
            return Err(TransportError::BundleTooLarge { size: data.len() });
        }
        match self {
            TransportHandle::Udp(t) => t.send(dest, data, ttl).await,
            TransportHandle::Mem(t) => t.send(dest, data, ttl).await,
        }
    }

    /// Short transport kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportHandle::Udp(_) => "udp",
            TransportHandle::Mem(_) => "mem",
        }
    }
}
