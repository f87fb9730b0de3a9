//! In-Process Loopback Transport
//!
//! A hub of registered node endpoints delivering bundles over channels
//! within one process. Used by the test suite to stand up multi-node
//! topologies and by the standalone collector mode when no network
//! transport is configured.

use super::{BundleTx, InboundBundle, TransportError};
use crate::types::{Endpoint, NodeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared registry of in-process nodes.
#[derive(Debug, Default)]
pub struct MemHub {
    endpoints: Mutex<HashMap<NodeId, BundleTx>>,
}

impl MemHub {
    /// Create an empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register(&self, node: NodeId, tx: BundleTx) {
        self.endpoints
            .lock()
            .expect("hub registry poisoned")
            .insert(node, tx);
    }

    fn unregister(&self, node: NodeId) {
        self.endpoints
            .lock()
            .expect("hub registry poisoned")
            .remove(&node);
    }

    async fn deliver(
        &self,
        source: Endpoint,
        dest: Endpoint,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let tx = {
            let endpoints = self.endpoints.lock().expect("hub registry poisoned");
            endpoints
                .get(&dest.node)
                .cloned()
                .ok_or(TransportError::UnknownDestination(dest.node))?
        };
        tx.send(InboundBundle {
            source: Some(source),
            data: data.to_vec(),
        })
        .await
        .map_err(|_| TransportError::SendFailed(format!("{} receiver closed", dest)))
    }
}

/// One node's attachment to a [`MemHub`].
pub struct MemTransport {
    local: NodeId,
    service: u32,
    hub: Arc<MemHub>,
    bundle_tx: BundleTx,
    started: bool,
}

impl MemTransport {
    /// Create a transport for `local` on the given hub. Inbound bundles
    /// are delivered on `bundle_tx` once started.
    pub fn new(local: NodeId, service: u32, hub: Arc<MemHub>, bundle_tx: BundleTx) -> Self {
        Self {
            local,
            service,
            hub,
            bundle_tx,
            started: false,
        }
    }

    /// Register with the hub.
    pub fn start(&mut self) -> Result<(), TransportError> {
        if self.started {
            return Err(TransportError::AlreadyStarted);
        }
        self.hub.register(self.local, self.bundle_tx.clone());
        self.started = true;
        Ok(())
    }

    /// Unregister from the hub.
    pub fn stop(&mut self) -> Result<(), TransportError> {
        if !self.started {
            return Err(TransportError::NotStarted);
        }
        self.hub.unregister(self.local);
        self.started = false;
        Ok(())
    }

    /// Deliver one bundle to another hub node. The TTL is ignored;
    /// delivery is immediate or fails.
    pub async fn send(
        &self,
        dest: Endpoint,
        data: &[u8],
        _ttl: Duration,
    ) -> Result<(), TransportError> {
        if !self.started {
            return Err(TransportError::NotStarted);
        }
        let source = Endpoint::new(self.local, self.service);
        self.hub.deliver(source, dest, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::bundle_channel;
    use crate::types::DTNEX_SERVICE;

    #[tokio::test]
    async fn test_delivery_between_hub_nodes() {
        let hub = MemHub::new();
        let (tx_a, _rx_a) = bundle_channel(8);
        let (tx_b, mut rx_b) = bundle_channel(8);

        let mut a = MemTransport::new(NodeId::new(1), DTNEX_SERVICE, hub.clone(), tx_a);
        let mut b = MemTransport::new(NodeId::new(2), DTNEX_SERVICE, hub.clone(), tx_b);
        a.start().unwrap();
        b.start().unwrap();

        a.send(
            Endpoint::dtnex(NodeId::new(2)),
            b"payload",
            Duration::from_secs(1800),
        )
        .await
        .unwrap();

        let bundle = rx_b.recv().await.unwrap();
        assert_eq!(bundle.data, b"payload");
        assert_eq!(bundle.source, Some(Endpoint::dtnex(NodeId::new(1))));
    }

    #[tokio::test]
    async fn test_unknown_destination() {
        let hub = MemHub::new();
        let (tx, _rx) = bundle_channel(8);
        let mut t = MemTransport::new(NodeId::new(1), DTNEX_SERVICE, hub, tx);
        t.start().unwrap();

        let err = t
            .send(Endpoint::dtnex(NodeId::new(9)), b"x", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::UnknownDestination(_)));
    }

    #[tokio::test]
    async fn test_stop_unregisters() {
        let hub = MemHub::new();
        let (tx_a, _rx_a) = bundle_channel(8);
        let (tx_b, _rx_b) = bundle_channel(8);

        let mut a = MemTransport::new(NodeId::new(1), DTNEX_SERVICE, hub.clone(), tx_a);
        let mut b = MemTransport::new(NodeId::new(2), DTNEX_SERVICE, hub.clone(), tx_b);
        a.start().unwrap();
        b.start().unwrap();
        b.stop().unwrap();

        let err = a
            .send(Endpoint::dtnex(NodeId::new(2)), b"x", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::UnknownDestination(_)));
    }

    #[tokio::test]
    async fn test_send_requires_start() {
        let hub = MemHub::new();
        let (tx, _rx) = bundle_channel(1);
        let t = MemTransport::new(NodeId::new(1), DTNEX_SERVICE, hub, tx);
        let err = t
            .send(Endpoint::dtnex(NodeId::new(2)), b"x", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotStarted));
    }
}
