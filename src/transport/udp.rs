//! UDP Transport
//!
//! Carries one envelope per datagram between statically configured peers.
//! Destination node ids resolve through a `node id -> host:port` table from
//! configuration; the reverse mapping identifies the sending endpoint on
//! receive. A single socket serves all peers and is safe for concurrent
//! send and receive.

use super::{BundleTx, InboundBundle, TransportError};
use crate::types::{Endpoint, NodeId};
use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receive buffer size. Larger than any valid envelope so oversized
/// datagrams are observed whole and dropped, not truncated into noise.
const RECV_BUFFER_SIZE: usize = 2048;

/// UDP transport with a static peer table.
pub struct UdpTransport {
    bind_addr: String,
    service: u32,
    peers: HashMap<NodeId, SocketAddr>,
    reverse: Arc<HashMap<SocketAddr, NodeId>>,
    socket: Option<Arc<UdpSocket>>,
    recv_task: Option<JoinHandle<()>>,
    bundle_tx: BundleTx,
}

impl UdpTransport {
    /// Create a UDP transport. `peer_addrs` maps neighbor node ids to
    /// `host:port` strings, resolved eagerly so bad entries fail at startup.
    pub fn new(
        bind_addr: String,
        service: u32,
        peer_addrs: &HashMap<u64, String>,
        bundle_tx: BundleTx,
    ) -> Result<Self, TransportError> {
        let mut peers = HashMap::new();
        let mut reverse = HashMap::new();
        for (node, addr) in peer_addrs {
            let resolved = addr
                .to_socket_addrs()
                .map_err(|e| TransportError::StartFailed(format!("peer {}: {}", addr, e)))?
                .next()
                .ok_or_else(|| {
                    TransportError::StartFailed(format!("peer {}: no addresses", addr))
                })?;
            peers.insert(NodeId::new(*node), resolved);
            reverse.insert(resolved, NodeId::new(*node));
        }

        Ok(Self {
            bind_addr,
            service,
            peers,
            reverse: Arc::new(reverse),
            socket: None,
            recv_task: None,
            bundle_tx,
        })
    }

    /// Bind the socket and spawn the receive loop.
    pub async fn start(&mut self) -> Result<(), TransportError> {
        if self.socket.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let socket = UdpSocket::bind(&self.bind_addr)
            .await
            .map_err(|e| TransportError::StartFailed(format!("bind {}: {}", self.bind_addr, e)))?;
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);
        self.socket = Some(socket.clone());

        let bundle_tx = self.bundle_tx.clone();
        let reverse = self.reverse.clone();
        let service = self.service;
        self.recv_task = Some(tokio::spawn(async move {
            udp_receive_loop(socket, bundle_tx, reverse, service).await;
        }));

        info!(local_addr = %local_addr, peers = self.peers.len(), "UDP transport started");
        Ok(())
    }

    /// Stop the receive loop and close the socket.
    pub async fn stop(&mut self) -> Result<(), TransportError> {
        if self.socket.is_none() {
            return Err(TransportError::NotStarted);
        }
        if let Some(task) = self.recv_task.take() {
            task.abort();
            let _ = task.await;
        }
        self.socket.take();
        debug!("UDP transport stopped");
        Ok(())
    }

    /// Send one envelope as a datagram. The TTL has no datagram analogue
    /// and is ignored.
    pub async fn send(
        &self,
        dest: Endpoint,
        data: &[u8],
        _ttl: Duration,
    ) -> Result<(), TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotStarted)?;
        let addr = self
            .peers
            .get(&dest.node)
            .ok_or(TransportError::UnknownDestination(dest.node))?;
        socket
            .send_to(data, addr)
            .await
            .map_err(|e| TransportError::SendFailed(format!("{} -> {}: {}", dest, addr, e)))?;
        Ok(())
    }
}

async fn udp_receive_loop(
    socket: Arc<UdpSocket>,
    bundle_tx: BundleTx,
    reverse: Arc<HashMap<SocketAddr, NodeId>>,
    service: u32,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        let (len, remote) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "UDP receive failed");
                continue;
            }
        };

        let source = reverse
            .get(&remote)
            .map(|node| Endpoint::new(*node, service));

        let bundle = InboundBundle {
            source,
            data: buf[..len].to_vec(),
        };

        if bundle_tx.send(bundle).await.is_err() {
            // Engine side closed; nothing left to deliver to.
            debug!("bundle channel closed, UDP receive loop exiting");
            return;
        }
    }
}
