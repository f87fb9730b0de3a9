//! Supervisor
//!
//! Owns the lifecycle of the gossip engine: connects to the router,
//! builds the transport, runs the engine, and reacts to failure. Losing
//! the router tears everything down and rebuilds the engine in place with
//! the original configuration, which is behaviorally a restart. All of
//! SIGINT, SIGTERM, and SIGTSTP mean graceful shutdown; the router cannot
//! safely tolerate a suspended client holding its resources, so the stop
//! signal is co-opted rather than honored.

use crate::config::Config;
use crate::engine::{Engine, EngineError, INBOUND_CHANNEL_DEPTH};
use crate::router::Router;
use crate::transport::{
    bundle_channel, BundleTx, MemHub, MemTransport, TransportError, TransportHandle,
    UdpTransport,
};
use crate::types::NodeId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

/// Reconnect delay when the router looks present but refused us.
pub const RETRY_SHORT: Duration = Duration::from_secs(10);

/// Reconnect delay when the router appears to be gone entirely.
pub const RETRY_LONG: Duration = Duration::from_secs(300);

/// Settle time before rebuilding after a router loss, giving a restarting
/// router a moment to come back.
const RESTART_DELAY: Duration = Duration::from_secs(2);

/// Errors that abort the supervisor outright.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to install signal handlers: {0}")]
    Signals(std::io::Error),
}

/// Supervisor lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    /// No router session.
    Disconnected,
    /// Attempting to establish a router session.
    Connecting,
    /// Engine running against a live router session.
    Connected,
    /// Terminal: winding down.
    ShuttingDown,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Disconnected => "disconnected",
            SupervisorState::Connecting => "connecting",
            SupervisorState::Connected => "connected",
            SupervisorState::ShuttingDown => "shutting down",
        };
        write!(f, "{}", name)
    }
}

/// Requests graceful shutdown from any task.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Begin graceful shutdown. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Drives connect/retry/run/restart until shutdown.
pub struct Supervisor {
    config: Arc<Config>,
    router: Arc<dyn Router>,
    hub: Arc<MemHub>,
    state: SupervisorState,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Supervisor {
    /// Create a supervisor over a configured router adapter.
    pub fn new(config: Config, router: Arc<dyn Router>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config: Arc::new(config),
            router,
            hub: MemHub::new(),
            state: SupervisorState::Disconnected,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Handle for requesting shutdown from outside the run loop.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Run until graceful shutdown.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        spawn_signal_listener(self.shutdown_handle()).map_err(SupervisorError::Signals)?;

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            self.state = SupervisorState::Connecting;
            info!(state = %self.state, "establishing router session");

            let local_id = match self.router.connect() {
                Ok(id) if !id.is_unset() => id,
                Ok(_) => {
                    warn!("router reported a zero node id");
                    if self.backoff().await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "router connection failed");
                    if self.backoff().await {
                        break;
                    }
                    continue;
                }
            };
            info!(local_id = %local_id, "router session established");

            let (bundle_tx, bundle_rx) = bundle_channel(INBOUND_CHANNEL_DEPTH);
            let mut transport = match self.build_transport(local_id, bundle_tx) {
                Ok(transport) => transport,
                Err(e) => {
                    warn!(error = %e, "transport construction failed");
                    self.router.disconnect();
                    if self.backoff().await {
                        break;
                    }
                    continue;
                }
            };
            if let Err(e) = transport.start().await {
                warn!(error = %e, "transport start failed");
                self.router.disconnect();
                if self.backoff().await {
                    break;
                }
                continue;
            }

            self.state = SupervisorState::Connected;
            let mut engine = Engine::new(
                self.config.clone(),
                local_id,
                self.router.clone(),
                transport,
                bundle_rx,
                self.shutdown_rx.clone(),
            );

            let exit = engine.run().await;
            engine.teardown().await;
            self.router.disconnect();
            self.state = SupervisorState::Disconnected;

            match exit {
                Ok(()) => break,
                Err(EngineError::RouterLost(reason)) => {
                    warn!(%reason, "router lost, rebuilding engine");
                }
                Err(EngineError::InboundClosed) => {
                    warn!("transport receive side closed, rebuilding engine");
                }
            }

            if self.sleep_or_shutdown(RESTART_DELAY).await {
                break;
            }
        }

        self.state = SupervisorState::ShuttingDown;
        info!(state = %self.state, "supervisor exiting");
        Ok(())
    }

    fn build_transport(
        &self,
        local_id: NodeId,
        bundle_tx: BundleTx,
    ) -> Result<TransportHandle, TransportError> {
        match &self.config.transport.udp {
            Some(udp) => Ok(TransportHandle::Udp(UdpTransport::new(
                udp.bind_addr.clone(),
                self.config.node.service_number,
                &udp.peers,
                bundle_tx,
            )?)),
            None => Ok(TransportHandle::Mem(MemTransport::new(
                local_id,
                self.config.node.service_number,
                self.hub.clone(),
                bundle_tx,
            ))),
        }
    }

    /// Wait out a reconnect delay. Returns true when shutdown arrived.
    async fn backoff(&mut self) -> bool {
        self.state = SupervisorState::Disconnected;
        let delay = if self.router.is_available() {
            RETRY_SHORT
        } else {
            RETRY_LONG
        };
        info!(delay_secs = delay.as_secs(), "retrying router connection");
        self.sleep_or_shutdown(delay).await
    }

    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => *self.shutdown_rx.borrow(),
            changed = self.shutdown_rx.changed() => {
                changed.is_err() || *self.shutdown_rx.borrow()
            }
        }
    }
}

/// Route SIGINT, SIGTERM, and SIGTSTP to graceful shutdown.
fn spawn_signal_listener(handle: ShutdownHandle) -> Result<(), std::io::Error> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut stop = signal(SignalKind::from_raw(libc::SIGTSTP))?;

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("interrupt signal received, shutting down"),
            _ = terminate.recv() => info!("termination signal received, shutting down"),
            _ = stop.recv() => {
                info!("stop signal received, shutting down instead of suspending")
            }
        }
        handle.shutdown();
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::mem::MemoryRouter;
    use crate::router::{ContactEntry, InsertOutcome, Plan, RouterError};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn test_config() -> Config {
        Config::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_supervisor() {
        let router = Arc::new(MemoryRouter::new(NodeId::new(1), vec![NodeId::new(2)]));
        let supervisor = Supervisor::new(test_config(), router);
        let handle = supervisor.shutdown_handle();

        let run = tokio::spawn(supervisor.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown();

        run.await.expect("join").expect("clean exit");
    }

    /// Router that drops its session after the first neighbor query, then
    /// recovers, so the supervisor must rebuild the engine.
    struct FlakyRouter {
        connects: AtomicUsize,
        dropped: AtomicBool,
    }

    impl FlakyRouter {
        fn new() -> Self {
            Self {
                connects: AtomicUsize::new(0),
                dropped: AtomicBool::new(false),
            }
        }
    }

    impl Router for FlakyRouter {
        fn connect(&self) -> Result<NodeId, RouterError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(NodeId::new(1))
        }

        fn local_node_id(&self) -> NodeId {
            NodeId::new(1)
        }

        fn neighbors(&self) -> Result<Vec<Plan>, RouterError> {
            // First session: fail once, forcing a rebuild. After that,
            // report a stable empty neighborhood.
            if self.connects.load(Ordering::SeqCst) == 1
                && !self.dropped.swap(true, Ordering::SeqCst)
            {
                return Err(RouterError::Gone("simulated restart".into()));
            }
            Ok(Vec::new())
        }

        fn insert_contact(
            &self,
            _region: u32,
            _from_time: u64,
            _to_time: u64,
            _src: NodeId,
            _dst: NodeId,
            _xmit_rate: u32,
            _confidence: f32,
        ) -> Result<InsertOutcome, RouterError> {
            Ok(InsertOutcome::Inserted)
        }

        fn insert_range(
            &self,
            _from_time: u64,
            _to_time: u64,
            _src: NodeId,
            _dst: NodeId,
            _owlt_secs: u32,
        ) -> Result<InsertOutcome, RouterError> {
            Ok(InsertOutcome::Inserted)
        }

        fn is_available(&self) -> bool {
            true
        }

        fn list_contacts(&self) -> Result<Vec<ContactEntry>, RouterError> {
            Ok(Vec::new())
        }

        fn disconnect(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_router_loss_triggers_rebuild() {
        let router = Arc::new(FlakyRouter::new());
        let supervisor = Supervisor::new(test_config(), router.clone());
        let handle = supervisor.shutdown_handle();

        let run = tokio::spawn(supervisor.run());

        // Let the first session fail and the rebuild complete.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(
            router.connects.load(Ordering::SeqCst) >= 2,
            "supervisor must reconnect after router loss"
        );

        handle.shutdown();
        run.await.expect("join").expect("clean exit");
    }
}
