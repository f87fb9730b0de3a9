//! Protocol Engine
//!
//! The stateful core of the gossip agent: originates periodic contact and
//! metadata broadcasts, authenticates and installs inbound advertisements,
//! and forwards them onward. One engine value owns the replay cache, the
//! metadata store, and the neighbor snapshot; a single cooperative select
//! loop serializes every access, so none of them needs a lock.

mod broadcast;
mod forward;
mod inbound;

pub use inbound::{Disposition, DropReason};

use crate::config::Config;
use crate::metadata::MetadataStore;
use crate::replay::ReplayCache;
use crate::router::{PlanCache, Router, RouterError};
use crate::transport::{BundleRx, TransportHandle};
use crate::types::NodeId;
use crate::wire::DecodeOptions;
use crate::auth::SharedKey;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Cadence of the engine's housekeeping tick. Each tick refreshes the
/// neighbor snapshot and decides whether a broadcast round is due, so this
/// also bounds how quickly a neighbor-set change is noticed.
pub const ENGINE_TICK: Duration = Duration::from_secs(20);

/// Buffer depth of the inbound bundle channel.
pub const INBOUND_CHANNEL_DEPTH: usize = 64;

/// Errors that stop the engine loop.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The router vanished mid-operation. The supervisor tears the engine
    /// down and reconnects.
    #[error("router connection lost: {0}")]
    RouterLost(String),

    /// Every transport receive loop has exited.
    #[error("inbound channel closed")]
    InboundClosed,
}

/// A running gossip engine, owned by the supervisor for one router session.
pub struct Engine {
    config: Arc<Config>,
    key: SharedKey,
    decode_opts: DecodeOptions,
    local_id: NodeId,
    router: Arc<dyn Router>,
    transport: TransportHandle,
    bundle_rx: BundleRx,
    replay: ReplayCache,
    metadata: MetadataStore,
    plans: PlanCache,
    /// When the last broadcast round ran, Unix seconds.
    last_broadcast: Option<u64>,
    /// Sorted neighbor ids as of the last broadcast, for change detection.
    last_neighbor_set: Vec<NodeId>,
    shutdown: watch::Receiver<bool>,
}

impl Engine {
    /// Assemble an engine for a connected router session. Seeds the
    /// metadata store with the local descriptor when one is configured.
    pub fn new(
        config: Arc<Config>,
        local_id: NodeId,
        router: Arc<dyn Router>,
        transport: TransportHandle,
        bundle_rx: BundleRx,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let key = config.shared_key();
        let decode_opts = config.decode_options();
        let mut metadata = MetadataStore::new();
        if let Some(record) = config.local_metadata(local_id) {
            info!(name = %record.name, "seeded local node descriptor");
            metadata.put(record);
        }

        Self {
            config,
            key,
            decode_opts,
            local_id,
            router,
            transport,
            bundle_rx,
            replay: ReplayCache::with_default_capacity(),
            metadata,
            plans: PlanCache::new(),
            last_broadcast: None,
            last_neighbor_set: Vec::new(),
            shutdown,
        }
    }

    /// The local node id this engine gossips as.
    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// Run until shutdown or router loss.
    ///
    /// The first housekeeping tick fires immediately, which performs the
    /// startup broadcast.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        let mut tick = tokio::time::interval(ENGINE_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(local_id = %self.local_id, transport = self.transport.kind(), "engine started");

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                bundle = self.bundle_rx.recv() => {
                    match bundle {
                        Some(bundle) => {
                            let disposition =
                                self.handle_inbound(&bundle.data, unix_now()).await?;
                            match disposition {
                                Disposition::Delivered { message_type, forwards } => {
                                    info!(%message_type, forwards, "message processed");
                                }
                                Disposition::Dropped(reason) => {
                                    debug!(%reason, "message dropped");
                                }
                            }
                        }
                        None => return Err(EngineError::InboundClosed),
                    }
                }
                _ = tick.tick() => {
                    self.on_tick(unix_now()).await?;
                }
            }
        }

        info!("engine stopped");
        Ok(())
    }

    /// Housekeeping: refresh the neighbor snapshot and broadcast when the
    /// interval has elapsed or the neighbor set changed.
    pub(crate) async fn on_tick(&mut self, now: u64) -> Result<(), EngineError> {
        let plans = match self.plans.snapshot(self.router.as_ref(), now) {
            Ok(plans) => plans,
            Err(RouterError::Gone(reason)) => return Err(EngineError::RouterLost(reason)),
            Err(RouterError::Transient(reason)) => {
                warn!(%reason, "neighbor snapshot unavailable, skipping tick");
                return Ok(());
            }
        };

        let mut neighbor_set: Vec<NodeId> = plans.iter().map(|p| p.neighbor).collect();
        neighbor_set.sort_unstable();
        neighbor_set.dedup();

        let due = self
            .last_broadcast
            .map_or(true, |at| now.saturating_sub(at) >= self.config.node.update_interval);
        let changed = neighbor_set != self.last_neighbor_set;

        if due || changed {
            if changed && !due {
                info!(neighbors = neighbor_set.len(), "neighbor set changed, broadcasting early");
            }
            self.broadcast_round(&plans, now).await;
            self.last_broadcast = Some(now);
            self.last_neighbor_set = neighbor_set;
            self.log_topology();
        }

        Ok(())
    }

    /// Release the engine's transport. Called by the supervisor after the
    /// run loop exits, before reconnecting or shutting down.
    pub async fn teardown(mut self) {
        if let Err(e) = self.transport.stop().await {
            debug!(error = %e, "transport stop during teardown");
        }
    }

    /// Debug dump of what this node currently knows.
    fn log_topology(&self) {
        match self.router.list_contacts() {
            Ok(contacts) => debug!(
                contacts = contacts.len(),
                descriptors = self.metadata.len(),
                "topology snapshot"
            ),
            Err(e) => debug!(error = %e, "contact listing unavailable"),
        }
        for record in self.metadata.iter() {
            debug!(
                node = %record.node_id,
                name = %record.name,
                contact = %record.contact,
                "known descriptor"
            );
        }
    }
}

/// Wall-clock Unix seconds, the time base peers compare envelope fields in.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
