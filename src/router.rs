//! DTN Router Boundary
//!
//! The gossip engine does not route; it installs learned contact and range
//! edges into an external DTN router and reads the configured neighbor
//! plans back from it. [`Router`] is that boundary. Any router exposing
//! these operations can sit behind it; [`mem::MemoryRouter`] is the
//! in-process implementation used for standalone topology collection and
//! by the test suite.

pub mod mem;

use crate::types::NodeId;
use std::time::Duration;
use thiserror::Error;

/// Region number used for every installed contact.
pub const DEFAULT_REGION: u32 = 1;

/// Transmission rate recorded on installed contacts, bytes per second.
pub const DEFAULT_XMIT_RATE: u32 = 100_000;

/// Confidence recorded on installed contacts.
pub const DEFAULT_CONFIDENCE: f32 = 1.0;

/// One-way light time recorded on installed ranges, seconds.
pub const DEFAULT_OWLT_SECS: u32 = 1;

/// How long a neighbor snapshot stays fresh before the router is asked again.
pub const PLAN_CACHE_WINDOW: Duration = Duration::from_secs(20);

/// Errors surfaced by a router adapter.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A single operation failed but the router is otherwise reachable.
    /// Logged; processing continues.
    #[error("router transient error: {0}")]
    Transient(String),

    /// The router is unreachable or in an invalid state. Escalates to the
    /// supervisor, which tears the engine down and reconnects.
    #[error("router gone: {0}")]
    Gone(String),
}

/// Result of an idempotent edge insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The edge was newly installed.
    Inserted,
    /// An identical edge already exists. Success for gossip purposes.
    AlreadyExists,
    /// The edge duplicates an overlapping one. Success for gossip purposes.
    Duplicate,
}

/// A configured neighbor as reported by the router.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Plan {
    /// The neighbor's node id.
    pub neighbor: NodeId,
    /// When this snapshot observed the plan, Unix seconds.
    pub observed_at: u64,
}

/// A directional contact edge, read back for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContactEntry {
    pub src: NodeId,
    pub dst: NodeId,
    pub from_time: u64,
    pub to_time: u64,
}

/// The external DTN router surface consumed by the engine.
pub trait Router: Send + Sync {
    /// Establish the connection and return the local node id, which is
    /// non-zero on success.
    fn connect(&self) -> Result<NodeId, RouterError>;

    /// The local node id, used as `origin` and `from` on originated
    /// envelopes. Zero until connected.
    fn local_node_id(&self) -> NodeId;

    /// Snapshot of currently configured neighbors, excluding the local
    /// node. Callers should go through [`PlanCache`] to rate-limit this.
    fn neighbors(&self) -> Result<Vec<Plan>, RouterError>;

    /// Install a directional contact edge. Idempotent: re-installing an
    /// existing edge reports `AlreadyExists` or `Duplicate`, not an error.
    #[allow(clippy::too_many_arguments)]
    fn insert_contact(
        &self,
        region: u32,
        from_time: u64,
        to_time: u64,
        src: NodeId,
        dst: NodeId,
        xmit_rate: u32,
        confidence: f32,
    ) -> Result<InsertOutcome, RouterError>;

    /// Install a directional propagation-delay edge.
    fn insert_range(
        &self,
        from_time: u64,
        to_time: u64,
        src: NodeId,
        dst: NodeId,
        owlt_secs: u32,
    ) -> Result<InsertOutcome, RouterError>;

    /// Cheap liveness probe; also used by the supervisor to pick the
    /// reconnect cadence.
    fn is_available(&self) -> bool;

    /// Enumerate installed contacts. Diagnostics only.
    fn list_contacts(&self) -> Result<Vec<ContactEntry>, RouterError>;

    /// Release router resources. Safe to call more than once.
    fn disconnect(&self);
}

/// Rate-limited neighbor snapshot.
///
/// Refreshes from the router at most once per [`PLAN_CACHE_WINDOW`]. A
/// transient refresh failure falls back to the previous snapshot; a gone
/// router propagates so the supervisor can restart.
#[derive(Debug, Default)]
pub struct PlanCache {
    plans: Vec<Plan>,
    refreshed_at: Option<u64>,
}

impl PlanCache {
    /// Create an empty cache; the first call always queries the router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current neighbor snapshot, refreshed from `router` when stale.
    pub fn snapshot(&mut self, router: &dyn Router, now: u64) -> Result<Vec<Plan>, RouterError> {
        let fresh = self
            .refreshed_at
            .is_some_and(|at| now.saturating_sub(at) < PLAN_CACHE_WINDOW.as_secs());
        if fresh {
            return Ok(self.plans.clone());
        }

        match router.neighbors() {
            Ok(plans) => {
                self.plans = plans;
                self.refreshed_at = Some(now);
                Ok(self.plans.clone())
            }
            Err(RouterError::Transient(reason)) => {
                if self.refreshed_at.is_some() {
                    tracing::warn!(%reason, "neighbor refresh failed, using stale snapshot");
                    Ok(self.plans.clone())
                } else {
                    Err(RouterError::Transient(reason))
                }
            }
            Err(gone @ RouterError::Gone(_)) => Err(gone),
        }
    }

    /// Drop the snapshot so the next call queries the router.
    pub fn invalidate(&mut self) {
        self.refreshed_at = None;
    }
}
