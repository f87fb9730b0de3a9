//! In-Memory Router
//!
//! A process-local contact/range graph implementing the [`Router`]
//! boundary. Backs the standalone collector deployment, where the agent
//! gossips topology without a co-resident DTN router, and the test suite.
//! The local node id and neighbor set come from configuration.

use super::{ContactEntry, InsertOutcome, Plan, Router, RouterError};
use crate::types::NodeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Key for a directional edge table: (src, dst).
type EdgeKey = (NodeId, NodeId);

/// A directional edge's time window plus its payload attribute
/// (xmit rate for contacts, OWLT for ranges).
#[derive(Clone, Copy, Debug, PartialEq)]
struct EdgeWindow {
    from_time: u64,
    to_time: u64,
    attribute: u32,
}

#[derive(Debug, Default)]
struct GraphState {
    contacts: HashMap<EdgeKey, Vec<EdgeWindow>>,
    ranges: HashMap<EdgeKey, Vec<EdgeWindow>>,
}

impl GraphState {
    fn insert(
        table: &mut HashMap<EdgeKey, Vec<EdgeWindow>>,
        key: EdgeKey,
        window: EdgeWindow,
    ) -> InsertOutcome {
        let windows = table.entry(key).or_default();
        if windows.contains(&window) {
            return InsertOutcome::AlreadyExists;
        }
        let overlaps = windows
            .iter()
            .any(|w| window.from_time < w.to_time && w.from_time < window.to_time);
        if overlaps {
            return InsertOutcome::Duplicate;
        }
        windows.push(window);
        InsertOutcome::Inserted
    }
}

/// In-memory [`Router`] implementation.
#[derive(Debug)]
pub struct MemoryRouter {
    node_id: NodeId,
    neighbors: Mutex<Vec<NodeId>>,
    state: Mutex<GraphState>,
    connected: AtomicBool,
}

impl MemoryRouter {
    /// Create a router for `node_id` with a static neighbor set.
    pub fn new(node_id: NodeId, neighbors: Vec<NodeId>) -> Self {
        Self {
            node_id,
            neighbors: Mutex::new(neighbors),
            state: Mutex::new(GraphState::default()),
            connected: AtomicBool::new(false),
        }
    }

    /// Replace the configured neighbor set.
    pub fn set_neighbors(&self, neighbors: Vec<NodeId>) {
        *self.neighbors.lock().expect("router state poisoned") = neighbors;
    }

    /// Total number of installed directional contacts.
    pub fn contact_count(&self) -> usize {
        let state = self.state.lock().expect("router state poisoned");
        state.contacts.values().map(Vec::len).sum()
    }

    /// Total number of installed directional ranges.
    pub fn range_count(&self) -> usize {
        let state = self.state.lock().expect("router state poisoned");
        state.ranges.values().map(Vec::len).sum()
    }

    /// Whether a contact with this exact window is installed.
    pub fn has_contact(&self, src: NodeId, dst: NodeId, from_time: u64, to_time: u64) -> bool {
        let state = self.state.lock().expect("router state poisoned");
        state
            .contacts
            .get(&(src, dst))
            .is_some_and(|ws| ws.iter().any(|w| w.from_time == from_time && w.to_time == to_time))
    }

    /// Whether a range with this exact window is installed.
    pub fn has_range(&self, src: NodeId, dst: NodeId, from_time: u64, to_time: u64) -> bool {
        let state = self.state.lock().expect("router state poisoned");
        state
            .ranges
            .get(&(src, dst))
            .is_some_and(|ws| ws.iter().any(|w| w.from_time == from_time && w.to_time == to_time))
    }

    fn ensure_connected(&self) -> Result<(), RouterError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RouterError::Gone("not connected".into()))
        }
    }
}

impl Router for MemoryRouter {
    fn connect(&self) -> Result<NodeId, RouterError> {
        if self.node_id.is_unset() {
            return Err(RouterError::Gone("local node id not configured".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(self.node_id)
    }

    fn local_node_id(&self) -> NodeId {
        if self.connected.load(Ordering::SeqCst) {
            self.node_id
        } else {
            NodeId::new(0)
        }
    }

    fn neighbors(&self) -> Result<Vec<Plan>, RouterError> {
        self.ensure_connected()?;
        let observed_at = unix_now();
        let neighbors = self.neighbors.lock().expect("router state poisoned");
        Ok(neighbors
            .iter()
            .filter(|n| **n != self.node_id)
            .map(|n| Plan {
                neighbor: *n,
                observed_at,
            })
            .collect())
    }

    fn insert_contact(
        &self,
        _region: u32,
        from_time: u64,
        to_time: u64,
        src: NodeId,
        dst: NodeId,
        xmit_rate: u32,
        _confidence: f32,
    ) -> Result<InsertOutcome, RouterError> {
        self.ensure_connected()?;
        let mut state = self.state.lock().expect("router state poisoned");
        Ok(GraphState::insert(
            &mut state.contacts,
            (src, dst),
            EdgeWindow {
                from_time,
                to_time,
                attribute: xmit_rate,
            },
        ))
    }

    fn insert_range(
        &self,
        from_time: u64,
        to_time: u64,
        src: NodeId,
        dst: NodeId,
        owlt_secs: u32,
    ) -> Result<InsertOutcome, RouterError> {
        self.ensure_connected()?;
        let mut state = self.state.lock().expect("router state poisoned");
        Ok(GraphState::insert(
            &mut state.ranges,
            (src, dst),
            EdgeWindow {
                from_time,
                to_time,
                attribute: owlt_secs,
            },
        ))
    }

    fn is_available(&self) -> bool {
        true
    }

    fn list_contacts(&self) -> Result<Vec<ContactEntry>, RouterError> {
        self.ensure_connected()?;
        let state = self.state.lock().expect("router state poisoned");
        let mut entries: Vec<ContactEntry> = state
            .contacts
            .iter()
            .flat_map(|((src, dst), windows)| {
                windows.iter().map(move |w| ContactEntry {
                    src: *src,
                    dst: *dst,
                    from_time: w.from_time,
                    to_time: w.to_time,
                })
            })
            .collect();
        entries.sort_by_key(|e| (e.src, e.dst, e.from_time));
        Ok(entries)
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
