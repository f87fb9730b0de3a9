//! Node Descriptor Store
//!
//! Last-seen human-readable descriptor per node, fed by inbound metadata
//! messages and seeded with the local descriptor at startup. Upsert
//! semantics: at most one record per node, later writes win. The store is
//! bounded; once full, descriptors for previously unseen nodes are
//! dropped while updates to known nodes still apply.

use crate::types::NodeId;
use crate::wire::NodeMetadata;
use std::collections::HashMap;
use tracing::debug;

/// Default maximum number of tracked nodes.
pub const DEFAULT_METADATA_CAPACITY: usize = 100;

/// In-memory map from node id to its last-seen descriptor.
#[derive(Debug)]
pub struct MetadataStore {
    records: HashMap<NodeId, NodeMetadata>,
    capacity: usize,
}

impl MetadataStore {
    /// Create an empty store with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_METADATA_CAPACITY)
    }

    /// Create an empty store holding at most `capacity` nodes.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "metadata store capacity must be positive");
        Self {
            records: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert or replace the descriptor for `record.node_id`. A record for
    /// an unseen node is dropped when the store is full.
    pub fn put(&mut self, record: NodeMetadata) {
        if self.records.len() == self.capacity && !self.records.contains_key(&record.node_id) {
            debug!(node = %record.node_id, capacity = self.capacity, "descriptor store full");
            return;
        }
        self.records.insert(record.node_id, record);
    }

    /// Get the last-seen descriptor for a node.
    pub fn get(&self, node_id: NodeId) -> Option<&NodeMetadata> {
        self.records.get(&node_id)
    }

    /// Iterate over all known descriptors.
    pub fn iter(&self) -> impl Iterator<Item = &NodeMetadata> {
        self.records.values()
    }

    /// Number of nodes with a known descriptor.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no descriptors are known.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new()
    }
}
