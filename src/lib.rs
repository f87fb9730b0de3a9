//! DTNEX: DTN Network Information Exchange
//!
//! A gossip agent for delay-tolerant networks. Each node advertises its
//! directly configured neighbor contacts and a small descriptor to its
//! neighbors, authenticates and installs advertisements received from
//! peers into the local DTN router's contact and range tables, and floods
//! them onward with replay and loop suppression.

pub mod auth;
pub mod cbor;
pub mod config;
pub mod engine;
pub mod metadata;
pub mod replay;
pub mod router;
pub mod supervisor;
pub mod transport;
pub mod types;
pub mod wire;

// Re-export identifier types
pub use types::{Endpoint, NodeId, DTNEX_SERVICE, ECHO_SERVICE};

// Re-export crypto types
pub use auth::{MacTag, Nonce, SharedKey, MAC_SIZE, NONCE_SIZE};

// Re-export wire types
pub use wire::{
    ContactInfo, DecodeOptions, Envelope, GpsCoordinates, MessageType, NodeMetadata, Payload,
    WireError, MAX_ENVELOPE_SIZE, PROTOCOL_VERSION,
};

// Re-export store types
pub use metadata::{MetadataStore, DEFAULT_METADATA_CAPACITY};
pub use replay::{ReplayCache, DEFAULT_REPLAY_CAPACITY};

// Re-export router boundary types
pub use router::{
    mem::MemoryRouter, ContactEntry, InsertOutcome, Plan, PlanCache, Router, RouterError,
};

// Re-export transport types
pub use transport::{
    bundle_channel, BundleRx, BundleTx, InboundBundle, MemHub, MemTransport, TransportError,
    TransportHandle, UdpTransport,
};

// Re-export engine and supervisor types
pub use config::{Config, ConfigError};
pub use engine::{Disposition, DropReason, Engine, EngineError};
pub use supervisor::{ShutdownHandle, Supervisor, SupervisorError, SupervisorState};
