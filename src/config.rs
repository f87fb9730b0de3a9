//! Configuration
//!
//! Loads layered YAML configuration with a cascading priority system:
//! 1. `/etc/dtnex/dtnex.yaml` (system - lowest priority)
//! 2. `~/.config/dtnex/dtnex.yaml` (user config directory)
//! 3. `./dtnex.yaml` (current directory - highest priority)
//!
//! Values from higher priority files override those from lower priority
//! files. Validation failures are fatal at startup: a daemon gossiping
//! with a half-parsed key or an impossible schedule is worse than one
//! that refuses to start.

use crate::auth::SharedKey;
use crate::types::{NodeId, DTNEX_SERVICE};
use crate::wire::{
    DecodeOptions, GpsCoordinates, NodeMetadata, MAX_CONTACT_LEN, MAX_NAME_LEN,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config filename.
const CONFIG_FILENAME: &str = "dtnex.yaml";

/// Seconds between originate broadcasts.
pub const DEFAULT_UPDATE_INTERVAL: u64 = 600;

/// Seconds an advertised contact stays valid.
pub const DEFAULT_CONTACT_LIFETIME: u64 = 3600;

/// Clock-skew slack applied to inbound timestamps, seconds.
pub const DEFAULT_CONTACT_TIME_TOLERANCE: u64 = 1800;

/// Bundle TTL passed to transport sends, seconds.
pub const DEFAULT_BUNDLE_TTL: u64 = 1800;

/// Shared secret used when none is configured.
pub const DEFAULT_SHARED_KEY: &str = "open";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Raw file layer
// ============================================================================

// Every field is optional in the files; merging keeps the highest-priority
// value per field and `Config::resolve` fills in defaults.

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    node: RawNode,
    #[serde(default)]
    metadata: RawMetadata,
    #[serde(default)]
    router: RawRouter,
    #[serde(default)]
    transport: RawTransport,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNode {
    update_interval: Option<u64>,
    contact_lifetime: Option<u64>,
    contact_time_tolerance: Option<u64>,
    bundle_ttl: Option<u64>,
    shared_key: Option<String>,
    service_number: Option<u32>,
    disable_metadata_exchange: Option<bool>,
    accept_legacy_metadata: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMetadata {
    name: Option<String>,
    contact: Option<String>,
    gps_lat: Option<f64>,
    gps_lon: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRouter {
    node_id: Option<u64>,
    neighbors: Option<Vec<u64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTransport {
    udp: Option<RawUdp>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUdp {
    bind_addr: Option<String>,
    #[serde(default)]
    peers: HashMap<u64, String>,
}

impl RawConfig {
    /// Merge a higher-priority file over this one, field by field.
    fn merge(&mut self, other: RawConfig) {
        macro_rules! take {
            ($($section:ident . $field:ident),* $(,)?) => {
                $(if other.$section.$field.is_some() {
                    self.$section.$field = other.$section.$field;
                })*
            };
        }
        take!(
            node.update_interval,
            node.contact_lifetime,
            node.contact_time_tolerance,
            node.bundle_ttl,
            node.shared_key,
            node.service_number,
            node.disable_metadata_exchange,
            node.accept_legacy_metadata,
            metadata.name,
            metadata.contact,
            metadata.gps_lat,
            metadata.gps_lon,
            router.node_id,
            router.neighbors,
            transport.udp,
        );
    }
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Protocol and scheduling settings.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Seconds between originate broadcasts.
    pub update_interval: u64,
    /// Seconds an advertised contact stays valid; also drives the envelope
    /// expiry and the duration-in-minutes on the wire.
    pub contact_lifetime: u64,
    /// Accepted future clock skew on inbound timestamps, seconds.
    pub contact_time_tolerance: u64,
    /// TTL handed to transport sends, seconds. Must be at least the
    /// update interval or messages expire in queue between rounds.
    pub bundle_ttl: u64,
    /// Network-wide shared secret keying the envelope MAC.
    pub shared_key: String,
    /// IPN service number carrying gossip payloads.
    pub service_number: u32,
    /// Do not originate the local descriptor.
    pub disable_metadata_exchange: bool,
    /// Accept legacy metadata payloads lacking the node id.
    pub accept_legacy_metadata: bool,
}

/// The local node's descriptor, if configured.
#[derive(Clone, Debug, Default)]
pub struct MetadataConfig {
    pub name: Option<String>,
    pub contact: Option<String>,
    pub gps: Option<GpsCoordinates>,
}

/// Router adapter settings for the in-memory (standalone) router.
#[derive(Clone, Debug, Default)]
pub struct RouterConfig {
    /// Local node id. Required when running the in-memory router.
    pub node_id: Option<u64>,
    /// Static neighbor set.
    pub neighbors: Vec<u64>,
}

/// UDP transport settings.
#[derive(Clone, Debug)]
pub struct UdpConfig {
    /// Socket bind address.
    pub bind_addr: String,
    /// Neighbor node id to `host:port` table.
    pub peers: HashMap<u64, String>,
}

/// Transport selection. Without a UDP section the daemon runs on the
/// in-process loopback transport.
#[derive(Clone, Debug, Default)]
pub struct TransportConfig {
    pub udp: Option<UdpConfig>,
}

/// Fully resolved and validated configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub node: NodeConfig,
    pub metadata: MetadataConfig,
    pub router: RouterConfig,
    pub transport: TransportConfig,
}

impl Config {
    /// Load configuration from the standard search paths.
    ///
    /// Returns the config and the paths that were actually loaded. When no
    /// file was found at all, metadata exchange is disabled: a node with no
    /// configuration has nothing meaningful to say about itself.
    pub fn load() -> Result<(Self, Vec<PathBuf>), ConfigError> {
        Self::load_from_paths(&Self::search_paths())
    }

    /// Load configuration from specific paths, later paths overriding
    /// earlier ones.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut raw = RawConfig::default();
        let mut loaded_paths = Vec::new();

        for path in paths {
            if path.exists() {
                raw.merge(Self::load_raw(path)?);
                loaded_paths.push(path.clone());
            }
        }

        let mut config = Self::resolve(raw)?;
        if loaded_paths.is_empty() {
            config.node.disable_metadata_exchange = true;
        }
        Ok((config, loaded_paths))
    }

    /// Load configuration from a single file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        Self::resolve(Self::load_raw(path)?)
    }

    fn load_raw(path: &Path) -> Result<RawConfig, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Standard search paths in priority order (lowest to highest).
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        paths.push(PathBuf::from("/etc/dtnex").join(CONFIG_FILENAME));
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("dtnex").join(CONFIG_FILENAME));
        }
        paths.push(PathBuf::from(".").join(CONFIG_FILENAME));
        paths
    }

    fn resolve(raw: RawConfig) -> Result<Self, ConfigError> {
        let node = NodeConfig {
            update_interval: raw.node.update_interval.unwrap_or(DEFAULT_UPDATE_INTERVAL),
            contact_lifetime: raw.node.contact_lifetime.unwrap_or(DEFAULT_CONTACT_LIFETIME),
            contact_time_tolerance: raw
                .node
                .contact_time_tolerance
                .unwrap_or(DEFAULT_CONTACT_TIME_TOLERANCE),
            bundle_ttl: raw.node.bundle_ttl.unwrap_or(DEFAULT_BUNDLE_TTL),
            shared_key: raw
                .node
                .shared_key
                .unwrap_or_else(|| DEFAULT_SHARED_KEY.to_string()),
            service_number: raw.node.service_number.unwrap_or(DTNEX_SERVICE),
            disable_metadata_exchange: raw.node.disable_metadata_exchange.unwrap_or(false),
            accept_legacy_metadata: raw.node.accept_legacy_metadata.unwrap_or(false),
        };

        if node.update_interval == 0 {
            return Err(ConfigError::Invalid("update_interval must be positive".into()));
        }
        if node.contact_lifetime == 0 {
            return Err(ConfigError::Invalid("contact_lifetime must be positive".into()));
        }
        if node.contact_lifetime / 60 > u16::MAX as u64 {
            return Err(ConfigError::Invalid(
                "contact_lifetime exceeds the wire format's 16-bit minute field".into(),
            ));
        }
        if node.bundle_ttl < node.update_interval {
            return Err(ConfigError::Invalid(format!(
                "bundle_ttl ({}) must be at least update_interval ({})",
                node.bundle_ttl, node.update_interval
            )));
        }
        if node.shared_key.is_empty() {
            return Err(ConfigError::Invalid("shared_key must not be empty".into()));
        }

        let metadata = Self::resolve_metadata(raw.metadata)?;

        let router = RouterConfig {
            node_id: raw.router.node_id,
            neighbors: raw.router.neighbors.unwrap_or_default(),
        };
        if router.node_id == Some(0) {
            return Err(ConfigError::Invalid("router.node_id must be non-zero".into()));
        }

        let transport = TransportConfig {
            udp: raw.transport.udp.map(|udp| UdpConfig {
                bind_addr: udp
                    .bind_addr
                    .unwrap_or_else(|| format!("0.0.0.0:{}", node.service_number)),
                peers: udp.peers,
            }),
        };

        Ok(Self {
            node,
            metadata,
            router,
            transport,
        })
    }

    fn resolve_metadata(raw: RawMetadata) -> Result<MetadataConfig, ConfigError> {
        if let Some(name) = &raw.name {
            if name.len() > MAX_NAME_LEN {
                return Err(ConfigError::Invalid(format!(
                    "metadata.name exceeds {} bytes",
                    MAX_NAME_LEN
                )));
            }
        }
        if let Some(contact) = &raw.contact {
            if contact.len() > MAX_CONTACT_LEN {
                return Err(ConfigError::Invalid(format!(
                    "metadata.contact exceeds {} bytes",
                    MAX_CONTACT_LEN
                )));
            }
        }
        if raw.name.is_none() && (raw.contact.is_some() || raw.gps_lat.is_some()) {
            return Err(ConfigError::Invalid(
                "metadata.name is required when other metadata fields are set".into(),
            ));
        }

        let gps = match (raw.gps_lat, raw.gps_lon) {
            (Some(lat), Some(lon)) => Some(GpsCoordinates::from_degrees(lat, lon).map_err(
                |_| ConfigError::Invalid("gps coordinates out of range".into()),
            )?),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid(
                    "gps_lat and gps_lon must be set together".into(),
                ))
            }
        };

        Ok(MetadataConfig {
            name: raw.name,
            contact: raw.contact,
            gps,
        })
    }

    /// The MAC key derived from the configured shared secret.
    pub fn shared_key(&self) -> SharedKey {
        SharedKey::new(&self.node.shared_key)
    }

    /// Decoder options derived from configuration.
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            accept_legacy_metadata: self.node.accept_legacy_metadata,
        }
    }

    /// The local descriptor record, once the local node id is known.
    /// `None` when no descriptor is configured or exchange is disabled.
    pub fn local_metadata(&self, local_id: NodeId) -> Option<NodeMetadata> {
        if self.node.disable_metadata_exchange {
            return None;
        }
        let name = self.metadata.name.clone()?;
        Some(NodeMetadata {
            node_id: local_id,
            name,
            contact: self.metadata.contact.clone().unwrap_or_default(),
            gps: self.metadata.gps,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::resolve(RawConfig::default()).expect("defaults are valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.node.update_interval, 600);
        assert_eq!(config.node.contact_lifetime, 3600);
        assert_eq!(config.node.contact_time_tolerance, 1800);
        assert_eq!(config.node.bundle_ttl, 1800);
        assert_eq!(config.node.shared_key, "open");
        assert_eq!(config.node.service_number, 12160);
        assert!(!config.node.disable_metadata_exchange);
        assert!(!config.node.accept_legacy_metadata);
        assert!(config.metadata.name.is_none());
    }

    #[test]
    fn test_no_config_file_disables_metadata_exchange() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.yaml");
        let (config, loaded) = Config::load_from_paths(&[missing]).unwrap();
        assert!(loaded.is_empty());
        assert!(config.node.disable_metadata_exchange);
    }

    #[test]
    fn test_load_single_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "dtnex.yaml",
            r#"
node:
  update_interval: 120
  bundle_ttl: 600
  shared_key: "sesame"
metadata:
  name: "Gateway"
  contact: "ops@x"
router:
  node_id: 268484800
  neighbors: [268484801, 268484802]
"#,
        );
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.node.update_interval, 120);
        assert_eq!(config.node.shared_key, "sesame");
        assert_eq!(config.router.node_id, Some(268484800));
        assert_eq!(config.router.neighbors, [268484801, 268484802]);
        assert_eq!(config.metadata.name.as_deref(), Some("Gateway"));
    }

    #[test]
    fn test_later_files_override_earlier() {
        let dir = TempDir::new().unwrap();
        let low = write_config(
            &dir,
            "low.yaml",
            "node:\n  update_interval: 120\n  bundle_ttl: 900\n  shared_key: \"low\"\n",
        );
        let high = write_config(&dir, "high.yaml", "node:\n  shared_key: \"high\"\n");

        let (config, loaded) = Config::load_from_paths(&[low, high]).unwrap();
        assert_eq!(loaded.len(), 2);
        // Overridden by the later file.
        assert_eq!(config.node.shared_key, "high");
        // Untouched by the later file, kept from the earlier one.
        assert_eq!(config.node.update_interval, 120);
        assert_eq!(config.node.bundle_ttl, 900);
    }

    #[test]
    fn test_bundle_ttl_below_update_interval_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "dtnex.yaml",
            "node:\n  update_interval: 600\n  bundle_ttl: 300\n",
        );
        assert!(matches!(
            Config::load_file(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_empty_shared_key_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "dtnex.yaml", "node:\n  shared_key: \"\"\n");
        assert!(matches!(
            Config::load_file(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_gps_requires_both_coordinates() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "dtnex.yaml",
            "metadata:\n  name: \"G\"\n  gps_lat: 59.33\n",
        );
        assert!(matches!(
            Config::load_file(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_gps_out_of_range_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "dtnex.yaml",
            "metadata:\n  name: \"G\"\n  gps_lat: 95.0\n  gps_lon: 10.0\n",
        );
        assert!(matches!(
            Config::load_file(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_overlong_metadata_name_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "dtnex.yaml",
            &format!("metadata:\n  name: \"{}\"\n", "n".repeat(MAX_NAME_LEN + 1)),
        );
        assert!(matches!(
            Config::load_file(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "dtnex.yaml", "node:\n  update_intreval: 600\n");
        assert!(matches!(
            Config::load_file(&path),
            Err(ConfigError::ParseYaml { .. })
        ));
    }

    #[test]
    fn test_local_metadata_record() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "dtnex.yaml",
            "metadata:\n  name: \"Gateway\"\n  contact: \"ops@x\"\n  gps_lat: 59.334591\n  gps_lon: 18.063240\n",
        );
        let config = Config::load_file(&path).unwrap();
        let record = config.local_metadata(NodeId::new(7)).unwrap();
        assert_eq!(record.node_id, NodeId::new(7));
        assert_eq!(record.name, "Gateway");
        let gps = record.gps.unwrap();
        assert_eq!(gps.latitude_udeg, 59_334_591);
        assert_eq!(gps.longitude_udeg, 18_063_240);
    }

    #[test]
    fn test_local_metadata_respects_disable_flag() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "dtnex.yaml",
            "node:\n  disable_metadata_exchange: true\nmetadata:\n  name: \"Gateway\"\n",
        );
        let config = Config::load_file(&path).unwrap();
        assert!(config.local_metadata(NodeId::new(7)).is_none());
    }

    #[test]
    fn test_udp_bind_addr_defaults_to_service_port() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "dtnex.yaml",
            "transport:\n  udp:\n    peers:\n      268484801: \"10.0.0.2:12160\"\n",
        );
        let config = Config::load_file(&path).unwrap();
        let udp = config.transport.udp.unwrap();
        assert_eq!(udp.bind_addr, "0.0.0.0:12160");
        assert_eq!(udp.peers.len(), 1);
    }

    #[test]
    fn test_zero_node_id_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "dtnex.yaml", "router:\n  node_id: 0\n");
        assert!(matches!(
            Config::load_file(&path),
            Err(ConfigError::Invalid(_))
        ));
    }
}
