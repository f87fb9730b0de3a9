//! Envelope Wire Format
//!
//! Defines the authenticated gossip envelope carried in bundle payloads.
//! An envelope is a nine-element CBOR array; the MAC covers every byte
//! before the MAC field itself.
//!
//! ## Envelope layout
//!
//! ```text
//! array(9) [
//!   version        uint       (always 2)
//!   type           text(1)    "c" contact | "m" metadata
//!   timestamp      uint       creation time, Unix seconds
//!   expire_time    uint       discard deadline, Unix seconds
//!   origin         uint       node that constructed the envelope
//!   from           uint       most recent sender, rewritten per hop
//!   nonce          bytes(3)   chosen by origin, preserved across hops
//!   payload        array      type-specific, see below
//!   mac            bytes(8)   truncated HMAC-SHA-256 over all prior bytes
//! ]
//! ```
//!
//! ## Payloads
//!
//! | Type | Shape | Elements |
//! |------|-------|----------|
//! | contact  | array(3) | node_a, node_b, duration_minutes |
//! | metadata | array(3) | node_id, name, contact |
//! | metadata | array(5) | node_id, name, contact, lat_µdeg, lon_µdeg |
//!
//! Legacy metadata payloads of 2 or 4 elements (no leading node_id) decode
//! only when explicitly enabled, with `origin` standing in for the node id.
//!
//! Encoded envelopes never exceed [`MAX_ENVELOPE_SIZE`]; the string limits
//! guarantee it and the encoder checks it.

use crate::auth::{MacTag, Nonce, SharedKey, MAC_SIZE, NONCE_SIZE};
use crate::cbor::{self, CborError, Reader};
use crate::types::NodeId;
use std::fmt;
use thiserror::Error;

/// Protocol version carried in every envelope.
pub const PROTOCOL_VERSION: u64 = 2;

/// Number of elements in the outer envelope array.
pub const ENVELOPE_ELEMENTS: u64 = 9;

/// Hard upper bound on an encoded envelope.
pub const MAX_ENVELOPE_SIZE: usize = 128;

/// Maximum length of a descriptor name, in bytes.
pub const MAX_NAME_LEN: usize = 24;

/// Maximum length of a descriptor contact string, in bytes.
pub const MAX_CONTACT_LEN: usize = 24;

/// Scale factor between decimal degrees and transmitted microdegrees.
pub const GPS_PRECISION_FACTOR: f64 = 1_000_000.0;

const TYPE_CONTACT: &str = "c";
const TYPE_METADATA: &str = "m";

/// Errors from encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum WireError {
    #[error(transparent)]
    Cbor(#[from] CborError),

    #[error("unsupported protocol version {0}")]
    Version(u64),

    #[error("unknown message type {0:?}")]
    MessageType(String),

    #[error("envelope has {0} elements, expected {ENVELOPE_ELEMENTS}")]
    EnvelopeShape(u64),

    #[error("payload has unsupported element count {0}")]
    PayloadShape(u64),

    #[error("{field} exceeds {max} bytes")]
    FieldTooLong { field: &'static str, max: usize },

    #[error("duration does not fit 16 bits")]
    DurationRange,

    #[error("gps coordinate out of range")]
    GpsRange,

    #[error("encoded envelope is {0} bytes, limit {MAX_ENVELOPE_SIZE}")]
    EnvelopeTooLarge(usize),

    #[error("trailing bytes after envelope")]
    TrailingBytes,
}

// ============================================================================
// Payload Types
// ============================================================================

/// Message kind, the `type` field of the envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    /// Contact advertisement.
    Contact,
    /// Node descriptor.
    Metadata,
}

impl MessageType {
    fn as_str(&self) -> &'static str {
        match self {
            MessageType::Contact => TYPE_CONTACT,
            MessageType::Metadata => TYPE_METADATA,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Contact => "contact",
            MessageType::Metadata => "metadata",
        };
        write!(f, "{}", name)
    }
}

/// A contact advertisement: both directions of the edge are installed by
/// the receiver, so the pair is semantically unordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContactInfo {
    /// One endpoint of the advertised edge.
    pub node_a: NodeId,
    /// The other endpoint.
    pub node_b: NodeId,
    /// Validity window in whole minutes.
    pub duration_minutes: u16,
}

/// GPS position in integer microdegrees. Both coordinates travel together.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpsCoordinates {
    /// Latitude in microdegrees (degrees x 1e6).
    pub latitude_udeg: i32,
    /// Longitude in microdegrees (degrees x 1e6).
    pub longitude_udeg: i32,
}

impl GpsCoordinates {
    /// Latitude in decimal degrees.
    pub fn latitude_deg(&self) -> f64 {
        self.latitude_udeg as f64 / GPS_PRECISION_FACTOR
    }

    /// Longitude in decimal degrees.
    pub fn longitude_deg(&self) -> f64 {
        self.longitude_udeg as f64 / GPS_PRECISION_FACTOR
    }

    /// Build from decimal degrees, truncating to microdegree precision.
    pub fn from_degrees(lat: f64, lon: f64) -> Result<Self, WireError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(WireError::GpsRange);
        }
        Ok(Self {
            latitude_udeg: (lat * GPS_PRECISION_FACTOR) as i32,
            longitude_udeg: (lon * GPS_PRECISION_FACTOR) as i32,
        })
    }
}

/// A node's human-readable descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeMetadata {
    /// Node the descriptor belongs to.
    pub node_id: NodeId,
    /// Short display name.
    pub name: String,
    /// Operator contact string.
    pub contact: String,
    /// Optional position.
    pub gps: Option<GpsCoordinates>,
}

impl NodeMetadata {
    fn check_limits(&self) -> Result<(), WireError> {
        if self.name.len() > MAX_NAME_LEN {
            return Err(WireError::FieldTooLong {
                field: "name",
                max: MAX_NAME_LEN,
            });
        }
        if self.contact.len() > MAX_CONTACT_LEN {
            return Err(WireError::FieldTooLong {
                field: "contact",
                max: MAX_CONTACT_LEN,
            });
        }
        Ok(())
    }
}

/// Type-specific envelope payload. The variant set is closed.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Contact(ContactInfo),
    Metadata(NodeMetadata),
}

impl Payload {
    /// The message type this payload encodes as.
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::Contact(_) => MessageType::Contact,
            Payload::Metadata(_) => MessageType::Metadata,
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// A decoded or locally originated gossip envelope.
///
/// The nonce is private and only set by the originating constructors or the
/// decoder; [`Envelope::forwarded`] replaces `from` and nothing else, so a
/// forwarding path cannot mint a fresh nonce.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    timestamp: u64,
    expire_time: u64,
    origin: NodeId,
    from: NodeId,
    nonce: Nonce,
    payload: Payload,
}

impl Envelope {
    /// Originate a contact advertisement. `origin` and `from` are both the
    /// local node; the nonce is freshly generated.
    pub fn new_contact(
        origin: NodeId,
        contact: ContactInfo,
        timestamp: u64,
        expire_time: u64,
    ) -> Self {
        Self {
            timestamp,
            expire_time,
            origin,
            from: origin,
            nonce: Nonce::generate(),
            payload: Payload::Contact(contact),
        }
    }

    /// Originate a metadata advertisement.
    pub fn new_metadata(
        origin: NodeId,
        metadata: NodeMetadata,
        timestamp: u64,
        expire_time: u64,
    ) -> Self {
        Self {
            timestamp,
            expire_time,
            origin,
            from: origin,
            nonce: Nonce::generate(),
            payload: Payload::Metadata(metadata),
        }
    }

    /// Produce the forwarding copy of this envelope: identical in every
    /// field except `from`, which becomes the forwarder's id.
    pub fn forwarded(&self, local_id: NodeId) -> Self {
        let mut fwd = self.clone();
        fwd.from = local_id;
        fwd
    }

    /// Construct an envelope with explicit nonce bytes, for test vectors.
    #[cfg(test)]
    pub(crate) fn with_nonce(
        origin: NodeId,
        from: NodeId,
        nonce_bytes: [u8; NONCE_SIZE],
        payload: Payload,
        timestamp: u64,
        expire_time: u64,
    ) -> Self {
        Self {
            timestamp,
            expire_time,
            origin,
            from,
            nonce: Nonce::from_bytes(nonce_bytes),
            payload,
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn expire_time(&self) -> u64 {
        self.expire_time
    }

    pub fn origin(&self) -> NodeId {
        self.origin
    }

    pub fn from(&self) -> NodeId {
        self.from
    }

    pub fn nonce(&self) -> Nonce {
        self.nonce
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    /// Serialize and seal the envelope under `key`.
    pub fn encode(&self, key: &SharedKey) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::with_capacity(MAX_ENVELOPE_SIZE);

        cbor::write_array(&mut buf, ENVELOPE_ELEMENTS);
        cbor::write_uint(&mut buf, PROTOCOL_VERSION);
        cbor::write_text(&mut buf, self.message_type().as_str());
        cbor::write_uint(&mut buf, self.timestamp);
        cbor::write_uint(&mut buf, self.expire_time);
        cbor::write_uint(&mut buf, self.origin.as_u64());
        cbor::write_uint(&mut buf, self.from.as_u64());
        cbor::write_bytes(&mut buf, self.nonce.as_bytes());

        match &self.payload {
            Payload::Contact(c) => {
                cbor::write_array(&mut buf, 3);
                cbor::write_uint(&mut buf, c.node_a.as_u64());
                cbor::write_uint(&mut buf, c.node_b.as_u64());
                cbor::write_uint(&mut buf, c.duration_minutes as u64);
            }
            Payload::Metadata(m) => {
                m.check_limits()?;
                match m.gps {
                    Some(gps) => {
                        cbor::write_array(&mut buf, 5);
                        cbor::write_uint(&mut buf, m.node_id.as_u64());
                        cbor::write_text(&mut buf, &m.name);
                        cbor::write_text(&mut buf, &m.contact);
                        cbor::write_int(&mut buf, gps.latitude_udeg as i64);
                        cbor::write_int(&mut buf, gps.longitude_udeg as i64);
                    }
                    None => {
                        cbor::write_array(&mut buf, 3);
                        cbor::write_uint(&mut buf, m.node_id.as_u64());
                        cbor::write_text(&mut buf, &m.name);
                        cbor::write_text(&mut buf, &m.contact);
                    }
                }
            }
        }

        // MAC covers every byte written so far.
        let tag = key.seal(&buf);
        cbor::write_bytes(&mut buf, tag.as_bytes());

        if buf.len() > MAX_ENVELOPE_SIZE {
            return Err(WireError::EnvelopeTooLarge(buf.len()));
        }
        Ok(buf)
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decoder knobs controlled by configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodeOptions {
    /// Accept legacy 2- and 4-element metadata payloads that lack the
    /// leading node id, substituting the envelope origin.
    pub accept_legacy_metadata: bool,
}

/// A structurally valid envelope plus what is needed to authenticate it.
#[derive(Debug)]
pub struct Decoded {
    /// The decoded envelope.
    pub envelope: Envelope,
    /// Received MAC tag.
    mac: MacTag,
    /// Length of the MAC-covered prefix of the raw input.
    signed_len: usize,
}

impl Decoded {
    /// Verify the received MAC against the raw bytes this was decoded from.
    pub fn verify(&self, raw: &[u8], key: &SharedKey) -> bool {
        raw.len() >= self.signed_len && key.verify(&raw[..self.signed_len], &self.mac)
    }

    /// Consume into the envelope once authenticated.
    pub fn into_envelope(self) -> Envelope {
        self.envelope
    }
}

/// Decode a received envelope. Structural validation only; the caller
/// authenticates via [`Decoded::verify`] and applies expiry policy itself.
pub fn decode(raw: &[u8], opts: DecodeOptions) -> Result<Decoded, WireError> {
    if raw.len() > MAX_ENVELOPE_SIZE {
        return Err(WireError::EnvelopeTooLarge(raw.len()));
    }

    let mut r = Reader::new(raw);

    let elements = r.read_array()?;
    if elements != ENVELOPE_ELEMENTS {
        return Err(WireError::EnvelopeShape(elements));
    }

    let version = r.read_uint()?;
    if version != PROTOCOL_VERSION {
        return Err(WireError::Version(version));
    }

    let type_str = r.read_text(1)?;
    let message_type = match type_str.as_str() {
        TYPE_CONTACT => MessageType::Contact,
        TYPE_METADATA => MessageType::Metadata,
        _ => return Err(WireError::MessageType(type_str)),
    };

    let timestamp = r.read_uint()?;
    let expire_time = r.read_uint()?;
    let origin = NodeId::new(r.read_uint()?);
    let from = NodeId::new(r.read_uint()?);
    let nonce = Nonce::from_bytes(r.read_exact_bytes::<NONCE_SIZE>()?);

    let payload = match message_type {
        MessageType::Contact => Payload::Contact(decode_contact(&mut r)?),
        MessageType::Metadata => Payload::Metadata(decode_metadata(&mut r, origin, opts)?),
    };

    // The MAC field starts here; everything before it is covered.
    let signed_len = r.position();
    let mac = MacTag::from_bytes(r.read_exact_bytes::<MAC_SIZE>()?);

    if r.remaining() != 0 {
        return Err(WireError::TrailingBytes);
    }

    Ok(Decoded {
        envelope: Envelope {
            timestamp,
            expire_time,
            origin,
            from,
            nonce,
            payload,
        },
        mac,
        signed_len,
    })
}

fn decode_contact(r: &mut Reader<'_>) -> Result<ContactInfo, WireError> {
    let elements = r.read_array()?;
    if elements != 3 {
        return Err(WireError::PayloadShape(elements));
    }
    let node_a = NodeId::new(r.read_uint()?);
    let node_b = NodeId::new(r.read_uint()?);
    let duration = r.read_uint()?;
    let duration_minutes = u16::try_from(duration).map_err(|_| WireError::DurationRange)?;
    Ok(ContactInfo {
        node_a,
        node_b,
        duration_minutes,
    })
}

fn decode_metadata(
    r: &mut Reader<'_>,
    origin: NodeId,
    opts: DecodeOptions,
) -> Result<NodeMetadata, WireError> {
    let elements = r.read_array()?;

    let (node_id, has_gps) = match elements {
        3 => (NodeId::new(r.read_uint()?), false),
        5 => (NodeId::new(r.read_uint()?), true),
        2 if opts.accept_legacy_metadata => (origin, false),
        4 if opts.accept_legacy_metadata => (origin, true),
        other => return Err(WireError::PayloadShape(other)),
    };

    let name = r.read_text(MAX_NAME_LEN)?;
    let contact = r.read_text(MAX_CONTACT_LEN)?;

    let gps = if has_gps {
        let lat = r.read_int()?;
        let lon = r.read_int()?;
        let latitude_udeg = i32::try_from(lat).map_err(|_| WireError::GpsRange)?;
        let longitude_udeg = i32::try_from(lon).map_err(|_| WireError::GpsRange)?;
        Some(GpsCoordinates {
            latitude_udeg,
            longitude_udeg,
        })
    } else {
        None
    };

    Ok(NodeMetadata {
        node_id,
        name,
        contact,
        gps,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SharedKey {
        SharedKey::new("open")
    }

    fn sample_contact() -> Envelope {
        Envelope::new_contact(
            NodeId::new(268484800),
            ContactInfo {
                node_a: NodeId::new(268484800),
                node_b: NodeId::new(268484801),
                duration_minutes: 60,
            },
            1_700_000_000,
            1_700_003_600,
        )
    }

    fn sample_metadata(gps: Option<GpsCoordinates>) -> Envelope {
        Envelope::new_metadata(
            NodeId::new(268484800),
            NodeMetadata {
                node_id: NodeId::new(268484800),
                name: "Gateway".into(),
                contact: "ops@x".into(),
                gps,
            },
            1_700_000_000,
            1_700_003_600,
        )
    }

    #[test]
    fn test_contact_roundtrip() {
        let env = sample_contact();
        let raw = env.encode(&key()).unwrap();
        let decoded = decode(&raw, DecodeOptions::default()).unwrap();
        assert!(decoded.verify(&raw, &key()));
        assert_eq!(decoded.envelope, env);
    }

    #[test]
    fn test_metadata_roundtrip_without_gps() {
        let env = sample_metadata(None);
        let raw = env.encode(&key()).unwrap();
        let decoded = decode(&raw, DecodeOptions::default()).unwrap();
        assert!(decoded.verify(&raw, &key()));
        assert_eq!(decoded.envelope, env);
        match decoded.envelope.payload() {
            Payload::Metadata(m) => assert!(m.gps.is_none()),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_metadata_roundtrip_with_gps() {
        let env = sample_metadata(Some(GpsCoordinates {
            latitude_udeg: 59_334_591,
            longitude_udeg: -18_063_240,
        }));
        let raw = env.encode(&key()).unwrap();
        let decoded = decode(&raw, DecodeOptions::default()).unwrap();
        assert!(decoded.verify(&raw, &key()));
        assert_eq!(decoded.envelope, env);
    }

    #[test]
    fn test_size_bound_holds_at_maximums() {
        // Largest legal envelope: 64-bit ids, max-length strings, GPS set.
        let env = Envelope::new_metadata(
            NodeId::new(u64::MAX),
            NodeMetadata {
                node_id: NodeId::new(u64::MAX),
                name: "n".repeat(MAX_NAME_LEN),
                contact: "c".repeat(MAX_CONTACT_LEN),
                gps: Some(GpsCoordinates {
                    latitude_udeg: -90_000_000,
                    longitude_udeg: -180_000_000,
                }),
            },
            u64::MAX,
            u64::MAX,
        );
        let raw = env.encode(&key()).unwrap();
        assert!(raw.len() <= MAX_ENVELOPE_SIZE, "len {}", raw.len());
    }

    #[test]
    fn test_overlong_name_rejected() {
        let env = Envelope::new_metadata(
            NodeId::new(1),
            NodeMetadata {
                node_id: NodeId::new(1),
                name: "x".repeat(MAX_NAME_LEN + 1),
                contact: String::new(),
                gps: None,
            },
            0,
            1,
        );
        assert!(matches!(
            env.encode(&key()),
            Err(WireError::FieldTooLong { field: "name", .. })
        ));
    }

    #[test]
    fn test_mac_field_is_eight_bytes() {
        let raw = sample_contact().encode(&key()).unwrap();
        // The final field is bytes(8): one head byte plus the tag.
        assert_eq!(raw[raw.len() - MAC_SIZE - 1], 0x48);
    }

    #[test]
    fn test_any_flipped_bit_outside_mac_fails_verification() {
        let raw = sample_contact().encode(&key()).unwrap();
        let signed_len = raw.len() - MAC_SIZE - 1;
        for byte in 0..signed_len {
            let mut tampered = raw.clone();
            tampered[byte] ^= 0x01;
            match decode(&tampered, DecodeOptions::default()) {
                Ok(d) => assert!(
                    !d.verify(&tampered, &key()),
                    "bit flip at byte {} slipped through",
                    byte
                ),
                // Structural rejection is an equally sound outcome.
                Err(_) => {}
            }
        }
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let raw = sample_contact().encode(&key()).unwrap();
        let decoded = decode(&raw, DecodeOptions::default()).unwrap();
        assert!(!decoded.verify(&raw, &SharedKey::new("sesame")));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut raw = sample_contact().encode(&key()).unwrap();
        raw[1] = 0x03; // version element follows the array head
        assert!(matches!(
            decode(&raw, DecodeOptions::default()),
            Err(WireError::Version(3))
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut raw = sample_contact().encode(&key()).unwrap();
        raw[3] = b'x'; // the type text content
        assert!(matches!(
            decode(&raw, DecodeOptions::default()),
            Err(WireError::MessageType(_))
        ));
    }

    #[test]
    fn test_truncated_envelope_rejected() {
        let raw = sample_contact().encode(&key()).unwrap();
        for len in 0..raw.len() {
            assert!(decode(&raw[..len], DecodeOptions::default()).is_err());
        }
    }

    #[test]
    fn test_oversized_input_rejected() {
        let raw = vec![0u8; MAX_ENVELOPE_SIZE + 1];
        assert!(matches!(
            decode(&raw, DecodeOptions::default()),
            Err(WireError::EnvelopeTooLarge(_))
        ));
    }

    #[test]
    fn test_forwarded_rewrites_from_only() {
        let env = sample_contact();
        let fwd = env.forwarded(NodeId::new(268484850));
        assert_eq!(fwd.from(), NodeId::new(268484850));
        assert_eq!(fwd.origin(), env.origin());
        assert_eq!(fwd.nonce(), env.nonce());
        assert_eq!(fwd.timestamp(), env.timestamp());
        assert_eq!(fwd.expire_time(), env.expire_time());
        assert_eq!(fwd.payload(), env.payload());
    }

    #[test]
    fn test_forwarded_envelope_reauthenticates() {
        let env = sample_contact();
        let fwd = env.forwarded(NodeId::new(268484850));
        let raw = fwd.encode(&key()).unwrap();
        let decoded = decode(&raw, DecodeOptions::default()).unwrap();
        assert!(decoded.verify(&raw, &key()));
        assert_eq!(decoded.envelope.from(), NodeId::new(268484850));
        assert_eq!(decoded.envelope.nonce(), env.nonce());
    }

    #[test]
    fn test_legacy_metadata_rejected_by_default() {
        let raw = encode_legacy_metadata(false);
        assert!(matches!(
            decode(&raw, DecodeOptions::default()),
            Err(WireError::PayloadShape(2))
        ));
    }

    #[test]
    fn test_legacy_metadata_accepted_when_enabled() {
        let raw = encode_legacy_metadata(false);
        let opts = DecodeOptions {
            accept_legacy_metadata: true,
        };
        let decoded = decode(&raw, opts).unwrap();
        assert!(decoded.verify(&raw, &key()));
        match decoded.envelope.payload() {
            Payload::Metadata(m) => {
                // Origin stands in for the missing node id.
                assert_eq!(m.node_id, NodeId::new(7));
                assert_eq!(m.name, "Relay");
                assert!(m.gps.is_none());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_legacy_gps_metadata_accepted_when_enabled() {
        let raw = encode_legacy_metadata(true);
        let opts = DecodeOptions {
            accept_legacy_metadata: true,
        };
        let decoded = decode(&raw, opts).unwrap();
        match decoded.envelope.payload() {
            Payload::Metadata(m) => {
                assert_eq!(m.node_id, NodeId::new(7));
                let gps = m.gps.expect("gps present");
                assert_eq!(gps.latitude_udeg, 59_334_591);
                assert_eq!(gps.longitude_udeg, 18_063_240);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    /// Hand-build a legacy metadata envelope (2 or 4 payload elements).
    fn encode_legacy_metadata(with_gps: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        cbor::write_array(&mut buf, ENVELOPE_ELEMENTS);
        cbor::write_uint(&mut buf, PROTOCOL_VERSION);
        cbor::write_text(&mut buf, "m");
        cbor::write_uint(&mut buf, 1_700_000_000);
        cbor::write_uint(&mut buf, 1_700_003_600);
        cbor::write_uint(&mut buf, 7); // origin
        cbor::write_uint(&mut buf, 7); // from
        cbor::write_bytes(&mut buf, &[0xA1, 0xB2, 0xC3]);
        if with_gps {
            cbor::write_array(&mut buf, 4);
            cbor::write_text(&mut buf, "Relay");
            cbor::write_text(&mut buf, "ops@x");
            cbor::write_int(&mut buf, 59_334_591);
            cbor::write_int(&mut buf, 18_063_240);
        } else {
            cbor::write_array(&mut buf, 2);
            cbor::write_text(&mut buf, "Relay");
            cbor::write_text(&mut buf, "ops@x");
        }
        let tag = key().seal(&buf);
        cbor::write_bytes(&mut buf, tag.as_bytes());
        buf
    }

    #[test]
    fn test_gps_degree_conversion() {
        let gps = GpsCoordinates {
            latitude_udeg: 59_334_591,
            longitude_udeg: 18_063_240,
        };
        assert!((gps.latitude_deg() - 59.334591).abs() < 1e-9);
        assert!((gps.longitude_deg() - 18.063240).abs() < 1e-9);
    }

    #[test]
    fn test_gps_from_degrees_bounds() {
        assert!(GpsCoordinates::from_degrees(91.0, 0.0).is_err());
        assert!(GpsCoordinates::from_degrees(0.0, -180.5).is_err());
        let gps = GpsCoordinates::from_degrees(59.334591, 18.063240).unwrap();
        assert_eq!(gps.latitude_udeg, 59_334_591);
        assert_eq!(gps.longitude_udeg, 18_063_240);
    }
}
