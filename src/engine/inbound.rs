//! Inbound Message Handling
//!
//! Decodes, authenticates, and applies received envelopes, then hands them
//! to the forwarder. Rejections are the normal case for a gossip protocol
//! and are silent beyond a debug line; only a vanished router stops
//! processing.

use super::{Engine, EngineError};
use crate::router::{
    InsertOutcome, RouterError, DEFAULT_CONFIDENCE, DEFAULT_OWLT_SECS, DEFAULT_REGION,
    DEFAULT_XMIT_RATE,
};
use crate::types::NodeId;
use crate::wire::{self, ContactInfo, Envelope, MessageType, Payload};
use std::fmt;
use tracing::{debug, info, warn};

/// Why an inbound envelope was discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Structural decode failure, wrong version, unknown type, size
    /// violation, or implausible timestamp.
    Malformed,
    /// Past its expiry deadline.
    Expired,
    /// MAC did not verify under the shared key.
    AuthFailed,
    /// `(origin, nonce)` already seen.
    Duplicate,
    /// Our own message echoed back.
    SelfOrigin,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DropReason::Malformed => "malformed",
            DropReason::Expired => "expired",
            DropReason::AuthFailed => "auth failed",
            DropReason::Duplicate => "duplicate",
            DropReason::SelfOrigin => "self origin",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of handling one inbound bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Accepted, applied, and forwarded to `forwards` neighbors.
    Delivered {
        message_type: MessageType,
        forwards: usize,
    },
    /// Discarded without side effects.
    Dropped(DropReason),
}

impl Engine {
    /// Process one received bundle payload.
    ///
    /// Pipeline: decode, expiry, MAC, replay, self-origin, apply, forward.
    /// Replay insertion happens before the self-origin check so that our
    /// own echoes are also remembered.
    pub(crate) async fn handle_inbound(
        &mut self,
        raw: &[u8],
        now: u64,
    ) -> Result<Disposition, EngineError> {
        let decoded = match wire::decode(raw, self.decode_opts) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(error = %e, len = raw.len(), "undecodable bundle");
                return Ok(Disposition::Dropped(DropReason::Malformed));
            }
        };

        let envelope = &decoded.envelope;
        if now >= envelope.expire_time() {
            debug!(
                expire_time = envelope.expire_time(),
                now, "expired envelope"
            );
            return Ok(Disposition::Dropped(DropReason::Expired));
        }
        if envelope.timestamp() > now + self.config.node.contact_time_tolerance {
            debug!(
                timestamp = envelope.timestamp(),
                now, "timestamp beyond clock skew tolerance"
            );
            return Ok(Disposition::Dropped(DropReason::Malformed));
        }

        if !decoded.verify(raw, &self.key) {
            debug!(origin = %envelope.origin(), "MAC verification failed");
            return Ok(Disposition::Dropped(DropReason::AuthFailed));
        }

        if self.replay.contains(envelope.origin(), envelope.nonce()) {
            debug!(
                origin = %envelope.origin(),
                nonce = %envelope.nonce(),
                "replayed or looped envelope"
            );
            return Ok(Disposition::Dropped(DropReason::Duplicate));
        }
        self.replay
            .insert(envelope.origin(), envelope.nonce(), now);

        if envelope.origin() == self.local_id {
            debug!("own message echoed back");
            return Ok(Disposition::Dropped(DropReason::SelfOrigin));
        }

        let envelope = decoded.into_envelope();
        match envelope.payload() {
            Payload::Contact(contact) => {
                info!(
                    origin = %envelope.origin(),
                    from = %envelope.from(),
                    node_a = %contact.node_a,
                    node_b = %contact.node_b,
                    duration_minutes = contact.duration_minutes,
                    "received contact advertisement"
                );
                self.install_contact(&envelope, *contact)?;
            }
            Payload::Metadata(metadata) => {
                info!(
                    origin = %envelope.origin(),
                    from = %envelope.from(),
                    node = %metadata.node_id,
                    name = %metadata.name,
                    "received node descriptor"
                );
                self.metadata.put(metadata.clone());
            }
        }

        let forwards = self.forward(&envelope, now).await?;
        Ok(Disposition::Delivered {
            message_type: envelope.message_type(),
            forwards,
        })
    }

    /// Install both directions of an advertised contact, then both ranges.
    ///
    /// Idempotent router responses count as success; a transient failure on
    /// one edge does not stop the remaining insertions.
    fn install_contact(
        &mut self,
        envelope: &Envelope,
        contact: ContactInfo,
    ) -> Result<(), EngineError> {
        let from_time = envelope.timestamp();
        let to_time = from_time + u64::from(contact.duration_minutes) * 60;
        let directions = [
            (contact.node_a, contact.node_b),
            (contact.node_b, contact.node_a),
        ];

        for (src, dst) in directions {
            let outcome = self.router.insert_contact(
                DEFAULT_REGION,
                from_time,
                to_time,
                src,
                dst,
                DEFAULT_XMIT_RATE,
                DEFAULT_CONFIDENCE,
            );
            Self::note_insert("contact", src, dst, outcome)?;
        }

        for (src, dst) in directions {
            let outcome =
                self.router
                    .insert_range(from_time, to_time, src, dst, DEFAULT_OWLT_SECS);
            Self::note_insert("range", src, dst, outcome)?;
        }

        Ok(())
    }

    fn note_insert(
        kind: &'static str,
        src: NodeId,
        dst: NodeId,
        outcome: Result<InsertOutcome, RouterError>,
    ) -> Result<(), EngineError> {
        match outcome {
            Ok(InsertOutcome::Inserted) => {
                debug!(kind, %src, %dst, "edge installed");
                Ok(())
            }
            Ok(InsertOutcome::AlreadyExists) => {
                debug!(kind, %src, %dst, "edge already exists");
                Ok(())
            }
            Ok(InsertOutcome::Duplicate) => {
                debug!(kind, %src, %dst, "edge duplicates an overlapping window");
                Ok(())
            }
            Err(RouterError::Transient(reason)) => {
                warn!(kind, %src, %dst, %reason, "edge insertion failed");
                Ok(())
            }
            Err(RouterError::Gone(reason)) => Err(EngineError::RouterLost(reason)),
        }
    }
}
