//! Message Forwarding
//!
//! Re-emits an accepted envelope to every neighbor that has not already
//! seen it: the origin, the peer it arrived from, and the local node are
//! skipped. The forwarded copy differs only in its `from` field; the
//! origin and nonce travel unchanged so replay suppression keeps working
//! across hops, and the MAC is recomputed because `from` is inside the
//! authenticated range.

use super::{Engine, EngineError};
use crate::router::RouterError;
use crate::types::Endpoint;
use crate::wire::Envelope;
use std::time::Duration;
use tracing::{debug, warn};

impl Engine {
    /// Forward one accepted envelope. Returns the number of copies sent.
    pub(crate) async fn forward(
        &mut self,
        envelope: &Envelope,
        now: u64,
    ) -> Result<usize, EngineError> {
        let plans = match self.plans.snapshot(self.router.as_ref(), now) {
            Ok(plans) => plans,
            Err(RouterError::Gone(reason)) => return Err(EngineError::RouterLost(reason)),
            Err(RouterError::Transient(reason)) => {
                warn!(%reason, "neighbor snapshot unavailable, not forwarding");
                return Ok(0);
            }
        };

        let forwarded = envelope.forwarded(self.local_id);
        let raw = match forwarded.encode(&self.key) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to re-encode envelope for forwarding");
                return Ok(0);
            }
        };

        let ttl = Duration::from_secs(self.config.node.bundle_ttl);
        let service = self.config.node.service_number;

        let mut sent = 0usize;
        for plan in &plans {
            let neighbor = plan.neighbor;
            if neighbor == envelope.origin()
                || neighbor == envelope.from()
                || neighbor == self.local_id
            {
                continue;
            }

            let endpoint = Endpoint::new(neighbor, service);
            match self.transport.send(endpoint, &raw, ttl).await {
                Ok(()) => {
                    sent += 1;
                    debug!(
                        to = %endpoint,
                        origin = %envelope.origin(),
                        from = %envelope.from(),
                        "forwarded"
                    );
                }
                Err(e) => warn!(to = %endpoint, error = %e, "forward send failed"),
            }
        }

        Ok(sent)
    }
}
