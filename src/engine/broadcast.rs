//! Originate Broadcast
//!
//! Periodically advertises the local node's neighbor contacts and its
//! descriptor to every neighbor. The pairwise fan-out seeds each peer's
//! one-hop view; receivers handle further propagation.

use super::Engine;
use crate::router::Plan;
use crate::types::Endpoint;
use crate::wire::{ContactInfo, Envelope};
use std::time::Duration;
use tracing::{debug, info, warn};

impl Engine {
    /// Send one full broadcast round to the given neighbor snapshot.
    ///
    /// For every pair `(i, j)` of neighbors with `j != local`, node `j` is
    /// told about the contact `local <-> i`; then the local descriptor goes
    /// to every neighbor when metadata exchange is on. Send failures are
    /// logged and skipped; the next round retries.
    pub(crate) async fn broadcast_round(&mut self, plans: &[Plan], now: u64) {
        if plans.is_empty() {
            debug!("no neighbors configured, nothing to broadcast");
            return;
        }

        let lifetime = self.config.node.contact_lifetime;
        let expire_time = now + lifetime;
        let duration_minutes = (lifetime / 60) as u16;
        let ttl = Duration::from_secs(self.config.node.bundle_ttl);
        let service = self.config.node.service_number;

        info!(neighbors = plans.len(), "broadcasting contact information");

        let mut sent = 0usize;
        for target in plans {
            for dest in plans {
                if dest.neighbor == self.local_id {
                    continue;
                }

                let contact = ContactInfo {
                    node_a: self.local_id,
                    node_b: target.neighbor,
                    duration_minutes,
                };
                let envelope = Envelope::new_contact(self.local_id, contact, now, expire_time);
                let raw = match envelope.encode(&self.key) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(error = %e, "failed to encode contact advertisement");
                        continue;
                    }
                };

                let endpoint = Endpoint::new(dest.neighbor, service);
                match self.transport.send(endpoint, &raw, ttl).await {
                    Ok(()) => {
                        sent += 1;
                        debug!(
                            to = %endpoint,
                            node_a = %contact.node_a,
                            node_b = %contact.node_b,
                            "sent contact advertisement"
                        );
                    }
                    Err(e) => warn!(to = %endpoint, error = %e, "contact send failed"),
                }
            }
        }

        sent += self.broadcast_local_metadata(plans, now, expire_time, ttl).await;
        debug!(sent, "broadcast round complete");
    }

    /// Advertise the local descriptor to every neighbor. A node with no
    /// configured descriptor, or with exchange disabled, says nothing.
    async fn broadcast_local_metadata(
        &mut self,
        plans: &[Plan],
        now: u64,
        expire_time: u64,
        ttl: Duration,
    ) -> usize {
        if self.config.node.disable_metadata_exchange {
            return 0;
        }
        let record = match self.metadata.get(self.local_id) {
            Some(record) => record.clone(),
            None => return 0,
        };
        let service = self.config.node.service_number;

        let mut sent = 0usize;
        for dest in plans {
            if dest.neighbor == self.local_id {
                continue;
            }

            let envelope =
                Envelope::new_metadata(self.local_id, record.clone(), now, expire_time);
            let raw = match envelope.encode(&self.key) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "failed to encode metadata advertisement");
                    continue;
                }
            };

            let endpoint = Endpoint::new(dest.neighbor, service);
            match self.transport.send(endpoint, &raw, ttl).await {
                Ok(()) => {
                    sent += 1;
                    debug!(to = %endpoint, name = %record.name, "sent metadata advertisement");
                }
                Err(e) => warn!(to = %endpoint, error = %e, "metadata send failed"),
            }
        }
        sent
    }
}
