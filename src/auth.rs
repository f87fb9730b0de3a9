//! Message Authentication
//!
//! Every envelope is sealed with HMAC-SHA-256 under a network-wide shared
//! secret, truncated to 8 bytes for wire economy, and carries a 3-byte
//! random nonce chosen by the originator. The `(origin, nonce)` pair is the
//! replay and loop suppression key, so a forwarder must never mint a fresh
//! nonce; only originating constructors in `wire` generate one.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Transmitted MAC length in bytes (truncated HMAC-SHA-256).
pub const MAC_SIZE: usize = 8;

/// Nonce length in bytes.
pub const NONCE_SIZE: usize = 3;

/// The network-wide shared secret used to key the envelope MAC.
#[derive(Clone)]
pub struct SharedKey(Vec<u8>);

impl SharedKey {
    /// Create a key from the configured printable secret.
    pub fn new(secret: &str) -> Self {
        Self(secret.as_bytes().to_vec())
    }

    /// Compute the truncated MAC over `message`.
    pub fn seal(&self, message: &[u8]) -> MacTag {
        let mut mac = HmacSha256::new_from_slice(&self.0)
            .expect("HMAC accepts any key size per RFC 2104");
        mac.update(message);
        let digest = mac.finalize().into_bytes();
        let mut tag = [0u8; MAC_SIZE];
        tag.copy_from_slice(&digest[..MAC_SIZE]);
        MacTag(tag)
    }

    /// Verify a received tag against `message` in constant time.
    pub fn verify(&self, message: &[u8], received: &MacTag) -> bool {
        let expected = self.seal(message);
        expected.0.ct_eq(&received.0).into()
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the secret itself.
        write!(f, "SharedKey({} bytes)", self.0.len())
    }
}

/// A truncated envelope MAC.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MacTag([u8; MAC_SIZE]);

impl MacTag {
    /// Wrap raw tag bytes received from the wire.
    pub fn from_bytes(bytes: [u8; MAC_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the tag bytes.
    pub fn as_bytes(&self) -> &[u8; MAC_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MacTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacTag({})", hex::encode(self.0))
    }
}

/// A per-message random nonce chosen by the originating node.
///
/// Immutable under forwarding: the struct offers no mutation and no public
/// constructor from caller-chosen bytes outside this crate's codec.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a fresh random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap nonce bytes decoded from the wire.
    pub(crate) fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the nonce bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", hex::encode(self.0))
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_is_eight_bytes() {
        let key = SharedKey::new("open");
        let tag = key.seal(b"hello");
        assert_eq!(tag.as_bytes().len(), MAC_SIZE);
    }

    #[test]
    fn test_seal_is_deterministic() {
        let key = SharedKey::new("open");
        assert_eq!(key.seal(b"payload"), key.seal(b"payload"));
    }

    #[test]
    fn test_verify_accepts_valid_tag() {
        let key = SharedKey::new("open");
        let tag = key.seal(b"payload");
        assert!(key.verify(b"payload", &tag));
    }

    #[test]
    fn test_verify_rejects_tampered_message() {
        let key = SharedKey::new("open");
        let tag = key.seal(b"payload");
        assert!(!key.verify(b"payloae", &tag));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let tag = SharedKey::new("open").seal(b"payload");
        assert!(!SharedKey::new("sesame").verify(b"payload", &tag));
    }

    #[test]
    fn test_verify_rejects_flipped_tag_bit() {
        let key = SharedKey::new("open");
        let tag = key.seal(b"payload");
        let mut raw = *tag.as_bytes();
        raw[0] ^= 0x01;
        assert!(!key.verify(b"payload", &MacTag::from_bytes(raw)));
    }

    #[test]
    fn test_long_keys_are_hashed_not_rejected() {
        // Keys longer than the SHA-256 block size are legal HMAC keys.
        let key = SharedKey::new(&"k".repeat(100));
        let tag = key.seal(b"payload");
        assert!(key.verify(b"payload", &tag));
    }

    #[test]
    fn test_nonce_generation_varies() {
        // 24 bits of randomness: eight draws colliding pairwise is
        // vanishingly unlikely and would indicate a broken RNG hookup.
        let draws: Vec<Nonce> = (0..8).map(|_| Nonce::generate()).collect();
        let distinct = draws
            .iter()
            .map(|n| n.as_bytes().to_vec())
            .collect::<std::collections::HashSet<_>>();
        assert!(distinct.len() > 1);
    }
}
