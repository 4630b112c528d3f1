//! Signatures and public keys.
//!
//! The core never verifies signature bytes itself; verification happens
//! before a section reaches the resolution engine. What the core does
//! depend on are the validity intervals carried here, which bound how
//! long a section may stay cached.

use serde::{Deserialize, Serialize};

/// Identifies the key space a signature or key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeySpace {
    /// The native RAINS key space.
    Rains = 0,
}

/// Signature algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    Ed25519 = 1,
    Ed448 = 2,
    Ecdsa256 = 3,
    Ecdsa384 = 4,
}

/// A signature over a section.
///
/// `valid_since`/`valid_until` are unix seconds and bound the interval
/// during which the signature vouches for the signed content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub key_space: KeySpace,
    pub algorithm: SignatureAlgorithm,
    pub valid_since: i64,
    pub valid_until: i64,
    pub data: Vec<u8>,
}

impl Signature {
    /// A signature whose interval is inverted can never be valid.
    pub fn is_well_formed(&self) -> bool {
        self.valid_since <= self.valid_until
    }
}

/// A public key carried inside delegation-style objects.
///
/// The interval defines the window during which the key may sign
/// subordinate sections. Key bytes are opaque to the core.
///
/// Ordered field-wise with the key bytes last, so keys from the same
/// signer at different lifetimes sort by lifetime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    pub algorithm: SignatureAlgorithm,
    pub key_space: KeySpace,
    pub valid_since: i64,
    pub valid_until: i64,
    pub key: Vec<u8>,
}
