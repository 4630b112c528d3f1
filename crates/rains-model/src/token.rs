//! Opaque correlation tokens.

use serde::{Deserialize, Serialize};

/// A 16-byte opaque identifier correlating a request with its response.
///
/// Every outbound query carries a token; an inbound section answers the
/// pending queries keyed by the token of the message it arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Token(pub [u8; 16]);

impl Token {
    /// The all-zero token, used when recursing into contained sections.
    pub const EMPTY: Token = Token([0u8; 16]);

    /// Generate a fresh random token.
    pub fn fresh() -> Self {
        Self(rand::random())
    }

    /// Create a token from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 hex chars
        write!(f, "{}...", &self.to_hex()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tokens_differ() {
        let a = Token::fresh();
        let b = Token::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_is_all_zero() {
        assert_eq!(Token::EMPTY.as_bytes(), &[0u8; 16]);
    }

    #[test]
    fn hex_display_prefix() {
        let token = Token::from_bytes([0xab; 16]);
        assert_eq!(token.to_hex().len(), 32);
        assert_eq!(format!("{}", token), "abababab...");
    }
}
