//! Error types for rains-model.

use thiserror::Error;

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while validating or (de)serializing model values.
#[derive(Debug, Error)]
pub enum Error {
    /// An assertion must bind at least one object to its subject.
    #[error("assertion for {name}.{zone} carries no objects")]
    EmptyAssertion { zone: String, name: String },

    /// A contained assertion falls outside the shard's declared range.
    #[error("assertion for {name} is outside the shard range ({from}, {to})")]
    NameOutOfRange {
        name: String,
        from: String,
        to: String,
    },

    /// A signature whose interval is inverted can never be valid.
    #[error("signature interval is inverted: valid_since {since} > valid_until {until}")]
    InvertedSignature { since: i64, until: i64 },

    /// A section must carry at least one signature to be cacheable.
    #[error("section has no signatures")]
    Unsigned,

    /// IO error while saving or loading.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error while saving or loading.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
