//! Notifications: out-of-band signals between servers and clients.

use serde::{Deserialize, Serialize};

use crate::token::Token;

/// Notification kinds with their wire-level codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    /// Connection keepalive.
    Heartbeat = 100,
    /// The capability hash in a received message was not recognized.
    CapHashNotKnown = 399,
    /// The received message could not be decoded.
    BadMessage = 400,
    /// The received message contradicts itself.
    RcvInconsistentMsg = 403,
    /// The queried zone has provably no such assertion.
    NoAssertionsExist = 404,
    /// The message exceeded the receiver's size limit.
    MsgTooLarge = 413,
    /// Unspecified server failure.
    UnspecServerErr = 500,
    /// The server does not support the requested operation.
    ServerNotCapable = 501,
    /// No assertion is available to answer the query.
    NoAssertionAvail = 504,
}

/// A notification tied to the token of the message it reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub token: Token,
    pub kind: NotificationKind,
    /// Free-form diagnostic text; may be empty.
    pub data: String,
}

impl Notification {
    /// Create a notification with empty data.
    pub fn new(token: Token, kind: NotificationKind) -> Self {
        Self {
            token,
            kind,
            data: String::new(),
        }
    }

    /// Create a notification carrying diagnostic text.
    pub fn with_data(token: Token, kind: NotificationKind, data: impl Into<String>) -> Self {
        Self {
            token,
            kind,
            data: data.into(),
        }
    }
}
