//! The framed wire message.
//!
//! Byte-exact encoding is a transport concern; the core produces and
//! consumes these as decoded records.

use serde::{Deserialize, Serialize};

use crate::address::{AddressAssertion, AddressQuery, AddressZone};
use crate::notification::{Notification, NotificationKind};
use crate::query::Query;
use crate::section::{Assertion, Shard, SignedSection, Zone};
use crate::signature::Signature;
use crate::token::Token;

/// Any section a message may carry.
///
/// Tagged adjacently so section payloads can never collide with the
/// tag key, whatever fields they carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Section {
    Assertion(Assertion),
    Shard(Shard),
    Zone(Zone),
    Query(Query),
    Notification(Notification),
    AddressAssertion(AddressAssertion),
    AddressZone(AddressZone),
    AddressQuery(AddressQuery),
}

impl From<SignedSection> for Section {
    fn from(section: SignedSection) -> Self {
        match section {
            SignedSection::Assertion(a) => Section::Assertion(a),
            SignedSection::Shard(s) => Section::Shard(s),
            SignedSection::Zone(z) => Section::Zone(z),
        }
    }
}

/// A framed message: a token, optional capabilities, optional message
/// signatures, and the carried sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub token: Token,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<Signature>,
    pub content: Vec<Section>,
}

impl Message {
    /// A message answering `token` with a single section.
    pub fn answer(token: Token, section: Section) -> Self {
        Self {
            token,
            capabilities: Vec::new(),
            signatures: Vec::new(),
            content: vec![section],
        }
    }

    /// A message carrying a single query, framed under the same token.
    pub fn query(query: Query) -> Self {
        Self {
            token: query.token,
            capabilities: Vec::new(),
            signatures: Vec::new(),
            content: vec![Section::Query(query)],
        }
    }

    /// A message carrying a single notification.
    pub fn notification(token: Token, kind: NotificationKind, data: impl Into<String>) -> Self {
        Self {
            token: Token::fresh(),
            capabilities: Vec::new(),
            signatures: Vec::new(),
            content: vec![Section::Notification(Notification::with_data(
                token, kind, data,
            ))],
        }
    }

    /// A message advertising this server's capabilities on `token`.
    pub fn capabilities(token: Token, capabilities: Vec<String>) -> Self {
        Self {
            token,
            capabilities,
            signatures: Vec::new(),
            content: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Object, ObjectTag};
    use crate::query::QueryOption;
    use crate::signature::{KeySpace, SignatureAlgorithm};
    use std::net::Ipv4Addr;

    fn make_signature() -> Signature {
        Signature {
            key_space: KeySpace::Rains,
            algorithm: SignatureAlgorithm::Ed25519,
            valid_since: 1000,
            valid_until: 2000,
            data: b"SignatureData".to_vec(),
        }
    }

    fn make_assertion() -> Assertion {
        Assertion {
            context: ".".into(),
            zone: "ch".into(),
            name: "ethz".into(),
            content: vec![Object::Ip4(Ipv4Addr::new(127, 0, 0, 1))],
            signatures: vec![make_signature()],
        }
    }

    #[test]
    fn message_json_round_trip() {
        let assertion = make_assertion();
        let shard = Shard {
            context: ".".into(),
            zone: "ch".into(),
            range_from: "aaa".into(),
            range_to: "zzz".into(),
            content: vec![assertion.clone()],
            signatures: vec![make_signature()],
        };
        let query = Query {
            context: ".".into(),
            name: "ethz.ch".into(),
            tag: ObjectTag::Ip4,
            expires: 159_159,
            token: Token::fresh(),
            options: vec![QueryOption::MinE2eLatency, QueryOption::MinInfoLeakage],
        };
        let message = Message {
            token: Token::fresh(),
            capabilities: vec!["urn:x-rains:tlssrv".into()],
            signatures: vec![make_signature()],
            content: vec![
                Section::Assertion(assertion),
                Section::Shard(shard),
                Section::Query(query),
                Section::Notification(Notification::new(
                    Token::fresh(),
                    NotificationKind::Heartbeat,
                )),
            ],
        };

        let encoded = serde_json::to_vec(&message).unwrap();
        let decoded: Message = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(message, decoded);
    }

    #[test]
    fn answer_wraps_section_under_client_token() {
        let token = Token::fresh();
        let message = Message::answer(token, Section::Assertion(make_assertion()));
        assert_eq!(message.token, token);
        assert_eq!(message.content.len(), 1);
    }

    #[test]
    fn notification_references_offending_token() {
        let offending = Token::fresh();
        let message = Message::notification(offending, NotificationKind::BadMessage, "");
        // The notification points at the offending token; the message
        // itself travels under a fresh one.
        match &message.content[0] {
            Section::Notification(n) => {
                assert_eq!(n.token, offending);
                assert_eq!(n.kind, NotificationKind::BadMessage);
            }
            other => panic!("expected notification, got {other:?}"),
        }
        assert_ne!(message.token, offending);
    }
}
