//! Typed object payloads carried by assertions.
//!
//! An object binds one property to the subject of an assertion. The
//! payload shape is determined by the tag, and objects have a total
//! order: tag first, then payload. The `Object` variants are declared
//! in tag order so the derived `Ord` is exactly that order.

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::signature::PublicKey;

/// Discriminant identifying an object payload shape.
///
/// The numeric values are the wire-level type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectTag {
    Name = 1,
    Ip6 = 2,
    Ip4 = 3,
    Redirection = 4,
    Delegation = 5,
    Nameset = 6,
    CertInfo = 7,
    ServiceInfo = 8,
    Registrar = 9,
    Registrant = 10,
    InfraKey = 11,
    ExtraKey = 12,
    NextKey = 13,
}

/// An alias name, valid for the listed object tags.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NameAlias {
    pub name: String,
    /// Tags for which the alias is valid.
    pub tags: Vec<ObjectTag>,
}

/// A name-matching expression in a modified POSIX ERE format.
///
/// Kept as source text; the core never evaluates it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NamesetExpr(pub String);

/// Protocol a certificate applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProtocolType {
    Unspecified = 0,
    Tls = 1,
}

/// Role a certificate plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CertificateUsage {
    TrustAnchor = 2,
    EndEntity = 3,
}

/// Hash algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    None = 0,
    Sha256 = 1,
    Sha384 = 2,
    Sha512 = 3,
}

/// Certificate information bound to a name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Certificate {
    pub protocol: ProtocolType,
    pub usage: CertificateUsage,
    pub hash_algorithm: HashAlgorithm,
    pub data: Vec<u8>,
}

/// How to reach a named service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub port: u16,
    pub priority: u16,
}

/// A tagged object value.
///
/// Variants are declared in `ObjectTag` order; the derived `Ord` is
/// therefore tag-first, then payload, which is the contractual order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "tag", content = "value", rename_all = "snake_case")]
pub enum Object {
    Name(NameAlias),
    Ip6(Ipv6Addr),
    Ip4(Ipv4Addr),
    Redirection(String),
    Delegation(PublicKey),
    Nameset(NamesetExpr),
    CertInfo(Certificate),
    ServiceInfo(ServiceInfo),
    Registrar(String),
    Registrant(String),
    InfraKey(PublicKey),
    ExtraKey(PublicKey),
    NextKey(PublicKey),
}

impl Object {
    /// The tag identifying this object's payload shape.
    pub const fn tag(&self) -> ObjectTag {
        match self {
            Object::Name(_) => ObjectTag::Name,
            Object::Ip6(_) => ObjectTag::Ip6,
            Object::Ip4(_) => ObjectTag::Ip4,
            Object::Redirection(_) => ObjectTag::Redirection,
            Object::Delegation(_) => ObjectTag::Delegation,
            Object::Nameset(_) => ObjectTag::Nameset,
            Object::CertInfo(_) => ObjectTag::CertInfo,
            Object::ServiceInfo(_) => ObjectTag::ServiceInfo,
            Object::Registrar(_) => ObjectTag::Registrar,
            Object::Registrant(_) => ObjectTag::Registrant,
            Object::InfraKey(_) => ObjectTag::InfraKey,
            Object::ExtraKey(_) => ObjectTag::ExtraKey,
            Object::NextKey(_) => ObjectTag::NextKey,
        }
    }

    /// The public key payload, for the key-carrying tags.
    pub fn public_key(&self) -> Option<&PublicKey> {
        match self {
            Object::Delegation(key)
            | Object::InfraKey(key)
            | Object::ExtraKey(key)
            | Object::NextKey(key) => Some(key),
            _ => None,
        }
    }
}
