//! Address sections: reverse bindings from network prefixes to objects.
//!
//! These appear in the wire message model; the name-resolution engine
//! does not resolve them, so a server without an address engine answers
//! queries for them with `ServerNotCapable`.

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::object::{Object, ObjectTag};
use crate::query::QueryOption;
use crate::signature::Signature;
use crate::token::Token;

/// A network prefix identifying the subject of an address section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum SubjectAddr {
    V4 { addr: Ipv4Addr, prefix: u8 },
    V6 { addr: Ipv6Addr, prefix: u8 },
}

impl std::fmt::Display for SubjectAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4 { addr, prefix } => write!(f, "{addr}/{prefix}"),
            Self::V6 { addr, prefix } => write!(f, "{addr}/{prefix}"),
        }
    }
}

/// A signed statement about a network prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressAssertion {
    pub subject_addr: SubjectAddr,
    pub context: String,
    pub content: Vec<Object>,
    pub signatures: Vec<Signature>,
}

/// A signed collection of address assertions under one prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressZone {
    pub subject_addr: SubjectAddr,
    pub context: String,
    pub content: Vec<AddressAssertion>,
    pub signatures: Vec<Signature>,
}

/// A question about a network prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressQuery {
    pub subject_addr: SubjectAddr,
    pub context: String,
    pub tag: ObjectTag,
    pub expires: i64,
    pub token: Token,
    pub options: Vec<QueryOption>,
}
