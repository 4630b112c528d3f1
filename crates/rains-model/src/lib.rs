//! Data model for the RAINS naming service.
//!
//! RAINS binds names to typed objects through cryptographically signed
//! sections. An assertion states facts about one name; a shard states
//! the complete set of assertions over a name range; a zone covers the
//! whole namespace. Queries, notifications and address sections round
//! out the wire model.
//!
//! This crate holds only the decoded data shapes and their structural
//! rules. Caching, consistency and resolution live in `rains-cache`
//! and `rains-engine`; byte-exact wire encoding is a transport concern.

mod address;
mod error;
mod message;
mod notification;
mod object;
pub mod persist;
mod query;
mod section;
mod signature;
mod token;

pub use address::{AddressAssertion, AddressQuery, AddressZone, SubjectAddr};
pub use error::{Error, Result};
pub use message::{Message, Section};
pub use notification::{Notification, NotificationKind};
pub use object::{
    Certificate, CertificateUsage, HashAlgorithm, NameAlias, NamesetExpr, Object, ObjectTag,
    ProtocolType, ServiceInfo,
};
pub use query::{Query, QueryOption};
pub use section::{Assertion, SectionKind, Shard, Signed, SignedSection, Zone, ZoneContent};
pub use signature::{KeySpace, PublicKey, Signature, SignatureAlgorithm};
pub use token::Token;

/// The global context identifier.
pub const GLOBAL_CONTEXT: &str = ".";
