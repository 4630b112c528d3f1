//! Signed sections: assertions, shards, and zones.
//!
//! An assertion is a positive statement about one name. A shard claims
//! completeness over a lexicographic name range and is therefore also a
//! negative statement about every name in the range it does not list. A
//! zone is the all-encompassing shard with range `(-inf, +inf)`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::object::{Object, ObjectTag};
use crate::signature::{PublicKey, Signature};

/// The kind of a signed section, for dispatch and per-kind cache caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionKind {
    Assertion,
    Shard,
    Zone,
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assertion => write!(f, "assertion"),
            Self::Shard => write!(f, "shard"),
            Self::Zone => write!(f, "zone"),
        }
    }
}

/// Capability shared by every section that carries signatures.
pub trait Signed {
    fn kind(&self) -> SectionKind;
    fn context(&self) -> &str;
    fn zone(&self) -> &str;
    fn signatures(&self) -> &[Signature];
}

/// A signed positive statement binding a name to objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    pub context: String,
    pub zone: String,
    pub name: String,
    pub content: Vec<Object>,
    pub signatures: Vec<Signature>,
}

impl Assertion {
    /// Sort and deduplicate the content objects.
    ///
    /// Cached assertions always hold their objects in the contractual
    /// order (tag first, then payload) with duplicates removed.
    pub fn normalize(&mut self) {
        self.content.sort();
        self.content.dedup();
    }

    /// First object with the given tag, if any.
    pub fn object(&self, tag: ObjectTag) -> Option<&Object> {
        self.content.iter().find(|o| o.tag() == tag)
    }

    /// All distinct tags present in the content.
    pub fn tags(&self) -> Vec<ObjectTag> {
        let mut tags: Vec<ObjectTag> = self.content.iter().map(Object::tag).collect();
        tags.sort();
        tags.dedup();
        tags
    }

    /// The delegation key, if this assertion delegates a subordinate zone.
    pub fn delegation(&self) -> Option<&PublicKey> {
        self.object(ObjectTag::Delegation).and_then(Object::public_key)
    }

    /// Check structural validity.
    ///
    /// A zero-object assertion claims nothing and is rejected. Contained
    /// assertions inside a shard or zone may be unsigned (the container
    /// signature covers them), so signatures are checked for shape only.
    pub fn validate(&self) -> Result<()> {
        if self.content.is_empty() {
            return Err(Error::EmptyAssertion {
                zone: self.zone.clone(),
                name: self.name.clone(),
            });
        }
        check_signatures(&self.signatures)?;
        Ok(())
    }
}

/// A signed statement of completeness over a name range.
///
/// Endpoints are exclusive; an empty `range_from` means negative
/// infinity and an empty `range_to` means positive infinity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub context: String,
    pub zone: String,
    pub range_from: String,
    pub range_to: String,
    pub content: Vec<Assertion>,
    pub signatures: Vec<Signature>,
}

impl Shard {
    /// Whether `name` falls inside the open range `(range_from, range_to)`.
    pub fn covers(&self, name: &str) -> bool {
        (self.range_from.is_empty() || name > self.range_from.as_str())
            && (self.range_to.is_empty() || name < self.range_to.as_str())
    }

    /// Contained assertions for the given name.
    pub fn assertions_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Assertion> {
        self.content.iter().filter(move |a| a.name == name)
    }

    /// Check structural validity: every contained assertion must fall
    /// inside the declared range and be valid itself.
    pub fn validate(&self) -> Result<()> {
        check_signatures(&self.signatures)?;
        for assertion in &self.content {
            assertion.validate()?;
            if !self.covers(&assertion.name) {
                return Err(Error::NameOutOfRange {
                    name: assertion.name.clone(),
                    from: self.range_from.clone(),
                    to: self.range_to.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Either member of a zone's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneContent {
    Assertion(Assertion),
    Shard(Shard),
}

/// A whole-namespace shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub context: String,
    pub zone: String,
    pub content: Vec<ZoneContent>,
    pub signatures: Vec<Signature>,
}

impl Zone {
    /// Contained assertions for the given name, including those inside
    /// contained shards whose range covers it.
    pub fn assertions_for<'a>(&'a self, name: &'a str) -> Vec<&'a Assertion> {
        let mut found = Vec::new();
        for member in &self.content {
            match member {
                ZoneContent::Assertion(a) if a.name == name => found.push(a),
                ZoneContent::Shard(s) if s.covers(name) => {
                    found.extend(s.assertions_for(name));
                }
                _ => {}
            }
        }
        found
    }

    /// Check structural validity of the zone and everything it contains.
    pub fn validate(&self) -> Result<()> {
        check_signatures(&self.signatures)?;
        for member in &self.content {
            match member {
                ZoneContent::Assertion(a) => a.validate()?,
                ZoneContent::Shard(s) => s.validate()?,
            }
        }
        Ok(())
    }
}

/// Tagged variant over the cacheable section kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignedSection {
    Assertion(Assertion),
    Shard(Shard),
    Zone(Zone),
}

impl SignedSection {
    /// Check structural validity. A top-level section must be signed.
    pub fn validate(&self) -> Result<()> {
        if self.signatures().is_empty() {
            return Err(Error::Unsigned);
        }
        match self {
            Self::Assertion(a) => a.validate(),
            Self::Shard(s) => s.validate(),
            Self::Zone(z) => z.validate(),
        }
    }
}

impl Signed for Assertion {
    fn kind(&self) -> SectionKind {
        SectionKind::Assertion
    }
    fn context(&self) -> &str {
        &self.context
    }
    fn zone(&self) -> &str {
        &self.zone
    }
    fn signatures(&self) -> &[Signature] {
        &self.signatures
    }
}

impl Signed for Shard {
    fn kind(&self) -> SectionKind {
        SectionKind::Shard
    }
    fn context(&self) -> &str {
        &self.context
    }
    fn zone(&self) -> &str {
        &self.zone
    }
    fn signatures(&self) -> &[Signature] {
        &self.signatures
    }
}

impl Signed for Zone {
    fn kind(&self) -> SectionKind {
        SectionKind::Zone
    }
    fn context(&self) -> &str {
        &self.context
    }
    fn zone(&self) -> &str {
        &self.zone
    }
    fn signatures(&self) -> &[Signature] {
        &self.signatures
    }
}

impl Signed for SignedSection {
    fn kind(&self) -> SectionKind {
        match self {
            Self::Assertion(a) => a.kind(),
            Self::Shard(s) => s.kind(),
            Self::Zone(z) => z.kind(),
        }
    }
    fn context(&self) -> &str {
        match self {
            Self::Assertion(a) => a.context(),
            Self::Shard(s) => s.context(),
            Self::Zone(z) => z.context(),
        }
    }
    fn zone(&self) -> &str {
        match self {
            Self::Assertion(a) => a.zone(),
            Self::Shard(s) => s.zone(),
            Self::Zone(z) => z.zone(),
        }
    }
    fn signatures(&self) -> &[Signature] {
        match self {
            Self::Assertion(a) => a.signatures(),
            Self::Shard(s) => s.signatures(),
            Self::Zone(z) => z.signatures(),
        }
    }
}

fn check_signatures(signatures: &[Signature]) -> Result<()> {
    for sig in signatures {
        if !sig.is_well_formed() {
            return Err(Error::InvertedSignature {
                since: sig.valid_since,
                until: sig.valid_until,
            });
        }
    }
    Ok(())
}
