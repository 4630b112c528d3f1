//! Resolution engine for the RAINS naming service.
//!
//! The engine accepts decoded, signature-verified sections and queries
//! and drives them through a fixed pipeline:
//!
//! ```text
//! section ──► consistency check ──► validity clamp ──► cache insert
//!                                                        │
//!                              pending queries ◄─────────┘
//!
//! query ──► assertion cache ──► negative cache ──► delegation walk
//!               hit: answer         hit: answer       forward + wait
//! ```
//!
//! Everything the engine says to the outside world leaves through one
//! outbound channel; the transport in front decides how to frame it.
//! Signature verification and wire encoding are collaborators, not
//! concerns of this crate.

mod config;
mod consistency;
mod delegation;
mod engine;
mod error;

pub use config::{split_first_label, EngineConfig, QNameSplitter, SplitName};
pub use consistency::{assertion_consistent, shard_consistent, zone_consistent};
pub use delegation::{delegate_address, delegation_key, parent_and_label};
pub use engine::{BlockedSection, Engine, Outbound};
pub use error::{Error, Result};
