//! Bounded in-memory caches for the RAINS resolution core.
//!
//! Three caches cooperate with the resolution engine:
//!
//! - the **assertion cache** holds signed positive facts, keyed by
//!   `(context, zone, name, tag)`;
//! - the **negative cache** holds shards and zones, indexed by range
//!   for point-in-interval lookup;
//! - the **pending-query cache** tracks queries forwarded upstream,
//!   keyed by the outbound token, until the answer arrives or the
//!   deadline passes.
//!
//! All three are lossy by design: capacity-bounded, lazily expired,
//! and swept by a periodic reaper. Validity windows are computed by
//! the arithmetic in [`validity`], which intersects signature and
//! delegation-key lifetimes under per-kind caps.

mod assertion;
mod negative;
mod pending;
pub mod validity;

pub use assertion::{AssertionCache, AssertionKey, CachedAssertion};
pub use negative::{CachedRange, NegativeCache, NegativeSection};
pub use pending::{PendingQuery, PendingQueryCache};
pub use validity::{Acceptance, Clock, MaxCacheValidity, Window};
