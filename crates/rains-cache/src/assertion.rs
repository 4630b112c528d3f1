//! Positive-assertion cache.
//!
//! A bounded store of signed positive facts, keyed by
//! `(context, zone, name, tag)`. Multiple entries may coexist under one
//! key when they come from distinct signers; answering is free to
//! return any valid one. Expiry is lazy; the reaper sweeps.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use rains_model::{Assertion, Object, ObjectTag, PublicKey};

use crate::validity::Window;

/// Primary cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssertionKey {
    pub context: String,
    pub zone: String,
    pub name: String,
    pub tag: ObjectTag,
}

impl AssertionKey {
    pub fn new(context: &str, zone: &str, name: &str, tag: ObjectTag) -> Self {
        Self {
            context: context.to_string(),
            zone: zone.to_string(),
            name: name.to_string(),
            tag,
        }
    }
}

/// A cached positive fact.
///
/// The section itself is a shared immutable handle; a shard's contained
/// assertions are indexed here without copying.
#[derive(Debug, Clone)]
pub struct CachedAssertion {
    pub assertion: Arc<Assertion>,
    pub window: Window,
    pub authoritative: bool,
}

#[derive(Debug)]
struct Slot {
    entry: CachedAssertion,
    last_used: u64,
}

/// Bounded keyed store of signed positive facts.
///
/// Eviction picks a non-authoritative victim, expired entries first,
/// then least recently used. Authoritative entries are never evicted
/// for space; when the cache is full of them, new non-authoritative
/// inserts are rejected silently and authoritative inserts are allowed
/// to exceed the bound.
#[derive(Debug)]
pub struct AssertionCache {
    capacity: usize,
    len: usize,
    entries: HashMap<AssertionKey, Vec<Slot>>,
    use_counter: u64,
}

impl AssertionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            len: 0,
            entries: HashMap::new(),
            use_counter: 0,
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert an entry under the given key.
    ///
    /// Re-inserting an equal assertion merges instead: the
    /// authoritative flag upgrades (never downgrades) and the window
    /// widens to cover both. Returns false only when a non-authoritative
    /// insert is rejected because every possible victim is authoritative.
    pub fn add(&mut self, key: AssertionKey, entry: CachedAssertion, now: i64) -> bool {
        let stamp = self.next_stamp();

        if let Some(slots) = self.entries.get_mut(&key) {
            if let Some(slot) = slots
                .iter_mut()
                .find(|slot| slot.entry.assertion == entry.assertion)
            {
                slot.entry.authoritative |= entry.authoritative;
                slot.entry.window = slot.entry.window.union(entry.window);
                slot.last_used = stamp;
                return true;
            }
        }

        if self.len >= self.capacity && !self.evict_one(now) {
            if !entry.authoritative {
                debug!(
                    context = %key.context,
                    zone = %key.zone,
                    name = %key.name,
                    "assertion cache full of authoritative entries, dropping insert"
                );
                return false;
            }
            // Authoritative entries may exceed the bound; they expire,
            // they are never displaced.
        }

        self.entries
            .entry(key)
            .or_default()
            .push(Slot { entry, last_used: stamp });
        self.len += 1;
        true
    }

    /// All entries under `(context, zone, name, tag)`.
    ///
    /// With `include_expired` false, entries whose window has passed
    /// are filtered out. Hits refresh recency.
    pub fn get(
        &mut self,
        context: &str,
        zone: &str,
        name: &str,
        tag: ObjectTag,
        include_expired: bool,
        now: i64,
    ) -> Vec<CachedAssertion> {
        let stamp = self.next_stamp();
        let key = AssertionKey::new(context, zone, name, tag);
        let Some(slots) = self.entries.get_mut(&key) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        for slot in slots.iter_mut() {
            if include_expired || !slot.entry.window.expired_at(now) {
                slot.last_used = stamp;
                found.push(slot.entry.clone());
            }
        }
        found
    }

    /// All non-expired entries within `(context, zone)`, any name or tag.
    ///
    /// Used by the consistency checker; does not refresh recency.
    pub fn in_zone(&self, context: &str, zone: &str, now: i64) -> Vec<&CachedAssertion> {
        self.entries
            .iter()
            .filter(|(key, _)| key.context == context && key.zone == zone)
            .flat_map(|(_, slots)| slots.iter())
            .filter(|slot| !slot.entry.window.expired_at(now))
            .map(|slot| &slot.entry)
            .collect()
    }

    /// First non-expired object of the given tag cached under
    /// `(context, zone, name)`.
    ///
    /// Does not refresh recency: delegation walks and validity checks
    /// should not keep entries alive on their own.
    pub fn first_object(
        &self,
        context: &str,
        zone: &str,
        name: &str,
        tag: ObjectTag,
        now: i64,
    ) -> Option<Object> {
        let key = AssertionKey::new(context, zone, name, tag);
        self.entries
            .get(&key)?
            .iter()
            .filter(|slot| !slot.entry.window.expired_at(now))
            .flat_map(|slot| slot.entry.assertion.content.iter())
            .find(|object| object.tag() == tag)
            .cloned()
    }

    /// The delegation key cached for `(context, zone, name)`, if any.
    pub fn delegation_key(
        &self,
        context: &str,
        zone: &str,
        name: &str,
        now: i64,
    ) -> Option<PublicKey> {
        match self.first_object(context, zone, name, ObjectTag::Delegation, now)? {
            Object::Delegation(key) => Some(key),
            _ => None,
        }
    }

    /// Drop every entry whose window has passed. Returns how many.
    pub fn remove_expired(&mut self, now: i64) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, slots| {
            slots.retain(|slot| {
                let keep = !slot.entry.window.expired_at(now);
                if !keep {
                    removed += 1;
                }
                keep
            });
            !slots.is_empty()
        });
        self.len -= removed;
        removed
    }

    fn next_stamp(&mut self) -> u64 {
        self.use_counter += 1;
        self.use_counter
    }

    /// Remove one non-authoritative entry, expired first, then least
    /// recently used. Returns false when nothing is evictable.
    fn evict_one(&mut self, now: i64) -> bool {
        let mut victim: Option<(AssertionKey, usize)> = None;
        let mut victim_expired = false;
        let mut victim_stamp = u64::MAX;

        for (key, slots) in &self.entries {
            for (idx, slot) in slots.iter().enumerate() {
                if slot.entry.authoritative {
                    continue;
                }
                let expired = slot.entry.window.expired_at(now);
                let better = (expired && !victim_expired)
                    || (expired == victim_expired && slot.last_used < victim_stamp);
                if better {
                    victim = Some((key.clone(), idx));
                    victim_expired = expired;
                    victim_stamp = slot.last_used;
                }
            }
        }

        let Some((key, idx)) = victim else {
            return false;
        };
        if let Some(slots) = self.entries.get_mut(&key) {
            slots.remove(idx);
            if slots.is_empty() {
                self.entries.remove(&key);
            }
            self.len -= 1;
        }
        true
    }
}
