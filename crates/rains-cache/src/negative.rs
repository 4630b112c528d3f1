//! Negative-assertion cache.
//!
//! Shards and zones, indexed per `(context, zone)` by an ordered map on
//! their range start so a point lookup only examines ranges starting at
//! or before the point. A zone is the range `(-inf, +inf)` and matches
//! any point.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use tracing::debug;

use rains_model::{SectionKind, Shard, Zone};

use crate::validity::Window;

/// A shard or zone held by the negative cache.
#[derive(Debug, Clone)]
pub enum NegativeSection {
    Shard(Arc<Shard>),
    Zone(Arc<Zone>),
}

impl NegativeSection {
    pub fn kind(&self) -> SectionKind {
        match self {
            Self::Shard(_) => SectionKind::Shard,
            Self::Zone(_) => SectionKind::Zone,
        }
    }

    /// Range start; empty means negative infinity.
    pub fn range_from(&self) -> &str {
        match self {
            Self::Shard(shard) => &shard.range_from,
            Self::Zone(_) => "",
        }
    }

    /// Range end; empty means positive infinity.
    pub fn range_to(&self) -> &str {
        match self {
            Self::Shard(shard) => &shard.range_to,
            Self::Zone(_) => "",
        }
    }

    /// Whether the open range covers `name`.
    pub fn covers(&self, name: &str) -> bool {
        match self {
            Self::Shard(shard) => shard.covers(name),
            Self::Zone(_) => true,
        }
    }

    fn same_section(&self, other: &NegativeSection) -> bool {
        match (self, other) {
            (Self::Shard(a), Self::Shard(b)) => a == b,
            (Self::Zone(a), Self::Zone(b)) => a == b,
            _ => false,
        }
    }
}

/// A cached negative statement.
#[derive(Debug, Clone)]
pub struct CachedRange {
    pub section: NegativeSection,
    pub window: Window,
    pub authoritative: bool,
}

#[derive(Debug)]
struct RangeSlot {
    entry: CachedRange,
    last_used: u64,
    seq: u64,
}

type ZoneKey = (String, String);

/// Bounded per-`(context, zone)` store of shards and zones.
///
/// Point lookup prefers the most specific covering range, then the
/// newest insertion. Eviction follows the assertion cache discipline:
/// non-authoritative victims only, expired first, then least recently
/// used.
#[derive(Debug)]
pub struct NegativeCache {
    capacity: usize,
    len: usize,
    zones: HashMap<ZoneKey, BTreeMap<String, Vec<RangeSlot>>>,
    use_counter: u64,
    seq_counter: u64,
}

impl NegativeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            len: 0,
            zones: HashMap::new(),
            use_counter: 0,
            seq_counter: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a shard or zone under `(context, zone)`.
    ///
    /// Re-inserting an equal section merges (authoritative upgrades,
    /// window widens). Returns false only when a non-authoritative
    /// insert finds no evictable victim.
    pub fn add(&mut self, context: &str, zone: &str, entry: CachedRange, now: i64) -> bool {
        self.use_counter += 1;
        let stamp = self.use_counter;
        let zone_key = (context.to_string(), zone.to_string());
        let start = entry.section.range_from().to_string();

        if let Some(slots) = self
            .zones
            .get_mut(&zone_key)
            .and_then(|tree| tree.get_mut(&start))
        {
            if let Some(slot) = slots
                .iter_mut()
                .find(|slot| slot.entry.section.same_section(&entry.section))
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
                    context,
                    zone, "negative cache full of authoritative entries, dropping insert"
                );
                return false;
            }
        }

        self.seq_counter += 1;
        let seq = self.seq_counter;
        self.zones
            .entry(zone_key)
            .or_default()
            .entry(start)
            .or_default()
            .push(RangeSlot {
                entry,
                last_used: stamp,
                seq,
            });
        self.len += 1;
        true
    }

    /// The best non-expired shard or zone covering `point`.
    ///
    /// When several ranges cover the point, the most specific (smallest)
    /// range wins; among equal ranges, the newest insertion. The hit
    /// refreshes recency.
    pub fn get(
        &mut self,
        context: &str,
        zone: &str,
        point: &str,
        now: i64,
    ) -> Option<CachedRange> {
        self.use_counter += 1;
        let stamp = self.use_counter;
        let zone_key = (context.to_string(), zone.to_string());
        let tree = self.zones.get_mut(&zone_key)?;

        let mut best: Option<&mut RangeSlot> = None;
        for (_, slots) in tree.range_mut::<str, _>((Bound::Unbounded, Bound::Included(point))) {
            for slot in slots {
                if slot.entry.window.expired_at(now) || !slot.entry.section.covers(point) {
                    continue;
                }
                best = match best {
                    None => Some(slot),
                    Some(current) => {
                        let ranking = cmp_specificity(&slot.entry, &current.entry)
                            .then_with(|| slot.seq.cmp(&current.seq));
                        if ranking == Ordering::Greater {
                            Some(slot)
                        } else {
                            Some(current)
                        }
                    }
                };
            }
        }

        let slot = best?;
        slot.last_used = stamp;
        Some(slot.entry.clone())
    }

    /// Every non-expired range covering `point`, unordered.
    ///
    /// Used by the consistency checker; does not refresh recency.
    pub fn covering(&self, context: &str, zone: &str, point: &str, now: i64) -> Vec<&CachedRange> {
        let zone_key = (context.to_string(), zone.to_string());
        let Some(tree) = self.zones.get(&zone_key) else {
            return Vec::new();
        };
        tree.range::<str, _>((Bound::Unbounded, Bound::Included(point)))
            .flat_map(|(_, slots)| slots.iter())
            .filter(|slot| !slot.entry.window.expired_at(now) && slot.entry.section.covers(point))
            .map(|slot| &slot.entry)
            .collect()
    }

    /// Drop every range whose window has passed. Returns how many.
    pub fn remove_expired(&mut self, now: i64) -> usize {
        let mut removed = 0;
        self.zones.retain(|_, tree| {
            tree.retain(|_, slots| {
                slots.retain(|slot| {
                    let keep = !slot.entry.window.expired_at(now);
                    if !keep {
                        removed += 1;
                    }
                    keep
                });
                !slots.is_empty()
            });
            !tree.is_empty()
        });
        self.len -= removed;
        removed
    }

    fn evict_one(&mut self, now: i64) -> bool {
        let mut victim: Option<(ZoneKey, String, usize)> = None;
        let mut victim_expired = false;
        let mut victim_stamp = u64::MAX;

        for (zone_key, tree) in &self.zones {
            for (start, slots) in tree {
                for (idx, slot) in slots.iter().enumerate() {
                    if slot.entry.authoritative {
                        continue;
                    }
                    let expired = slot.entry.window.expired_at(now);
                    let better = (expired && !victim_expired)
                        || (expired == victim_expired && slot.last_used < victim_stamp);
                    if better {
                        victim = Some((zone_key.clone(), start.clone(), idx));
                        victim_expired = expired;
                        victim_stamp = slot.last_used;
                    }
                }
            }
        }

        let Some((zone_key, start, idx)) = victim else {
            return false;
        };
        if let Some(tree) = self.zones.get_mut(&zone_key) {
            if let Some(slots) = tree.get_mut(&start) {
                slots.remove(idx);
                if slots.is_empty() {
                    tree.remove(&start);
                }
            }
            if tree.is_empty() {
                self.zones.remove(&zone_key);
            }
            self.len -= 1;
        }
        true
    }
}

/// Rank two covering ranges; `Greater` means more specific.
///
/// A later start narrows the range (empty start is negative infinity),
/// an earlier end narrows it (empty end is positive infinity).
fn cmp_specificity(a: &CachedRange, b: &CachedRange) -> Ordering {
    let by_start = a.section.range_from().cmp(b.section.range_from());
    if by_start != Ordering::Equal {
        return by_start;
    }
    match (
        a.section.range_to().is_empty(),
        b.section.range_to().is_empty(),
    ) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => b.section.range_to().cmp(a.section.range_to()),
    }
}
