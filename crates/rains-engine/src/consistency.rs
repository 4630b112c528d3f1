//! Consistency checking between new sections and the caches.
//!
//! A signed section only enters the caches if it does not contradict
//! signed statements already cached over the same `(context, zone)`.
//! Contradictions are dropped with a log and no notification; telling
//! the sender what the cache holds would leak its state.
//!
//! A shard that agrees with some cached assertions and contradicts
//! others is treated as fully inconsistent: nothing of it is cached.

use rains_cache::{AssertionCache, NegativeCache, NegativeSection};
use rains_model::{Assertion, Object, Shard, Zone, ZoneContent};

/// Two object sets agree when they never bind the same tag to
/// different payloads.
fn objects_agree(ours: &[Object], theirs: &[Object]) -> bool {
    ours.iter()
        .all(|a| theirs.iter().filter(|b| b.tag() == a.tag()).all(|b| b == a))
}

/// Whether `contained` can stand in for `claim`: same subject, no
/// disagreeing payloads, and every tag of the claim present.
fn equivalent(contained: &Assertion, claim: &Assertion) -> bool {
    contained.name == claim.name
        && objects_agree(&claim.content, &contained.content)
        && claim
            .tags()
            .iter()
            .all(|tag| contained.object(*tag).is_some())
}

/// Whether a cached negative statement accounts for `claim`: it must
/// list an equivalent assertion for the claim's name, since it asserts
/// completeness over the covered range.
fn accounts_for(section: &NegativeSection, claim: &Assertion) -> bool {
    match section {
        NegativeSection::Shard(shard) => {
            shard.assertions_for(&claim.name).any(|a| equivalent(a, claim))
        }
        NegativeSection::Zone(zone) => zone
            .assertions_for(&claim.name)
            .into_iter()
            .any(|a| equivalent(a, claim)),
    }
}

/// A new assertion is consistent when cached assertions for the same
/// subject carry no disagreeing payloads and every cached shard or
/// zone covering its name already lists an equivalent assertion.
pub fn assertion_consistent(
    assertion: &Assertion,
    assertions: &AssertionCache,
    negatives: &NegativeCache,
    now: i64,
) -> bool {
    let cached_agree = assertions
        .in_zone(&assertion.context, &assertion.zone, now)
        .iter()
        .filter(|cached| cached.assertion.name == assertion.name)
        .all(|cached| objects_agree(&assertion.content, &cached.assertion.content));
    if !cached_agree {
        return false;
    }

    negatives
        .covering(&assertion.context, &assertion.zone, &assertion.name, now)
        .iter()
        .all(|range| accounts_for(&range.section, assertion))
}

/// A new shard is consistent when every cached assertion whose name
/// falls in its range appears equivalently in its content.
pub fn shard_consistent(
    shard: &Shard,
    assertions: &AssertionCache,
    _negatives: &NegativeCache,
    now: i64,
) -> bool {
    assertions
        .in_zone(&shard.context, &shard.zone, now)
        .iter()
        .filter(|cached| shard.covers(&cached.assertion.name))
        .all(|cached| {
            shard
                .assertions_for(&cached.assertion.name)
                .any(|a| equivalent(a, &cached.assertion))
        })
}

/// A new zone is consistent when it accounts for every cached
/// assertion in its `(context, zone)` and does not contradict itself:
/// each contained shard must account for the sibling assertions its
/// range covers.
pub fn zone_consistent(
    zone: &Zone,
    assertions: &AssertionCache,
    _negatives: &NegativeCache,
    now: i64,
) -> bool {
    let accounts_for_cache = assertions
        .in_zone(&zone.context, &zone.zone, now)
        .iter()
        .all(|cached| {
            zone.assertions_for(&cached.assertion.name)
                .into_iter()
                .any(|a| equivalent(a, &cached.assertion))
        });
    if !accounts_for_cache {
        return false;
    }

    zone_internally_consistent(zone)
}

fn zone_internally_consistent(zone: &Zone) -> bool {
    let direct: Vec<&Assertion> = zone
        .content
        .iter()
        .filter_map(|member| match member {
            ZoneContent::Assertion(a) => Some(a),
            ZoneContent::Shard(_) => None,
        })
        .collect();

    zone.content.iter().all(|member| match member {
        ZoneContent::Assertion(_) => true,
        ZoneContent::Shard(shard) => direct
            .iter()
            .filter(|a| shard.covers(&a.name))
            .all(|a| shard.assertions_for(&a.name).any(|c| equivalent(c, a))),
    })
}
