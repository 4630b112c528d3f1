//! Delegation resolver.
//!
//! Decides where an unresolved query goes next: walk up the label
//! chain of the queried zone and take the first cached redirection
//! whose target has a cached address. With nothing cached, the
//! configured root server is the answer of last resort.

use std::net::{IpAddr, SocketAddr};

use rains_cache::AssertionCache;
use rains_model::{Object, ObjectTag, PublicKey};

use crate::config::EngineConfig;

/// Split a zone into its first label and the parent zone.
///
/// `ethz.ch` yields `("ethz", "ch")`, a top-level `ch` yields
/// `("ch", ".")`. The root (or an empty zone) has no parent.
pub fn parent_and_label(zone: &str) -> Option<(&str, &str)> {
    if zone.is_empty() || zone == "." {
        return None;
    }
    match zone.split_once('.') {
        Some((label, parent)) if !parent.is_empty() => Some((label, parent)),
        Some((label, _)) => Some((label, ".")),
        None => Some((zone, ".")),
    }
}

/// The label chain from `zone` up to, but excluding, the root.
fn label_chain(zone: &str) -> impl Iterator<Item = &str> {
    let mut cursor = Some(zone);
    std::iter::from_fn(move || {
        let current = cursor.take()?;
        if current.is_empty() || current == "." {
            return None;
        }
        cursor = parent_and_label(current).map(|(_, parent)| parent);
        Some(current)
    })
}

/// The delegation key cached for `zone` within `context`, if any.
///
/// The delegation assertion for a zone lives in its parent, named by
/// the zone's first label.
pub fn delegation_key(
    assertions: &AssertionCache,
    context: &str,
    zone: &str,
    now: i64,
) -> Option<PublicKey> {
    let (label, parent) = parent_and_label(zone)?;
    assertions.delegation_key(context, parent, label, now)
}

/// The upstream address an unresolved query for `(context, zone)`
/// should be forwarded to.
///
/// Walks `zone, parent(zone), ...` looking for a cached redirection;
/// the redirection names a server, whose address must itself be cached
/// as an Ip4 or Ip6 assertion. Prefixes whose redirection target has
/// no cached address are skipped. Falls back to the configured root.
pub fn delegate_address(
    assertions: &AssertionCache,
    context: &str,
    zone: &str,
    config: &EngineConfig,
    now: i64,
) -> SocketAddr {
    for prefix in label_chain(zone) {
        let Some((label, parent)) = parent_and_label(prefix) else {
            break;
        };
        let target = match assertions.first_object(context, parent, label, ObjectTag::Redirection, now)
        {
            Some(Object::Redirection(target)) => target,
            _ => continue,
        };
        if let Some(ip) = resolve_target(assertions, context, &target, now) {
            return SocketAddr::new(ip, config.delegate_port);
        }
    }
    config.root_server
}

/// Look up the cached address of a redirection target name.
fn resolve_target(
    assertions: &AssertionCache,
    context: &str,
    target: &str,
    now: i64,
) -> Option<IpAddr> {
    let (name, zone) = target.split_once('.').unwrap_or((target, ""));
    if let Some(Object::Ip4(addr)) = assertions.first_object(context, zone, name, ObjectTag::Ip4, now)
    {
        return Some(IpAddr::V4(addr));
    }
    if let Some(Object::Ip6(addr)) = assertions.first_object(context, zone, name, ObjectTag::Ip6, now)
    {
        return Some(IpAddr::V6(addr));
    }
    None
}
