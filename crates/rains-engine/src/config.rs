//! Engine configuration.

use std::net::SocketAddr;

use rains_cache::MaxCacheValidity;

/// Result of splitting a fully qualified query name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitName {
    pub zone: String,
    pub name: String,
}

/// Pluggable strategy turning a query name into candidate
/// `(zone, name)` splits, tried in order.
pub type QNameSplitter = fn(&str) -> Vec<SplitName>;

/// Default split heuristic: the first label is the name, the remainder
/// is the zone. `ethz.ch` becomes name `ethz` in zone `ch`; a bare
/// label has the empty zone; the empty name splits into two empties.
pub fn split_first_label(qname: &str) -> Vec<SplitName> {
    match qname.split_once('.') {
        Some((name, zone)) => vec![SplitName {
            zone: zone.to_string(),
            name: name.to_string(),
        }],
        None => vec![SplitName {
            zone: String::new(),
            name: qname.to_string(),
        }],
    }
}

/// Tunables for the resolution engine and its caches.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity bound of the assertion cache, in entries.
    pub assertion_cache_size: usize,

    /// Capacity bound of the negative-assertion cache, in entries.
    pub negative_cache_size: usize,

    /// Capacity bound of the pending-query cache, in waiters.
    pub pending_query_cache_size: usize,

    /// Per-kind caps on cached validity windows.
    pub max_validity: MaxCacheValidity,

    /// Upper bound on how long a forwarded query stays pending, seconds.
    pub assertion_query_validity: i64,

    /// This server's own address, for self-delegation detection.
    pub server_address: SocketAddr,

    /// Where queries go when no delegation is cached.
    pub root_server: SocketAddr,

    /// Port assumed for delegate servers resolved from the cache.
    pub delegate_port: u16,

    /// Capabilities advertised on `CapHashNotKnown`.
    pub capabilities: Vec<String>,

    /// The query-name split strategy.
    pub split_qname: QNameSplitter,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            assertion_cache_size: 10_000,
            negative_cache_size: 1_000,
            pending_query_cache_size: 1_000,
            max_validity: MaxCacheValidity::default(),
            assertion_query_validity: 10,
            server_address: "127.0.0.1:55553".parse().expect("valid default address"),
            root_server: "127.0.0.1:55553".parse().expect("valid default address"),
            delegate_port: 55553,
            capabilities: Vec::new(),
            split_qname: split_first_label,
        }
    }
}

impl EngineConfig {
    /// Set the cache capacity bounds.
    #[must_use]
    pub fn with_cache_sizes(mut self, assertions: usize, negatives: usize, pending: usize) -> Self {
        self.assertion_cache_size = assertions;
        self.negative_cache_size = negatives;
        self.pending_query_cache_size = pending;
        self
    }

    /// Set the per-kind validity caps.
    #[must_use]
    pub fn with_max_validity(mut self, max_validity: MaxCacheValidity) -> Self {
        self.max_validity = max_validity;
        self
    }

    /// Set the pending-time bound for forwarded queries.
    #[must_use]
    pub fn with_query_validity(mut self, seconds: i64) -> Self {
        self.assertion_query_validity = seconds;
        self
    }

    /// Set this server's own address.
    #[must_use]
    pub fn with_server_address(mut self, addr: SocketAddr) -> Self {
        self.server_address = addr;
        self
    }

    /// Set the fallback root server.
    #[must_use]
    pub fn with_root_server(mut self, addr: SocketAddr) -> Self {
        self.root_server = addr;
        self
    }

    /// Replace the query-name split strategy.
    #[must_use]
    pub fn with_splitter(mut self, splitter: QNameSplitter) -> Self {
        self.split_qname = splitter;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_split_is_first_label() {
        assert_eq!(
            split_first_label("ethz.ch"),
            vec![SplitName {
                zone: "ch".into(),
                name: "ethz".into()
            }]
        );
        assert_eq!(
            split_first_label("ns.ethz.ch"),
            vec![SplitName {
                zone: "ethz.ch".into(),
                name: "ns".into()
            }]
        );
    }

    #[test]
    fn split_of_bare_label_has_empty_zone() {
        assert_eq!(
            split_first_label("ch"),
            vec![SplitName {
                zone: String::new(),
                name: "ch".into()
            }]
        );
    }

    #[test]
    fn split_of_empty_name_is_empty() {
        assert_eq!(
            split_first_label(""),
            vec![SplitName {
                zone: String::new(),
                name: String::new()
            }]
        );
    }

    #[test]
    fn builders_chain() {
        let config = EngineConfig::default()
            .with_cache_sizes(10, 20, 30)
            .with_query_validity(5);
        assert_eq!(config.assertion_cache_size, 10);
        assert_eq!(config.negative_cache_size, 20);
        assert_eq!(config.pending_query_cache_size, 30);
        assert_eq!(config.assertion_query_validity, 5);
    }
}
