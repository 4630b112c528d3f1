//! Pending-query cache.
//!
//! Tracks queries forwarded upstream, keyed by the token the server
//! chose for the outbound query. When the matching response arrives,
//! all waiters are fetched and removed in one step; the reaper drops
//! waiters whose deadline passed so their clients can be notified.

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::debug;

use rains_model::{ObjectTag, Token};

/// A client waiting on a forwarded query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuery {
    /// Where to deliver the eventual answer.
    pub sender: SocketAddr,
    /// The client's original token; answers travel under it.
    pub token: Token,
    /// Unix seconds after which the waiter is dead.
    pub valid_until: i64,
    pub context: String,
    pub zone: String,
    pub name: String,
    pub tag: ObjectTag,
}

/// Token-keyed table of outstanding upstream queries.
///
/// Capacity bounds the total number of waiters. A full cache rejects
/// new waiters; the caller answers the client with a server-busy
/// notification instead of silently losing the query.
#[derive(Debug)]
pub struct PendingQueryCache {
    capacity: usize,
    len: usize,
    waiters: HashMap<Token, Vec<PendingQuery>>,
}

impl PendingQueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            len: 0,
            waiters: HashMap::new(),
        }
    }

    /// Number of waiters across all tokens.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record a waiter under the upstream token.
    ///
    /// Returns false when the cache is at capacity; the waiter is not
    /// recorded and the caller must signal the client.
    pub fn add(&mut self, upstream: Token, waiter: PendingQuery) -> bool {
        if self.len >= self.capacity {
            debug!(token = %upstream, "pending query cache full, rejecting waiter");
            return false;
        }
        self.waiters.entry(upstream).or_default().push(waiter);
        self.len += 1;
        true
    }

    /// Atomically fetch and remove all waiters for a response token.
    pub fn get_all_and_delete(&mut self, token: Token) -> Vec<PendingQuery> {
        let waiters = self.waiters.remove(&token).unwrap_or_default();
        self.len -= waiters.len();
        waiters
    }

    /// Whether any waiter is recorded under `token`.
    pub fn contains(&self, token: Token) -> bool {
        self.waiters.contains_key(&token)
    }

    /// Drop every waiter past its deadline and return them, so the
    /// caller can notify their clients that no assertion is available.
    pub fn remove_expired(&mut self, now: i64) -> Vec<PendingQuery> {
        let mut dropped = Vec::new();
        self.waiters.retain(|_, waiters| {
            waiters.retain(|waiter| {
                let keep = waiter.valid_until > now;
                if !keep {
                    dropped.push(waiter.clone());
                }
                keep
            });
            !waiters.is_empty()
        });
        self.len -= dropped.len();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_waiter(valid_until: i64) -> PendingQuery {
        PendingQuery {
            sender: "127.0.0.1:4000".parse().unwrap(),
            token: Token::fresh(),
            valid_until,
            context: ".".into(),
            zone: "ch".into(),
            name: "ethz".into(),
            tag: ObjectTag::Ip4,
        }
    }

    #[test]
    fn drain_is_exhaustive() {
        let mut cache = PendingQueryCache::new(8);
        let upstream = Token::fresh();
        cache.add(upstream, make_waiter(1000));
        cache.add(upstream, make_waiter(2000));

        let drained = cache.get_all_and_delete(upstream);
        assert_eq!(drained.len(), 2);

        // A second drain yields nothing: nobody is woken twice.
        assert!(cache.get_all_and_delete(upstream).is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn tokens_are_independent() {
        let mut cache = PendingQueryCache::new(8);
        let a = Token::fresh();
        let b = Token::fresh();
        cache.add(a, make_waiter(1000));
        cache.add(b, make_waiter(1000));

        assert_eq!(cache.get_all_and_delete(a).len(), 1);
        assert!(cache.contains(b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn full_cache_rejects_waiters() {
        let mut cache = PendingQueryCache::new(2);
        assert!(cache.add(Token::fresh(), make_waiter(1000)));
        assert!(cache.add(Token::fresh(), make_waiter(1000)));
        assert!(!cache.add(Token::fresh(), make_waiter(1000)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn remove_expired_returns_dropped_waiters() {
        let mut cache = PendingQueryCache::new(8);
        let upstream = Token::fresh();
        cache.add(upstream, make_waiter(100));
        cache.add(upstream, make_waiter(1000));
        cache.add(Token::fresh(), make_waiter(50));

        let dropped = cache.remove_expired(500);
        assert_eq!(dropped.len(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_all_and_delete(upstream).len(), 1);
    }

    #[test]
    fn deadline_is_exclusive() {
        let mut cache = PendingQueryCache::new(8);
        cache.add(Token::fresh(), make_waiter(500));
        // A waiter whose deadline equals now is already dead.
        assert_eq!(cache.remove_expired(500).len(), 1);
    }
}
