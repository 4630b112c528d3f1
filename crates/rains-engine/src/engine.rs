//! The resolution engine.
//!
//! Accepts verified sections and queries, routes them through the
//! consistency checker and the caches, and emits outbound messages:
//! answers to clients, forwarded queries to delegates, notifications
//! on the failure paths.
//!
//! The engine owns its caches behind per-cache locks and is shared by
//! reference across handler tasks; there is no global state. All cache
//! critical sections are short and never nested, so the consistency
//! checker sees a snapshot, as consistency is defined to.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use rains_cache::validity;
use rains_cache::{
    Acceptance, AssertionCache, AssertionKey, CachedAssertion, CachedRange, Clock, NegativeCache,
    NegativeSection, PendingQuery, PendingQueryCache, Window,
};
use rains_model::{
    Assertion, Message, NotificationKind, Query, QueryOption, Section, Shard, Signed,
    SignedSection, Token, Zone, ZoneContent,
};

use crate::config::EngineConfig;
use crate::consistency;
use crate::delegation;
use crate::error::{Error, Result};

/// A message addressed to a peer or client.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub dest: SocketAddr,
    pub message: Message,
}

/// A verified section parked until the delegation key for its zone
/// arrives.
#[derive(Debug, Clone)]
pub struct BlockedSection {
    pub section: SignedSection,
    pub authoritative: bool,
    pub token: Token,
    /// Unix seconds after which waiting is pointless.
    pub valid_until: i64,
}

type DelegationKey = (String, String);

/// The resolution core: three caches, a delegation-pending table, and
/// an outbound channel.
///
/// Lifecycle: [`Engine::new`] builds the engine and hands back the
/// receiving end of its outbound channel; dropping the receiver makes
/// every subsequent emit fail with [`Error::OutboundClosed`], which is
/// how shutdown propagates.
pub struct Engine {
    config: EngineConfig,
    clock: Clock,
    assertions: RwLock<AssertionCache>,
    negatives: RwLock<NegativeCache>,
    pending: Mutex<PendingQueryCache>,
    awaiting_delegation: Mutex<HashMap<DelegationKey, Vec<BlockedSection>>>,
    out: mpsc::UnboundedSender<Outbound>,
}

impl Engine {
    /// Build an engine and the receiver draining its outbound messages.
    pub fn new(config: EngineConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (out, rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            assertions: RwLock::new(AssertionCache::new(config.assertion_cache_size)),
            negatives: RwLock::new(NegativeCache::new(config.negative_cache_size)),
            pending: Mutex::new(PendingQueryCache::new(config.pending_query_cache_size)),
            awaiting_delegation: Mutex::new(HashMap::new()),
            clock: Clock::new(),
            config,
            out,
        });
        (engine, rx)
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process a verified section.
    ///
    /// The section is consistency-checked, cached with its clamped
    /// validity window, and any pending queries keyed by `token` are
    /// answered with it. Malformed or inconsistent sections are dropped
    /// with a log; neither mutates the caches.
    pub fn assert(&self, section: SignedSection, authoritative: bool, token: Token) -> Result<()> {
        if let Err(err) = section.validate() {
            warn!(%err, "dropping malformed section");
            return Ok(());
        }
        let now = self.clock.now();

        match section {
            SignedSection::Assertion(mut assertion) => {
                assertion.normalize();
                info!(zone = %assertion.zone, name = %assertion.name, "processing assertion");
                if !self.check_consistency(|a, n| {
                    consistency::assertion_consistent(&assertion, a, n, now)
                }) {
                    debug!(name = %assertion.name, "assertion inconsistent with cached sections, dropping");
                    return Ok(());
                }
                let assertion = Arc::new(assertion);
                if self.cache_assertion(&assertion, authoritative, token, None, now) {
                    self.handle_assertion(&assertion, token, now)?;
                }
            }
            SignedSection::Shard(mut shard) => {
                for contained in &mut shard.content {
                    contained.normalize();
                }
                info!(zone = %shard.zone, from = %shard.range_from, to = %shard.range_to, "processing shard");
                if !self.check_consistency(|a, n| consistency::shard_consistent(&shard, a, n, now))
                {
                    debug!(zone = %shard.zone, "shard inconsistent with cached sections, dropping");
                    return Ok(());
                }
                let shard = Arc::new(shard);
                if self.cache_shard(&shard, authoritative, token, None, now) {
                    self.handle_pending_queries(&Section::Shard((*shard).clone()), token, now)?;
                }
            }
            SignedSection::Zone(mut zone) => {
                for member in &mut zone.content {
                    match member {
                        ZoneContent::Assertion(a) => a.normalize(),
                        ZoneContent::Shard(s) => {
                            for contained in &mut s.content {
                                contained.normalize();
                            }
                        }
                    }
                }
                info!(zone = %zone.zone, "processing zone");
                if !self.check_consistency(|a, n| consistency::zone_consistent(&zone, a, n, now)) {
                    debug!(zone = %zone.zone, "zone inconsistent with cached sections, dropping");
                    return Ok(());
                }
                let zone = Arc::new(zone);
                if self.cache_zone(&zone, authoritative, token, now) {
                    self.handle_pending_queries(&Section::Zone((*zone).clone()), token, now)?;
                }
            }
        }
        Ok(())
    }

    /// Answer a query from cache or forward it to a delegate.
    pub fn query(&self, query: Query, sender: SocketAddr) -> Result<()> {
        let now = self.clock.now();
        info!(name = %query.name, tag = ?query.tag, "processing query");
        let splits = (self.config.split_qname)(&query.name);
        let include_expired = query.contains_option(QueryOption::ExpiredAssertionsOk);

        for split in &splits {
            let hits = self.assertions.write().unwrap().get(
                &query.context,
                &split.zone,
                &split.name,
                query.tag,
                include_expired,
                now,
            );
            // Of several valid entries, answer with the longest-lived one.
            if let Some(best) = hits.into_iter().max_by_key(|entry| entry.window.until) {
                debug!(name = %query.name, "answering query from assertion cache");
                let answer = Section::Assertion((*best.assertion).clone());
                return self.emit(sender, Message::answer(query.token, answer));
            }
        }

        for split in &splits {
            let hit =
                self.negatives
                    .write()
                    .unwrap()
                    .get(&query.context, &split.zone, &split.name, now);
            if let Some(range) = hit {
                debug!(name = %query.name, "answering query from negative cache");
                let answer = match range.section {
                    NegativeSection::Shard(shard) => Section::Shard((*shard).clone()),
                    NegativeSection::Zone(zone) => Section::Zone((*zone).clone()),
                };
                return self.emit(sender, Message::answer(query.token, answer));
            }
        }

        if query.contains_option(QueryOption::CachedAnswersOnly) {
            debug!(name = %query.name, "cache miss with cached-answers-only");
            return self.send_notification(sender, query.token, NotificationKind::NoAssertionAvail);
        }

        // One forward per query: candidates are tried in order and the
        // first with an external delegate wins.
        for split in &splits {
            let delegate = {
                let assertions = self.assertions.read().unwrap();
                delegation::delegate_address(&assertions, &query.context, &split.zone, &self.config, now)
            };
            if delegate == self.config.server_address {
                warn!(zone = %split.zone, "authoritative for the zone with no cached answer");
                continue;
            }

            let upstream = if query.contains_option(QueryOption::TokenTracing) {
                query.token
            } else {
                Token::fresh()
            };
            let valid_until = query
                .expires
                .min(now.saturating_add(self.config.assertion_query_validity));
            let waiter = PendingQuery {
                sender,
                token: query.token,
                valid_until,
                context: query.context.clone(),
                zone: split.zone.clone(),
                name: split.name.clone(),
                tag: query.tag,
            };
            if !self.pending.lock().unwrap().add(upstream, waiter) {
                return self.send_notification(
                    sender,
                    query.token,
                    NotificationKind::UnspecServerErr,
                );
            }
            debug!(name = %query.name, delegate = %delegate, "forwarding query");
            let forwarded = Query {
                context: query.context.clone(),
                name: query.name.clone(),
                tag: query.tag,
                expires: valid_until,
                token: upstream,
                options: query.options.clone(),
            };
            return self.emit(delegate, Message::query(forwarded));
        }

        // Every candidate delegates back to this server: we are the
        // authority and the caches hold no answer.
        self.send_notification(sender, query.token, NotificationKind::NoAssertionAvail)
    }

    /// React to an inbound notification.
    pub fn notify(&self, kind: NotificationKind, token: Token, sender: SocketAddr) -> Result<()> {
        match kind {
            NotificationKind::Heartbeat => trace!(peer = %sender, "heartbeat"),
            NotificationKind::CapHashNotKnown => {
                return self.emit(
                    sender,
                    Message::capabilities(token, self.config.capabilities.clone()),
                );
            }
            NotificationKind::NoAssertionAvail => {
                // An upstream gave up on a query we forwarded; its
                // waiters learn the same, under their own tokens.
                let now = self.clock.now();
                let waiters = self.pending.lock().unwrap().get_all_and_delete(token);
                for waiter in waiters {
                    if waiter.valid_until > now {
                        self.send_notification(
                            waiter.sender,
                            waiter.token,
                            NotificationKind::NoAssertionAvail,
                        )?;
                    }
                }
            }
            NotificationKind::BadMessage | NotificationKind::RcvInconsistentMsg => {
                warn!(peer = %sender, ?kind, "peer rejected our message");
            }
            kind => debug!(peer = %sender, ?kind, "notification received"),
        }
        Ok(())
    }

    /// Park a section until the delegation key for its zone arrives.
    pub fn park_for_delegation(&self, blocked: BlockedSection) {
        let key = (
            blocked.section.context().to_string(),
            blocked.section.zone().to_string(),
        );
        debug!(zone = %key.1, "parking section until its delegation arrives");
        self.awaiting_delegation
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push(blocked);
    }

    /// Sweep expired entries from every cache.
    ///
    /// Waiters whose deadline passed are answered with
    /// `NoAssertionAvail`; a response arriving later finds no waiter
    /// and is silently absorbed into the caches.
    pub fn reap(&self) -> Result<()> {
        let now = self.clock.now();
        let assertions = self.assertions.write().unwrap().remove_expired(now);
        let negatives = self.negatives.write().unwrap().remove_expired(now);
        let dropped = self.pending.lock().unwrap().remove_expired(now);
        let timed_out = dropped.len();
        for waiter in dropped {
            self.send_notification(waiter.sender, waiter.token, NotificationKind::NoAssertionAvail)?;
        }
        self.awaiting_delegation.lock().unwrap().retain(|_, blocked| {
            blocked.retain(|section| section.valid_until > now);
            !blocked.is_empty()
        });
        if assertions + negatives + timed_out > 0 {
            debug!(assertions, negatives, timed_out, "reaped expired cache entries");
        }
        Ok(())
    }

    /// Number of waiters currently pending on upstream answers.
    pub fn pending_queries(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Run `check` against a snapshot of both section caches.
    fn check_consistency<F>(&self, check: F) -> bool
    where
        F: FnOnce(&AssertionCache, &NegativeCache) -> bool,
    {
        let assertions = self.assertions.read().unwrap();
        let negatives = self.negatives.read().unwrap();
        check(&assertions, &negatives)
    }

    /// Effective validity window of a section: its signature lifetimes
    /// intersected with the cached delegation key for its zone, capped
    /// per kind. Contained sections fall back to their container's
    /// window when they carry no signatures of their own.
    fn signed_window<S: Signed>(&self, section: &S, fallback: Option<Window>, now: i64) -> Option<Window> {
        let cap = self.config.max_validity.for_kind(section.kind());
        let pkey = {
            let assertions = self.assertions.read().unwrap();
            delegation::delegation_key(&assertions, section.context(), section.zone(), now)
        };
        validity::section_window(section.signatures(), pkey.as_ref(), cap, now).or(fallback)
    }

    /// Insert an assertion into the cache under every tag it carries.
    /// Returns false when the section cannot answer anything and its
    /// waiters were purged.
    fn cache_assertion(
        &self,
        assertion: &Arc<Assertion>,
        authoritative: bool,
        token: Token,
        fallback: Option<Window>,
        now: i64,
    ) -> bool {
        let cap = self.config.max_validity.assertion;
        let Some(window) = self.signed_window(assertion.as_ref(), fallback, now) else {
            warn!(name = %assertion.name, "assertion has no usable signature window, not caching");
            return true;
        };
        // An inherited container window still honors this kind's cap.
        let window = Window::new(window.since, window.until.min(now.saturating_add(cap)));
        match validity::accept(window, cap, now) {
            Acceptance::TooFarInFuture => {
                warn!(name = %assertion.name, since = window.since, "assertion validity starts too far in the future, dropping");
                self.purge_waiters(token);
                false
            }
            Acceptance::Accept(window) => {
                let mut cache = self.assertions.write().unwrap();
                for tag in assertion.tags() {
                    cache.add(
                        AssertionKey::new(&assertion.context, &assertion.zone, &assertion.name, tag),
                        CachedAssertion {
                            assertion: assertion.clone(),
                            window,
                            authoritative,
                        },
                        now,
                    );
                }
                true
            }
        }
    }

    /// Insert a shard and all its contained assertions.
    fn cache_shard(
        &self,
        shard: &Arc<Shard>,
        authoritative: bool,
        token: Token,
        fallback: Option<Window>,
        now: i64,
    ) -> bool {
        let cap = self.config.max_validity.shard;
        let Some(window) = self.signed_window(shard.as_ref(), fallback, now) else {
            warn!(zone = %shard.zone, "shard has no usable signature window, not caching");
            return true;
        };
        let window = Window::new(window.since, window.until.min(now.saturating_add(cap)));
        match validity::accept(window, cap, now) {
            Acceptance::TooFarInFuture => {
                warn!(zone = %shard.zone, since = window.since, "shard validity starts too far in the future, dropping");
                self.purge_waiters(token);
                false
            }
            Acceptance::Accept(window) => {
                self.negatives.write().unwrap().add(
                    &shard.context,
                    &shard.zone,
                    CachedRange {
                        section: NegativeSection::Shard(shard.clone()),
                        window,
                        authoritative,
                    },
                    now,
                );
                // Contained assertions are indexed individually; a
                // child failing does not roll its siblings back.
                for contained in &shard.content {
                    let contained = Arc::new(contained.clone());
                    self.cache_assertion(&contained, authoritative, Token::EMPTY, Some(window), now);
                }
                true
            }
        }
    }

    /// Insert a zone, its shards, and every reachable assertion.
    fn cache_zone(&self, zone: &Arc<Zone>, authoritative: bool, token: Token, now: i64) -> bool {
        let Some(window) = self.signed_window(zone.as_ref(), None, now) else {
            warn!(zone = %zone.zone, "zone has no usable signature window, not caching");
            return true;
        };
        match validity::accept(window, self.config.max_validity.zone, now) {
            Acceptance::TooFarInFuture => {
                warn!(zone = %zone.zone, since = window.since, "zone validity starts too far in the future, dropping");
                self.purge_waiters(token);
                false
            }
            Acceptance::Accept(window) => {
                self.negatives.write().unwrap().add(
                    &zone.context,
                    &zone.zone,
                    CachedRange {
                        section: NegativeSection::Zone(zone.clone()),
                        window,
                        authoritative,
                    },
                    now,
                );
                for member in &zone.content {
                    match member {
                        ZoneContent::Assertion(contained) => {
                            let contained = Arc::new(contained.clone());
                            self.cache_assertion(
                                &contained,
                                authoritative,
                                Token::EMPTY,
                                Some(window),
                                now,
                            );
                        }
                        ZoneContent::Shard(contained) => {
                            let contained = Arc::new(contained.clone());
                            self.cache_shard(
                                &contained,
                                authoritative,
                                Token::EMPTY,
                                Some(window),
                                now,
                            );
                        }
                    }
                }
                true
            }
        }
    }

    /// Post-insert handling for assertions: wake sections parked on a
    /// freshly delegated zone, then answer pending queries.
    fn handle_assertion(&self, assertion: &Arc<Assertion>, token: Token, now: i64) -> Result<()> {
        if assertion.delegation().is_some() {
            let delegated = child_zone(&assertion.zone, &assertion.name);
            let woken = self
                .awaiting_delegation
                .lock()
                .unwrap()
                .remove(&(assertion.context.clone(), delegated))
                .unwrap_or_default();
            for blocked in woken {
                debug!(zone = %blocked.section.zone(), "delegation arrived, reprocessing parked section");
                self.assert(blocked.section, blocked.authoritative, blocked.token)?;
            }
        }
        self.handle_pending_queries(&Section::Assertion((**assertion).clone()), token, now)
    }

    /// Atomically drain the waiters for `token` and answer each one
    /// that is still alive under its own client token.
    fn handle_pending_queries(&self, answer: &Section, token: Token, now: i64) -> Result<()> {
        let waiters = self.pending.lock().unwrap().get_all_and_delete(token);
        for waiter in waiters {
            if waiter.valid_until > now {
                self.emit(waiter.sender, Message::answer(waiter.token, answer.clone()))?;
            } else {
                info!(deadline = waiter.valid_until, "query expired in the pending queue");
            }
        }
        Ok(())
    }

    /// Drop waiters for a token whose expected answer turned out
    /// unusable. By design nobody is notified; the reaper's deadline
    /// sweep covers the client.
    fn purge_waiters(&self, token: Token) {
        let dropped = self.pending.lock().unwrap().get_all_and_delete(token);
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "purged waiters for an unusable answer");
        }
    }

    /// Queue a message on the outbound channel.
    ///
    /// The transport in front drains the channel; the engine never
    /// touches a socket itself.
    pub fn emit(&self, dest: SocketAddr, message: Message) -> Result<()> {
        self.out
            .send(Outbound { dest, message })
            .map_err(|_| Error::OutboundClosed)
    }

    fn send_notification(
        &self,
        dest: SocketAddr,
        token: Token,
        kind: NotificationKind,
    ) -> Result<()> {
        self.emit(dest, Message::notification(token, kind, ""))
    }
}

/// The zone a delegation assertion delegates: its subject name
/// prefixed onto its subject zone.
fn child_zone(zone: &str, name: &str) -> String {
    if zone.is_empty() || zone == "." {
        name.to_string()
    } else {
        format!("{name}.{zone}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SplitName;
    use rains_cache::MaxCacheValidity;
    use rains_model::{KeySpace, Object, ObjectTag, PublicKey, Signature, SignatureAlgorithm};
    use std::net::Ipv4Addr;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn server_addr() -> SocketAddr {
        "127.0.0.1:7000".parse().unwrap()
    }

    fn root_addr() -> SocketAddr {
        "127.0.0.1:7001".parse().unwrap()
    }

    fn client_addr() -> SocketAddr {
        "127.0.0.1:4001".parse().unwrap()
    }

    fn setup() -> (Arc<Engine>, UnboundedReceiver<Outbound>) {
        let config = EngineConfig::default()
            .with_server_address(server_addr())
            .with_root_server(root_addr())
            .with_query_validity(10);
        Engine::new(config)
    }

    fn now() -> i64 {
        rains_cache::validity::unix_now()
    }

    fn make_signature(until: i64) -> Signature {
        Signature {
            key_space: KeySpace::Rains,
            algorithm: SignatureAlgorithm::Ed25519,
            valid_since: 0,
            valid_until: until,
            data: b"sig".to_vec(),
        }
    }

    fn ip4_assertion(zone: &str, name: &str, until: i64) -> Assertion {
        Assertion {
            context: ".".into(),
            zone: zone.into(),
            name: name.into(),
            content: vec![Object::Ip4(Ipv4Addr::new(127, 0, 0, 1))],
            signatures: vec![make_signature(until)],
        }
    }

    fn ip4_query(name: &str, options: Vec<QueryOption>) -> Query {
        Query {
            context: ".".into(),
            name: name.into(),
            tag: ObjectTag::Ip4,
            expires: now() + 3600,
            token: Token::fresh(),
            options,
        }
    }

    fn recv(rx: &mut UnboundedReceiver<Outbound>) -> Outbound {
        rx.try_recv().expect("expected an outbound message")
    }

    fn assert_no_outbound(rx: &mut UnboundedReceiver<Outbound>) {
        assert!(rx.try_recv().is_err(), "expected no outbound message");
    }

    fn notification_kind(message: &Message) -> NotificationKind {
        match &message.content[0] {
            Section::Notification(n) => n.kind,
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn query_hit_answers_from_cache() {
        let (engine, mut rx) = setup();
        let assertion = ip4_assertion("ch", "ethz", now() + 60);
        engine
            .assert(SignedSection::Assertion(assertion.clone()), false, Token::fresh())
            .unwrap();
        assert_no_outbound(&mut rx);

        let query = ip4_query("ethz.ch", vec![]);
        engine.query(query.clone(), client_addr()).unwrap();

        let out = recv(&mut rx);
        assert_eq!(out.dest, client_addr());
        assert_eq!(out.message.token, query.token);
        match &out.message.content[0] {
            Section::Assertion(a) => assert_eq!(a.name, "ethz"),
            other => panic!("expected assertion answer, got {other:?}"),
        }
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn query_miss_forwards_and_answer_reaches_client() {
        let (engine, mut rx) = setup();
        let query = ip4_query("ethz.ch", vec![]);
        engine.query(query.clone(), client_addr()).unwrap();

        // Forwarded to the root under a fresh token.
        let forwarded = recv(&mut rx);
        assert_eq!(forwarded.dest, root_addr());
        let upstream = match &forwarded.message.content[0] {
            Section::Query(q) => {
                assert_eq!(q.name, "ethz.ch");
                assert_ne!(q.token, query.token);
                q.token
            }
            other => panic!("expected forwarded query, got {other:?}"),
        };
        assert_eq!(engine.pending_queries(), 1);

        // The upstream answer wakes the waiter under the client token.
        let answer = ip4_assertion("ch", "ethz", now() + 60);
        engine
            .assert(SignedSection::Assertion(answer), false, upstream)
            .unwrap();
        let delivered = recv(&mut rx);
        assert_eq!(delivered.dest, client_addr());
        assert_eq!(delivered.message.token, query.token);
        assert_eq!(engine.pending_queries(), 0);
    }

    #[test]
    fn token_tracing_reuses_client_token() {
        let (engine, mut rx) = setup();
        let query = ip4_query("ethz.ch", vec![QueryOption::TokenTracing]);
        engine.query(query.clone(), client_addr()).unwrap();

        let forwarded = recv(&mut rx);
        match &forwarded.message.content[0] {
            Section::Query(q) => assert_eq!(q.token, query.token),
            other => panic!("expected forwarded query, got {other:?}"),
        }
    }

    #[test]
    fn cached_answers_only_never_forwards() {
        let (engine, mut rx) = setup();
        let query = ip4_query("ethz.ch", vec![QueryOption::CachedAnswersOnly]);
        engine.query(query.clone(), client_addr()).unwrap();

        let out = recv(&mut rx);
        assert_eq!(out.dest, client_addr());
        assert_eq!(notification_kind(&out.message), NotificationKind::NoAssertionAvail);
        assert_no_outbound(&mut rx);
        assert_eq!(engine.pending_queries(), 0);
    }

    #[test]
    fn self_delegation_answers_no_assertion_avail() {
        let config = EngineConfig::default()
            .with_server_address(server_addr())
            .with_root_server(server_addr());
        let (engine, mut rx) = Engine::new(config);

        engine.query(ip4_query("ethz.ch", vec![]), client_addr()).unwrap();
        let out = recv(&mut rx);
        assert_eq!(notification_kind(&out.message), NotificationKind::NoAssertionAvail);
        assert_no_outbound(&mut rx);
    }

    fn split_two_zones(_qname: &str) -> Vec<SplitName> {
        vec![
            SplitName {
                zone: "a".into(),
                name: "x".into(),
            },
            SplitName {
                zone: "b".into(),
                name: "x".into(),
            },
        ]
    }

    #[test]
    fn forward_tries_split_candidates_in_order() {
        // The delegation walk builds delegate addresses on the
        // delegate port, so self-delegation needs the server there.
        let server: SocketAddr = "127.0.0.99:55553".parse().unwrap();
        let config = EngineConfig::default()
            .with_server_address(server)
            .with_root_server(root_addr())
            .with_splitter(split_two_zones);
        let (engine, mut rx) = Engine::new(config);

        // Candidate zone "a" delegates back to this server.
        let redirection = Assertion {
            context: ".".into(),
            zone: ".".into(),
            name: "a".into(),
            content: vec![Object::Redirection("ns.a".into())],
            signatures: vec![make_signature(now() + 60)],
        };
        engine
            .assert(SignedSection::Assertion(redirection), true, Token::fresh())
            .unwrap();
        let ns = Assertion {
            context: ".".into(),
            zone: "a".into(),
            name: "ns".into(),
            content: vec![Object::Ip4(Ipv4Addr::new(127, 0, 0, 99))],
            signatures: vec![make_signature(now() + 60)],
        };
        engine
            .assert(SignedSection::Assertion(ns), true, Token::fresh())
            .unwrap();

        engine.query(ip4_query("x.c", vec![]), client_addr()).unwrap();

        // The self-delegating candidate is skipped; the second one
        // forwards to the root, and exactly once.
        let out = recv(&mut rx);
        assert_eq!(out.dest, root_addr());
        assert_no_outbound(&mut rx);
        assert_eq!(engine.pending_queries(), 1);
    }

    #[test]
    fn pending_timeout_notifies_and_late_answer_is_silent() {
        let (engine, mut rx) = setup();
        let mut query = ip4_query("ethz.ch", vec![]);
        // Already past its deadline when forwarded.
        query.expires = now() - 1;
        engine.query(query.clone(), client_addr()).unwrap();

        let forwarded = recv(&mut rx);
        let upstream = match &forwarded.message.content[0] {
            Section::Query(q) => q.token,
            other => panic!("expected forwarded query, got {other:?}"),
        };

        // The reaper fires: the waiter is dead, the client learns it.
        engine.reap().unwrap();
        let out = recv(&mut rx);
        assert_eq!(out.dest, client_addr());
        assert_eq!(notification_kind(&out.message), NotificationKind::NoAssertionAvail);
        assert_eq!(engine.pending_queries(), 0);

        // The late answer still lands in the cache, but nobody hears it.
        engine
            .assert(
                SignedSection::Assertion(ip4_assertion("ch", "ethz", now() + 60)),
                false,
                upstream,
            )
            .unwrap();
        assert_no_outbound(&mut rx);

        let followup = ip4_query("ethz.ch", vec![QueryOption::CachedAnswersOnly]);
        engine.query(followup, client_addr()).unwrap();
        match &recv(&mut rx).message.content[0] {
            Section::Assertion(_) => {}
            other => panic!("late answer should have been cached, got {other:?}"),
        }
    }

    #[test]
    fn pending_overflow_signals_server_busy() {
        let config = EngineConfig::default()
            .with_server_address(server_addr())
            .with_root_server(root_addr())
            .with_cache_sizes(16, 16, 0);
        let (engine, mut rx) = Engine::new(config);

        engine.query(ip4_query("ethz.ch", vec![]), client_addr()).unwrap();
        let out = recv(&mut rx);
        assert_eq!(notification_kind(&out.message), NotificationKind::UnspecServerErr);
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn expired_assertions_ok_widens_lookup() {
        let (engine, mut rx) = setup();
        // Expired a minute ago.
        let assertion = ip4_assertion("ch", "ethz", now() - 60);
        engine
            .assert(SignedSection::Assertion(assertion), false, Token::fresh())
            .unwrap();

        // A plain query refuses the stale entry and forwards.
        engine.query(ip4_query("ethz.ch", vec![]), client_addr()).unwrap();
        let out = recv(&mut rx);
        assert_eq!(out.dest, root_addr());

        // With the option set, the stale entry answers.
        let stale_ok = ip4_query("ethz.ch", vec![QueryOption::ExpiredAssertionsOk]);
        engine.query(stale_ok, client_addr()).unwrap();
        let out = recv(&mut rx);
        assert_eq!(out.dest, client_addr());
        match &out.message.content[0] {
            Section::Assertion(a) => assert_eq!(a.name, "ethz"),
            other => panic!("expected assertion answer, got {other:?}"),
        }
    }

    #[test]
    fn shard_answers_negative_query_and_indexes_content() {
        let (engine, mut rx) = setup();
        let shard = Shard {
            context: ".".into(),
            zone: "ch".into(),
            range_from: "a".into(),
            range_to: "z".into(),
            content: vec![ip4_assertion("ch", "ethz", now() + 60)],
            signatures: vec![make_signature(now() + 60)],
        };
        engine
            .assert(SignedSection::Shard(shard), false, Token::fresh())
            .unwrap();

        // The contained assertion is indexed positively.
        engine.query(ip4_query("ethz.ch", vec![]), client_addr()).unwrap();
        match &recv(&mut rx).message.content[0] {
            Section::Assertion(a) => assert_eq!(a.name, "ethz"),
            other => panic!("expected assertion answer, got {other:?}"),
        }

        // A covered name without an assertion gets the shard.
        engine.query(ip4_query("uzh.ch", vec![]), client_addr()).unwrap();
        match &recv(&mut rx).message.content[0] {
            Section::Shard(s) => assert_eq!(s.range_from, "a"),
            other => panic!("expected shard answer, got {other:?}"),
        }
    }

    #[test]
    fn zone_recursion_reaches_nested_assertions() {
        let (engine, mut rx) = setup();
        let zone = Zone {
            context: ".".into(),
            zone: "ch".into(),
            content: vec![
                ZoneContent::Assertion(ip4_assertion("ch", "direct", now() + 60)),
                ZoneContent::Shard(Shard {
                    context: ".".into(),
                    zone: "ch".into(),
                    range_from: "m".into(),
                    range_to: "z".into(),
                    content: vec![ip4_assertion("ch", "nested", now() + 60)],
                    signatures: vec![],
                }),
            ],
            signatures: vec![make_signature(now() + 60)],
        };
        engine
            .assert(SignedSection::Zone(zone), true, Token::fresh())
            .unwrap();

        for name in ["direct.ch", "nested.ch"] {
            engine.query(ip4_query(name, vec![]), client_addr()).unwrap();
            match &recv(&mut rx).message.content[0] {
                Section::Assertion(_) => {}
                other => panic!("expected assertion for {name}, got {other:?}"),
            }
        }

        // An uncovered name gets the zone itself.
        engine.query(ip4_query("absent.ch", vec![]), client_addr()).unwrap();
        match &recv(&mut rx).message.content[0] {
            Section::Zone(z) => assert_eq!(z.zone, "ch"),
            other => panic!("expected zone answer, got {other:?}"),
        }
    }

    #[test]
    fn inconsistent_assertion_mutates_nothing() {
        let (engine, mut rx) = setup();
        engine
            .assert(
                SignedSection::Assertion(ip4_assertion("ch", "ethz", now() + 60)),
                false,
                Token::fresh(),
            )
            .unwrap();

        // Same subject and tag, different address.
        let mut conflicting = ip4_assertion("ch", "ethz", now() + 60);
        conflicting.content = vec![Object::Ip4(Ipv4Addr::new(10, 0, 0, 1))];
        engine
            .assert(SignedSection::Assertion(conflicting), false, Token::fresh())
            .unwrap();

        engine.query(ip4_query("ethz.ch", vec![]), client_addr()).unwrap();
        match &recv(&mut rx).message.content[0] {
            Section::Assertion(a) => {
                assert_eq!(a.content[0], Object::Ip4(Ipv4Addr::new(127, 0, 0, 1)));
            }
            other => panic!("expected original assertion, got {other:?}"),
        }
    }

    #[test]
    fn malformed_sections_are_dropped() {
        let (engine, mut rx) = setup();
        let mut empty = ip4_assertion("ch", "ethz", now() + 60);
        empty.content.clear();
        engine
            .assert(SignedSection::Assertion(empty), false, Token::fresh())
            .unwrap();

        let mut inverted = ip4_assertion("ch", "uzh", now() + 60);
        inverted.signatures[0].valid_since = inverted.signatures[0].valid_until + 1;
        engine
            .assert(SignedSection::Assertion(inverted), false, Token::fresh())
            .unwrap();

        engine
            .query(ip4_query("ethz.ch", vec![QueryOption::CachedAnswersOnly]), client_addr())
            .unwrap();
        assert_eq!(
            notification_kind(&recv(&mut rx).message),
            NotificationKind::NoAssertionAvail
        );
    }

    #[test]
    fn delegation_arrival_wakes_parked_sections() {
        let (engine, mut rx) = setup();
        let parked = ip4_assertion("ethz.ch", "ns", now() + 60);
        engine.park_for_delegation(BlockedSection {
            section: SignedSection::Assertion(parked),
            authoritative: false,
            token: Token::fresh(),
            valid_until: now() + 60,
        });

        // The delegation for ethz.ch lands: parked work replays.
        let delegation = Assertion {
            context: ".".into(),
            zone: "ch".into(),
            name: "ethz".into(),
            content: vec![Object::Delegation(PublicKey {
                algorithm: SignatureAlgorithm::Ed25519,
                key_space: KeySpace::Rains,
                valid_since: 0,
                valid_until: now() + 3600,
                key: vec![5; 32],
            })],
            signatures: vec![make_signature(now() + 60)],
        };
        engine
            .assert(SignedSection::Assertion(delegation), true, Token::fresh())
            .unwrap();

        engine.query(ip4_query("ns.ethz.ch", vec![]), client_addr()).unwrap();
        match &recv(&mut rx).message.content[0] {
            Section::Assertion(a) => assert_eq!(a.name, "ns"),
            other => panic!("expected the parked assertion, got {other:?}"),
        }
    }

    #[test]
    fn delegation_key_clamps_cached_window() {
        let (engine, mut rx) = setup();
        // Delegation key for ethz.ch valid only 30 more seconds.
        let delegation = Assertion {
            context: ".".into(),
            zone: "ch".into(),
            name: "ethz".into(),
            content: vec![Object::Delegation(PublicKey {
                algorithm: SignatureAlgorithm::Ed25519,
                key_space: KeySpace::Rains,
                valid_since: 0,
                valid_until: now() + 30,
                key: vec![5; 32],
            })],
            signatures: vec![make_signature(now() + 3600)],
        };
        engine
            .assert(SignedSection::Assertion(delegation), true, Token::fresh())
            .unwrap();

        // A section of ethz.ch signed for an hour still expires with
        // its delegation key.
        let assertion = ip4_assertion("ethz.ch", "ns", now() + 3600);
        engine
            .assert(SignedSection::Assertion(assertion), false, Token::fresh())
            .unwrap();

        let horizon = now() + 30;
        let hits = engine.assertions.write().unwrap().get(
            ".",
            "ethz.ch",
            "ns",
            ObjectTag::Ip4,
            false,
            now(),
        );
        assert_eq!(hits.len(), 1);
        assert!(hits[0].window.until <= horizon);
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn cached_window_respects_kind_cap() {
        let config = EngineConfig::default()
            .with_server_address(server_addr())
            .with_root_server(root_addr())
            .with_max_validity(MaxCacheValidity {
                assertion: 5,
                shard: 5,
                zone: 5,
            });
        let (engine, _rx) = Engine::new(config);

        let assertion = ip4_assertion("ch", "ethz", now() + 3600);
        engine
            .assert(SignedSection::Assertion(assertion), false, Token::fresh())
            .unwrap();

        let horizon = now() + 5;
        let hits =
            engine
                .assertions
                .write()
                .unwrap()
                .get(".", "ch", "ethz", ObjectTag::Ip4, false, now());
        assert_eq!(hits.len(), 1);
        assert!(hits[0].window.until <= horizon);
    }

    #[test]
    fn cap_hash_not_known_returns_capabilities() {
        let mut config = EngineConfig::default().with_server_address(server_addr());
        config.capabilities = vec!["urn:x-rains:tlssrv".to_string()];
        let (engine, mut rx) = Engine::new(config);

        let token = Token::fresh();
        engine
            .notify(NotificationKind::CapHashNotKnown, token, client_addr())
            .unwrap();
        let out = recv(&mut rx);
        assert_eq!(out.message.token, token);
        assert_eq!(out.message.capabilities, vec!["urn:x-rains:tlssrv".to_string()]);

        // Heartbeats are absorbed.
        engine
            .notify(NotificationKind::Heartbeat, Token::fresh(), client_addr())
            .unwrap();
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn empty_query_name_misses_cleanly() {
        let (engine, mut rx) = setup();
        engine
            .assert(
                SignedSection::Assertion(ip4_assertion("ch", "ethz", now() + 60)),
                false,
                Token::fresh(),
            )
            .unwrap();

        let query = ip4_query("", vec![QueryOption::CachedAnswersOnly]);
        engine.query(query, client_addr()).unwrap();
        assert_eq!(
            notification_kind(&recv(&mut rx).message),
            NotificationKind::NoAssertionAvail
        );
    }

    #[test]
    fn upstream_no_assertion_avail_reaches_waiters() {
        let (engine, mut rx) = setup();
        let query = ip4_query("ethz.ch", vec![]);
        engine.query(query.clone(), client_addr()).unwrap();

        let forwarded = recv(&mut rx);
        let upstream = match &forwarded.message.content[0] {
            Section::Query(q) => q.token,
            other => panic!("expected forwarded query, got {other:?}"),
        };

        engine
            .notify(NotificationKind::NoAssertionAvail, upstream, root_addr())
            .unwrap();
        let out = recv(&mut rx);
        assert_eq!(out.dest, client_addr());
        assert_eq!(notification_kind(&out.message), NotificationKind::NoAssertionAvail);
        assert_eq!(engine.pending_queries(), 0);
    }

    #[test]
    fn closed_outbound_channel_surfaces_as_error() {
        let (engine, rx) = setup();
        drop(rx);
        let result = engine.query(ip4_query("ethz.ch", vec![]), client_addr());
        assert!(matches!(result, Err(Error::OutboundClosed)));
    }
}
