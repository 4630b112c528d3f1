//! Clock and validity-window arithmetic.
//!
//! Every cached section carries an effective `[since, until]` window:
//! the intersection of the signature lifetime and the delegation-key
//! lifetime, both ends clamped so the entry never outlives
//! `now + max_validity` for its section kind.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use rains_model::{PublicKey, SectionKind, Signature};

/// An inclusive validity interval in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub since: i64,
    pub until: i64,
}

impl Window {
    /// The unbounded interval.
    pub const MAX: Window = Window {
        since: i64::MIN,
        until: i64::MAX,
    };

    pub const fn new(since: i64, until: i64) -> Self {
        Self { since, until }
    }

    /// Whether `at` lies inside the window.
    pub fn contains(&self, at: i64) -> bool {
        self.since <= at && at <= self.until
    }

    /// Whether the window has passed at `now`.
    pub fn expired_at(&self, now: i64) -> bool {
        self.until < now
    }

    /// The union of two windows: earliest start, latest end.
    pub fn union(&self, other: Window) -> Window {
        Window {
            since: self.since.min(other.since),
            until: self.until.max(other.until),
        }
    }
}

/// Per-kind caps on how long a section may stay cached, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxCacheValidity {
    pub assertion: i64,
    pub shard: i64,
    pub zone: i64,
}

impl MaxCacheValidity {
    /// The cap for the given section kind.
    pub const fn for_kind(&self, kind: SectionKind) -> i64 {
        match kind {
            SectionKind::Assertion => self.assertion,
            SectionKind::Shard => self.shard,
            SectionKind::Zone => self.zone,
        }
    }
}

impl Default for MaxCacheValidity {
    fn default() -> Self {
        Self {
            assertion: 24 * 3600,
            shard: 24 * 3600,
            zone: 24 * 3600,
        }
    }
}

/// Intersect a delegation-key lifetime with a signature lifetime.
///
/// Both ends are clamped to `now + cap`, so a window that starts in the
/// far future collapses onto the ceiling rather than surviving past it.
pub fn clamp(pkey: Window, sig: Window, cap: i64, now: i64) -> Window {
    let ceiling = now.saturating_add(cap);
    Window {
        since: pkey.since.max(sig.since).min(ceiling),
        until: pkey.until.min(sig.until).min(ceiling),
    }
}

/// Effective window of a section: the union over its signatures of each
/// signature's clamped intersection with the delegation-key lifetime.
///
/// Malformed signatures (inverted intervals) contribute nothing. With
/// no usable signature there is no window and the section cannot be
/// cached. A missing delegation key leaves the signature lifetime
/// unconstrained; key lookup is the caller's concern.
pub fn section_window(
    signatures: &[Signature],
    pkey: Option<&PublicKey>,
    cap: i64,
    now: i64,
) -> Option<Window> {
    let pkey_window = pkey
        .map(|key| Window::new(key.valid_since, key.valid_until))
        .unwrap_or(Window::MAX);

    let mut effective: Option<Window> = None;
    for sig in signatures {
        if !sig.is_well_formed() {
            continue;
        }
        let clamped = clamp(
            pkey_window,
            Window::new(sig.valid_since, sig.valid_until),
            cap,
            now,
        );
        effective = Some(match effective {
            Some(acc) => acc.union(clamped),
            None => clamped,
        });
    }
    effective
}

/// Outcome of checking a window against the cache ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// The window may enter the cache.
    Accept(Window),
    /// The window starts beyond `now + cap`; the section is useless to
    /// any current waiter and must be dropped.
    TooFarInFuture,
}

/// Gate a window against `now + cap`.
pub fn accept(window: Window, cap: i64, now: i64) -> Acceptance {
    if window.since > now.saturating_add(cap) {
        Acceptance::TooFarInFuture
    } else {
        Acceptance::Accept(window)
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Wall-clock seconds that never run backwards within a process.
///
/// Validity comparisons assume time moves forward; a wall clock stepped
/// backwards (NTP, VM migration) would otherwise resurrect expired
/// entries and re-arm dead waiters.
#[derive(Debug, Default)]
pub struct Clock {
    floor: AtomicI64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current unix seconds, monotonic within this process.
    pub fn now(&self) -> i64 {
        let wall = unix_now();
        let floor = self.floor.fetch_max(wall, Ordering::Relaxed);
        wall.max(floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rains_model::{KeySpace, SignatureAlgorithm};

    fn make_signature(since: i64, until: i64) -> Signature {
        Signature {
            key_space: KeySpace::Rains,
            algorithm: SignatureAlgorithm::Ed25519,
            valid_since: since,
            valid_until: until,
            data: b"sig".to_vec(),
        }
    }

    fn make_key(since: i64, until: i64) -> PublicKey {
        PublicKey {
            algorithm: SignatureAlgorithm::Ed25519,
            key_space: KeySpace::Rains,
            valid_since: since,
            valid_until: until,
            key: vec![1; 32],
        }
    }

    #[test]
    fn clamp_intersects_and_caps() {
        let now = 1_000_000;
        // (pkey, sig, cap, want)
        let cases = [
            ((now + 1, now + 4), (now + 2, now + 3), 4, (now + 2, now + 3)),
            ((now + 2, now + 3), (now + 1, now + 4), 4, (now + 2, now + 3)),
            ((now + 1, now + 3), (now + 2, now + 4), 4, (now + 2, now + 3)),
            ((now + 2, now + 4), (now + 1, now + 3), 4, (now + 2, now + 3)),
            ((now + 2, now + 4), (now + 1, now + 3), 2, (now + 2, now + 2)),
            ((now + 2, now + 4), (now + 1, now + 3), 1, (now + 1, now + 1)),
        ];
        for (i, (pkey, sig, cap, want)) in cases.into_iter().enumerate() {
            let got = clamp(
                Window::new(pkey.0, pkey.1),
                Window::new(sig.0, sig.1),
                cap,
                now,
            );
            assert_eq!(got, Window::new(want.0, want.1), "case {i}");
        }
    }

    #[test]
    fn section_window_unions_signatures() {
        let now = 1_000_000;
        let sigs = [
            make_signature(now + 1, now + 2),
            make_signature(now + 3, now + 4),
        ];
        let window = section_window(&sigs, None, 100, now).unwrap();
        assert_eq!(window, Window::new(now + 1, now + 4));
    }

    #[test]
    fn section_window_respects_delegation_key() {
        let now = 1_000_000;
        let sigs = [make_signature(now + 2, now + 3)];
        let key = make_key(now + 1, now + 4);
        let window = section_window(&sigs, Some(&key), 4, now).unwrap();
        assert_eq!(window, Window::new(now + 2, now + 3));
    }

    #[test]
    fn section_window_skips_malformed_signatures() {
        let now = 1_000_000;
        let sigs = [make_signature(now + 5, now + 1)];
        assert_eq!(section_window(&sigs, None, 100, now), None);
        assert_eq!(section_window(&[], None, 100, now), None);
    }

    #[test]
    fn accept_rejects_far_future() {
        let now = 1_000_000;
        // A window computed against an earlier clock can start beyond
        // the current ceiling; such a section answers nothing.
        let stale = Window::new(now + 50, now + 60);
        assert_eq!(accept(stale, 10, now), Acceptance::TooFarInFuture);
        assert_eq!(
            accept(Window::new(now + 5, now + 60), 10, now),
            Acceptance::Accept(Window::new(now + 5, now + 60))
        );
    }

    #[test]
    fn window_contains_and_expiry() {
        let window = Window::new(100, 200);
        assert!(window.contains(100));
        assert!(window.contains(200));
        assert!(!window.contains(201));
        assert!(!window.expired_at(200));
        assert!(window.expired_at(201));
    }

    #[test]
    fn clock_never_runs_backwards() {
        let clock = Clock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
