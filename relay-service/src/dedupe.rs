//! Recent-send ledger and in-flight tracking.
//!
//! Suppresses repeat relays of the same URL: once through a bounded
//! most-recent-first ledger with a per-call-site time window, and once
//! through an in-flight marker guaranteeing at most one concurrent dispatch
//! attempt per URL.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Maximum number of ledger entries; oldest are evicted first.
pub const LEDGER_CAP: usize = 200;

/// Self-expiry of an in-flight marker. A safety bound against stuck state,
/// not a completion signal.
pub const IN_FLIGHT_TTL: Duration = Duration::from_secs(5);

/// Suppression window, chosen per call site rather than per URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeWindow {
    /// Click/menu driven sends.
    Interactive,
    /// Network-observer driven sends.
    Observer,
}

impl DedupeWindow {
    pub fn duration(self) -> Duration {
        match self {
            DedupeWindow::Interactive => Duration::from_secs(3),
            DedupeWindow::Observer => Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    url: String,
    when: Instant,
}

/// Deduplication state for one host session.
///
/// Constructed once per session and owned by the coordinating task; callers
/// on other tasks share it behind a mutex.
pub struct DedupeGuard {
    recent: VecDeque<LedgerEntry>,
    in_flight: HashMap<String, Instant>,
}

impl DedupeGuard {
    pub fn new() -> Self {
        Self {
            recent: VecDeque::new(),
            in_flight: HashMap::new(),
        }
    }

    /// Whether the ledger holds an entry for this URL inside the window.
    ///
    /// Read-only; entries outside the window are ignored but stay in the
    /// ledger until evicted by capacity.
    pub fn seen_recently(&self, url: &str, window: DedupeWindow, now: Instant) -> bool {
        self.recent
            .iter()
            .any(|e| e.url == url && now.duration_since(e.when) < window.duration())
    }

    /// Decide whether a candidate for `url` may proceed to dispatch.
    ///
    /// On acceptance, records an in-flight marker and prepends a ledger
    /// entry. Returns false when the URL was sent inside the window or a
    /// dispatch for it is still in flight.
    pub fn accept(&mut self, url: &str, window: DedupeWindow, now: Instant) -> bool {
        if self.seen_recently(url, window, now) {
            return false;
        }
        if let Some(&since) = self.in_flight.get(url) {
            if now.duration_since(since) < IN_FLIGHT_TTL {
                return false;
            }
        }

        self.in_flight.insert(url.to_string(), now);
        self.recent.push_front(LedgerEntry {
            url: url.to_string(),
            when: now,
        });
        self.recent.truncate(LEDGER_CAP);
        true
    }

    /// The dispatch attempt for `url` resolved; drop its marker early.
    pub fn complete(&mut self, url: &str) {
        self.in_flight.remove(url);
    }

    pub fn ledger_len(&self) -> usize {
        self.recent.len()
    }
}

impl Default for DedupeGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_send_accepted() {
        let mut guard = DedupeGuard::new();
        assert!(guard.accept("http://a/f.zip", DedupeWindow::Interactive, Instant::now()));
    }

    #[test]
    fn test_repeat_inside_window_suppressed() {
        let mut guard = DedupeGuard::new();
        let t0 = Instant::now();
        assert!(guard.accept("http://a/f.zip", DedupeWindow::Interactive, t0));
        guard.complete("http://a/f.zip");

        assert!(!guard.accept(
            "http://a/f.zip",
            DedupeWindow::Interactive,
            t0 + Duration::from_secs(1)
        ));
    }

    #[test]
    fn test_reaccepted_after_window_elapses() {
        let mut guard = DedupeGuard::new();
        let t0 = Instant::now();
        assert!(guard.accept("http://a/f.zip", DedupeWindow::Interactive, t0));
        guard.complete("http://a/f.zip");

        assert!(guard.accept(
            "http://a/f.zip",
            DedupeWindow::Interactive,
            t0 + Duration::from_secs(4)
        ));
    }

    #[test]
    fn test_observer_window_is_longer() {
        let mut guard = DedupeGuard::new();
        let t0 = Instant::now();
        assert!(guard.accept("http://a/f.zip", DedupeWindow::Observer, t0));
        guard.complete("http://a/f.zip");

        // 4s is outside the interactive window but inside the observer one.
        assert!(!guard.accept(
            "http://a/f.zip",
            DedupeWindow::Observer,
            t0 + Duration::from_secs(4)
        ));
        assert!(guard.accept(
            "http://a/f.zip",
            DedupeWindow::Observer,
            t0 + Duration::from_secs(6)
        ));
    }

    #[test]
    fn test_in_flight_blocks_until_completion() {
        let mut guard = DedupeGuard::new();
        let t0 = Instant::now();
        assert!(guard.accept("http://a/f.zip", DedupeWindow::Interactive, t0));

        // Window elapsed but the dispatch never resolved: still suppressed.
        assert!(!guard.accept(
            "http://a/f.zip",
            DedupeWindow::Interactive,
            t0 + Duration::from_secs(4)
        ));
    }

    #[test]
    fn test_in_flight_marker_self_expires() {
        let mut guard = DedupeGuard::new();
        let t0 = Instant::now();
        assert!(guard.accept("http://a/f.zip", DedupeWindow::Interactive, t0));

        // Dispatch stuck past the marker TTL: the URL becomes acceptable again.
        assert!(guard.accept(
            "http://a/f.zip",
            DedupeWindow::Interactive,
            t0 + Duration::from_secs(6)
        ));
    }

    #[test]
    fn test_ledger_never_exceeds_capacity() {
        let mut guard = DedupeGuard::new();
        let t0 = Instant::now();
        for i in 0..500 {
            guard.accept(
                &format!("http://a/f{}.zip", i),
                DedupeWindow::Interactive,
                t0,
            );
        }
        assert_eq!(guard.ledger_len(), LEDGER_CAP);
    }

    #[test]
    fn test_distinct_urls_independent() {
        let mut guard = DedupeGuard::new();
        let t0 = Instant::now();
        assert!(guard.accept("http://a/1.zip", DedupeWindow::Interactive, t0));
        assert!(guard.accept("http://a/2.zip", DedupeWindow::Interactive, t0));
    }
}
