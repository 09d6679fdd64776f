//! Per-client request throttling.
//!
//! Fixed-window counters in a process-local concurrent map. State dies with
//! the process; a restart clears every window.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

/// Admission control seam. The orchestrator only sees this trait, so a
/// deployment can substitute a shared external counter store without
/// touching the pipeline.
pub trait RequestGate: Send + Sync {
    /// Admit or reject one request from `identifier`.
    fn admit(&self, identifier: &str) -> bool;

    /// Seconds until the identifier's current window resets, rounded up.
    /// 0 when the identifier has no live window.
    fn reset_seconds(&self, identifier: &str) -> u64;
}

#[derive(Debug, Clone)]
struct WindowEntry {
    count: u32,
    reset_at_ms: u64,
}

/// Fixed-window limiter: at most `max_requests` admissions per identifier
/// per window.
pub struct FixedWindowLimiter {
    entries: DashMap<String, WindowEntry>,
    max_requests: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_requests: max_requests.max(1),
            window,
        }
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Drop every expired window. O(active identifiers), run on each
    /// admission check; fine at this scale and keeps the map from
    /// accumulating one entry per client ever seen.
    fn purge_expired(&self, now_ms: u64) {
        self.entries.retain(|_, entry| entry.reset_at_ms > now_ms);
    }
}

impl RequestGate for FixedWindowLimiter {
    fn admit(&self, identifier: &str) -> bool {
        let now = Self::now_ms();
        self.purge_expired(now);

        // The entry guard holds the shard lock, making read-check-increment
        // atomic per identifier.
        let mut entry = self
            .entries
            .entry(identifier.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                reset_at_ms: now + self.window.as_millis() as u64,
            });

        if entry.reset_at_ms <= now {
            entry.count = 1;
            entry.reset_at_ms = now + self.window.as_millis() as u64;
            return true;
        }

        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    fn reset_seconds(&self, identifier: &str) -> u64 {
        let now = Self::now_ms();
        match self.entries.get(identifier) {
            Some(entry) if entry.reset_at_ms > now => {
                (entry.reset_at_ms - now).div_ceil(1000)
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_max_then_rejects() {
        let limiter = FixedWindowLimiter::new(5, Duration::from_secs(60));
        for i in 0..5 {
            assert!(limiter.admit("1.2.3.4"), "request {} should be admitted", i + 1);
        }
        assert!(!limiter.admit("1.2.3.4"), "6th request must be rejected");
        assert!(limiter.reset_seconds("1.2.3.4") > 0);
    }

    #[test]
    fn test_rejection_does_not_consume_budget_forever() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.admit("ip"));
        assert!(!limiter.admit("ip"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.admit("ip"), "a new window admits again");
    }

    #[test]
    fn test_identifiers_are_independent() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.admit("a"));
        assert!(!limiter.admit("a"));
        assert!(limiter.admit("b"));
    }

    #[test]
    fn test_reset_seconds_zero_for_unknown() {
        let limiter = FixedWindowLimiter::new(5, Duration::from_secs(60));
        assert_eq!(limiter.reset_seconds("nobody"), 0);
    }

    #[test]
    fn test_reset_seconds_rounds_up() {
        let limiter = FixedWindowLimiter::new(5, Duration::from_secs(60));
        limiter.admit("ip");
        let reset = limiter.reset_seconds("ip");
        assert!(reset >= 59 && reset <= 60, "got {reset}");
    }

    #[test]
    fn test_expired_entries_are_purged() {
        let limiter = FixedWindowLimiter::new(5, Duration::from_millis(10));
        limiter.admit("a");
        limiter.admit("b");
        std::thread::sleep(Duration::from_millis(20));
        limiter.admit("c");
        // a and b expired and were swept by c's admission check.
        assert_eq!(limiter.entries.len(), 1);
        assert_eq!(limiter.reset_seconds("a"), 0);
    }

    #[test]
    fn test_concurrent_admissions_never_over_admit() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let limiter = Arc::new(FixedWindowLimiter::new(5, Duration::from_secs(60)));
        let admitted = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let limiter = limiter.clone();
                let admitted = admitted.clone();
                std::thread::spawn(move || {
                    if limiter.admit("shared-ip") {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_zero_max_is_clamped() {
        let limiter = FixedWindowLimiter::new(0, Duration::from_secs(60));
        assert!(limiter.admit("ip"), "clamped to 1, first request passes");
        assert!(!limiter.admit("ip"));
    }
}
