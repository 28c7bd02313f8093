//! Per-identifier failure counting and time-boxed lockout.
//!
//! Flow Overview:
//! 1) Every failed admin authentication calls `record_failure` with the
//!    human-facing identifier (email or username), not the client IP.
//! 2) Reaching `max_failed_attempts` locks the identifier for `lockout_duration`.
//! 3) While locked, further failures are refused without touching the counter.
//! 4) A successful login calls `clear`; an expired lockout behaves as no history.
//! 5) Failures older than `lockout_duration` without a lockout are forgotten,
//!    so one-off identifiers do not accumulate.

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use super::config::delta;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureRecord {
    pub identifier: String,
    pub failed_count: u32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub last_failure: DateTime<Utc>,
}

impl FailureRecord {
    fn new(identifier: String, now: DateTime<Utc>) -> Self {
        Self {
            identifier,
            failed_count: 0,
            lockout_until: None,
            last_failure: now,
        }
    }

    fn locked_at(&self, now: DateTime<Utc>) -> bool {
        self.lockout_until.is_some_and(|until| now <= until)
    }

    /// A served lockout, or sub-threshold failures idle for longer than `window`.
    fn is_stale(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        match self.lockout_until {
            Some(until) => now > until,
            None => now.signed_duration_since(self.last_failure) > window,
        }
    }
}

#[derive(Debug)]
pub struct LockoutTracker {
    max_failed_attempts: u32,
    lockout_duration: TimeDelta,
    records: RwLock<HashMap<String, FailureRecord>>,
}

impl LockoutTracker {
    #[must_use]
    pub fn new(max_failed_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            max_failed_attempts: max_failed_attempts.max(1),
            lockout_duration: delta(lockout_duration),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Register a failed attempt and report whether the identifier is now locked.
    pub fn record_failure(&self, identifier: &str, now: DateTime<Utc>) -> bool {
        let key = normalize_identifier(identifier);
        let newly_locked = {
            let mut records = self.records.write();
            let record = records
                .entry(key.clone())
                .or_insert_with(|| FailureRecord::new(key.clone(), now));

            if record.locked_at(now) {
                return true;
            }
            if record.is_stale(now, self.lockout_duration) {
                record.failed_count = 0;
                record.lockout_until = None;
            }

            record.failed_count = record.failed_count.saturating_add(1);
            if now > record.last_failure {
                record.last_failure = now;
            }
            if record.failed_count >= self.max_failed_attempts {
                let until = now
                    .checked_add_signed(self.lockout_duration)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                record.lockout_until = Some(until);
                Some(until)
            } else {
                None
            }
        };

        match newly_locked {
            Some(until) => {
                warn!(identifier = %key, %until, "identifier locked out after repeated failures");
                true
            }
            None => false,
        }
    }

    /// Forget all failures for `identifier`.
    pub fn clear(&self, identifier: &str) {
        self.records
            .write()
            .remove(&normalize_identifier(identifier));
    }

    #[must_use]
    pub fn is_locked(&self, identifier: &str, now: DateTime<Utc>) -> bool {
        self.records
            .read()
            .get(&normalize_identifier(identifier))
            .is_some_and(|record| record.locked_at(now))
    }

    /// Time left on an active lockout.
    #[must_use]
    pub fn remaining(&self, identifier: &str, now: DateTime<Utc>) -> Option<Duration> {
        let until = self
            .records
            .read()
            .get(&normalize_identifier(identifier))
            .and_then(|record| record.lockout_until)?;
        until.signed_duration_since(now).to_std().ok()
    }

    #[must_use]
    pub fn record(&self, identifier: &str) -> Option<FailureRecord> {
        self.records
            .read()
            .get(&normalize_identifier(identifier))
            .cloned()
    }

    /// Drop served lockouts and idle sub-threshold records. Returns how many
    /// were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let window = self.lockout_duration;
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| !record.is_stale(now, window));
        before - records.len()
    }
}

fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOB: &str = "bob@example.com";

    fn tracker() -> LockoutTracker {
        LockoutTracker::new(3, Duration::from_secs(15 * 60))
    }

    fn count(tracker: &LockoutTracker, identifier: &str) -> u32 {
        tracker
            .record(identifier)
            .map_or(0, |record| record.failed_count)
    }

    #[test]
    fn lockout_cycle() {
        let tracker = tracker();
        let now = Utc::now();

        assert!(!tracker.record_failure(BOB, now));
        assert!(!tracker.record_failure(BOB, now + TimeDelta::seconds(1)));
        assert!(tracker.record_failure(BOB, now + TimeDelta::seconds(2)));
        assert!(tracker.record_failure(BOB, now + TimeDelta::seconds(3)));
        assert_eq!(count(&tracker, BOB), 3);

        tracker.clear(BOB);
        assert!(!tracker.record_failure(BOB, now + TimeDelta::seconds(4)));
        assert_eq!(count(&tracker, BOB), 1);
    }

    #[test]
    fn locked_identifier_never_increments() {
        let tracker = tracker();
        let now = Utc::now();
        for offset in 0..3 {
            tracker.record_failure(BOB, now + TimeDelta::seconds(offset));
        }
        for minute in 0..15 {
            assert!(tracker.record_failure(BOB, now + TimeDelta::minutes(minute)));
            assert_eq!(count(&tracker, BOB), 3);
        }
        assert!(tracker.is_locked(BOB, now + TimeDelta::minutes(10)));
    }

    #[test]
    fn expired_lockout_restarts_at_one() {
        let tracker = tracker();
        let now = Utc::now();
        for _ in 0..3 {
            tracker.record_failure(BOB, now);
        }
        let later = now + TimeDelta::minutes(15) + TimeDelta::seconds(1);
        assert!(!tracker.is_locked(BOB, later));
        assert!(!tracker.record_failure(BOB, later));
        assert_eq!(count(&tracker, BOB), 1);
    }

    #[test]
    fn identifiers_are_normalized() {
        let tracker = tracker();
        let now = Utc::now();
        tracker.record_failure(" Bob@Example.com ", now);
        tracker.record_failure("BOB@EXAMPLE.COM", now);
        assert_eq!(count(&tracker, BOB), 2);
    }

    #[test]
    fn remaining_reports_time_left() {
        let tracker = tracker();
        let now = Utc::now();
        assert_eq!(tracker.remaining(BOB, now), None);
        for _ in 0..3 {
            tracker.record_failure(BOB, now);
        }
        assert_eq!(
            tracker.remaining(BOB, now + TimeDelta::minutes(5)),
            Some(Duration::from_secs(10 * 60))
        );
        assert_eq!(tracker.remaining(BOB, now + TimeDelta::minutes(16)), None);
    }

    #[test]
    fn purge_expired_drops_served_lockouts() {
        let tracker = tracker();
        let now = Utc::now();
        for _ in 0..3 {
            tracker.record_failure(BOB, now);
        }
        tracker.record_failure("carol@example.com", now + TimeDelta::minutes(10));

        assert_eq!(tracker.purge_expired(now + TimeDelta::minutes(1)), 0);
        assert_eq!(tracker.purge_expired(now + TimeDelta::minutes(16)), 1);
        assert!(tracker.record(BOB).is_none());
        assert_eq!(count(&tracker, "carol@example.com"), 1);
    }

    #[test]
    fn purge_expired_drops_idle_failures() {
        let tracker = tracker();
        let now = Utc::now();
        for n in 0..10_000 {
            tracker.record_failure(&format!("guess-{n}@example.com"), now);
        }
        tracker.record_failure(BOB, now + TimeDelta::minutes(10));

        assert_eq!(tracker.purge_expired(now + TimeDelta::minutes(15)), 0);
        assert_eq!(tracker.purge_expired(now + TimeDelta::minutes(16)), 10_000);
        assert_eq!(count(&tracker, BOB), 1);
        assert_eq!(tracker.purge_expired(now + TimeDelta::days(365)), 1);
        assert!(tracker.record(BOB).is_none());
    }

    #[test]
    fn idle_failures_restart_the_count() {
        let tracker = tracker();
        let now = Utc::now();
        tracker.record_failure(BOB, now);
        tracker.record_failure(BOB, now);
        assert!(!tracker.record_failure(BOB, now + TimeDelta::minutes(20)));
        assert_eq!(count(&tracker, BOB), 1);
    }
}
