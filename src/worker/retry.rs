//! Retry Policy
//!
//! Attempt budget and backoff shared by both workers. Settings can be
//! changed at runtime through `&self`.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::swap::TransactionRecord;

#[derive(Debug)]
pub struct RetryPolicy {
    max_retries: AtomicU32,
    retry_delay_secs: AtomicU64,
}

fn clamp_u32(n: i64) -> u32 {
    u32::try_from(n.max(0)).unwrap_or(u32::MAX)
}

fn clamp_u64(n: i64) -> u64 {
    n.max(0) as u64
}

impl RetryPolicy {
    /// Negative inputs are treated as zero.
    pub fn new(max_retries: i64, retry_delay_secs: i64) -> Self {
        Self {
            max_retries: AtomicU32::new(clamp_u32(max_retries)),
            retry_delay_secs: AtomicU64::new(clamp_u64(retry_delay_secs)),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.load(Ordering::Relaxed)
    }

    pub fn retry_delay_secs(&self) -> u64 {
        self.retry_delay_secs.load(Ordering::Relaxed)
    }

    pub fn retry_delay(&self) -> TimeDelta {
        i64::try_from(self.retry_delay_secs())
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    pub fn set_max_retries(&self, max_retries: i64) {
        self.max_retries
            .store(clamp_u32(max_retries), Ordering::Relaxed);
    }

    pub fn set_retry_delay(&self, retry_delay_secs: i64) {
        self.retry_delay_secs
            .store(clamp_u64(retry_delay_secs), Ordering::Relaxed);
    }

    /// Budget left for another attempt after a failure
    pub fn should_retry(&self, record: &TransactionRecord) -> bool {
        record.retry_count < self.max_retries()
    }

    /// `last_retry_at + retry_delay`, or `now` for a record never retried
    pub fn next_attempt_allowed_at(
        &self,
        record: &TransactionRecord,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        match record.last_retry_at {
            Some(last) => last
                .checked_add_signed(self.retry_delay())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            None => now,
        }
    }

    pub fn is_eligible(&self, record: &TransactionRecord, now: DateTime<Utc>) -> bool {
        now >= self.next_attempt_allowed_at(record, now)
    }

    /// Records whose `last_retry_at` is at or before this instant are due.
    pub fn due_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.retry_delay())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::TransactionRecord;
    use crate::swap::types::fixtures::{deposit_hash, new_swap};

    fn record() -> TransactionRecord {
        TransactionRecord::new(new_swap(&deposit_hash(1)), Utc::now())
    }

    #[test]
    fn test_should_retry_budget() {
        let policy = RetryPolicy::new(2, 30);
        let mut r = record();
        assert!(policy.should_retry(&r));
        r.retry_count = 1;
        assert!(policy.should_retry(&r));
        r.retry_count = 2;
        assert!(!policy.should_retry(&r));
    }

    #[test]
    fn test_next_attempt_allowed_at() {
        let policy = RetryPolicy::new(3, 30);
        let now = Utc::now();
        let mut r = record();
        assert_eq!(policy.next_attempt_allowed_at(&r, now), now);
        assert!(policy.is_eligible(&r, now));

        r.last_retry_at = Some(now);
        assert_eq!(
            policy.next_attempt_allowed_at(&r, now),
            now + TimeDelta::seconds(30)
        );
        assert!(!policy.is_eligible(&r, now + TimeDelta::seconds(29)));
        assert!(policy.is_eligible(&r, now + TimeDelta::seconds(30)));
        assert_eq!(policy.due_cutoff(now), now - TimeDelta::seconds(30));
    }

    #[test]
    fn test_negative_settings_clamp_to_zero() {
        let policy = RetryPolicy::new(3, 30);
        policy.set_max_retries(-5);
        policy.set_retry_delay(-100);
        assert_eq!(policy.max_retries(), 0);
        assert_eq!(policy.retry_delay_secs(), 0);

        let mut r = record();
        r.last_retry_at = Some(Utc::now());
        assert!(!policy.should_retry(&r));
        assert!(policy.is_eligible(&r, Utc::now()));
    }

    #[test]
    fn test_huge_delay_does_not_overflow() {
        let policy = RetryPolicy::new(i64::MAX, i64::MAX);
        assert_eq!(policy.max_retries(), u32::MAX);
        let now = Utc::now();
        let mut r = record();
        r.last_retry_at = Some(now);
        assert!(!policy.is_eligible(&r, now));
        assert_eq!(policy.due_cutoff(now), DateTime::<Utc>::MIN_UTC);
    }
}
