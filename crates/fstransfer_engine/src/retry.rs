use chrono::{DateTime, Duration, Utc};
use fstransfer_contract::RequestStatus;

use crate::settings::RetrySettings;

/// Fixed-delay retry with a ceiling on the number of failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    limit: u32,
    delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry_count: u32,
    pub status: RequestStatus,
    pub execution_time: DateTime<Utc>,
}

impl RetryPolicy {
    pub fn new(limit: u32, delay_secs: u64) -> Self {
        let delay = i64::try_from(delay_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self { limit, delay }
    }

    /// Outcome of a failed attempt made by a request that had failed
    /// `retry_count` times before it.
    pub fn after_failure(&self, retry_count: u32, now: DateTime<Utc>) -> RetryDecision {
        let retry_count = retry_count.saturating_add(1);
        let status = if retry_count >= self.limit {
            RequestStatus::Error
        } else {
            RequestStatus::Failed
        };

        RetryDecision {
            retry_count,
            status,
            execution_time: now
                .checked_add_signed(self.delay)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy::new(settings.limit, settings.delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use fstransfer_contract::RequestStatus;

    use super::RetryPolicy;

    #[test]
    fn zero_limit_fails_permanently_on_first_error() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let decision = RetryPolicy::new(0, 3600).after_failure(0, now);
        assert_eq!(decision.retry_count, 1);
        assert_eq!(decision.status, RequestStatus::Error);
    }

    #[test]
    fn failures_below_ceiling_are_rescheduled_after_delay() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let policy = RetryPolicy::new(2, 60);

        let first = policy.after_failure(0, now);
        assert_eq!(first.retry_count, 1);
        assert_eq!(first.status, RequestStatus::Failed);
        assert_eq!(first.execution_time, now + Duration::seconds(60));

        let second = policy.after_failure(first.retry_count, first.execution_time);
        assert_eq!(second.retry_count, 2);
        assert_eq!(second.status, RequestStatus::Error);
    }

    #[test]
    fn retry_count_at_or_above_ceiling_is_never_failed() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let policy = RetryPolicy::new(3, 10);
        for before in 0..10u32 {
            let decision = policy.after_failure(before, now);
            assert_eq!(decision.retry_count, before + 1);
            if decision.retry_count >= 3 {
                assert_eq!(decision.status, RequestStatus::Error);
            } else {
                assert_eq!(decision.status, RequestStatus::Failed);
            }
        }
    }

    #[test]
    fn oversized_delay_saturates() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let decision = RetryPolicy::new(5, u64::MAX).after_failure(0, now);
        assert!(decision.execution_time > now);
    }
}
