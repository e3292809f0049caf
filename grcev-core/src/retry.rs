//! Retry backoff policy.
//!
//! Pure functions mapping an attempt count to the next retry time. The
//! dispatcher calls [`next_retry_at`] after each failed attempt with the
//! incremented attempt number; a `None` result marks the log eligible
//! for dead-lettering.

use crate::entities::subscription::RetryPolicy;

/// Exponent cap for exponential backoff so the shift stays in range.
/// 2^20 * 2 minutes is already far beyond any useful retry horizon.
const MAX_BACKOFF_EXPONENT: i32 = 20;

/// Delay before the retry that would follow attempt `attempt_number`.
///
/// * `Linear`: `attempt_number * 5` minutes (5, 10, 15, …)
/// * `Exponential`: `2^attempt_number * 2` minutes (4, 8, 16, …)
/// * `None`: zero — immediate retry eligibility; true no-retry semantics
///   come from `max_retries = 0`, not from this policy
pub fn retry_delay(attempt_number: i32, policy: RetryPolicy) -> time::Duration {
    let attempt = i64::from(attempt_number.max(0));
    match policy {
        RetryPolicy::None => time::Duration::ZERO,
        RetryPolicy::Linear => time::Duration::minutes(attempt * 5),
        RetryPolicy::Exponential => {
            let exponent = attempt.min(i64::from(MAX_BACKOFF_EXPONENT));
            time::Duration::minutes(2i64 << exponent)
        }
    }
}

/// Compute the next retry time after a failed attempt, or `None` once
/// `attempt_number` has reached `max_retries`.
pub fn next_retry_at(
    attempt_number: i32,
    policy: RetryPolicy,
    max_retries: i32,
    now: time::OffsetDateTime,
) -> Option<time::OffsetDateTime> {
    if attempt_number >= max_retries {
        return None;
    }
    Some(now + retry_delay(attempt_number, policy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_delay_is_five_minutes_per_attempt() {
        assert_eq!(
            retry_delay(1, RetryPolicy::Linear),
            time::Duration::minutes(5)
        );
        assert_eq!(
            retry_delay(2, RetryPolicy::Linear),
            time::Duration::minutes(10)
        );
        assert_eq!(
            retry_delay(3, RetryPolicy::Linear),
            time::Duration::minutes(15)
        );
    }

    #[test]
    fn linear_delay_is_monotonically_non_decreasing() {
        let mut previous = time::Duration::ZERO;
        for attempt in 0..100 {
            let delay = retry_delay(attempt, RetryPolicy::Linear);
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn exponential_delay_doubles_from_four_minutes() {
        assert_eq!(
            retry_delay(1, RetryPolicy::Exponential),
            time::Duration::minutes(4)
        );
        assert_eq!(
            retry_delay(2, RetryPolicy::Exponential),
            time::Duration::minutes(8)
        );
        assert_eq!(
            retry_delay(3, RetryPolicy::Exponential),
            time::Duration::minutes(16)
        );
    }

    #[test]
    fn exponential_delay_is_strictly_increasing_below_the_cap() {
        let mut previous = time::Duration::ZERO;
        for attempt in 0..=MAX_BACKOFF_EXPONENT {
            let delay = retry_delay(attempt, RetryPolicy::Exponential);
            assert!(delay > previous);
            previous = delay;
        }
    }

    #[test]
    fn exponential_delay_is_capped_for_huge_attempt_counts() {
        let capped = retry_delay(MAX_BACKOFF_EXPONENT, RetryPolicy::Exponential);
        assert_eq!(retry_delay(MAX_BACKOFF_EXPONENT + 1, RetryPolicy::Exponential), capped);
        assert_eq!(retry_delay(i32::MAX, RetryPolicy::Exponential), capped);
    }

    #[test]
    fn no_backoff_policy_has_zero_delay() {
        assert_eq!(retry_delay(1, RetryPolicy::None), time::Duration::ZERO);
        assert_eq!(retry_delay(50, RetryPolicy::None), time::Duration::ZERO);
    }

    #[test]
    fn exhausted_attempts_yield_no_retry_time() {
        let now = time::OffsetDateTime::UNIX_EPOCH;
        for policy in [RetryPolicy::None, RetryPolicy::Linear, RetryPolicy::Exponential] {
            assert_eq!(next_retry_at(3, policy, 3, now), None);
            assert_eq!(next_retry_at(7, policy, 3, now), None);
            assert_eq!(next_retry_at(0, policy, 0, now), None);
        }
    }

    #[test]
    fn remaining_attempts_schedule_from_now() {
        let now = time::OffsetDateTime::UNIX_EPOCH;
        assert_eq!(
            next_retry_at(1, RetryPolicy::Exponential, 3, now),
            Some(now + time::Duration::minutes(4))
        );
        assert_eq!(
            next_retry_at(2, RetryPolicy::Linear, 3, now),
            Some(now + time::Duration::minutes(10))
        );
        assert_eq!(
            next_retry_at(1, RetryPolicy::None, 3, now),
            Some(now)
        );
    }
}
