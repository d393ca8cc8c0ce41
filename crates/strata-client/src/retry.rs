use std::time::Duration;

use rand::Rng;

/// How often and how patiently a transport retries one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Counted attempts; timeouts spend a separate grace budget.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
    /// Upserts treat 409 as retryable; reads do not.
    pub retry_conflicts: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::reads()
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn reads() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
            retry_conflicts: false,
        }
    }

    #[must_use]
    pub const fn upserts() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
            retry_conflicts: true,
        }
    }

    /// Pagination reads are retried harder: replication lag makes tenants
    /// occasionally answer a page with an empty body that a later attempt
    /// fills.
    #[must_use]
    pub const fn pagination() -> Self {
        Self {
            max_attempts: 7,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.1,
            retry_conflicts: false,
        }
    }

    #[must_use]
    pub const fn is_retryable_status(&self, status: u16) -> bool {
        status == 429 || status >= 500 || (status == 409 && self.retry_conflicts)
    }

    /// Backoff before the next attempt. A rate-limit hint from the server
    /// wins over exponential backoff, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, rate_limit_hint: Option<Duration>) -> Duration {
        if let Some(hint) = rate_limit_hint {
            return hint.min(self.max_delay);
        }

        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);

        let exponential_ms = u64::try_from(exponential.as_millis()).unwrap_or(u64::MAX);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let jitter_ceiling = (exponential_ms as f64 * self.jitter_factor) as u64;
        let jitter_ms = if jitter_ceiling > 0 {
            rand::thread_rng().gen_range(0..jitter_ceiling)
        } else {
            0
        };

        exponential.saturating_add(Duration::from_millis(jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::RetryPolicy;

    #[test]
    fn server_errors_and_rate_limits_are_always_retryable() {
        let reads = RetryPolicy::reads();
        assert!(reads.is_retryable_status(429));
        assert!(reads.is_retryable_status(500));
        assert!(reads.is_retryable_status(503));
        assert!(!reads.is_retryable_status(403));
        assert!(!reads.is_retryable_status(404));
    }

    #[test]
    fn conflicts_retry_only_for_upserts() {
        assert!(!RetryPolicy::reads().is_retryable_status(409));
        assert!(RetryPolicy::upserts().is_retryable_status(409));
    }

    #[test]
    fn rate_limit_hint_overrides_backoff_but_is_capped() {
        let policy = RetryPolicy::reads();
        let hinted = policy.delay_for(0, Some(Duration::from_secs(2)));
        assert_eq!(hinted, Duration::from_secs(2));

        let capped = policy.delay_for(0, Some(Duration::from_secs(3600)));
        assert_eq!(capped, policy.max_delay);
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..RetryPolicy::reads()
        };
        assert_eq!(policy.delay_for(0, None), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1, None), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(30, None), policy.max_delay);
    }
}
