//! Retry Policy
//!
//! 관리형 트랜잭션 함수의 재시도 정책

use std::time::Duration;

use rand::Rng;

use super::driver::DriverConfig;
use super::error::DriverError;

/// 재시도 정책
///
/// `attempt`번째 재시도 전 대기 시간은
/// `initial_delay * multiplier^attempt`에 ±`jitter_factor` 비율의 흔들림을 더한 값입니다.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 최대 재시도 횟수 (첫 시도 제외)
    pub max_retries: usize,
    /// 첫 재시도 대기 시간
    pub initial_delay: Duration,
    /// 지수 배수
    pub multiplier: f64,
    /// 흔들림 비율 (0.0..=1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// 드라이버 설정에서 생성
    pub fn from_config(config: &DriverConfig) -> Self {
        Self {
            max_retries: config.max_retry_count,
            initial_delay: config.initial_retry_delay,
            multiplier: config.retry_backoff_multiplier,
            jitter_factor: config.retry_jitter_factor,
        }
    }

    /// 재시도 여부
    ///
    /// `attempt`는 지금까지의 재시도 횟수입니다.
    pub fn should_retry(&self, error: &DriverError, attempt: usize) -> bool {
        attempt < self.max_retries && is_retryable(error)
    }

    /// 흔들림 없는 대기 시간
    pub fn base_delay(&self, attempt: usize) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as usize) as i32);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }

    /// 흔들림이 적용된 대기 시간
    pub fn delay(&self, attempt: usize) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter_factor <= 0.0 || base.is_zero() {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(-self.jitter_factor..=self.jitter_factor);
        Duration::try_from_secs_f64(base.as_secs_f64() * (1.0 + jitter).max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// 트랜잭션 함수 안에서 다시 시도할 만한 에러
fn is_retryable(error: &DriverError) -> bool {
    error.is_retryable() || matches!(error, DriverError::ServiceUnavailable(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }

    #[test]
    fn test_should_retry_classification() {
        let policy = policy();
        let transient = DriverError::from_failure("Neo.TransientError.Transaction.DeadlockDetected", "deadlock");
        let client = DriverError::from_failure("Neo.ClientError.Statement.SyntaxError", "bad");

        assert!(policy.should_retry(&transient, 0));
        assert!(policy.should_retry(&DriverError::connection("reset by peer"), 0));
        assert!(policy.should_retry(&DriverError::service_unavailable("no writer"), 2));
        assert!(!policy.should_retry(&client, 0));
        assert!(!policy.should_retry(&DriverError::timeout("slow"), 0));
    }

    #[test]
    fn test_retry_bound() {
        let policy = policy();
        let transient = DriverError::from_failure("Neo.TransientError.General.DatabaseUnavailable", "down");
        let retries = (0..10).take_while(|&attempt| policy.should_retry(&transient, attempt)).count();
        assert_eq!(retries, 3);
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = policy();
        assert_eq!(policy.base_delay(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = policy();
        for _ in 0..100 {
            let delay = policy.delay(1);
            assert!(delay >= Duration::from_micros(159_990), "{:?}", delay);
            assert!(delay <= Duration::from_micros(240_010), "{:?}", delay);
        }
    }

    #[test]
    fn test_no_jitter() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..policy()
        };
        assert_eq!(policy.delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(10_000), Duration::MAX);
    }
}
