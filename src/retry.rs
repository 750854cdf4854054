use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::error::WaxPulseError;

/// Retry policy for a single remote fetch. Delay doubles per attempt,
/// capped at `max_delay`, with ±25% jitter so concurrent workers don't
/// retry in lockstep.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    #[cfg(test)]
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            add_jitter: false,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let delay = Duration::from_secs_f64(exp).min(self.max_delay);

        if self.add_jitter {
            let jitter_range = delay.as_millis() as f64 * 0.25;
            let jitter = (rand_unit() * 2.0 - 1.0) * jitter_range;
            Duration::from_millis((delay.as_millis() as f64 + jitter).max(0.0) as u64)
        } else {
            delay
        }
    }
}

/// Cheap 0.0..1.0 random from the clock's sub-second noise; good enough
/// for jitter without pulling in a PRNG dependency.
fn rand_unit() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos as f64) / (u32::MAX as f64)
}

/// Runs a blocking operation, retrying transient failures with exponential
/// backoff. Terminal errors (4xx, parse failures) return immediately; the
/// last error is returned after the attempt budget is exhausted.
pub fn with_retry<T, F>(config: &RetryConfig, mut operation: F) -> Result<T, WaxPulseError>
where
    F: FnMut() -> Result<T, WaxPulseError>,
{
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(result) => {
                if attempt > 0 {
                    debug!("Succeeded after {} retries", attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.is_retryable() {
                    debug!("Terminal error, not retrying: {}", e);
                    return Err(e);
                }

                attempt += 1;
                if attempt >= config.max_attempts {
                    warn!(
                        "Giving up after {} attempts: {}",
                        config.max_attempts, e
                    );
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt - 1);
                warn!(
                    "Attempt {}/{} failed ({}), retrying in {}ms",
                    attempt,
                    config.max_attempts,
                    e,
                    delay.as_millis()
                );
                thread::sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> WaxPulseError {
        WaxPulseError::Remote {
            status: "503 Service Unavailable".to_string(),
            body: String::new(),
        }
    }

    #[test]
    fn immediate_success_does_not_retry() {
        let mut calls = 0;
        let result = with_retry(&RetryConfig::fast(), || {
            calls += 1;
            Ok::<_, WaxPulseError>(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn retries_transient_errors_until_success() {
        let mut calls = 0;
        let result = with_retry(&RetryConfig::fast(), || {
            calls += 1;
            if calls < 3 {
                Err(transient())
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 3);
    }

    #[test]
    fn exhausts_attempt_budget() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry(&RetryConfig::fast(), || {
            calls += 1;
            Err(transient())
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn terminal_errors_fail_fast() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry(&RetryConfig::fast(), || {
            calls += 1;
            Err(WaxPulseError::Remote {
                status: "404 Not Found".to_string(),
                body: String::new(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn delay_doubles_and_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            add_jitter: false,
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(350));
    }
}
