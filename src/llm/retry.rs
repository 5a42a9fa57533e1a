//! Retry logic with exponential backoff and a circuit breaker.
//!
//! Resilient request handling for the connector layer:
//! - Exponential backoff: 1s, 2s, 4s, 8s, 16s maximum, with jitter
//! - Circuit breaker pattern: 5 failures = 30s cooldown
//! - Configurable timeout: per-request and total-operation
//!
//! Retryability follows [`AegisError::is_retryable`]: transport errors and
//! 408/429/5xx responses retry; other 4xx-class responses fail fast.

use crate::error::{AegisError, AegisResult};
use crate::logging::{log_debug, log_error, log_warn};

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Retry policy configuration for connector requests.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Maximum total operation time.
    pub total_timeout: Duration,
    /// Timeout for individual attempts.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            backoff_multiplier: 2.0,
            total_timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failing, blocking requests
    HalfOpen, // Testing if service recovered
}

#[derive(Debug)]
struct CircuitBreaker {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreaker {
    fn should_allow_request(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => self.check_recovery_timeout(),
        }
    }

    fn check_recovery_timeout(&mut self) -> bool {
        let Some(last_failure) = self.last_failure_time else {
            return false;
        };

        if last_failure.elapsed() >= self.recovery_timeout {
            log_debug!(
                circuit_breaker = "transitioning_to_half_open",
                recovery_timeout_seconds = self.recovery_timeout.as_secs(),
                "Circuit breaker attempting recovery"
            );
            self.state = CircuitState::HalfOpen;
            true
        } else {
            false
        }
    }

    fn record_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            log_debug!(
                circuit_breaker = "recovered",
                "Circuit breaker recovered, returning to closed state"
            );
        }
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.last_failure_time = None;
    }

    fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(Instant::now());

        if self.failure_count >= self.failure_threshold {
            if self.state != CircuitState::Open {
                log_warn!(
                    circuit_breaker = "opened",
                    failure_count = self.failure_count,
                    failure_threshold = self.failure_threshold,
                    recovery_timeout_seconds = self.recovery_timeout.as_secs(),
                    "Circuit breaker opened due to repeated failures"
                );
            }
            self.state = CircuitState::Open;
        }
    }
}

/// Retry executor that handles exponential backoff and circuit breaking.
///
/// Shared by reference across concurrent calls; the circuit breaker is the
/// only mutable state and sits behind a mutex held for checkpoint reads
/// and writes only, never across an await.
#[derive(Debug)]
pub(crate) struct RetryExecutor {
    policy: RetryPolicy,
    circuit_breaker: Mutex<CircuitBreaker>,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryExecutor {
    /// Create a new retry executor with the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            circuit_breaker: Mutex::new(CircuitBreaker::default()),
        }
    }

    /// Execute a request with retry logic and circuit breaking.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> AegisResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = AegisResult<T>>,
    {
        let start_time = Instant::now();
        let mut attempt = 0;
        let mut last_error: Option<AegisError> = None;

        while attempt < self.policy.max_attempts {
            self.check_circuit_breaker()?;
            if start_time.elapsed() >= self.policy.total_timeout {
                return Err(AegisError::upstream(
                    format!(
                        "Operation exceeded total timeout of {}s",
                        self.policy.total_timeout.as_secs()
                    ),
                    false,
                    None,
                ));
            }

            attempt += 1;
            log_debug!(
                attempt = attempt,
                max_attempts = self.policy.max_attempts,
                "Executing request with retry logic"
            );

            let operation_start = Instant::now();
            let result = tokio::time::timeout(self.policy.request_timeout, operation()).await;

            match result {
                Ok(Ok(response)) => {
                    self.record_success();
                    log_debug!(
                        attempt = attempt,
                        duration_ms = operation_start.elapsed().as_millis() as u64,
                        "Request succeeded"
                    );
                    return Ok(response);
                }
                Ok(Err(error)) => {
                    let should_retry = error.is_retryable() && attempt < self.policy.max_attempts;
                    self.record_failure();
                    if !should_retry {
                        last_error = Some(error);
                        break;
                    }
                    let delay = self.calculate_delay(attempt);
                    log_debug!(
                        attempt = attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Request failed, retrying after delay"
                    );
                    last_error = Some(error);
                    sleep(delay).await;
                }
                Err(_timeout) => {
                    self.record_failure();
                    let timeout_error = AegisError::upstream(
                        format!(
                            "Request timed out after {}s",
                            self.policy.request_timeout.as_secs()
                        ),
                        true,
                        None,
                    );
                    if attempt < self.policy.max_attempts {
                        let delay = self.calculate_delay(attempt);
                        log_debug!(
                            attempt = attempt,
                            max_attempts = self.policy.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            "Request timed out, retrying after delay"
                        );
                        last_error = Some(timeout_error);
                        sleep(delay).await;
                    } else {
                        last_error = Some(timeout_error);
                    }
                }
            }
        }

        let final_error = last_error.unwrap_or_else(|| {
            AegisError::upstream("Maximum retry attempts exceeded", false, None)
        });

        log_error!(
            attempts = attempt,
            total_duration_ms = start_time.elapsed().as_millis() as u64,
            error = %final_error,
            "Request failed after all retry attempts"
        );

        Err(final_error)
    }

    fn check_circuit_breaker(&self) -> AegisResult<()> {
        let allowed = self
            .circuit_breaker
            .lock()
            .map(|mut cb| cb.should_allow_request())
            .unwrap_or(true);
        if !allowed {
            return Err(AegisError::upstream(
                "Circuit breaker is open - service temporarily unavailable",
                false,
                None,
            ));
        }
        Ok(())
    }

    fn record_success(&self) {
        if let Ok(mut cb) = self.circuit_breaker.lock() {
            cb.record_success();
        }
    }

    fn record_failure(&self) {
        if let Ok(mut cb) = self.circuit_breaker.lock() {
            cb.record_failure();
        }
    }

    /// Calculate delay for exponential backoff.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_seconds = self.policy.initial_delay.as_secs_f64()
            * self.policy.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay = Duration::from_secs_f64(delay_seconds.min(self.policy.max_delay.as_secs_f64()));

        // Add jitter to prevent thundering herd
        let jitter = fastrand::f64() * 0.1; // Up to 10% jitter
        Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter))
    }
}
