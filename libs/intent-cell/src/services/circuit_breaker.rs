// =====================================================================================
// CIRCUIT BREAKER FOR THE LANGUAGE MODEL EXTRACTOR
// =====================================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{info, warn};

use shared_config::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    Closed,   // Normal operation
    Open,     // Failing, reject requests
    HalfOpen, // Probing whether the service recovered
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u64,
    pub recovery_timeout: Duration,
    pub success_threshold: u64,
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
            timeout: Duration::from_millis(4000),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            failure_threshold: config.extractor_failure_threshold.max(1),
            recovery_timeout: Duration::from_secs(config.extractor_recovery_secs),
            timeout: Duration::from_millis(config.extractor_timeout_ms),
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    CircuitOpen,
    #[error("Operation timed out")]
    Timeout,
    #[error("Operation failed: {0:?}")]
    OperationFailed(E),
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: Arc<RwLock<CircuitBreakerState>>,
    failure_count: Arc<AtomicU64>,
    success_count: Arc<AtomicU64>,
    last_failure_time: Arc<RwLock<Option<Instant>>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(CircuitBreakerState::Closed)),
            failure_count: Arc::new(AtomicU64::new(0)),
            success_count: Arc::new(AtomicU64::new(0)),
            last_failure_time: Arc::new(RwLock::new(None)),
            config,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub async fn state(&self) -> CircuitBreakerState {
        *self.state.read().await
    }

    /// Runs `operation` under the configured timeout. Timeouts count as failures.
    pub async fn execute<F, R, E>(&self, operation: F) -> Result<R, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<R, E>>,
        E: std::fmt::Debug,
    {
        if !self.should_allow_request().await {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        match tokio::time::timeout(self.config.timeout, operation).await {
            Ok(Ok(success)) => {
                self.on_success().await;
                Ok(success)
            }
            Ok(Err(error)) => {
                self.on_failure().await;
                Err(CircuitBreakerError::OperationFailed(error))
            }
            Err(_) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Timeout)
            }
        }
    }

    async fn should_allow_request(&self) -> bool {
        let state = *self.state.read().await;
        match state {
            CircuitBreakerState::Closed | CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open => {
                let recovered = self
                    .last_failure_time
                    .read()
                    .await
                    .map_or(false, |last| last.elapsed() >= self.config.recovery_timeout);
                if recovered {
                    *self.state.write().await = CircuitBreakerState::HalfOpen;
                    info!("Extractor circuit breaker HALF-OPEN, probing language model");
                }
                recovered
            }
        }
    }

    async fn on_success(&self) {
        let current = *self.state.read().await;
        match current {
            CircuitBreakerState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold {
                    *self.state.write().await = CircuitBreakerState::Closed;
                    self.failure_count.store(0, Ordering::SeqCst);
                    self.success_count.store(0, Ordering::SeqCst);
                    info!("Extractor circuit breaker reset to CLOSED");
                }
            }
            _ => self.failure_count.store(0, Ordering::SeqCst),
        }
    }

    async fn on_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_failure_time.write().await = Some(Instant::now());

        let mut state = self.state.write().await;
        let trial_failed = *state == CircuitBreakerState::HalfOpen;
        if trial_failed || failures >= self.config.failure_threshold {
            *state = CircuitBreakerState::Open;
            self.success_count.store(0, Ordering::SeqCst);
            warn!("Extractor circuit breaker OPEN after {} failures", failures);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u64, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: recovery,
            success_threshold: 1,
            timeout: Duration::from_millis(50),
        })
    }

    #[tokio::test]
    async fn opens_after_threshold_and_rejects() {
        let cb = breaker(2, Duration::from_secs(60));

        for _ in 0..2 {
            let r: Result<(), _> = cb.execute(async { Err::<(), &str>("down") }).await;
            assert!(matches!(r, Err(CircuitBreakerError::OperationFailed("down"))));
        }
        assert_eq!(cb.state().await, CircuitBreakerState::Open);

        let r = cb.execute(async { Ok::<_, &str>(1) }).await;
        assert!(matches!(r, Err(CircuitBreakerError::CircuitOpen)));
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let cb = breaker(1, Duration::from_secs(60));
        let r = cb
            .execute(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, &str>(())
            })
            .await;
        assert!(matches!(r, Err(CircuitBreakerError::Timeout)));
        assert_eq!(cb.state().await, CircuitBreakerState::Open);
    }

    #[tokio::test]
    async fn half_open_trial_closes_on_success() {
        let cb = breaker(1, Duration::from_millis(0));
        let _ = cb.execute(async { Err::<(), &str>("down") }).await;
        assert_eq!(cb.state().await, CircuitBreakerState::Open);

        let r = cb.execute(async { Ok::<_, &str>(7) }).await;
        assert!(matches!(r, Ok(7)));
        assert_eq!(cb.state().await, CircuitBreakerState::Closed);
    }
}
