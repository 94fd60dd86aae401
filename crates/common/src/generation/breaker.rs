//! Circuit breaker guarding calls to the generative backend
//!
//! Process-local state, rebuilt fresh on restart. Separate process
//! instances discover upstream instability independently.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through; failures are counted
    Closed,
    /// Calls fail fast until the cooldown elapses
    Open,
    /// One trial call is in flight
    HalfOpen,
}

/// Breaker tuning knobs
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Time the circuit stays open before a trial call
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
}

/// Circuit breaker over one logical external dependency
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().expect("breaker lock poisoned")
    }

    /// Ask permission to make a call.
    ///
    /// Returns the remaining cooldown when the call must be refused. Once
    /// the cooldown has elapsed exactly one caller is admitted as a trial;
    /// its outcome decides whether the circuit closes or reopens.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::HalfOpen => Err(self.config.cooldown),
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.cooldown);
                if elapsed >= self.config.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(self.config.cooldown - elapsed)
                }
            }
        }
    }

    /// Record a successful call: the circuit closes and the counter resets.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.last_failure_at = None;
    }

    /// Record a failed call. Returns true when this failure tripped the
    /// circuit open.
    pub fn record_failure(&self) -> bool {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        inner.last_failure_at = Some(Instant::now());

        let should_open = inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold;
        let tripped = should_open && inner.state != BreakerState::Open;
        if should_open {
            inner.state = BreakerState::Open;
        }
        tripped
    }

    /// Current state
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Current consecutive failure count
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_millis(cooldown_ms),
        })
    }

    #[test]
    fn test_opens_at_threshold() {
        let b = breaker(3, 60_000);

        assert!(b.try_acquire().is_ok());
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);

        let tripped = b.record_failure();
        assert!(tripped);
        assert_eq!(b.state(), BreakerState::Open);

        let refused = b.try_acquire();
        assert!(refused.is_err());
        assert!(refused.unwrap_err() > Duration::ZERO);
    }

    #[test]
    fn test_success_resets_counter() {
        let b = breaker(3, 60_000);
        b.record_failure();
        b.record_failure();
        b.record_success();
        assert_eq!(b.consecutive_failures(), 0);
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_admits_one_trial() {
        let b = breaker(1, 0);
        b.record_failure();

        // Cooldown of zero: the next acquire transitions to half-open.
        assert!(b.try_acquire().is_ok());
        assert_eq!(b.state(), BreakerState::HalfOpen);

        // A second caller is refused while the trial is in flight.
        assert!(b.try_acquire().is_err());

        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.consecutive_failures(), 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let b = breaker(1, 0);
        b.record_failure();
        assert!(b.try_acquire().is_ok());

        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
    }
}
