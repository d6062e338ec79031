//! Per-backend circuit breaker, so the forwarding executor stops hammering
//! a backend that is failing consistently and gives it time to recover.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct State {
    current: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

/// Tracks one backend's recent call outcomes and decides whether a call
/// should be attempted. Closed allows all calls, Open fails fast until the
/// configured timeout elapses, HalfOpen allows a probe call through.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(State {
                current: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call is allowed right now. Transitions Open -> HalfOpen
    /// as a side effect once the timeout has elapsed.
    pub fn should_allow_call(&self) -> bool {
        let mut state = self.state.lock();
        match state.current {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = state.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.timeout {
                    info!(backend = %self.name, "circuit breaker half-opening");
                    state.current = CircuitState::HalfOpen;
                    state.consecutive_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_result(&self, success: bool) {
        let mut state = self.state.lock();
        if success {
            state.consecutive_failures = 0;
            match state.current {
                CircuitState::HalfOpen => {
                    state.consecutive_successes += 1;
                    if state.consecutive_successes >= self.config.success_threshold {
                        info!(backend = %self.name, "circuit breaker closing");
                        state.current = CircuitState::Closed;
                        state.opened_at = None;
                    }
                }
                CircuitState::Closed => {}
                CircuitState::Open => {}
            }
        } else {
            state.consecutive_successes = 0;
            match state.current {
                CircuitState::HalfOpen => {
                    debug!(backend = %self.name, "probe failed, circuit breaker reopening");
                    state.current = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                }
                CircuitState::Closed => {
                    state.consecutive_failures += 1;
                    if state.consecutive_failures >= self.config.failure_threshold {
                        debug!(backend = %self.name, "failure threshold reached, opening circuit");
                        state.current = CircuitState::Open;
                        state.opened_at = Some(Instant::now());
                    }
                }
                CircuitState::Open => {}
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.lock().current
    }
}
