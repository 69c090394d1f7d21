use serde::Serialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Circuit state for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failed operations before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing a probe
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

/// Outcome of asking the breaker for permission to call the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Circuit closed, full retry budget applies
    Normal,
    /// Half-open probe: a single attempt, no retries
    Probe,
}

struct BreakerInner {
    state: BreakerState,
    failures: u32,
    opened_at: Option<Instant>,
}

/// Per-provider circuit breaker
///
/// Closed counts consecutive failed operations; at the threshold the circuit
/// opens and requests short-circuit until the cool-down elapses, after which
/// a single half-open probe decides between Closed and a fresh cool-down.
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
                failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Ask for permission to attempt the provider
    ///
    /// Returns None while the circuit is open (or a probe is already in
    /// flight); the caller must skip the provider without a network call.
    pub fn try_acquire(&self) -> Option<Attempt> {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            BreakerState::Closed => Some(Attempt::Normal),
            BreakerState::HalfOpen => None,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    Some(Attempt::Probe)
                } else {
                    None
                }
            }
        }
    }

    /// Success on any attempt resets the counter and closes the circuit
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = BreakerState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
    }

    /// Record one failed operation (after the retry budget is exhausted)
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                // Failed probe: reopen with a fresh cool-down clock
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().unwrap().failures
    }
}

/// Read-only breaker snapshot for status queries
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub provider: &'static str,
    pub state: BreakerState,
    pub failures: u32,
}
